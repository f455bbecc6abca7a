use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use runner_core::config::{DEFAULT_API_BASE, DEFAULT_API_VERSION};

use crate::error::GitHubError;
use crate::types::RepoInfo;

const GITHUB_ACCEPT: &str = "application/vnd.github+json";
const API_VERSION_HEADER: &str = "X-GitHub-Api-Version";
const CLIENT_USER_AGENT: &str = concat!("runnerd/", env!("CARGO_PKG_VERSION"));

/// Status and decoded body of one API call. Non-2xx statuses are data here,
/// not errors; callers decide what each status means.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    /// Parsed JSON body, `Value::Null` when the body is empty or not JSON.
    pub body: Value,
    /// Raw body text, kept for error messages.
    pub text: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self, context: &str) -> Result<T, GitHubError> {
        serde_json::from_value(self.body.clone()).map_err(|err| GitHubError::Decode {
            context: context.to_string(),
            message: err.to_string(),
        })
    }
}

/// Transport seam between the managers and the remote API.
///
/// Implementations fail only on transport problems (DNS, connect, timeout);
/// every HTTP status comes back as an [`ApiResponse`].
#[async_trait]
pub trait GitHubApi: Send + Sync {
    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<ApiResponse, GitHubError>;

    async fn post(&self, path: &str, body: &Value) -> Result<ApiResponse, GitHubError>;

    async fn get_repo(&self, repo: &str) -> Result<RepoInfo, GitHubError> {
        let context = format!("get repo {repo}");
        let response = self.get(&format!("/repos/{repo}"), &[]).await?;
        if response.status != 200 {
            return Err(GitHubError::from_response(context, &response));
        }
        response.json(&context)
    }

    /// Current default branch; never cached because it can change between jobs.
    async fn default_branch(&self, repo: &str) -> Result<String, GitHubError> {
        let info = self.get_repo(repo).await?;
        Ok(info.default_branch_or_main().to_string())
    }
}

/// Authenticated client for a fixed API root.
///
/// The underlying connection pool is built on first use and shared by all
/// callers; [`GitHubClient::close`] releases it and the next call rebuilds it.
/// Dropping the last handle releases it too.
pub struct GitHubClient {
    base_url: String,
    token: String,
    api_version: String,
    timeout: Duration,
    http: Mutex<Option<reqwest::Client>>,
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .field("timeout", &self.timeout)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

impl GitHubClient {
    pub fn new(token: impl Into<String>, timeout: Duration) -> Self {
        Self::with_base_url(DEFAULT_API_BASE, token, timeout)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            api_version: DEFAULT_API_VERSION.to_string(),
            timeout,
            http: Mutex::new(None),
        }
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_open(&self) -> bool {
        self.http
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Drop the pooled connections. Safe to call more than once.
    pub fn close(&self) {
        let released = self
            .http
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if released.is_some() {
            debug!(base_url = %self.base_url, "released GitHub API connection pool");
        }
    }

    fn connection(&self) -> Result<reqwest::Client, GitHubError> {
        let mut slot = self.http.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|source| GitHubError::Transport {
                context: "build http client".to_string(),
                source,
            })?;
        *slot = Some(client.clone());
        Ok(client)
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .bearer_auth(&self.token)
            .header(ACCEPT, GITHUB_ACCEPT)
            .header(API_VERSION_HEADER, &self.api_version)
            .header(USER_AGENT, CLIENT_USER_AGENT)
    }

    async fn execute(
        &self,
        context: String,
        request: reqwest::RequestBuilder,
    ) -> Result<ApiResponse, GitHubError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|source| GitHubError::Transport {
                context: context.clone(),
                source,
            })?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|source| GitHubError::Transport {
                context: context.clone(),
                source,
            })?;
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);
        debug!(%context, status, "GitHub API call finished");
        Ok(ApiResponse { status, body, text })
    }
}

#[async_trait]
impl GitHubApi for GitHubClient {
    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<ApiResponse, GitHubError> {
        let request = self.connection()?.get(self.url(path)).query(query);
        self.execute(format!("GET {path}"), request).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<ApiResponse, GitHubError> {
        let request = self.connection()?.post(self.url(path)).json(body);
        self.execute(format!("POST {path}"), request).await
    }
}
