use serde::{Deserialize, Serialize};

/// Subset of the repository resource the runner reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RepoInfo {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub fork: bool,
    #[serde(default)]
    pub parent: Option<RepoRef>,
    #[serde(default)]
    pub source: Option<RepoRef>,
    #[serde(default)]
    pub default_branch: Option<String>,
    #[serde(default)]
    pub permissions: Option<RepoPermissions>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRef {
    pub full_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RepoPermissions {
    #[serde(default)]
    pub admin: Option<bool>,
    #[serde(default)]
    pub push: Option<bool>,
    #[serde(default)]
    pub pull: Option<bool>,
}

impl RepoInfo {
    pub fn parent_name(&self) -> Option<&str> {
        self.parent.as_ref().map(|parent| parent.full_name.as_str())
    }

    pub fn source_name(&self) -> Option<&str> {
        self.source.as_ref().map(|source| source.full_name.as_str())
    }

    /// True when this repository is a fork whose parent or root source is
    /// `upstream`. Repository names compare case-insensitively, as they do
    /// on GitHub.
    pub fn is_fork_of(&self, upstream: &str) -> bool {
        self.fork
            && [self.parent_name(), self.source_name()]
                .into_iter()
                .flatten()
                .any(|name| name.eq_ignore_ascii_case(upstream))
    }

    /// Only an explicit `push: false` counts as denied; absent permissions
    /// mean the token's access was not reported.
    pub fn push_denied(&self) -> bool {
        self.permissions
            .and_then(|permissions| permissions.push)
            .is_some_and(|push| !push)
    }

    pub fn default_branch_or_main(&self) -> &str {
        self.default_branch
            .as_deref()
            .filter(|branch| !branch.is_empty())
            .unwrap_or("main")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestInfo {
    #[serde(default)]
    pub number: Option<u64>,
    #[serde(default)]
    pub html_url: String,
}
