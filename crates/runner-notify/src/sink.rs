use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::error::NotifyError;
use crate::signature::{CallbackSigner, SIGNATURE_HEADER};
use crate::types::CallbackPayload;

const RESPONSE_SNIPPET_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Per-attempt request timeout.
    pub timeout: Duration,
    pub max_attempts: u32,
    /// Base delay; attempt `n` is followed by a pause of `backoff * n`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_attempts: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

/// Pause after the given 1-based attempt. Linear, not exponential: callback
/// consumers are short-lived CI jobs.
pub fn linear_backoff(policy: &RetryPolicy, attempt: u32) -> Duration {
    policy.backoff.saturating_mul(attempt)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// No callback URL configured.
    Skipped,
    Delivered { attempts: u32 },
    Failed { attempts: u32, last_error: String },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            DeliveryOutcome::Skipped => 0,
            DeliveryOutcome::Delivered { attempts } | DeliveryOutcome::Failed { attempts, .. } => {
                *attempts
            }
        }
    }
}

/// Delivers signed terminal-status webhooks.
///
/// Never returns an error: a lost notification must not change the job's
/// already recorded outcome.
#[derive(Debug, Clone)]
pub struct CallbackNotifier {
    signer: CallbackSigner,
    policy: RetryPolicy,
}

impl CallbackNotifier {
    pub fn new(signer: CallbackSigner, policy: RetryPolicy) -> Self {
        Self { signer, policy }
    }

    pub fn signer(&self) -> &CallbackSigner {
        &self.signer
    }

    pub async fn send_callback(&self, url: &str, payload: &CallbackPayload) -> DeliveryOutcome {
        self.send_callback_with_policy(url, payload, &self.policy)
            .await
    }

    /// POST `payload` to `url`, retrying 429/5xx and transport failures up to
    /// `policy.max_attempts` times in total (at least once).
    ///
    /// The body is serialized and signed once and the same bytes are sent
    /// on every attempt.
    pub async fn send_callback_with_policy(
        &self,
        url: &str,
        payload: &CallbackPayload,
        policy: &RetryPolicy,
    ) -> DeliveryOutcome {
        if url.trim().is_empty() {
            debug!(job_id = %payload.job_id, "no callback URL configured; skipping");
            return DeliveryOutcome::Skipped;
        }

        let body = match payload.to_bytes() {
            Ok(body) => body,
            Err(err) => {
                error!(job_id = %payload.job_id, error = %err, "failed to encode callback payload");
                return DeliveryOutcome::Failed {
                    attempts: 0,
                    last_error: err.to_string(),
                };
            }
        };
        let signature = self.signer.generate_signature(&body);

        let client = match reqwest::Client::builder().timeout(policy.timeout).build() {
            Ok(client) => client,
            Err(err) => {
                error!(job_id = %payload.job_id, error = %err, "failed to build callback HTTP client");
                return DeliveryOutcome::Failed {
                    attempts: 0,
                    last_error: err.to_string(),
                };
            }
        };

        let max_attempts = policy.max_attempts.max(1);
        let mut last_error = String::new();
        for attempt in 1..=max_attempts {
            match post_once(&client, url, &body, signature.as_deref()).await {
                Ok(status) => {
                    info!(job_id = %payload.job_id, callback_url = url, status, attempt, "callback delivered");
                    return DeliveryOutcome::Delivered { attempts: attempt };
                }
                Err(err) if err.is_retryable() => {
                    warn!(job_id = %payload.job_id, callback_url = url, attempt, error = %err, "callback attempt failed");
                    last_error = err.to_string();
                }
                Err(err) => {
                    warn!(job_id = %payload.job_id, callback_url = url, attempt, error = %err, "callback rejected");
                    return DeliveryOutcome::Failed {
                        attempts: attempt,
                        last_error: err.to_string(),
                    };
                }
            }

            if attempt < max_attempts {
                sleep(linear_backoff(policy, attempt)).await;
            }
        }

        error!(
            job_id = %payload.job_id,
            callback_url = url,
            attempts = max_attempts,
            error = %last_error,
            "callback delivery gave up"
        );
        DeliveryOutcome::Failed {
            attempts: max_attempts,
            last_error,
        }
    }
}

async fn post_once(
    client: &reqwest::Client,
    url: &str,
    body: &[u8],
    signature: Option<&str>,
) -> Result<u16, NotifyError> {
    let mut request = client
        .post(url)
        .header(CONTENT_TYPE, "application/json")
        .body(body.to_vec());
    if let Some(signature) = signature {
        request = request.header(SIGNATURE_HEADER, signature);
    }

    let response = request
        .send()
        .await
        .map_err(|err| NotifyError::from_transport(&err))?;
    let status = response.status().as_u16();
    if status < 400 {
        return Ok(status);
    }

    let text = response.text().await.unwrap_or_default();
    let snippet: String = text.chars().take(RESPONSE_SNIPPET_CHARS).collect();
    Err(NotifyError::from_status(status, snippet.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_linearly_with_attempt() {
        let policy = RetryPolicy {
            backoff: Duration::from_millis(500),
            ..RetryPolicy::default()
        };
        assert_eq!(linear_backoff(&policy, 1), Duration::from_millis(500));
        assert_eq!(linear_backoff(&policy, 2), Duration::from_millis(1000));
        assert_eq!(linear_backoff(&policy, 3), Duration::from_millis(1500));
    }

    #[test]
    fn backoff_saturates_instead_of_overflowing() {
        let policy = RetryPolicy {
            backoff: Duration::MAX,
            ..RetryPolicy::default()
        };
        assert_eq!(linear_backoff(&policy, 3), Duration::MAX);
    }

    #[test]
    fn default_policy_matches_documented_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.timeout, Duration::from_secs(10));
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.backoff, Duration::from_secs(1));
    }

    #[test]
    fn outcome_helpers() {
        assert!(!DeliveryOutcome::Skipped.is_delivered());
        assert_eq!(DeliveryOutcome::Skipped.attempts(), 0);
        assert!(DeliveryOutcome::Delivered { attempts: 2 }.is_delivered());
        let failed = DeliveryOutcome::Failed {
            attempts: 3,
            last_error: "status 503".to_string(),
        };
        assert!(!failed.is_delivered());
        assert_eq!(failed.attempts(), 3);
    }

    #[tokio::test]
    async fn empty_url_is_skipped_without_sending() {
        let notifier = CallbackNotifier::new(CallbackSigner::default(), RetryPolicy::default());
        let payload = CallbackPayload::failed("J1", "octo/demo", None, "boom");
        assert_eq!(
            notifier.send_callback("", &payload).await,
            DeliveryOutcome::Skipped
        );
    }

    #[tokio::test]
    async fn malformed_url_fails_once_without_retrying() {
        let notifier = CallbackNotifier::new(
            CallbackSigner::default(),
            RetryPolicy {
                backoff: Duration::ZERO,
                ..RetryPolicy::default()
            },
        );
        let payload = CallbackPayload::failed("J1", "octo/demo", None, "boom");
        let outcome = notifier.send_callback("not a url", &payload).await;
        assert!(matches!(outcome, DeliveryOutcome::Failed { attempts: 1, .. }));
    }
}
