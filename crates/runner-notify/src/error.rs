/// Why a single delivery attempt failed. Internal to the retry loop; callers
/// of the notifier only ever see a [`crate::DeliveryOutcome`].
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("callback attempt failed, will retry: {message}")]
    Transient { message: String },
    #[error("callback failed permanently: {message}")]
    Permanent { message: String },
}

impl NotifyError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, NotifyError::Transient { .. })
    }

    /// 429 and 5xx are worth another attempt; any other 4xx is final.
    pub fn from_status(status: u16, body_snippet: &str) -> Self {
        let message = if body_snippet.is_empty() {
            format!("status {status}")
        } else {
            format!("status {status}: {body_snippet}")
        };
        if status == 429 || status >= 500 {
            NotifyError::Transient { message }
        } else {
            NotifyError::Permanent { message }
        }
    }

    /// Connect, timeout and body errors are transient; a request that could
    /// not even be built (bad URL, bad header) will never succeed.
    pub fn from_transport(err: &reqwest::Error) -> Self {
        let message = err.to_string();
        if err.is_builder() {
            NotifyError::Permanent { message }
        } else {
            NotifyError::Transient { message }
        }
    }
}
