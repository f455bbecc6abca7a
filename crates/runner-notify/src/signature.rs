//! HMAC-SHA256 webhook signatures (`X-Signature-256: sha256=<hex>`).

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{error, warn};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Signature-256";
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Signs outgoing payloads and verifies incoming ones with a shared secret.
#[derive(Clone, Default)]
pub struct CallbackSigner {
    secret: Option<String>,
    allow_insecure: bool,
}

impl std::fmt::Debug for CallbackSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackSigner")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("allow_insecure", &self.allow_insecure)
            .finish()
    }
}

impl CallbackSigner {
    /// An empty secret counts as no secret.
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
            allow_insecure: false,
        }
    }

    /// Accept unsigned webhooks when no secret is configured. Not for production.
    pub fn allow_insecure(mut self, allow: bool) -> Self {
        self.allow_insecure = allow;
        self
    }

    pub fn has_secret(&self) -> bool {
        self.secret.is_some()
    }

    fn mac(&self) -> Option<HmacSha256> {
        let secret = self.secret.as_ref()?;
        // HMAC takes keys of any length
        HmacSha256::new_from_slice(secret.as_bytes()).ok()
    }

    /// `sha256=<lowercase hex>` over the raw payload bytes, or `None` when
    /// no secret is configured.
    pub fn generate_signature(&self, payload: &[u8]) -> Option<String> {
        let mut mac = self.mac()?;
        mac.update(payload);
        Some(format!(
            "{SIGNATURE_PREFIX}{}",
            hex::encode(mac.finalize().into_bytes())
        ))
    }

    /// Check a presented `X-Signature-256` value against the raw body.
    ///
    /// The digest comparison is constant-time (`Mac::verify_slice`).
    pub fn verify_signature(&self, payload: &[u8], presented: &str) -> bool {
        let Some(mut mac) = self.mac() else {
            if self.allow_insecure {
                warn!("no webhook secret configured; signature verification skipped");
                return true;
            }
            error!("no webhook secret configured; rejecting webhook");
            return false;
        };

        let Some(digest) = presented
            .trim()
            .strip_prefix(SIGNATURE_PREFIX)
            .and_then(|hex_sig| hex::decode(hex_sig).ok())
        else {
            return false;
        };

        mac.update(payload);
        mac.verify_slice(&digest).is_ok()
    }
}
