//! # Webhook Signature
//!
//! HMAC-SHA256 over the raw request body, base64 encoded in the `Signature`
//! header. Verification happens before the body is parsed. Without a secret
//! every delivery is rejected.

use base64::{engine::general_purpose::STANDARD, Engine};
use ring::hmac;
use std::sync::Arc;

use crate::error::{SyncError, SyncResult};

/// Header carrying the body signature.
pub const SIGNATURE_HEADER: &str = "signature";

/// Verifies webhook bodies against the shared secret.
#[derive(Clone)]
pub struct SignatureVerifier {
    /// `None` when no secret is configured; nothing verifies then.
    key: Option<Arc<hmac::Key>>,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl SignatureVerifier {
    /// An empty secret yields a verifier that rejects everything.
    pub fn new(secret: &str) -> Self {
        let key = (!secret.is_empty())
            .then(|| Arc::new(hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes())));
        SignatureVerifier { key }
    }

    pub fn is_enabled(&self) -> bool {
        self.key.is_some()
    }

    /// Checks `header` against `body` in constant time.
    ///
    /// ## Returns
    /// * `Ok(())` - Signature matches
    /// * `Err(SyncError::InvalidSignature)` - Missing, malformed, wrong, or
    ///   no secret configured
    pub fn verify(&self, body: &[u8], header: Option<&str>) -> SyncResult<()> {
        let Some(key) = &self.key else {
            return Err(SyncError::InvalidSignature);
        };

        let tag = header
            .map(str::trim)
            .and_then(|h| STANDARD.decode(h).ok())
            .ok_or(SyncError::InvalidSignature)?;

        hmac::verify(key, body, &tag).map_err(|_| SyncError::InvalidSignature)
    }
}

/// Signs `body` the way the marketplace does.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    STANDARD.encode(hmac::sign(&key, body).as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &[u8] = br#"{"id":"d-1","cause":"order.create","object_id":7}"#;

    #[test]
    fn test_valid_signature() {
        let verifier = SignatureVerifier::new("s3cret");
        let header = sign("s3cret", BODY);
        assert!(verifier.verify(BODY, Some(&header)).is_ok());
    }

    #[test]
    fn test_rejects_tampered_body_and_wrong_secret() {
        let verifier = SignatureVerifier::new("s3cret");

        let header = sign("s3cret", BODY);
        let tampered = br#"{"id":"d-1","cause":"order.destroy","object_id":7}"#;
        assert!(matches!(
            verifier.verify(tampered, Some(&header)),
            Err(SyncError::InvalidSignature)
        ));

        let forged = sign("other", BODY);
        assert!(verifier.verify(BODY, Some(&forged)).is_err());
    }

    #[test]
    fn test_rejects_missing_or_garbage_header() {
        let verifier = SignatureVerifier::new("s3cret");
        assert!(verifier.verify(BODY, None).is_err());
        assert!(verifier.verify(BODY, Some("not base64 !!")).is_err());
        assert!(verifier.verify(BODY, Some("")).is_err());
    }

    #[test]
    fn test_no_secret_rejects_everything() {
        let verifier = SignatureVerifier::new("");
        assert!(!verifier.is_enabled());
        assert!(matches!(
            verifier.verify(BODY, None),
            Err(SyncError::InvalidSignature)
        ));
        let signed = sign("", BODY);
        assert!(verifier.verify(BODY, Some(&signed)).is_err());
    }
}
