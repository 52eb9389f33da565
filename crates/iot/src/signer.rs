//! Keyed signature used as the broker password.
//!
//! The broker verifies `password == HMAC-SHA256(device_secret, claims)`
//! where `claims` is the canonical string built by
//! [`Credentials::derive`](crate::credentials::Credentials::derive).

use std::fmt;

use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::error::TransferError;

type HmacSha256 = Hmac<Sha256>;

/// Signs claim strings with the device secret.
#[derive(Clone)]
pub struct CredentialSigner {
    secret: String,
}

impl CredentialSigner {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Computes the HMAC-SHA256 of `plaintext` and renders it as 64 lowercase
    /// hex characters.
    ///
    /// # Errors
    ///
    /// `TransferError::Signing` if the MAC backend rejects the key. The caller
    /// must abort the connect attempt; no partial signature is returned.
    pub fn sign(&self, plaintext: &str) -> Result<String, TransferError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| TransferError::Signing(e.to_string()))?;
        mac.update(plaintext.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

// Keep the secret out of Debug output and therefore out of logs.
impl fmt::Debug for CredentialSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSigner")
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_is_deterministic() {
        let signer = CredentialSigner::new("s3cr3t");
        let a = signer.sign("clientIdX").unwrap();
        let b = signer.sign("clientIdX").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn sign_matches_reference_vector() {
        let signer = CredentialSigner::new("key");
        assert_eq!(
            signer
                .sign("The quick brown fox jumps over the lazy dog")
                .unwrap(),
            "f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
        );
    }

    #[test]
    fn sign_changes_with_secret_and_input() {
        let a = CredentialSigner::new("one").sign("claims").unwrap();
        let b = CredentialSigner::new("two").sign("claims").unwrap();
        let c = CredentialSigner::new("one").sign("claims2").unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn sign_empty_plaintext() {
        let signer = CredentialSigner::new("s3cr3t");
        assert_eq!(
            signer.sign("").unwrap(),
            "3c81cc9496e1c25250f6ccb85f697c1bb623e3480d6538ad8cb6a6648142777d"
        );
    }

    #[test]
    fn debug_redacts_secret() {
        let signer = CredentialSigner::new("s3cr3t");
        let dbg = format!("{:?}", signer);
        assert!(!dbg.contains("s3cr3t"));
        assert!(dbg.contains("redacted"));
    }
}
