//! Device identity and time-bound broker credentials.
//!
//! Credentials are derived from the identity and the clock reading taken at
//! the start of each connect attempt. They are handed to the transport and
//! then dropped; only the resulting session is retained.

use std::fmt;

use super::{error::TransferError, signer::CredentialSigner};

/// Immutable device triple issued by the IoT platform.
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub product_key: String,
    pub device_name: String,
    pub device_secret: String,
}

impl DeviceIdentity {
    pub fn new(
        product_key: impl Into<String>,
        device_name: impl Into<String>,
        device_secret: impl Into<String>,
    ) -> Self {
        Self {
            product_key: product_key.into(),
            device_name: device_name.into(),
            device_secret: device_secret.into(),
        }
    }

    /// `"{product_key}.{device_name}"`, the short id embedded in the client id
    /// and in the signed claims.
    pub fn brief_id(&self) -> String {
        format!("{}.{}", self.product_key, self.device_name)
    }

    /// Builds a signer keyed with this identity's secret.
    pub fn signer(&self) -> CredentialSigner {
        CredentialSigner::new(self.device_secret.clone())
    }
}

impl fmt::Debug for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceIdentity")
            .field("product_key", &self.product_key)
            .field("device_name", &self.device_name)
            .field("device_secret", &"<redacted>")
            .finish()
    }
}

/// MQTT CONNECT credentials for a single attempt.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Derives credentials for the given timestamp claim.
    ///
    /// - client id: `{pk}.{dn}|securemode=2,signmethod=hmacsha256,timestamp={ts}|`
    /// - username: `{dn}&{pk}`
    /// - password: HMAC-SHA256 over [`Credentials::claims`]
    pub fn derive(
        identity: &DeviceIdentity,
        signer: &CredentialSigner,
        timestamp: &str,
    ) -> Result<Self, TransferError> {
        let brief_id = identity.brief_id();
        let client_id = format!(
            "{}|securemode=2,signmethod=hmacsha256,timestamp={}|",
            brief_id, timestamp
        );
        let password = signer.sign(&Self::claims(identity, timestamp))?;
        let username = format!("{}&{}", identity.device_name, identity.product_key);

        Ok(Self {
            client_id,
            username,
            password,
        })
    }

    /// The canonical claims string the broker re-computes to verify the password.
    pub fn claims(identity: &DeviceIdentity, timestamp: &str) -> String {
        format!(
            "clientId{}deviceName{}productKey{}timestamp{}",
            identity.brief_id(),
            identity.device_name,
            identity.product_key,
            timestamp
        )
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> DeviceIdentity {
        DeviceIdentity::new("PK1", "DN1", "s3cr3t")
    }

    #[test]
    fn claims_follow_canonical_layout() {
        assert_eq!(
            Credentials::claims(&identity(), "1700000000"),
            "clientIdPK1.DN1deviceNameDN1productKeyPK1timestamp1700000000"
        );
    }

    #[test]
    fn derive_matches_golden_vector() {
        let id = identity();
        let creds = Credentials::derive(&id, &id.signer(), "1700000000").unwrap();

        assert_eq!(
            creds.client_id,
            "PK1.DN1|securemode=2,signmethod=hmacsha256,timestamp=1700000000|"
        );
        assert_eq!(creds.username, "DN1&PK1");
        assert_eq!(
            creds.password,
            "766e7539512a6fca403a428b559fbcc0226f965ab1fbe38753481d008b10eb14"
        );
    }

    #[test]
    fn derive_changes_with_timestamp() {
        let id = identity();
        let signer = id.signer();
        let a = Credentials::derive(&id, &signer, "1700000000").unwrap();
        let b = Credentials::derive(&id, &signer, "1700000001").unwrap();
        assert_ne!(a.password, b.password);
        assert_ne!(a.client_id, b.client_id);
        assert_eq!(a.username, b.username);
    }

    #[test]
    fn debug_hides_secrets() {
        let id = identity();
        let creds = Credentials::derive(&id, &id.signer(), "1").unwrap();
        assert!(!format!("{:?}", id).contains("s3cr3t"));
        assert!(!format!("{:?}", creds).contains(&creds.password));
    }
}
