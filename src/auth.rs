use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("failed to read private key {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid RSA private key: {0}")]
    Key(#[source] jsonwebtoken::errors::Error),
    #[error("failed to sign token: {0}")]
    Sign(#[source] jsonwebtoken::errors::Error),
}

#[derive(Debug, Serialize, PartialEq)]
struct Claims {
    iat: u64,
    exp: u64,
    aud: String,
}

impl Claims {
    fn new(audience: &str, issued_at: SystemTime, lifetime: Duration) -> Self {
        let iat = issued_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Self {
            iat,
            exp: iat + lifetime.as_secs(),
            aud: audience.to_string(),
        }
    }
}

/// Mints RS256 tokens used as the MQTT password.
#[derive(Clone)]
pub struct TokenSigner {
    key: EncodingKey,
    audience: String,
    lifetime: Duration,
}

impl TokenSigner {
    pub fn from_pem_file(path: &str, audience: &str, lifetime: Duration) -> Result<Self, AuthError> {
        let pem = std::fs::read(path).map_err(|source| AuthError::Read {
            path: path.to_string(),
            source,
        })?;
        Self::from_pem(&pem, audience, lifetime)
    }

    pub fn from_pem(pem: &[u8], audience: &str, lifetime: Duration) -> Result<Self, AuthError> {
        let key = EncodingKey::from_rsa_pem(pem).map_err(AuthError::Key)?;
        Ok(Self {
            key,
            audience: audience.to_string(),
            lifetime,
        })
    }

    pub fn mint(&self) -> Result<String, AuthError> {
        let claims = Claims::new(&self.audience, SystemTime::now(), self.lifetime);
        encode(&Header::new(Algorithm::RS256), &claims, &self.key).map_err(AuthError::Sign)
    }
}

#[cfg(test)]
pub(crate) const TEST_PRIVATE_KEY: &[u8] =
    include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/testdata/rsa_private.pem"));

#[cfg(test)]
pub(crate) const TEST_PUBLIC_KEY: &[u8] =
    include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/testdata/rsa_public.pem"));

/// Verifies `token` against the test key pair and returns its claims.
#[cfg(test)]
pub(crate) fn decode_test_token(token: &str, audience: &str) -> serde_json::Value {
    use jsonwebtoken::{DecodingKey, Validation, decode};

    let key = DecodingKey::from_rsa_pem(TEST_PUBLIC_KEY).expect("public key");
    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&[audience]);
    let data = decode::<serde_json::Value>(token, &key, &validation).expect("valid token");
    assert_eq!(data.header.alg, Algorithm::RS256);
    data.claims
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_token_verifies_with_project_audience() {
        let signer =
            TokenSigner::from_pem(TEST_PRIVATE_KEY, "proj", Duration::from_secs(3600)).expect("key");
        let token = signer.mint().expect("mint");

        let claims = decode_test_token(&token, "proj");
        assert_eq!(claims["aud"], "proj");
        let iat = claims["iat"].as_u64().expect("iat");
        let exp = claims["exp"].as_u64().expect("exp");
        assert_eq!(exp - iat, 3600);
    }

    #[test]
    fn minted_token_is_rejected_for_other_audience() {
        use jsonwebtoken::{DecodingKey, Validation, decode};

        let signer =
            TokenSigner::from_pem(TEST_PRIVATE_KEY, "proj", Duration::from_secs(3600)).expect("key");
        let token = signer.mint().expect("mint");

        let key = DecodingKey::from_rsa_pem(TEST_PUBLIC_KEY).expect("public key");
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&["other"]);
        assert!(decode::<serde_json::Value>(&token, &key, &validation).is_err());
    }

    #[test]
    fn claims_expire_after_lifetime() {
        let issued = UNIX_EPOCH + Duration::from_secs(1_000);
        let claims = Claims::new("proj", issued, Duration::from_secs(3600));
        assert_eq!(
            claims,
            Claims {
                iat: 1_000,
                exp: 4_600,
                aud: "proj".into(),
            }
        );
    }

    #[test]
    fn garbage_key_is_rejected() {
        let err = TokenSigner::from_pem(b"not a key", "proj", Duration::from_secs(60))
            .err()
            .expect("key should be rejected");
        assert!(matches!(err, AuthError::Key(_)));
    }

    #[test]
    fn missing_key_file_is_reported() {
        let err = TokenSigner::from_pem_file(
            "/nonexistent/rsa_private.pem",
            "proj",
            Duration::from_secs(60),
        )
        .err()
        .expect("file should be missing");
        assert!(matches!(err, AuthError::Read { .. }));
    }
}
