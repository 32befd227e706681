//! Push webhook authentication (C9, spec §6): two verifiable-signature
//! schemes depending on the shape of the notification.
//!
//! - Pub/Sub `message` bodies carry a Google-issued JWT in `Authorization:
//!   Bearer …`; the core checks the `aud` claim against the configured
//!   webhook audience via an injected [`PushAuthVerifier`] (real RS256
//!   signature verification against Google's rotating public keys is an
//!   operational concern outside this crate — callers inject whatever
//!   `jsonwebtoken::DecodingKey` their deployment resolves those to).
//! - Header-based push-subscription notifications carry `X-Goog-Channel-Token`,
//!   an HMAC-SHA256 of the source id keyed by a shared secret.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing Authorization header")]
    MissingBearer,
    #[error("JWT verification failed: {0}")]
    InvalidJwt(String),
    #[error("missing or malformed channel token")]
    MissingChannelToken,
    #[error("channel token did not match")]
    ChannelTokenMismatch,
}

#[derive(Debug, Deserialize)]
struct PubSubClaims {
    #[allow(dead_code)]
    aud: String,
}

/// Verifies the signature of a push webhook request. Injected so the real
/// RS256-against-Google's-JWKS verification (which needs a live key fetch)
/// stays outside this crate; tests use an HS256 stand-in.
pub trait PushAuthVerifier: Send + Sync {
    fn verify_jwt(&self, bearer_token: &str, audience: &str) -> Result<(), AuthError>;
}

/// `jsonwebtoken`-backed verifier parameterized by algorithm and decoding
/// key, so a deployment can plug in Google's RS256 public key while tests
/// use a cheap HS256 shared secret.
pub struct JwtVerifier {
    pub algorithm: Algorithm,
    pub decoding_key: DecodingKey,
}

impl JwtVerifier {
    pub fn hmac(secret: &str) -> Self {
        Self {
            algorithm: Algorithm::HS256,
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

impl PushAuthVerifier for JwtVerifier {
    fn verify_jwt(&self, bearer_token: &str, audience: &str) -> Result<(), AuthError> {
        let mut validation = Validation::new(self.algorithm);
        validation.set_audience(&[audience]);
        decode::<PubSubClaims>(bearer_token, &self.decoding_key, &validation)
            .map(|_| ())
            .map_err(|e| AuthError::InvalidJwt(e.to_string()))
    }
}

/// Extract the bearer token from an `Authorization` header value.
pub fn extract_bearer(header_value: Option<&str>) -> Result<&str, AuthError> {
    header_value
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingBearer)
}

/// `HMAC-SHA256(source.id, shared-secret)`, base64url-encoded without
/// padding (spec §6).
pub fn channel_token_for(source_id: Uuid, secret: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(source_id.to_string().as_bytes());
    URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
}

/// Verify a channel token header against the expected HMAC for `source_id`,
/// using constant-time comparison via `hmac::Mac::verify_slice`.
pub fn verify_channel_token(token: Option<&str>, source_id: Uuid, secret: &str) -> Result<(), AuthError> {
    let token = token.ok_or(AuthError::MissingChannelToken)?;
    let provided = URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|_| AuthError::MissingChannelToken)?;
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(source_id.to_string().as_bytes());
    mac.verify_slice(&provided).map_err(|_| AuthError::ChannelTokenMismatch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;

    #[derive(Serialize)]
    struct Claims<'a> {
        aud: &'a str,
        exp: usize,
    }

    fn token_with_aud(secret: &str, aud: &str) -> String {
        let claims = Claims { aud, exp: 9_999_999_999 };
        encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn jwt_with_matching_audience_verifies() {
        let verifier = JwtVerifier::hmac("shh");
        let token = token_with_aud("shh", "https://example.com/webhooks/google/push");
        assert!(verifier.verify_jwt(&token, "https://example.com/webhooks/google/push").is_ok());
    }

    #[test]
    fn jwt_with_wrong_audience_rejected() {
        let verifier = JwtVerifier::hmac("shh");
        let token = token_with_aud("shh", "https://wrong.example.com");
        assert!(verifier.verify_jwt(&token, "https://example.com/webhooks/google/push").is_err());
    }

    #[test]
    fn jwt_signed_with_wrong_key_rejected() {
        let verifier = JwtVerifier::hmac("shh");
        let token = token_with_aud("other-secret", "aud");
        assert!(verifier.verify_jwt(&token, "aud").is_err());
    }

    #[test]
    fn extract_bearer_strips_prefix() {
        assert_eq!(extract_bearer(Some("Bearer abc.def.ghi")).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn extract_bearer_rejects_missing_or_malformed() {
        assert_eq!(extract_bearer(None), Err(AuthError::MissingBearer));
        assert_eq!(extract_bearer(Some("abc.def.ghi")), Err(AuthError::MissingBearer));
        assert_eq!(extract_bearer(Some("Bearer ")), Err(AuthError::MissingBearer));
    }

    #[test]
    fn channel_token_round_trips() {
        let source_id = Uuid::new_v4();
        let token = channel_token_for(source_id, "secret");
        assert!(verify_channel_token(Some(&token), source_id, "secret").is_ok());
    }

    #[test]
    fn channel_token_rejects_wrong_secret() {
        let source_id = Uuid::new_v4();
        let token = channel_token_for(source_id, "secret");
        assert_eq!(
            verify_channel_token(Some(&token), source_id, "other"),
            Err(AuthError::ChannelTokenMismatch)
        );
    }

    #[test]
    fn channel_token_rejects_wrong_source() {
        let token = channel_token_for(Uuid::new_v4(), "secret");
        assert_eq!(
            verify_channel_token(Some(&token), Uuid::new_v4(), "secret"),
            Err(AuthError::ChannelTokenMismatch)
        );
    }

    #[test]
    fn channel_token_rejects_missing() {
        assert_eq!(
            verify_channel_token(None, Uuid::new_v4(), "secret"),
            Err(AuthError::MissingChannelToken)
        );
    }
}
