use crate::config::AuthConfig;
use crate::error::{AppError, TokenError};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Which of the two token classes a JWT belongs to. Carried inside the
/// claims so a refresh token can never be replayed as an access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenClass {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    /// Random per-issuance id; two tokens minted in the same second for
    /// the same subject still differ byte-for-byte.
    pub jti: String,
    pub token_use: TokenClass,
}

/// Seam for resolving signing keys per token class. The shipped provider
/// holds two static secrets; a rotating provider can replace it without
/// touching the signer.
pub trait KeyLookup: Send + Sync {
    fn encoding_key(&self, class: TokenClass) -> &EncodingKey;
    fn decoding_key(&self, class: TokenClass) -> &DecodingKey;
}

pub struct StaticKeys {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
}

impl StaticKeys {
    pub fn from_secrets(access_secret: &str, refresh_secret: &str) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(refresh_secret.as_bytes()),
        }
    }
}

impl KeyLookup for StaticKeys {
    fn encoding_key(&self, class: TokenClass) -> &EncodingKey {
        match class {
            TokenClass::Access => &self.access_encoding,
            TokenClass::Refresh => &self.refresh_encoding,
        }
    }

    fn decoding_key(&self, class: TokenClass) -> &DecodingKey {
        match class {
            TokenClass::Access => &self.access_decoding,
            TokenClass::Refresh => &self.refresh_decoding,
        }
    }
}

/// Issues and verifies the signed, expiring tokens of both classes.
/// Expiry is checked lazily at verification; nothing sweeps tokens.
pub struct TokenSigner {
    keys: Arc<dyn KeyLookup>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenSigner {
    pub fn new(keys: Arc<dyn KeyLookup>, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            keys,
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn from_config(auth: &AuthConfig) -> Self {
        Self::new(
            Arc::new(StaticKeys::from_secrets(
                &auth.access_token_secret,
                &auth.refresh_token_secret,
            )),
            Duration::minutes(auth.access_token_ttl_minutes),
            Duration::days(auth.refresh_token_ttl_days),
        )
    }

    pub fn issue_access(&self, subject: Uuid) -> Result<String, AppError> {
        self.issue(subject, TokenClass::Access, self.access_ttl)
    }

    pub fn issue_refresh(&self, subject: Uuid) -> Result<String, AppError> {
        self.issue(subject, TokenClass::Refresh, self.refresh_ttl)
    }

    fn issue(&self, subject: Uuid, class: TokenClass, ttl: Duration) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = Claims {
            sub: subject.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
            token_use: class,
        };

        encode(&Header::default(), &claims, self.keys.encoding_key(class))
            .map_err(|e| AppError::Internal(format!("token signing failed: {}", e)))
    }

    /// Checks signature, expiry and class, in that order.
    pub fn verify(&self, token: &str, expected: TokenClass) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let data = decode::<Claims>(token, self.keys.decoding_key(expected), &validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Malformed,
            })?;

        if data.claims.token_use != expected {
            return Err(TokenError::ClassMismatch);
        }

        Ok(data.claims)
    }

    /// Parse the subject out of verified claims.
    pub fn subject(claims: &Claims) -> Result<Uuid, TokenError> {
        Uuid::parse_str(&claims.sub).map_err(|_| TokenError::Malformed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer(access_ttl: Duration, refresh_ttl: Duration) -> TokenSigner {
        TokenSigner::new(
            Arc::new(StaticKeys::from_secrets("access_secret", "refresh_secret")),
            access_ttl,
            refresh_ttl,
        )
    }

    #[test]
    fn test_issue_and_verify_roundtrip() {
        let signer = signer(Duration::minutes(15), Duration::days(7));
        let subject = Uuid::new_v4();

        let access = signer.issue_access(subject).unwrap();
        let claims = signer.verify(&access, TokenClass::Access).unwrap();
        assert_eq!(TokenSigner::subject(&claims).unwrap(), subject);
        assert_eq!(claims.token_use, TokenClass::Access);

        let refresh = signer.issue_refresh(subject).unwrap();
        let claims = signer.verify(&refresh, TokenClass::Refresh).unwrap();
        assert_eq!(TokenSigner::subject(&claims).unwrap(), subject);
    }

    #[test]
    fn test_consecutive_tokens_differ() {
        let signer = signer(Duration::minutes(15), Duration::days(7));
        let subject = Uuid::new_v4();
        let a = signer.issue_refresh(subject).unwrap();
        let b = signer.issue_refresh(subject).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_expired_token_rejected() {
        let signer = signer(Duration::minutes(-5), Duration::days(-1));
        let subject = Uuid::new_v4();

        let access = signer.issue_access(subject).unwrap();
        assert_eq!(
            signer.verify(&access, TokenClass::Access).unwrap_err(),
            TokenError::Expired
        );

        let refresh = signer.issue_refresh(subject).unwrap();
        assert_eq!(
            signer.verify(&refresh, TokenClass::Refresh).unwrap_err(),
            TokenError::Expired
        );
    }

    #[test]
    fn test_wrong_class_rejected_across_secrets() {
        let signer = signer(Duration::minutes(15), Duration::days(7));
        let subject = Uuid::new_v4();

        // Signed with the refresh key, so it fails the access-key
        // signature check outright.
        let refresh = signer.issue_refresh(subject).unwrap();
        assert_eq!(
            signer.verify(&refresh, TokenClass::Access).unwrap_err(),
            TokenError::Malformed
        );
    }

    #[test]
    fn test_wrong_class_rejected_with_shared_secret() {
        // With one shared secret the signature verifies and the class
        // claim is what stops the replay.
        let signer = TokenSigner::new(
            Arc::new(StaticKeys::from_secrets("shared", "shared")),
            Duration::minutes(15),
            Duration::days(7),
        );
        let subject = Uuid::new_v4();

        let refresh = signer.issue_refresh(subject).unwrap();
        assert_eq!(
            signer.verify(&refresh, TokenClass::Access).unwrap_err(),
            TokenError::ClassMismatch
        );
    }

    #[test]
    fn test_tampered_token_rejected() {
        let signer = signer(Duration::minutes(15), Duration::days(7));
        let token = signer.issue_access(Uuid::new_v4()).unwrap();

        let mut tampered = token.clone();
        tampered.pop();
        tampered.push('A');
        assert_eq!(
            signer.verify(&tampered, TokenClass::Access).unwrap_err(),
            TokenError::Malformed
        );

        assert_eq!(
            signer.verify("not.a.jwt", TokenClass::Access).unwrap_err(),
            TokenError::Malformed
        );
    }
}
