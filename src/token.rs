//! Signed, time-bounded bearer tokens.
//!
//! Tokens are HS256 JWTs built with `jsonwebtoken`. Claims are `sub`
//! (username), `tag` (identity tag), `iat`, `exp` (Unix seconds) and `jti`
//! (random id, for log correlation only). Tokens are not stored server-side
//! and there is no revocation list: a token stays valid until `exp` unless
//! the signing key is rotated.
//!
//! # Verification order
//!
//! 1. `header.claims.signature`, split at the first two dots, else
//!    `Malformed`. Everything after the second dot is the signature.
//! 2. The signature segment decodes to an HMAC-SHA256 tag, else `Invalid`.
//! 3. Header, signature and required claims via [`jsonwebtoken::decode`]:
//!    a signature mismatch is `Invalid`, anything else `Malformed`.
//! 4. `now <= exp`, else `Expired`.
//! 5. `sub` and `tag` non-empty, else `Malformed`.
//!
//! Expiry is checked here rather than by `jsonwebtoken` so that
//! [`TokenService::verify_at`] can run against an injected clock.

use std::time::Duration;

use anyhow::Context;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use context_vault_core::error::TokenError;
use context_vault_core::models::Identity;

/// HMAC-SHA256 output length.
const SIGNATURE_LEN: usize = 32;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    tag: String,
    iat: i64,
    exp: i64,
    jti: String,
}

/// A freshly issued token with its decoded lifetime.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub subject: String,
    pub identity_tag: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// What a valid token proves about its bearer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    pub subject: String,
    pub identity_tag: String,
}

/// Issues and verifies tokens with one server-held HMAC key.
///
/// Immutable after construction; share it behind an `Arc`.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenService {
    pub fn new(key: Vec<u8>, ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding: EncodingKey::from_secret(&key),
            decoding: DecodingKey::from_secret(&key),
            validation,
            ttl,
        }
    }

    /// Default lifetime applied by [`issue_default`](Self::issue_default).
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue_default(&self, identity: &Identity) -> anyhow::Result<IssuedToken> {
        self.issue_at(identity, self.ttl, Utc::now())
    }

    pub fn issue(&self, identity: &Identity, ttl: Duration) -> anyhow::Result<IssuedToken> {
        self.issue_at(identity, ttl, Utc::now())
    }

    /// Issue a token as if the current time were `now`.
    pub fn issue_at(
        &self,
        identity: &Identity,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> anyhow::Result<IssuedToken> {
        let iat = now.timestamp();
        let exp = iat.saturating_add(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX));
        let claims = Claims {
            sub: identity.username.clone(),
            tag: identity.identity_tag.clone(),
            iat,
            exp,
            jti: Uuid::new_v4().simple().to_string(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .context("failed to sign token")?;

        Ok(IssuedToken {
            token,
            subject: claims.sub,
            identity_tag: claims.tag,
            issued_at: DateTime::from_timestamp(iat, 0).unwrap_or(now),
            expires_at: DateTime::from_timestamp(exp, 0).unwrap_or(DateTime::<Utc>::MAX_UTC),
        })
    }

    pub fn verify(&self, token: &str) -> Result<VerifiedToken, TokenError> {
        self.verify_at(token, Utc::now())
    }

    /// Verify a token as if the current time were `now`.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<VerifiedToken, TokenError> {
        let mut parts = token.splitn(3, '.');
        let signature = match (parts.next(), parts.next(), parts.next()) {
            (Some(h), Some(c), Some(s)) if !h.is_empty() && !c.is_empty() => s,
            _ => return Err(TokenError::Malformed),
        };
        match URL_SAFE_NO_PAD.decode(signature) {
            Ok(tag) if tag.len() == SIGNATURE_LEN => {}
            _ => return Err(TokenError::Invalid),
        }

        let claims = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => TokenError::Invalid,
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Malformed,
            })?
            .claims;

        if now.timestamp() > claims.exp {
            return Err(TokenError::Expired);
        }
        if claims.sub.is_empty() || claims.tag.is_empty() {
            return Err(TokenError::Malformed);
        }
        Ok(VerifiedToken {
            subject: claims.sub,
            identity_tag: claims.tag,
        })
    }
}
