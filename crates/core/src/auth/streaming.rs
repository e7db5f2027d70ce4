//! Streaming tokens
//!
//! Short-lived HS256 tokens minted locally for clients that cannot send an
//! `Authorization` header (an `<img>` pointed at the video feed, for one).
//! They travel in the `token` query parameter and are accepted only by the
//! feed and snapshot endpoints.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Serialize;

use super::claims::{StreamingClaims, STREAMING_TOKEN_KIND};
use crate::error::{Error, Result};

/// A freshly minted streaming token
#[derive(Debug, Clone, Serialize)]
pub struct MintedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    /// Lifetime in seconds
    pub expires_in: i64,
}

/// Mints and verifies streaming tokens with a shared secret
#[derive(Clone)]
pub struct StreamingTokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl std::fmt::Debug for StreamingTokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingTokenIssuer").finish_non_exhaustive()
    }
}

impl StreamingTokenIssuer {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Mint a token for `subject` valid for `ttl_minutes` from now
    pub fn mint(&self, subject: &str, ttl_minutes: i64) -> Result<MintedToken> {
        self.mint_at(subject, ttl_minutes, Utc::now())
    }

    /// Mint a token as if issued at `issued_at`
    pub fn mint_at(
        &self,
        subject: &str,
        ttl_minutes: i64,
        issued_at: DateTime<Utc>,
    ) -> Result<MintedToken> {
        let expires_at = issued_at
            .checked_add_signed(Duration::minutes(ttl_minutes))
            .ok_or_else(|| Error::Internal(format!("invalid token lifetime: {} minutes", ttl_minutes)))?;

        let claims = StreamingClaims::new(subject, issued_at.timestamp(), expires_at.timestamp());
        let token = self.encode_claims(&claims)?;

        tracing::debug!(subject, ttl_minutes, "Minted streaming token");
        Ok(MintedToken {
            token,
            expires_at,
            expires_in: ttl_minutes * 60,
        })
    }

    /// Sign arbitrary streaming claims
    pub fn encode_claims(&self, claims: &StreamingClaims) -> Result<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| Error::Internal(format!("failed to sign streaming token: {}", e)))
    }

    /// Verify signature, expiry, and token kind
    pub fn verify(&self, token: &str) -> Result<StreamingClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Tokens expire at exactly the exp time
        validation.leeway = 0;

        let data = decode::<StreamingClaims>(token, &self.decoding_key, &validation)?;

        if data.claims.token_type != STREAMING_TOKEN_KIND {
            return Err(Error::invalid_token(format!(
                "expected a {} token, got '{}'",
                STREAMING_TOKEN_KIND, data.claims.token_type
            )));
        }
        Ok(data.claims)
    }
}
