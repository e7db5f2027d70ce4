//! Token verification
//!
//! Identity tokens are RS256 JWTs from the external identity provider,
//! checked against its published key set. Streaming tokens are HS256 JWTs
//! minted by [`StreamingTokenIssuer`]. Stream endpoints accept either, trying
//! identity first.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use super::claims::{AuthenticatedUser, IdentityClaims, StreamingClaims, TokenKind};
use super::jwks::{jwks_url, HttpKeySetFetcher, KeySetCache, KeySetFetcher};
use super::streaming::StreamingTokenIssuer;
use crate::config::AuthConfig;
use crate::error::{Error, Result};

/// Tolerated clock skew for the issued-at check, in seconds
const IAT_LEEWAY_SECS: i64 = 30;

/// Lifetime reported for synthesized bypass claims, in seconds
pub const BYPASS_TOKEN_TTL_SECS: i64 = 3600;

/// Verifies identity and streaming tokens
pub struct TokenVerifier {
    config: AuthConfig,
    keys: KeySetCache,
    streaming: StreamingTokenIssuer,
}

impl TokenVerifier {
    pub fn new(config: AuthConfig, fetcher: Arc<dyn KeySetFetcher>) -> Self {
        let keys = KeySetCache::new(fetcher, Duration::from_secs(config.jwks_cache_ttl_seconds));
        let streaming = StreamingTokenIssuer::new(&config.streaming_secret);
        Self {
            config,
            keys,
            streaming,
        }
    }

    /// Verifier fetching key sets over HTTPS
    pub fn from_config(config: AuthConfig) -> Result<Self> {
        let fetcher = HttpKeySetFetcher::new(Duration::from_secs(config.jwks_fetch_timeout_seconds))?;
        Ok(Self::new(config, Arc::new(fetcher)))
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn streaming_issuer(&self) -> &StreamingTokenIssuer {
        &self.streaming
    }

    pub fn key_sets(&self) -> &KeySetCache {
        &self.keys
    }

    /// Verify an identity token and return its claims
    pub async fn verify_identity(&self, token: &str) -> Result<IdentityClaims> {
        if let Some(claims) = self.bypass_claims(token) {
            return Ok(claims);
        }
        self.verify_remote(token).await
    }

    /// Like [`verify_identity`](Self::verify_identity), returning the caller
    pub async fn authenticate(&self, token: &str) -> Result<AuthenticatedUser> {
        if let Some(claims) = self.bypass_claims(token) {
            let mut user = AuthenticatedUser::from(claims);
            user.token_kind = TokenKind::Bypass;
            return Ok(user);
        }
        self.verify_remote(token).await.map(AuthenticatedUser::from)
    }

    /// Verify a locally minted streaming token
    pub fn verify_streaming(&self, token: &str) -> Result<StreamingClaims> {
        self.streaming.verify(token)
    }

    /// Accept an identity token or, failing that, a streaming token
    ///
    /// When both fail the returned `AuthInvalidToken` carries the error from
    /// whichever verifier the token was shaped for (HS256 header: streaming,
    /// anything else: identity).
    pub async fn verify_for_stream(&self, token: &str) -> Result<AuthenticatedUser> {
        let identity_err = match self.authenticate(token).await {
            Ok(user) => return Ok(user),
            Err(e) => e,
        };
        tracing::debug!(error = %identity_err, "Identity verification failed, trying streaming token");

        let streaming_err = match self.verify_streaming(token) {
            Ok(claims) => return Ok(claims.into()),
            Err(e) => e,
        };

        let shaped_as_streaming = decode_header(token)
            .map(|header| header.alg == Algorithm::HS256)
            .unwrap_or(false);
        let cause = if shaped_as_streaming {
            streaming_err
        } else {
            identity_err
        };

        Err(Error::AuthInvalidToken {
            reason: format!("token rejected ({})", cause),
            cause: Some(Box::new(cause)),
        })
    }

    async fn verify_remote(&self, token: &str) -> Result<IdentityClaims> {
        let header = decode_header(token)?;
        let kid = header
            .kid
            .ok_or_else(|| Error::invalid_token("token is missing a key id"))?;

        let url = self.key_set_url(token)?;
        let keys = self.keys.get(&url).await?;
        let jwk = keys.find(&kid).ok_or_else(|| {
            Error::AuthInvalidSignature(format!("no signing key matches key id '{}'", kid))
        })?;
        let key = DecodingKey::from_jwk(jwk)
            .map_err(|e| Error::AuthInvalidSignature(format!("unusable signing key: {}", e)))?;

        let mut validation = Validation::new(Algorithm::RS256);
        // The provider does not always set an audience
        validation.validate_aud = false;
        validation.leeway = 0;

        let claims = decode::<IdentityClaims>(token, &key, &validation)?.claims;

        if claims.iat > Utc::now().timestamp() + IAT_LEEWAY_SECS {
            return Err(Error::invalid_token("token issued in the future"));
        }

        tracing::info!(user_id = %claims.sub, "Identity token verified");
        Ok(claims)
    }

    /// Key-set URL from the configured provider root, else from a trusted issuer
    ///
    /// Untrusted issuers are only followed in development mode.
    fn key_set_url(&self, token: &str) -> Result<String> {
        if let Some(root) = &self.config.provider_root {
            return Ok(jwks_url(root));
        }

        let issuer = unverified_issuer(token)?;
        let normalized = issuer.trim_end_matches('/');

        if !self.config.trusted_issuers.is_empty() {
            let trusted = self
                .config
                .trusted_issuers
                .iter()
                .any(|t| t.trim_end_matches('/') == normalized);
            if !trusted {
                return Err(Error::invalid_token(format!("untrusted issuer '{}'", issuer)));
            }
        } else if !self.config.development_mode {
            return Err(Error::invalid_token(
                "no identity provider root or trusted issuers configured",
            ));
        }

        Ok(jwks_url(normalized))
    }

    fn bypass_claims(&self, token: &str) -> Option<IdentityClaims> {
        if !self.config.bypass_tokens_enabled() || token.is_empty() {
            return None;
        }

        let now = Utc::now().timestamp();
        if token == self.config.admin_token {
            tracing::warn!("Admin bypass token accepted");
            return Some(IdentityClaims {
                sub: "admin".to_string(),
                email: Some(self.config.admin_email.clone()),
                username: Some(self.config.admin_username.clone()),
                iat: now,
                exp: now + BYPASS_TOKEN_TTL_SECS,
                iss: None,
            });
        }

        if self.config.development_mode && self.config.dev_tokens.iter().any(|t| t == token) {
            tracing::warn!("Development token accepted");
            return Some(IdentityClaims {
                sub: "developer".to_string(),
                email: Some("developer@homecam.local".to_string()),
                username: Some("developer".to_string()),
                iat: now,
                exp: now + BYPASS_TOKEN_TTL_SECS,
                iss: None,
            });
        }

        None
    }
}

#[derive(Deserialize)]
struct IssuerOnly {
    iss: Option<String>,
}

/// Read `iss` without checking the signature; only used to locate keys
fn unverified_issuer(token: &str) -> Result<String> {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<IssuerOnly>(token, &DecodingKey::from_secret(&[]), &validation)?;
    data.claims
        .iss
        .filter(|iss| !iss.is_empty())
        .ok_or_else(|| Error::invalid_token("token is missing an issuer"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, StaticKeySetFetcher, TEST_ISSUER};

    fn verifier(config: AuthConfig) -> TokenVerifier {
        TokenVerifier::new(config, Arc::new(StaticKeySetFetcher::new(testing::test_jwks())))
    }

    #[tokio::test]
    async fn test_identity_token_verifies() {
        let verifier = verifier(testing::auth_config());
        let token = testing::sign_identity(&testing::identity_claims("user_123", 600));

        let claims = verifier.verify_identity(&token).await.unwrap();
        assert_eq!(claims.sub, "user_123");
        assert_eq!(claims.email.as_deref(), Some("user_123@example.com"));
    }

    #[tokio::test]
    async fn test_expired_identity_token() {
        let verifier = verifier(testing::auth_config());
        let token = testing::sign_identity(&testing::identity_claims("user_123", -60));

        let result = verifier.verify_identity(&token).await;
        assert!(matches!(result, Err(Error::AuthExpired)));
    }

    #[tokio::test]
    async fn test_future_iat_rejected() {
        let verifier = verifier(testing::auth_config());
        let mut claims = testing::identity_claims("user_123", 600);
        claims.iat += 3600;
        let token = testing::sign_identity(&claims);

        let err = verifier.verify_identity(&token).await.unwrap_err();
        assert_eq!(err.code(), "auth_invalid_token");
    }

    #[tokio::test]
    async fn test_unknown_kid() {
        let verifier = verifier(testing::auth_config());
        let token = testing::sign_identity_with_kid(&testing::identity_claims("u", 600), "other-key");

        let result = verifier.verify_identity(&token).await;
        assert!(matches!(result, Err(Error::AuthInvalidSignature(_))));
    }

    #[tokio::test]
    async fn test_issuer_derived_url_requires_trust() {
        let mut config = testing::auth_config();
        config.provider_root = None;
        config.trusted_issuers = vec!["https://other.example.com".to_string()];
        let token = testing::sign_identity(&testing::identity_claims("u", 600));

        let err = verifier(config.clone()).verify_identity(&token).await.unwrap_err();
        assert_eq!(err.code(), "auth_invalid_token");

        config.trusted_issuers.push(format!("{}/", TEST_ISSUER));
        assert!(verifier(config).verify_identity(&token).await.is_ok());
    }

    #[tokio::test]
    async fn test_issuer_derived_url_refused_without_trust_list() {
        let mut config = testing::auth_config();
        config.provider_root = None;
        let fetcher = Arc::new(StaticKeySetFetcher::new(testing::test_jwks()));
        let locked = TokenVerifier::new(config.clone(), fetcher.clone());
        let token = testing::sign_identity(&testing::identity_claims("u", 600));

        let err = locked.verify_identity(&token).await.unwrap_err();
        assert_eq!(err.code(), "auth_invalid_token");
        // Refused before any outbound request
        assert_eq!(fetcher.calls(), 0);

        config.development_mode = true;
        let dev = TokenVerifier::new(config, fetcher.clone());
        assert!(dev.verify_identity(&token).await.is_ok());
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_bypass_tokens_gated() {
        let mut config = testing::auth_config();
        config.admin_token = "admin-token".to_string();
        config.dev_tokens = vec!["dev-token".to_string()];

        let locked = verifier(config.clone());
        assert!(locked.verify_identity("admin-token").await.is_err());
        assert!(locked.verify_identity("dev-token").await.is_err());

        config.admin_bootstrap = true;
        let bootstrap = verifier(config.clone());
        let user = bootstrap.authenticate("admin-token").await.unwrap();
        assert_eq!(user.user_id, "admin");
        assert_eq!(user.token_kind, TokenKind::Bypass);
        // Legacy dev tokens need development mode
        assert!(bootstrap.verify_identity("dev-token").await.is_err());

        config.development_mode = true;
        let dev = verifier(config);
        assert_eq!(dev.verify_identity("dev-token").await.unwrap().sub, "developer");
    }

    #[tokio::test]
    async fn test_stream_accepts_streaming_token() {
        let verifier = verifier(testing::auth_config());
        let minted = verifier.streaming_issuer().mint("user_9", 5).unwrap();

        let user = verifier.verify_for_stream(&minted.token).await.unwrap();
        assert_eq!(user.user_id, "user_9");
        assert_eq!(user.token_kind, TokenKind::Streaming);
    }

    #[tokio::test]
    async fn test_stream_fallback_reports_specific_cause() {
        let verifier = verifier(testing::auth_config());
        let minted = verifier
            .streaming_issuer()
            .mint_at("user_9", 5, Utc::now() - chrono::Duration::minutes(10))
            .unwrap();

        match verifier.verify_for_stream(&minted.token).await {
            Err(Error::AuthInvalidToken { cause: Some(cause), .. }) => {
                assert!(matches!(*cause, Error::AuthExpired));
            }
            other => panic!("unexpected result: {:?}", other),
        }

        let expired_identity = testing::sign_identity(&testing::identity_claims("u", -60));
        match verifier.verify_for_stream(&expired_identity).await {
            Err(Error::AuthInvalidToken { cause: Some(cause), .. }) => {
                assert!(matches!(*cause, Error::AuthExpired));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_identity_rejects_streaming_token() {
        let verifier = verifier(testing::auth_config());
        let minted = verifier.streaming_issuer().mint("user_9", 5).unwrap();

        let err = verifier.verify_identity(&minted.token).await.unwrap_err();
        assert_eq!(err.code(), "auth_invalid_token");
    }
}
