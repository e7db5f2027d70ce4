//! Test fixtures: a fixed RSA signing key, its key set, and helpers to sign
//! identity tokens with it.
//!
//! Compiled for this crate's tests and, through the `test-util` feature, for
//! dependent crates' tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};

use crate::auth::claims::IdentityClaims;
use crate::auth::jwks::KeySetFetcher;
use crate::config::AuthConfig;
use crate::error::Result;

/// PKCS#1 private key used to sign test identity tokens
pub const TEST_RSA_PEM: &str = include_str!("test_rsa.pem");

pub const TEST_KID: &str = "homecam-test-key";

pub const TEST_ISSUER: &str = "https://id.homecam.test";

pub const TEST_STREAMING_SECRET: &str = "test-streaming-secret";

const TEST_MODULUS: &str = "2lRd33bhDHhH70HvIij_6pclTKn4XRpovoS77HBhAPxdQ6kdBUcRxOiqflVWNZpKtCtNkQLAaRnJ6VfD5XbUrqS7Hv3_8f6U5cfjjyh7M53OwktU67GafDF9wk5-sNCjj7kxXEgM1slqxZv55b3VQ_EgpCJkKJjhdX-WifowErslV9CN1uQZLXfpcNcVaD3pca6sqsd5nl9YYRBwX_n0e6Viop6sUqh6k3FTMXy3joDW2FZl4rKC0ShmgqUg76BXrFhNC8y819s99sFzvevt2JoVEk1xXTGvwx2SL0GHzuTp2-iSEtjWFOzFv6SOmB6QeiHnM3UkAz-nnMdTcoDYdQ";

const TEST_EXPONENT: &str = "AQAB";

/// Key set publishing the public half of [`TEST_RSA_PEM`]
pub fn test_jwks() -> JwkSet {
    serde_json::from_value(serde_json::json!({
        "keys": [{
            "kty": "RSA",
            "kid": TEST_KID,
            "use": "sig",
            "alg": "RS256",
            "n": TEST_MODULUS,
            "e": TEST_EXPONENT,
        }]
    }))
    .expect("test key set is valid")
}

/// Auth settings pointing at the test provider, bypass tokens off
pub fn auth_config() -> AuthConfig {
    AuthConfig {
        provider_root: Some(TEST_ISSUER.to_string()),
        streaming_secret: TEST_STREAMING_SECRET.to_string(),
        ..Default::default()
    }
}

/// Claims for `sub` expiring `ttl_secs` from now (negative for expired)
pub fn identity_claims(sub: &str, ttl_secs: i64) -> IdentityClaims {
    let now = Utc::now().timestamp();
    IdentityClaims {
        sub: sub.to_string(),
        email: Some(format!("{}@example.com", sub)),
        username: None,
        iat: now.min(now + ttl_secs) - 10,
        exp: now + ttl_secs,
        iss: Some(TEST_ISSUER.to_string()),
    }
}

/// Sign with the test key under [`TEST_KID`]
pub fn sign_identity(claims: &IdentityClaims) -> String {
    sign_identity_with_kid(claims, TEST_KID)
}

pub fn sign_identity_with_kid(claims: &IdentityClaims, kid: &str) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let key = EncodingKey::from_rsa_pem(TEST_RSA_PEM.as_bytes()).expect("test key parses");
    encode(&header, claims, &key).expect("test token signs")
}

/// Fetcher serving a fixed key set and counting calls
pub struct StaticKeySetFetcher {
    keys: JwkSet,
    calls: AtomicUsize,
}

impl StaticKeySetFetcher {
    pub fn new(keys: JwkSet) -> Self {
        Self {
            keys,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeySetFetcher for StaticKeySetFetcher {
    async fn fetch(&self, _url: &str) -> Result<JwkSet> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.keys.clone())
    }
}
