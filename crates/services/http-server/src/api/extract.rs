//! Authentication extractors
//!
//! [`IdentityUser`] requires an identity token in the `Authorization` header.
//! [`StreamUser`] also accepts a streaming token, and reads it from the
//! `token` query parameter first since media elements cannot set headers.

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Query},
    http::{header::AUTHORIZATION, request::Parts},
};
use homecam_core::auth::AuthenticatedUser;
use homecam_core::Error;
use serde::Deserialize;

use super::error::ApiError;
use super::AppState;

/// Caller authenticated with an identity token
#[derive(Debug, Clone)]
pub struct IdentityUser(pub AuthenticatedUser);

/// Caller authenticated with an identity or streaming token
#[derive(Debug, Clone)]
pub struct StreamUser(pub AuthenticatedUser);

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

fn bearer_token(parts: &Parts) -> Option<String> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

fn query_token(parts: &Parts) -> Option<String> {
    Query::<TokenQuery>::try_from_uri(&parts.uri)
        .ok()
        .and_then(|Query(q)| q.token)
        .filter(|t| !t.is_empty())
}

#[async_trait]
impl FromRequestParts<AppState> for IdentityUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| Error::invalid_token("missing bearer token"))?;
        let user = state.verifier.authenticate(&token).await?;
        Ok(IdentityUser(user))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for StreamUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = query_token(parts)
            .or_else(|| bearer_token(parts))
            .ok_or_else(|| Error::invalid_token("missing token (use the token query parameter or a bearer header)"))?;
        let user = state.verifier.verify_for_stream(&token).await?;
        Ok(StreamUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(uri: &str, auth: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri(uri);
        if let Some(auth) = auth {
            builder = builder.header(AUTHORIZATION, auth);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(&parts("/", Some("Bearer abc"))).as_deref(), Some("abc"));
        assert_eq!(bearer_token(&parts("/", Some("bearer  abc "))).as_deref(), Some("abc"));
        assert!(bearer_token(&parts("/", Some("Basic abc"))).is_none());
        assert!(bearer_token(&parts("/", Some("Bearer "))).is_none());
        assert!(bearer_token(&parts("/", None)).is_none());
    }

    #[test]
    fn test_query_token_parsing() {
        assert_eq!(query_token(&parts("/feed?token=xyz", None)).as_deref(), Some("xyz"));
        assert!(query_token(&parts("/feed?token=", None)).is_none());
        assert!(query_token(&parts("/feed", None)).is_none());
    }
}
