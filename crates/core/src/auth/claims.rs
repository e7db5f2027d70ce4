//! Token payloads

use serde::{Deserialize, Serialize};

/// Token kind carried by locally minted streaming tokens
pub const STREAMING_TOKEN_KIND: &str = "streaming";

/// Decoded identity token payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdentityClaims {
    /// Subject (user id)
    pub sub: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(
        default,
        alias = "preferred_username",
        skip_serializing_if = "Option::is_none"
    )]
    pub username: Option<String>,

    /// Issued-at (Unix epoch)
    pub iat: i64,

    /// Expiration (Unix epoch)
    pub exp: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

/// Decoded streaming token payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamingClaims {
    /// Subject the token was minted for
    #[serde(rename = "user_id", alias = "sub")]
    pub sub: String,

    /// Must equal [`STREAMING_TOKEN_KIND`]
    pub token_type: String,

    pub iat: i64,

    pub exp: i64,
}

impl StreamingClaims {
    pub fn new(sub: impl Into<String>, iat: i64, exp: i64) -> Self {
        Self {
            sub: sub.into(),
            token_type: STREAMING_TOKEN_KIND.to_string(),
            iat,
            exp,
        }
    }
}

/// How a caller authenticated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Identity,
    Streaming,
    Bypass,
}

/// Verified caller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub email: Option<String>,
    pub username: Option<String>,
    pub token_kind: TokenKind,
}

impl From<IdentityClaims> for AuthenticatedUser {
    fn from(claims: IdentityClaims) -> Self {
        // Fall back to the local part of the email
        let username = claims.username.or_else(|| {
            claims
                .email
                .as_deref()
                .and_then(|email| email.split('@').next())
                .filter(|local| !local.is_empty())
                .map(String::from)
        });

        Self {
            user_id: claims.sub,
            email: claims.email,
            username,
            token_kind: TokenKind::Identity,
        }
    }
}

impl From<StreamingClaims> for AuthenticatedUser {
    fn from(claims: StreamingClaims) -> Self {
        Self {
            user_id: claims.sub,
            email: None,
            username: None,
            token_kind: TokenKind::Streaming,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_streaming_claims_wire_names() {
        let claims = StreamingClaims::new("user-1", 100, 400);
        let json = serde_json::to_value(&claims).unwrap();

        assert_eq!(json["user_id"], "user-1");
        assert_eq!(json["token_type"], "streaming");

        // Tokens carrying `sub` instead of `user_id` decode as well
        let decoded: StreamingClaims = serde_json::from_str(
            r#"{"sub":"user-2","token_type":"streaming","iat":1,"exp":2}"#,
        )
        .unwrap();
        assert_eq!(decoded.sub, "user-2");
    }

    #[test]
    fn test_identity_claims_optional_fields() {
        let claims: IdentityClaims =
            serde_json::from_str(r#"{"sub":"u","iat":1,"exp":2,"preferred_username":"alice"}"#)
                .unwrap();
        assert_eq!(claims.username.as_deref(), Some("alice"));
        assert!(claims.email.is_none());

        let user = AuthenticatedUser::from(claims);
        assert_eq!(user.token_kind, TokenKind::Identity);

        let claims: IdentityClaims =
            serde_json::from_str(r#"{"sub":"u","iat":1,"exp":2,"email":"bob@example.com"}"#)
                .unwrap();
        assert_eq!(AuthenticatedUser::from(claims).username.as_deref(), Some("bob"));
    }
}
