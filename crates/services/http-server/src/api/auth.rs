//! Authentication endpoints

use axum::{extract::State, Form, Json};
use chrono::{DateTime, Utc};
use homecam_core::auth::{self, LoginGrant};
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use super::extract::IdentityUser;
use super::AppState;

/// OAuth2 password-grant style form
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

/// JSON login body
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Email address or username
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub success: bool,
    pub message: String,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct AuthInfoResponse {
    pub authenticated: bool,
    pub user_id: String,
    pub email: Option<String>,
    pub username: Option<String>,
    pub token_valid: bool,
}

#[derive(Debug, Serialize)]
pub struct StreamingTokenResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub expires_in: i64,
    pub usage: String,
}

/// POST /auth/login
pub async fn login_form(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<Json<LoginGrant>, ApiError> {
    login(&state, &form.username, &form.password)
}

/// POST /auth/login/json
pub async fn login_json(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginGrant>, ApiError> {
    let identifier = req.identifier.trim();
    if identifier.is_empty() {
        return Err(ApiError::BadRequest("Email or username is required".to_string()));
    }
    login(&state, identifier, &req.password)
}

fn login(state: &AppState, identifier: &str, password: &str) -> Result<Json<LoginGrant>, ApiError> {
    let grant = auth::login(&state.config.auth, identifier, password)?;
    Ok(Json(grant))
}

/// Tokens are stateless; the client discards its copy
///
/// POST /auth/logout
pub async fn logout(IdentityUser(user): IdentityUser) -> Json<LogoutResponse> {
    tracing::info!(user_id = %user.user_id, "User logged out");
    Json(LogoutResponse {
        success: true,
        message: "Successfully logged out".to_string(),
        user_id: user.user_id,
        timestamp: Utc::now(),
    })
}

/// GET /auth/info
pub async fn auth_info(IdentityUser(user): IdentityUser) -> Json<AuthInfoResponse> {
    Json(AuthInfoResponse {
        authenticated: true,
        user_id: user.user_id,
        email: user.email,
        username: user.username,
        token_valid: true,
    })
}

/// Mint a short-lived token for URL embedding
///
/// POST /auth/streaming-token
pub async fn streaming_token(
    State(state): State<AppState>,
    IdentityUser(user): IdentityUser,
) -> Result<Json<StreamingTokenResponse>, ApiError> {
    let ttl = state.config.auth.streaming_token_ttl_minutes;
    let minted = state.verifier.streaming_issuer().mint(&user.user_id, ttl)?;
    state.metrics.streaming_token_minted();
    tracing::info!(user_id = %user.user_id, ttl_minutes = ttl, "Issued streaming token");

    Ok(Json(StreamingTokenResponse {
        token: minted.token,
        expires_at: minted.expires_at,
        expires_in: minted.expires_in,
        usage: "Append as ?token=<token> to /camera/video_feed or /camera/snapshot URLs".to_string(),
    }))
}
