//! Credential login
//!
//! Only the configured admin account can log in locally. Every other account
//! belongs to the identity provider, and delegating to it is not provided.

use serde::Serialize;

use super::verifier::BYPASS_TOKEN_TTL_SECS;
use crate::config::AuthConfig;
use crate::error::{Error, Result};

/// Issued bearer token and the account it belongs to
#[derive(Debug, Clone, Serialize)]
pub struct LoginGrant {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user_id: String,
    pub email: String,
    pub username: String,
}

/// Check `identifier` (username or email) and `password`
pub fn login(config: &AuthConfig, identifier: &str, password: &str) -> Result<LoginGrant> {
    let identifier = identifier.trim();
    let is_admin = identifier.eq_ignore_ascii_case(&config.admin_username)
        || identifier.eq_ignore_ascii_case(&config.admin_email);

    if !is_admin {
        tracing::info!(identifier, "Login for non-admin account refused");
        return Err(Error::NotImplemented(
            "login through the identity provider is not available; sign in with the provider directly".to_string(),
        ));
    }

    if !config.bypass_tokens_enabled() || config.admin_password.is_empty() {
        tracing::warn!("Admin login attempted while admin bootstrap is disabled");
        return Err(Error::InvalidCredentials);
    }

    if !constant_time_eq(password.as_bytes(), config.admin_password.as_bytes()) {
        tracing::warn!("Admin login with wrong password");
        return Err(Error::InvalidCredentials);
    }

    tracing::info!(username = %config.admin_username, "Admin logged in");
    Ok(LoginGrant {
        access_token: config.admin_token.clone(),
        token_type: "bearer",
        expires_in: BYPASS_TOKEN_TTL_SECS,
        user_id: "admin".to_string(),
        email: config.admin_email.clone(),
        username: config.admin_username.clone(),
    })
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bootstrap_config() -> AuthConfig {
        AuthConfig {
            admin_password: "hunter2".to_string(),
            admin_bootstrap: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_admin_login() {
        let config = bootstrap_config();

        let grant = login(&config, "admin", "hunter2").unwrap();
        assert_eq!(grant.access_token, config.admin_token);
        assert_eq!(grant.expires_in, 3600);
        assert_eq!(grant.token_type, "bearer");

        let by_email = login(&config, " admin@homecam.local ", "hunter2").unwrap();
        assert_eq!(by_email.username, "admin");
    }

    #[test]
    fn test_wrong_password() {
        let result = login(&bootstrap_config(), "admin", "hunter3");
        assert!(matches!(result, Err(Error::InvalidCredentials)));
    }

    #[test]
    fn test_admin_login_requires_bootstrap() {
        let mut config = bootstrap_config();
        config.admin_bootstrap = false;
        assert!(matches!(login(&config, "admin", "hunter2"), Err(Error::InvalidCredentials)));

        let mut config = bootstrap_config();
        config.admin_password.clear();
        assert!(matches!(login(&config, "admin", ""), Err(Error::InvalidCredentials)));
    }

    #[test]
    fn test_other_accounts_not_implemented() {
        let result = login(&bootstrap_config(), "alice@example.com", "pw");
        assert!(matches!(result, Err(Error::NotImplemented(_))));
    }
}
