//! Configuration for HomeCam
//!
//! Configuration can be loaded from a TOML file and/or environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration for HomeCam
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Camera configuration
    #[serde(default)]
    pub camera: CameraConfig,

    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP API port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Allowed CORS origins; empty allows any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Directory served at `/` (viewer page), if any
    #[serde(default)]
    pub static_dir: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
            cors_origins: Vec::new(),
            static_dir: None,
        }
    }
}

/// Which capture backend opens devices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureBackend {
    /// Generated test pattern, no hardware needed
    Synthetic,
    /// Video4Linux2 (requires the `v4l2` feature)
    V4l2,
}

impl std::str::FromStr for CaptureBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "synthetic" => Ok(CaptureBackend::Synthetic),
            "v4l2" => Ok(CaptureBackend::V4l2),
            other => Err(ConfigError::Parse(format!("unknown capture backend: {}", other))),
        }
    }
}

/// Camera configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Preferred device index
    #[serde(default)]
    pub device_id: u32,

    /// Target frame width
    #[serde(default = "default_width")]
    pub width: u32,

    /// Target frame height
    #[serde(default = "default_height")]
    pub height: u32,

    /// Target frames per second
    #[serde(default = "default_fps")]
    pub fps: u32,

    /// Quality used by the background capture loop
    #[serde(default = "default_stream_quality")]
    pub stream_quality: u8,

    /// Quality used for snapshots
    #[serde(default = "default_snapshot_quality")]
    pub snapshot_quality: u8,

    /// Frame buffer capacity in frames
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    /// How long `stop_streaming` waits for the capture loop to exit
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,

    /// Capture backend
    #[serde(default = "default_backend")]
    pub backend: CaptureBackend,
}

fn default_width() -> u32 {
    1280
}

fn default_height() -> u32 {
    720
}

fn default_fps() -> u32 {
    10
}

fn default_stream_quality() -> u8 {
    85
}

fn default_snapshot_quality() -> u8 {
    90
}

fn default_buffer_capacity() -> usize {
    2
}

fn default_stop_timeout_ms() -> u64 {
    1000
}

fn default_backend() -> CaptureBackend {
    CaptureBackend::Synthetic
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_id: 0,
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            stream_quality: default_stream_quality(),
            snapshot_quality: default_snapshot_quality(),
            buffer_capacity: default_buffer_capacity(),
            stop_timeout_ms: default_stop_timeout_ms(),
            backend: default_backend(),
        }
    }
}

impl CameraConfig {
    /// Resolution string in `WxH` form
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Identity provider root; the key set is fetched from
    /// `<root>/.well-known/jwks.json`. When unset the root is taken from the
    /// token issuer claim.
    #[serde(default)]
    pub provider_root: Option<String>,

    /// Issuers accepted when the key-set URL is derived from the token
    #[serde(default)]
    pub trusted_issuers: Vec<String>,

    /// Key-set cache time-to-live in seconds
    #[serde(default = "default_jwks_ttl")]
    pub jwks_cache_ttl_seconds: u64,

    /// Key-set fetch timeout in seconds
    #[serde(default = "default_jwks_timeout")]
    pub jwks_fetch_timeout_seconds: u64,

    /// HMAC secret for streaming tokens
    #[serde(default = "default_streaming_secret")]
    pub streaming_secret: String,

    /// Streaming token lifetime in minutes
    #[serde(default = "default_streaming_ttl")]
    pub streaming_token_ttl_minutes: i64,

    /// Admin account username
    #[serde(default = "default_admin_username")]
    pub admin_username: String,

    /// Admin account email
    #[serde(default = "default_admin_email")]
    pub admin_email: String,

    /// Admin account password; admin login is refused while empty
    #[serde(default)]
    pub admin_password: String,

    /// Admin bootstrap mode: enables the admin bypass token
    #[serde(default)]
    pub admin_bootstrap: bool,

    /// Fixed admin bypass token
    #[serde(default = "default_admin_token")]
    pub admin_token: String,

    /// Legacy development tokens (development mode only)
    #[serde(default)]
    pub dev_tokens: Vec<String>,

    /// Development mode: enables every bypass token
    #[serde(default)]
    pub development_mode: bool,
}

fn default_jwks_ttl() -> u64 {
    3600 // 1 hour
}

fn default_jwks_timeout() -> u64 {
    10
}

fn default_streaming_secret() -> String {
    // In production, this should be set via environment variable
    "streaming-secret-change-in-production".to_string()
}

fn default_streaming_ttl() -> i64 {
    5
}

fn default_admin_username() -> String {
    "admin".to_string()
}

fn default_admin_email() -> String {
    "admin@homecam.local".to_string()
}

fn default_admin_token() -> String {
    "admin-bootstrap-token".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            provider_root: None,
            trusted_issuers: Vec::new(),
            jwks_cache_ttl_seconds: default_jwks_ttl(),
            jwks_fetch_timeout_seconds: default_jwks_timeout(),
            streaming_secret: default_streaming_secret(),
            streaming_token_ttl_minutes: default_streaming_ttl(),
            admin_username: default_admin_username(),
            admin_email: default_admin_email(),
            admin_password: String::new(),
            admin_bootstrap: false,
            admin_token: default_admin_token(),
            dev_tokens: Vec::new(),
            development_mode: false,
        }
    }
}

impl AuthConfig {
    /// Whether the fixed diagnostic tokens short-circuit verification
    pub fn bypass_tokens_enabled(&self) -> bool {
        self.development_mode || self.admin_bootstrap
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e.to_string()))?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(config)
    }

    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        // Server
        if let Some(host) = lookup("HOMECAM_HOST") {
            config.server.host = host;
        }
        set_parsed(&lookup, "HOMECAM_HTTP_PORT", &mut config.server.http_port);
        if let Some(origins) = lookup("HOMECAM_CORS_ORIGINS") {
            config.server.cors_origins = split_list(&origins);
        }
        if let Some(dir) = lookup("HOMECAM_STATIC_DIR") {
            config.server.static_dir = Some(dir);
        }

        // Camera
        set_parsed(&lookup, "HOMECAM_CAMERA_DEVICE_ID", &mut config.camera.device_id);
        set_parsed(&lookup, "HOMECAM_CAMERA_WIDTH", &mut config.camera.width);
        set_parsed(&lookup, "HOMECAM_CAMERA_HEIGHT", &mut config.camera.height);
        set_parsed(&lookup, "HOMECAM_CAMERA_FPS", &mut config.camera.fps);
        set_parsed(&lookup, "HOMECAM_CAMERA_BACKEND", &mut config.camera.backend);

        // Auth
        if let Some(root) = lookup("HOMECAM_IDENTITY_PROVIDER_ROOT") {
            config.auth.provider_root = Some(root);
        }
        if let Some(issuers) = lookup("HOMECAM_TRUSTED_ISSUERS") {
            config.auth.trusted_issuers = split_list(&issuers);
        }
        set_parsed(&lookup, "HOMECAM_JWKS_CACHE_TTL", &mut config.auth.jwks_cache_ttl_seconds);
        set_parsed(
            &lookup,
            "HOMECAM_JWKS_FETCH_TIMEOUT",
            &mut config.auth.jwks_fetch_timeout_seconds,
        );
        if let Some(secret) = lookup("HOMECAM_STREAMING_SECRET") {
            config.auth.streaming_secret = secret;
        }
        set_parsed(
            &lookup,
            "HOMECAM_STREAMING_TOKEN_TTL",
            &mut config.auth.streaming_token_ttl_minutes,
        );
        if let Some(username) = lookup("HOMECAM_ADMIN_USERNAME") {
            config.auth.admin_username = username;
        }
        if let Some(email) = lookup("HOMECAM_ADMIN_EMAIL") {
            config.auth.admin_email = email;
        }
        if let Some(password) = lookup("HOMECAM_ADMIN_PASSWORD") {
            config.auth.admin_password = password;
        }
        if let Some(token) = lookup("HOMECAM_ADMIN_TOKEN") {
            config.auth.admin_token = token;
        }
        if let Some(tokens) = lookup("HOMECAM_DEV_TOKENS") {
            config.auth.dev_tokens = split_list(&tokens);
        }
        set_flag(&lookup, "HOMECAM_ADMIN_BOOTSTRAP", &mut config.auth.admin_bootstrap);
        set_flag(&lookup, "HOMECAM_DEV_MODE", &mut config.auth.development_mode);

        config
    }

    /// Load configuration from file if it exists, otherwise from environment
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> Result<Self, ConfigError> {
        if let Some(p) = path {
            if p.as_ref().exists() {
                return Self::from_file(p);
            }
        }
        Ok(Self::from_env())
    }
}

fn set_parsed<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    if let Some(raw) = lookup(key) {
        match raw.trim().parse() {
            Ok(value) => *target = value,
            Err(_) => tracing::warn!(key, value = %raw, "Ignoring unparseable setting"),
        }
    }
}

fn set_flag<F>(lookup: &F, key: &str, target: &mut bool)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(key) {
        *target = matches!(
            raw.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        );
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),
}
