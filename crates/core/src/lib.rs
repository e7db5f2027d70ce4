//! HomeCam core
//!
//! Operates one capture device and hands its frames to any number of viewers,
//! with every access gated behind bearer-token verification.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                            homecam-core                             │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                                                                     │
//! │  ┌────────────────┐  verify_for_stream  ┌─────────────────────────┐ │
//! │  │ TokenVerifier  │────────────────────▶│ CaptureManager          │ │
//! │  │ (RS256 / HS256)│                     │ acquire / start / stop  │ │
//! │  └───────┬────────┘                     │ release / snapshot      │ │
//! │          │ get(url)                     └───────────┬─────────────┘ │
//! │          ▼                                          │ spawns        │
//! │  ┌────────────────┐                                 ▼               │
//! │  │ KeySetCache    │                     ┌─────────────────────────┐ │
//! │  │ TTL + single-  │                     │ capture loop (thread)   │ │
//! │  │ flight refresh │                     │ read ▶ encode ▶ publish │ │
//! │  └────────────────┘                     └───────────┬─────────────┘ │
//! │                                                     ▼               │
//! │  ┌────────────────┐                     ┌─────────────────────────┐ │
//! │  │ Streaming      │                     │ FrameBuffer (N=2)       │ │
//! │  │ TokenIssuer    │                     │ drop-oldest, try_take   │ │
//! │  └────────────────┘                     └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Transport concerns (HTTP routing, multipart framing) live in
//! `homecam-http-server`.

pub mod auth;
pub mod capture;
pub mod config;
pub mod error;
pub mod metrics;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use config::Config;
pub use error::{Error, Result};
