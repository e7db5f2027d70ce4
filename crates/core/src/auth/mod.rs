//! Token verification pipeline
//!
//! - [`jwks`]: key-set cache with TTL and single-flight refresh
//! - [`verifier`]: identity and streaming token verification
//! - [`streaming`]: streaming token minting
//! - [`login`]: admin credential login

pub mod claims;
pub mod jwks;
pub mod login;
pub mod streaming;
pub mod verifier;

pub use claims::{AuthenticatedUser, IdentityClaims, StreamingClaims, TokenKind};
pub use jwks::{HttpKeySetFetcher, KeySetCache, KeySetFetcher};
pub use login::{login, LoginGrant};
pub use streaming::{MintedToken, StreamingTokenIssuer};
pub use verifier::TokenVerifier;
