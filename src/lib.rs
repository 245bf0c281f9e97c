//! Expense API authentication core
//!
//! OAuth2 client-credentials tokens, a rotating service API key, and hybrid
//! request authentication in front of the expense routes.
//!
//! ## Modules
//!
//! - [`keys`] - Key provider (file / env / static sources, TTL cache) and rotation
//! - [`auth`] - Client registry, token service, API keys, auth middleware
//! - [`api`] - REST routes and the error envelope
//! - [`domain`] - Expense records
//! - [`infra`] - Expense store and process plumbing
//! - [`server`] - Configuration and HTTP server bootstrap

pub mod api;
pub mod auth;
pub mod domain;
pub mod infra;
pub mod keys;
pub mod server;

// Re-export commonly used types
pub use auth::{AuthError, AuthIdentity, AuthStrategy, Authenticator, TokenService};
pub use keys::{ExternalKeyProvider, KeyKind, KeyProvider, SecretValue};
