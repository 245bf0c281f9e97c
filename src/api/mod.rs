//! API layer
//!
//! REST endpoints: the token endpoint, the protected expense and admin
//! routes, and the structured error envelope they share.

pub mod auth_helpers;
pub mod error;
pub mod handlers;
mod rest;

pub use error::{ApiError, ErrorCode, ErrorDetails};
pub use rest::*;
