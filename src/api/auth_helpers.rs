//! Authorization helper functions for REST API handlers.

use super::ApiError;
use crate::auth::{AuthError, AuthIdentity, SCOPE_ADMIN, SCOPE_READ, SCOPE_WRITE};

/// Ensure the caller holds `scope`.
pub fn ensure_scope(identity: &AuthIdentity, scope: &'static str) -> Result<(), ApiError> {
    if identity.has_scope(scope) {
        Ok(())
    } else {
        tracing::warn!(
            subject = %identity.subject,
            method = %identity.method,
            required = scope,
            "insufficient scope"
        );
        Err(AuthError::InsufficientScope(scope).into())
    }
}

pub fn ensure_read(identity: &AuthIdentity) -> Result<(), ApiError> {
    ensure_scope(identity, SCOPE_READ)
}

pub fn ensure_write(identity: &AuthIdentity) -> Result<(), ApiError> {
    ensure_scope(identity, SCOPE_WRITE)
}

pub fn ensure_admin(identity: &AuthIdentity) -> Result<(), ApiError> {
    ensure_scope(identity, SCOPE_ADMIN)
}
