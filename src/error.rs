//! # Error Handling
//!
//! Unified error taxonomy for the portal data-access core. Every fallible
//! operation in the crate surfaces a [`PortalError`]; the HTTP layer above
//! maps these onto response codes.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type PortalResult<T> = Result<T, PortalError>;

/// Domain errors for the multi-tenant data-access layer.
#[derive(Debug, Error)]
pub enum PortalError {
    /// The requested tenant id is not present in the configured catalog.
    #[error("unknown tenant '{tenant_id}'")]
    UnknownTenant { tenant_id: String },

    /// The user is not allowed to operate in the requested tenant.
    #[error("user is not authorized for tenant '{tenant_id}': {reason}")]
    Unauthorized { tenant_id: String, reason: String },

    /// One tenant's ERP is unreachable or timed out. Carries the tenant so
    /// fan-out callers can report partial success per tenant.
    #[error("ERP for tenant '{tenant_id}' unavailable: {message}")]
    UpstreamUnavailable { tenant_id: String, message: String },

    /// Another active portal user already holds this provider identity.
    #[error(
        "provider code '{provider_code}' in tenant '{tenant_id}' is already claimed by another user"
    )]
    MappingConflict {
        tenant_id: String,
        provider_code: String,
    },

    /// Entity or provider record absent where one was required.
    #[error("not found: {what}")]
    NotFound { what: String },

    /// An uploaded document failed validation.
    #[error("document validation failed: {reason}")]
    ValidationFailed { reason: String },

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Portal database failure.
    #[error("portal database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

impl PortalError {
    /// Shorthand for an [`PortalError::UpstreamUnavailable`] tied to a tenant.
    pub fn upstream(tenant_id: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::UpstreamUnavailable {
            tenant_id: tenant_id.into(),
            message: message.to_string(),
        }
    }

    /// Shorthand for a [`PortalError::NotFound`].
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// True when retrying against the same tenant might help (transient
    /// upstream failure). Mapping conflicts and authorization failures are
    /// never retryable.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::UpstreamUnavailable { .. })
    }
}

/// Detects unique-constraint violations from the portal database so races on
/// mapping insertion can be reported as conflicts instead of opaque 500s.
pub fn is_unique_violation(error: &sea_orm::DbErr) -> bool {
    use sea_orm::RuntimeErr;

    const PG_UNIQUE: &str = "23505";
    const SQLITE_DUPLICATE_CODES: &[&str] = &["1555", "2067"];

    let runtime_err = match error {
        sea_orm::DbErr::Query(RuntimeErr::SqlxError(sqlx_err))
        | sea_orm::DbErr::Exec(RuntimeErr::SqlxError(sqlx_err)) => sqlx_err,
        _ => return false,
    };

    let Some(db_error) = runtime_err.as_database_error() else {
        return false;
    };

    if db_error.is_unique_violation() {
        return true;
    }

    db_error
        .code()
        .map(|code| {
            let code = code.as_ref();
            code == PG_UNIQUE || SQLITE_DUPLICATE_CODES.contains(&code)
        })
        .unwrap_or(false)
}
