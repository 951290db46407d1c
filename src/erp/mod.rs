//! ERP access seam.
//!
//! The ERP is read-mostly: the portal consumes transactional truth from it
//! and writes almost nothing back. That policy is structural here, not
//! conventional. Read access and the two whitelisted write operations live
//! on separate capability traits, and components receive only the
//! capability they are allowed to use. The workflow-write path holds an
//! [`ErpRead`] and therefore cannot express an ERP write at all.

pub mod mssql;
pub mod types;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::PortalResult;
use crate::tenants::TenantConfig;
pub use types::{
    CompanyCandidate, EntityFilters, EntityKind, ErpDocument, ErpDocumentStatus, ErpProvider,
    NewProviderRecord,
};

/// Read-only view of one tenant's ERP database.
///
/// Implementations are scoped to a single tenant: the company-code
/// partition filter is applied internally, callers never pass it.
#[async_trait]
pub trait ErpRead: Send + Sync {
    /// Enumerates the companies an RFC is registered in. Only meaningful on
    /// the designated primary ERP, which hosts the shared lookup procedure.
    async fn lookup_provider_companies(&self, rfc: &str) -> PortalResult<Vec<CompanyCandidate>>;

    /// Looks up the provider master record by RFC in this company's ERP.
    /// The per-company internal code can differ from other companies.
    async fn find_provider_by_rfc(&self, rfc: &str) -> PortalResult<Option<ErpProvider>>;

    /// Lists documents of one kind for a provider, applying the filters as
    /// bound parameters.
    async fn list_documents(
        &self,
        kind: EntityKind,
        provider_code: &str,
        filters: &EntityFilters,
    ) -> PortalResult<Vec<ErpDocument>>;

    /// Fetches a single document by its natural key.
    async fn get_document(
        &self,
        kind: EntityKind,
        natural_key: &str,
    ) -> PortalResult<Option<ErpDocument>>;
}

/// The whitelisted ERP write operations. Narrow and auditable by design;
/// nothing else in the crate can write to an ERP database.
#[async_trait]
pub trait ErpAdmin: Send + Sync {
    /// Attaches an uploaded-document reference to an ERP document.
    async fn attach_document_reference(
        &self,
        kind: EntityKind,
        natural_key: &str,
        reference: &str,
    ) -> PortalResult<()>;

    /// One-time provider-record creation during registration.
    async fn create_provider_record(&self, record: &NewProviderRecord) -> PortalResult<()>;
}

/// Capability handles for one tenant's ERP. Both sides usually share the
/// same underlying connection pool.
#[derive(Clone)]
pub struct ErpChannels {
    pub read: Arc<dyn ErpRead>,
    pub admin: Arc<dyn ErpAdmin>,
}

impl std::fmt::Debug for ErpChannels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErpChannels").finish_non_exhaustive()
    }
}

/// Factory establishing ERP connectivity for a tenant. The pool manager is
/// the only caller; everything else borrows channels from it.
#[async_trait]
pub trait ErpConnector: Send + Sync {
    async fn connect(&self, tenant: &TenantConfig) -> PortalResult<ErpChannels>;
}
