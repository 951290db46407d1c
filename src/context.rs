//! Tenant context resolution.
//!
//! Every portal operation runs inside a [`TenantContext`]: one tenant, and
//! for suppliers the provider code they hold there. Context resolution is
//! the authorization gate. A supplier without an active mapping in the
//! requested tenant is turned away here, before any data access happens.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::error::{PortalError, PortalResult};
use crate::pool::PoolManager;
use crate::repositories::MappingRepository;
use crate::tenants::TenantConfig;

/// Portal-side role of an authenticated user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortalRole {
    /// External supplier; sees only the provider identity they hold.
    Supplier,
    /// Internal staff; may enter any configured tenant, unscoped.
    Staff,
}

/// The authenticated principal, as handed over by the session layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub user_id: Uuid,
    pub role: PortalRole,
    /// Tenant the user last worked in; used as the default target.
    pub last_tenant: Option<String>,
}

/// Resolved scope for one operation.
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub tenant: TenantConfig,
    /// The provider identity the user holds in this tenant. `None` for
    /// staff, who query unscoped.
    pub provider_code: Option<String>,
}

/// Resolves a user plus a (possibly implicit) tenant choice into a
/// [`TenantContext`].
pub struct TenantContextResolver {
    pools: Arc<PoolManager>,
    allow_mapping_fallback: bool,
}

impl TenantContextResolver {
    pub fn new(pools: Arc<PoolManager>, allow_mapping_fallback: bool) -> Self {
        Self {
            pools,
            allow_mapping_fallback,
        }
    }

    /// Resolves the context for `requested` (falling back to the user's
    /// last-used tenant when absent).
    ///
    /// Suppliers must hold an active mapping in the target tenant. When
    /// they do not, the default is a hard [`PortalError::Unauthorized`];
    /// with `allow_mapping_fallback` enabled the resolver instead redirects
    /// to some tenant where the user does hold a mapping, and logs the
    /// redirect loudly.
    pub async fn resolve(
        &self,
        user: &UserIdentity,
        requested: Option<&str>,
    ) -> PortalResult<TenantContext> {
        let target = requested
            .or(user.last_tenant.as_deref())
            .ok_or_else(|| PortalError::ValidationFailed {
                reason: "no tenant requested and no last-used tenant on record".to_string(),
            })?;

        let tenant = self.pools.registry().resolve(target)?.clone();

        if user.role == PortalRole::Staff {
            return Ok(TenantContext {
                tenant,
                provider_code: None,
            });
        }

        let repo = MappingRepository::new(self.pools.portal());
        if let Some(mapping) = repo
            .active_for_user_in_tenant(user.user_id, &tenant.tenant_id)
            .await?
        {
            return Ok(TenantContext {
                tenant,
                provider_code: Some(mapping.erp_provider_code),
            });
        }

        if self.allow_mapping_fallback {
            if let Some(mapping) = repo.active_for_user(user.user_id).await?.into_iter().next() {
                let fallback = self.pools.registry().resolve(&mapping.tenant_id)?.clone();
                warn!(
                    user_id = %user.user_id,
                    requested = %tenant.tenant_id,
                    fallback = %fallback.tenant_id,
                    "Supplier has no mapping in requested tenant, redirecting to fallback tenant"
                );
                return Ok(TenantContext {
                    tenant: fallback,
                    provider_code: Some(mapping.erp_provider_code),
                });
            }
        }

        Err(PortalError::Unauthorized {
            tenant_id: tenant.tenant_id,
            reason: "no active provider mapping for this tenant".to_string(),
        })
    }
}
