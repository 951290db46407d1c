//! Provider identity resolution.
//!
//! Bridges the portal's notion of "who is this supplier" with the ERP's:
//! an RFC (tax id) fans out, via the primary ERP's company-membership
//! lookup, into per-tenant provider codes, which are then persisted as
//! durable mappings. Discovery is best-effort per tenant; one unreachable
//! ERP must not block registration against the reachable ones.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::erp::types::{CompanyCandidate, NewProviderRecord};
use crate::error::{PortalError, PortalResult};
use crate::models::provider_mapping::Model as MappingModel;
use crate::pool::PoolManager;
use crate::repositories::{MappingClaim, MappingRepository};
use crate::tenants::{EnvironmentClass, TenantConfig};

/// One strategy for matching a company-membership row from the primary ERP
/// against a configured tenant. Strategies are tried in a fixed order; the
/// company code is authoritative, the other two cover catalogs where the
/// lookup procedure predates code standardization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantMatcher {
    CompanyCode,
    DatabaseName,
    CompanyName,
}

impl TenantMatcher {
    /// Default matcher order, strongest signal first.
    pub const DEFAULT: [TenantMatcher; 3] = [
        TenantMatcher::CompanyCode,
        TenantMatcher::DatabaseName,
        TenantMatcher::CompanyName,
    ];

    fn matches(&self, tenant: &TenantConfig, candidate: &CompanyCandidate) -> bool {
        match self {
            TenantMatcher::CompanyCode => {
                tenant.erp_company_code.eq_ignore_ascii_case(&candidate.company_code)
            }
            TenantMatcher::DatabaseName => {
                tenant.erp_database.eq_ignore_ascii_case(&candidate.database_name)
            }
            TenantMatcher::CompanyName => {
                tenant.display_name.eq_ignore_ascii_case(&candidate.company_name)
            }
        }
    }
}

/// A tenant where the RFC resolved to a concrete provider code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub tenant_id: String,
    pub provider_code: String,
}

/// A tenant that had to be skipped during discovery, with the reason.
#[derive(Debug)]
pub struct SkippedTenant {
    pub tenant_id: String,
    pub reason: PortalError,
}

/// Outcome of one discovery fan-out. Partial success is the normal case.
#[derive(Debug, Default)]
pub struct DiscoveryReport {
    pub resolved: Vec<ResolvedIdentity>,
    pub skipped: Vec<SkippedTenant>,
}

/// Resolves RFCs to per-tenant provider identities and persists them.
pub struct ProviderIdentityResolver {
    pools: Arc<PoolManager>,
    primary_tenant: String,
    matchers: Vec<TenantMatcher>,
}

impl ProviderIdentityResolver {
    pub fn new(pools: Arc<PoolManager>, primary_tenant: impl Into<String>) -> Self {
        Self {
            pools,
            primary_tenant: primary_tenant.into(),
            matchers: TenantMatcher::DEFAULT.to_vec(),
        }
    }

    /// Overrides the matcher order (mainly for catalogs known to carry
    /// unreliable company codes).
    pub fn with_matchers(mut self, matchers: Vec<TenantMatcher>) -> Self {
        self.matchers = matchers;
        self
    }

    /// Fans an RFC out across every configured tenant of the given class.
    ///
    /// The primary ERP hosts the company-membership lookup, so its failure
    /// aborts discovery entirely. Per-tenant failures after that point are
    /// collected into `skipped` instead: an RFC that is reachable in four
    /// of five tenants still registers against those four.
    pub async fn discover_tenants_for_rfc(
        &self,
        rfc: &str,
        class: EnvironmentClass,
    ) -> PortalResult<DiscoveryReport> {
        let primary = self.pools.erp_read(&self.primary_tenant).await?;
        let candidates = primary.lookup_provider_companies(rfc).await?;
        info!(
            rfc = %rfc,
            candidates = candidates.len(),
            "Company membership lookup completed on primary ERP"
        );

        let mut report = DiscoveryReport::default();
        let mut seen: HashSet<String> = HashSet::new();

        for candidate in &candidates {
            let Some(tenant) = self.match_candidate(candidate, class) else {
                warn!(
                    rfc = %rfc,
                    company_code = %candidate.company_code,
                    database = %candidate.database_name,
                    "Company candidate matched no configured tenant, dropping"
                );
                continue;
            };
            // Two candidate rows can legitimately point at the same tenant.
            if !seen.insert(tenant.tenant_id.clone()) {
                continue;
            }

            match self.resolve_provider_code(&tenant.tenant_id, rfc).await {
                Ok(provider_code) => {
                    report.resolved.push(ResolvedIdentity {
                        tenant_id: tenant.tenant_id.clone(),
                        provider_code,
                    });
                }
                Err(reason) => {
                    warn!(
                        rfc = %rfc,
                        tenant_id = %tenant.tenant_id,
                        error = %reason,
                        "Skipping tenant during identity discovery"
                    );
                    // A dead connection would otherwise be handed to the
                    // next caller; evict so first use re-establishes.
                    if reason.is_transient() {
                        self.pools.invalidate(&tenant.tenant_id);
                    }
                    report.skipped.push(SkippedTenant {
                        tenant_id: tenant.tenant_id.clone(),
                        reason,
                    });
                }
            }
        }

        info!(
            rfc = %rfc,
            resolved = report.resolved.len(),
            skipped = report.skipped.len(),
            "Identity discovery finished"
        );
        Ok(report)
    }

    /// Looks up the RFC's provider code inside one tenant's own ERP. The
    /// code is company-local; the same RFC resolves to different codes in
    /// different tenants.
    pub async fn resolve_provider_code(&self, tenant_id: &str, rfc: &str) -> PortalResult<String> {
        let erp = self.pools.erp_read(tenant_id).await?;
        let provider = erp
            .find_provider_by_rfc(rfc)
            .await?
            .ok_or_else(|| PortalError::not_found(format!("provider {rfc} in {tenant_id}")))?;
        Ok(provider.provider_code)
    }

    /// Persists the resolved identities as active mappings for a user.
    /// Transactional: a cross-user conflict on any claim rolls back all of
    /// them. Re-running with the same report is a no-op.
    pub async fn persist_mappings(
        &self,
        portal_user_id: Uuid,
        resolved: &[ResolvedIdentity],
    ) -> PortalResult<Vec<MappingModel>> {
        let claims: Vec<MappingClaim> = resolved
            .iter()
            .map(|r| MappingClaim {
                tenant_id: r.tenant_id.clone(),
                provider_code: r.provider_code.clone(),
            })
            .collect();
        MappingRepository::new(self.pools.portal())
            .claim_mappings(portal_user_id, &claims)
            .await
    }

    /// One-time creation of the provider master record in a tenant's ERP,
    /// for suppliers onboarding into a company that has not registered them
    /// yet. This is one of the two whitelisted ERP writes.
    pub async fn register_provider_record(
        &self,
        tenant_id: &str,
        record: &NewProviderRecord,
    ) -> PortalResult<()> {
        if let Some(existing) = self
            .pools
            .erp_read(tenant_id)
            .await?
            .find_provider_by_rfc(&record.rfc)
            .await?
        {
            return Err(PortalError::ValidationFailed {
                reason: format!(
                    "rfc {} already registered in {tenant_id} as {}",
                    record.rfc, existing.provider_code
                ),
            });
        }
        self.pools
            .erp_admin(tenant_id)
            .await?
            .create_provider_record(record)
            .await?;
        info!(
            tenant_id = %tenant_id,
            provider_code = %record.provider_code,
            "Created provider record in tenant ERP"
        );
        Ok(())
    }

    /// Soft-deactivates every mapping a user holds (off-boarding). Rows
    /// are kept for audit history.
    pub async fn deactivate_mappings(&self, portal_user_id: Uuid) -> PortalResult<u64> {
        let count = MappingRepository::new(self.pools.portal())
            .deactivate_for_user(portal_user_id)
            .await?;
        info!(portal_user_id = %portal_user_id, deactivated = count, "Deactivated user mappings");
        Ok(count)
    }

    fn match_candidate(
        &self,
        candidate: &CompanyCandidate,
        class: EnvironmentClass,
    ) -> Option<TenantConfig> {
        for matcher in &self.matchers {
            if let Some(tenant) = self
                .pools
                .registry()
                .tenants(class)
                .find(|t| matcher.matches(t, candidate))
            {
                return Some(tenant.clone());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenants::{EnvironmentClass, tenant};

    fn candidate(code: &str, database: &str, name: &str) -> CompanyCandidate {
        CompanyCandidate {
            company_code: code.to_string(),
            database_name: database.to_string(),
            company_name: name.to_string(),
        }
    }

    #[test]
    fn company_code_match_is_case_insensitive() {
        let t = tenant("la-cantera", "LC", EnvironmentClass::Production);
        assert!(TenantMatcher::CompanyCode.matches(&t, &candidate("lc", "X", "Y")));
        assert!(!TenantMatcher::CompanyCode.matches(&t, &candidate("PE", "X", "Y")));
    }

    #[test]
    fn database_and_name_matchers_fall_back() {
        let t = tenant("peralillo", "PE", EnvironmentClass::Production);
        // tenant() helper derives database "Intelisis_peralillo" and
        // display name "peralillo".
        let c = candidate("??", "intelisis_peralillo", "zz");
        assert!(!TenantMatcher::CompanyCode.matches(&t, &c));
        assert!(TenantMatcher::DatabaseName.matches(&t, &c));

        let c = candidate("??", "zz", "Peralillo");
        assert!(TenantMatcher::CompanyName.matches(&t, &c));
    }
}
