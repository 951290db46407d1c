//! Tenant catalog
//!
//! Static registry mapping a portal-facing tenant id to the physical ERP
//! database behind it. Built once from configuration at process start and
//! never mutated afterwards; all lookups are pure.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{PortalError, PortalResult};

/// Whether a tenant's ERP database belongs to the production range or the
/// test range. Company codes are only unique within one class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentClass {
    Production,
    Test,
}

/// Immutable description of one tenant (one company, one ERP database).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantConfig {
    /// Portal-facing tenant identifier, globally unique.
    pub tenant_id: String,
    /// Human-readable company name.
    pub display_name: String,
    /// Hostname of the SQL Server instance holding this tenant's ERP.
    pub erp_server: String,
    /// Database name on that server.
    pub erp_database: String,
    /// Company code used inside shared ERP tables partitioned by company.
    /// Unique only within an environment class.
    pub erp_company_code: String,
    pub environment_class: EnvironmentClass,
}

/// Errors raised while building the registry from configuration.
#[derive(Debug, Error)]
pub enum TenantCatalogError {
    #[error("duplicate tenant id '{tenant_id}' in tenant catalog")]
    DuplicateTenantId { tenant_id: String },
    #[error(
        "company code '{company_code}' is shared by tenants '{first}' and '{second}' within the same environment class"
    )]
    DuplicateCompanyCode {
        company_code: String,
        first: String,
        second: String,
    },
    #[error("tenant catalog is empty")]
    Empty,
}

/// Read-only catalog of configured tenants.
#[derive(Debug, Clone)]
pub struct TenantRegistry {
    // Insertion order preserved for stable discovery/sync iteration.
    ordered: Vec<TenantConfig>,
    by_id: HashMap<String, usize>,
}

impl TenantRegistry {
    /// Builds the registry, rejecting catalogs that violate the uniqueness
    /// invariants (`tenant_id` global, `erp_company_code` per class).
    pub fn new(tenants: Vec<TenantConfig>) -> Result<Self, TenantCatalogError> {
        if tenants.is_empty() {
            return Err(TenantCatalogError::Empty);
        }

        let mut by_id = HashMap::with_capacity(tenants.len());
        let mut by_class_code: HashMap<(EnvironmentClass, &str), &str> = HashMap::new();

        for (idx, tenant) in tenants.iter().enumerate() {
            if by_id.insert(tenant.tenant_id.clone(), idx).is_some() {
                return Err(TenantCatalogError::DuplicateTenantId {
                    tenant_id: tenant.tenant_id.clone(),
                });
            }
            if let Some(first) = by_class_code.insert(
                (tenant.environment_class, tenant.erp_company_code.as_str()),
                tenant.tenant_id.as_str(),
            ) {
                return Err(TenantCatalogError::DuplicateCompanyCode {
                    company_code: tenant.erp_company_code.clone(),
                    first: first.to_string(),
                    second: tenant.tenant_id.clone(),
                });
            }
        }

        Ok(Self {
            ordered: tenants,
            by_id,
        })
    }

    /// Resolves a tenant id to its configuration.
    pub fn resolve(&self, tenant_id: &str) -> PortalResult<&TenantConfig> {
        self.by_id
            .get(tenant_id)
            .map(|&idx| &self.ordered[idx])
            .ok_or_else(|| PortalError::UnknownTenant {
                tenant_id: tenant_id.to_string(),
            })
    }

    /// Iterates configured tenants of one environment class in catalog
    /// order. The iterator is cheap and restartable; discovery and sync
    /// workflows re-run it freely.
    pub fn tenants(
        &self,
        class: EnvironmentClass,
    ) -> impl Iterator<Item = &TenantConfig> + Clone + '_ {
        self.ordered
            .iter()
            .filter(move |t| t.environment_class == class)
    }

    /// All tenants regardless of class, catalog order.
    pub fn all(&self) -> impl Iterator<Item = &TenantConfig> + '_ {
        self.ordered.iter()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

#[cfg(test)]
pub(crate) fn tenant(id: &str, code: &str, class: EnvironmentClass) -> TenantConfig {
    TenantConfig {
        tenant_id: id.to_string(),
        display_name: id.replace('-', " "),
        erp_server: "erp01.internal".to_string(),
        erp_database: format!("Intelisis_{}", id.replace('-', "_")),
        erp_company_code: code.to_string(),
        environment_class: class,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PortalError;

    #[test]
    fn resolve_known_and_unknown_tenant() {
        let registry = TenantRegistry::new(vec![
            tenant("la-cantera", "LC", EnvironmentClass::Production),
            tenant("peralillo", "PE", EnvironmentClass::Production),
        ])
        .unwrap();

        assert_eq!(registry.resolve("peralillo").unwrap().erp_company_code, "PE");
        let err = registry.resolve("plaza-galerena").unwrap_err();
        assert!(matches!(err, PortalError::UnknownTenant { tenant_id } if tenant_id == "plaza-galerena"));
    }

    #[test]
    fn duplicate_tenant_id_rejected() {
        let result = TenantRegistry::new(vec![
            tenant("la-cantera", "LC", EnvironmentClass::Production),
            tenant("la-cantera", "LC2", EnvironmentClass::Production),
        ]);
        assert!(matches!(
            result,
            Err(TenantCatalogError::DuplicateTenantId { .. })
        ));
    }

    #[test]
    fn company_code_unique_only_within_class() {
        // Same code across classes is legal (test databases mirror
        // production company codes).
        let registry = TenantRegistry::new(vec![
            tenant("la-cantera", "LC", EnvironmentClass::Production),
            tenant("la-cantera-pruebas", "LC", EnvironmentClass::Test),
        ]);
        assert!(registry.is_ok());

        let clash = TenantRegistry::new(vec![
            tenant("la-cantera", "LC", EnvironmentClass::Production),
            tenant("peralillo", "LC", EnvironmentClass::Production),
        ]);
        assert!(matches!(
            clash,
            Err(TenantCatalogError::DuplicateCompanyCode { .. })
        ));
    }

    #[test]
    fn tenants_iterator_filters_by_class_and_restarts() {
        let registry = TenantRegistry::new(vec![
            tenant("la-cantera", "LC", EnvironmentClass::Production),
            tenant("icrear-pruebas", "IC", EnvironmentClass::Test),
            tenant("peralillo", "PE", EnvironmentClass::Production),
        ])
        .unwrap();

        let production = registry.tenants(EnvironmentClass::Production);
        let first: Vec<_> = production.clone().map(|t| t.tenant_id.as_str()).collect();
        let second: Vec<_> = production.map(|t| t.tenant_id.as_str()).collect();
        assert_eq!(first, vec!["la-cantera", "peralillo"]);
        assert_eq!(first, second);
    }

    #[test]
    fn empty_catalog_rejected() {
        assert!(matches!(
            TenantRegistry::new(Vec::new()),
            Err(TenantCatalogError::Empty)
        ));
    }
}
