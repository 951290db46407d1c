//! Test utilities for integration testing.
//!
//! Provides an in-memory SQLite portal database with migrations applied,
//! plus in-memory ERP fakes wired through the real [`PoolManager`] so the
//! suites exercise the same code paths the service runs in production.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use migration::{Migrator, MigratorTrait};
use rust_decimal::Decimal;
use sea_orm::{Database, DatabaseConnection};

use portal_proveedores::erp::{
    CompanyCandidate, EntityFilters, EntityKind, ErpAdmin, ErpChannels, ErpConnector, ErpDocument,
    ErpDocumentStatus, ErpProvider, ErpRead, NewProviderRecord,
};
use portal_proveedores::error::{PortalError, PortalResult};
use portal_proveedores::pool::PoolManager;
use portal_proveedores::tenants::{EnvironmentClass, TenantConfig, TenantRegistry};

/// Sets up an in-memory SQLite portal database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

pub fn test_tenant(id: &str, code: &str) -> TenantConfig {
    TenantConfig {
        tenant_id: id.to_string(),
        display_name: id.replace('-', " "),
        erp_server: "erp01.internal".to_string(),
        erp_database: format!("Intelisis_{}", id.replace('-', "_")),
        erp_company_code: code.to_string(),
        environment_class: EnvironmentClass::Production,
    }
}

/// The standard five-company production catalog used across the suites.
pub fn standard_registry() -> Arc<TenantRegistry> {
    Arc::new(
        TenantRegistry::new(vec![
            test_tenant("la-cantera", "LC"),
            test_tenant("peralillo", "PE"),
            test_tenant("plaza-galerena", "PG"),
            test_tenant("icrear", "IC"),
            test_tenant("el-mirador", "EM"),
        ])
        .expect("standard catalog is valid"),
    )
}

/// In-memory stand-in for one tenant's ERP database. Read fixtures are set
/// up front; writes through [`ErpAdmin`] are recorded for assertions.
#[derive(Default)]
pub struct FakeErp {
    pub companies: Vec<CompanyCandidate>,
    pub providers: Vec<ErpProvider>,
    pub documents: Vec<ErpDocument>,
    /// When set, every read fails as this tenant's unreachable upstream.
    pub fail_reads_as: Option<String>,
    #[allow(dead_code)]
    pub attachments: Mutex<Vec<(EntityKind, String, String)>>,
    #[allow(dead_code)]
    pub created_providers: Mutex<Vec<NewProviderRecord>>,
}

impl FakeErp {
    pub fn with_provider(mut self, code: &str, name: &str, rfc: &str) -> Self {
        self.providers.push(ErpProvider {
            provider_code: code.to_string(),
            name: name.to_string(),
            rfc: rfc.to_string(),
        });
        self
    }

    /// Registers a row in the primary ERP's company-membership lookup.
    pub fn with_company(mut self, tenant: &TenantConfig) -> Self {
        self.companies.push(CompanyCandidate {
            company_code: tenant.erp_company_code.clone(),
            database_name: tenant.erp_database.clone(),
            company_name: tenant.display_name.clone(),
        });
        self
    }

    #[allow(dead_code)]
    pub fn with_document(mut self, document: ErpDocument) -> Self {
        self.documents.push(document);
        self
    }

    /// Simulates an ERP whose pool connects but whose queries then die
    /// (network reset after establishment).
    #[allow(dead_code)]
    pub fn with_failing_reads(mut self, tenant_id: &str) -> Self {
        self.fail_reads_as = Some(tenant_id.to_string());
        self
    }

    fn check_reachable(&self) -> PortalResult<()> {
        match &self.fail_reads_as {
            Some(tenant_id) => Err(PortalError::upstream(tenant_id, "connection reset by peer")),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ErpRead for FakeErp {
    async fn lookup_provider_companies(&self, _rfc: &str) -> PortalResult<Vec<CompanyCandidate>> {
        self.check_reachable()?;
        Ok(self.companies.clone())
    }

    async fn find_provider_by_rfc(&self, rfc: &str) -> PortalResult<Option<ErpProvider>> {
        self.check_reachable()?;
        Ok(self.providers.iter().find(|p| p.rfc == rfc).cloned())
    }

    async fn list_documents(
        &self,
        kind: EntityKind,
        provider_code: &str,
        _filters: &EntityFilters,
    ) -> PortalResult<Vec<ErpDocument>> {
        Ok(self
            .documents
            .iter()
            .filter(|d| d.kind == kind && d.provider_code == provider_code)
            .cloned()
            .collect())
    }

    async fn get_document(
        &self,
        kind: EntityKind,
        natural_key: &str,
    ) -> PortalResult<Option<ErpDocument>> {
        Ok(self
            .documents
            .iter()
            .find(|d| d.kind == kind && d.natural_key == natural_key)
            .cloned())
    }
}

#[async_trait]
impl ErpAdmin for FakeErp {
    async fn attach_document_reference(
        &self,
        kind: EntityKind,
        natural_key: &str,
        reference: &str,
    ) -> PortalResult<()> {
        self.attachments.lock().unwrap().push((
            kind,
            natural_key.to_string(),
            reference.to_string(),
        ));
        Ok(())
    }

    async fn create_provider_record(&self, record: &NewProviderRecord) -> PortalResult<()> {
        self.created_providers.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// Connector handing out [`FakeErp`] channels per tenant. Tenants marked
/// unreachable fail to connect the way a dead SQL Server would.
#[derive(Default)]
pub struct FakeConnector {
    erps: Mutex<HashMap<String, Arc<FakeErp>>>,
    unreachable: Mutex<HashSet<String>>,
    attempts: Mutex<HashMap<String, usize>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&self, tenant_id: &str, erp: FakeErp) -> Arc<FakeErp> {
        let erp = Arc::new(erp);
        self.erps
            .lock()
            .unwrap()
            .insert(tenant_id.to_string(), erp.clone());
        erp
    }

    #[allow(dead_code)]
    pub fn mark_unreachable(&self, tenant_id: &str) {
        self.unreachable
            .lock()
            .unwrap()
            .insert(tenant_id.to_string());
    }

    /// Connect attempts made for one tenant so far.
    #[allow(dead_code)]
    pub fn attempts_for(&self, tenant_id: &str) -> usize {
        self.attempts
            .lock()
            .unwrap()
            .get(tenant_id)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl ErpConnector for FakeConnector {
    async fn connect(&self, tenant: &TenantConfig) -> PortalResult<ErpChannels> {
        *self
            .attempts
            .lock()
            .unwrap()
            .entry(tenant.tenant_id.clone())
            .or_insert(0) += 1;
        if self.unreachable.lock().unwrap().contains(&tenant.tenant_id) {
            return Err(PortalError::upstream(
                &tenant.tenant_id,
                "connection refused",
            ));
        }
        let erp = self
            .erps
            .lock()
            .unwrap()
            .entry(tenant.tenant_id.clone())
            .or_insert_with(|| Arc::new(FakeErp::default()))
            .clone();
        Ok(ErpChannels {
            read: erp.clone(),
            admin: erp,
        })
    }
}

/// Pool manager over the standard catalog, a fresh in-memory portal
/// database and the given fake connector.
pub async fn setup_pool_manager(connector: Arc<FakeConnector>) -> Result<Arc<PoolManager>> {
    let portal = setup_test_db().await?;
    Ok(Arc::new(PoolManager::with_portal(
        standard_registry(),
        connector,
        portal,
    )))
}

/// ERP document fixture with sensible defaults.
#[allow(dead_code)]
pub fn erp_document(
    kind: EntityKind,
    natural_key: &str,
    provider_code: &str,
    amount: i64,
    status: ErpDocumentStatus,
) -> ErpDocument {
    ErpDocument {
        kind,
        natural_key: natural_key.to_string(),
        provider_code: provider_code.to_string(),
        issued_on: NaiveDate::from_ymd_opt(2025, 5, 2).expect("valid date"),
        due_on: NaiveDate::from_ymd_opt(2025, 6, 1),
        amount: Decimal::from(amount),
        balance: Decimal::from(amount),
        currency: "MXN".to_string(),
        status,
    }
}
