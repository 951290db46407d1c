//! Connection pool management.
//!
//! One [`PoolManager`] owns every shared connection in the process: the
//! single Portal database pool plus one lazily-established ERP channel pair
//! per tenant. Callers borrow capability handles; they never own, close or
//! rebuild pools themselves.
//!
//! Cold-start storms are the dangerous case: dozens of requests can race on
//! the first use of a tenant after a restart. Establishment is therefore
//! single-flight per tenant, and losers of the race await the in-flight
//! attempt instead of opening their own pool.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection};
use tokio::sync::OnceCell;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::erp::{ErpAdmin, ErpChannels, ErpConnector, ErpRead};
use crate::error::{PortalError, PortalResult};
use crate::tenants::TenantRegistry;

/// Initializes the Portal database pool with retry and exponential backoff
/// for transient startup errors.
pub async fn init_portal_pool(cfg: &AppConfig) -> PortalResult<DatabaseConnection> {
    let mut opt = ConnectOptions::new(&cfg.portal_database_url);
    opt.max_connections(cfg.db_max_connections)
        .acquire_timeout(Duration::from_millis(cfg.db_acquire_timeout_ms))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    let max_retries = 5;
    let mut retry_delay = Duration::from_millis(100);

    for attempt in 1..=max_retries {
        match Database::connect(opt.clone()).await {
            Ok(conn) => {
                info!(attempt, "Connected to portal database");
                return Ok(conn);
            }
            Err(e) if attempt < max_retries => {
                warn!(
                    attempt,
                    error = %e,
                    retry_in_ms = retry_delay.as_millis() as u64,
                    "Portal database connection attempt failed, retrying"
                );
                sleep(retry_delay).await;
                retry_delay *= 2;
            }
            Err(e) => return Err(PortalError::Database(e)),
        }
    }
    unreachable!("retry loop either returns a connection or the final error")
}

/// Verifies the portal pool still answers a trivial query.
pub async fn portal_health_check(db: &DatabaseConnection) -> PortalResult<()> {
    use sea_orm::Statement;

    let stmt = Statement::from_string(db.get_database_backend(), "SELECT 1".to_string());
    db.query_one(stmt).await?;
    Ok(())
}

type ChannelCell = Arc<OnceCell<ErpChannels>>;

/// Owner of all pooled connections, ERP and Portal alike.
pub struct PoolManager {
    registry: Arc<TenantRegistry>,
    connector: Arc<dyn ErpConnector>,
    portal: DatabaseConnection,
    cells: Mutex<HashMap<String, ChannelCell>>,
}

impl PoolManager {
    /// Builds the manager, establishing the Portal pool eagerly. ERP pools
    /// stay lazy.
    pub async fn init(
        config: &AppConfig,
        registry: Arc<TenantRegistry>,
        connector: Arc<dyn ErpConnector>,
    ) -> PortalResult<Self> {
        let portal = init_portal_pool(config).await?;
        Ok(Self::with_portal(registry, connector, portal))
    }

    /// Assembles a manager around an already-open Portal connection
    /// (test databases, mostly).
    pub fn with_portal(
        registry: Arc<TenantRegistry>,
        connector: Arc<dyn ErpConnector>,
        portal: DatabaseConnection,
    ) -> Self {
        Self {
            registry,
            connector,
            portal,
            cells: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &TenantRegistry {
        &self.registry
    }

    /// The Portal's own pool. Exactly one exists per process.
    pub fn portal(&self) -> &DatabaseConnection {
        &self.portal
    }

    /// Returns the ERP channels for a tenant, establishing them on first
    /// use. Concurrent first calls for the same tenant collapse into one
    /// establishment attempt; a failure is surfaced to its caller and the
    /// next call starts fresh. Other tenants are never affected.
    ///
    /// Established channels are cached for the process lifetime. A caller
    /// that hits a connection-level fatal error on a cached channel must
    /// call [`PoolManager::invalidate`] so the next use re-establishes
    /// instead of reusing the dead pool.
    pub async fn erp_channels(&self, tenant_id: &str) -> PortalResult<ErpChannels> {
        let tenant = self.registry.resolve(tenant_id)?.clone();

        let cell = {
            let mut cells = self.cells.lock().expect("pool map poisoned");
            cells
                .entry(tenant.tenant_id.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let channels = cell
            .get_or_try_init(|| self.connector.connect(&tenant))
            .await?;
        Ok(channels.clone())
    }

    /// Read capability for a tenant's ERP. This is the only handle the
    /// query/merge paths receive.
    pub async fn erp_read(&self, tenant_id: &str) -> PortalResult<Arc<dyn ErpRead>> {
        Ok(self.erp_channels(tenant_id).await?.read)
    }

    /// Whitelisted-write capability for a tenant's ERP. Handed out only to
    /// registration and document-intake paths.
    pub async fn erp_admin(&self, tenant_id: &str) -> PortalResult<Arc<dyn ErpAdmin>> {
        Ok(self.erp_channels(tenant_id).await?.admin)
    }

    /// Evicts a tenant's pool after a fatal connection error. In-flight
    /// borrowers keep their (broken) handle and surface the failure; the
    /// next `erp_channels` call re-establishes.
    pub fn invalidate(&self, tenant_id: &str) {
        let removed = {
            let mut cells = self.cells.lock().expect("pool map poisoned");
            cells.remove(tenant_id).is_some()
        };
        if removed {
            warn!(tenant_id = %tenant_id, "Evicted ERP connection pool after fatal error");
        }
    }
}
