//! SQL Server driver for the ERP seam.
//!
//! Talks to Intelisis-style company databases over Tiberius with a bb8
//! connection pool. Every value that originates from a request is bound as
//! a `@Pn` parameter; SQL text only ever varies over fixed fragments chosen
//! by entity kind. Each round trip runs under the configured timeout and
//! failures surface as `UpstreamUnavailable` for this handle's tenant.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bb8::Pool;
use bb8_tiberius::ConnectionManager;
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use tiberius::{AuthMethod, Config, Row, ToSql};
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::erp::types::split_natural_key;
use crate::erp::{
    CompanyCandidate, EntityFilters, EntityKind, ErpAdmin, ErpChannels, ErpConnector, ErpDocument,
    ErpDocumentStatus, ErpProvider, ErpRead, NewProviderRecord,
};
use crate::error::{PortalError, PortalResult};
use crate::tenants::TenantConfig;

const ERP_PORT: u16 = 1433;

/// Factory for per-tenant SQL Server pools.
pub struct MssqlErpConnector {
    username: String,
    password: String,
    connect_timeout: Duration,
    query_timeout: Duration,
    pool_max_size: u32,
}

impl MssqlErpConnector {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            username: config.erp_username.clone().unwrap_or_default(),
            password: config.erp_password.clone().unwrap_or_default(),
            connect_timeout: Duration::from_millis(config.erp_connect_timeout_ms),
            query_timeout: Duration::from_millis(config.erp_query_timeout_ms),
            pool_max_size: config.erp_pool_max_size,
        }
    }
}

#[async_trait]
impl ErpConnector for MssqlErpConnector {
    async fn connect(&self, tenant: &TenantConfig) -> PortalResult<ErpChannels> {
        let mut config = Config::new();
        config.host(&tenant.erp_server);
        config.port(ERP_PORT);
        config.database(&tenant.erp_database);
        config.authentication(AuthMethod::sql_server(&self.username, &self.password));
        // Legacy in-house instances run self-signed certificates.
        config.trust_cert();

        let manager = ConnectionManager::new(config);
        let pool = Pool::builder()
            .max_size(self.pool_max_size)
            .connection_timeout(self.connect_timeout)
            .build(manager)
            .await
            .map_err(|e| PortalError::upstream(&tenant.tenant_id, e))?;

        info!(
            tenant_id = %tenant.tenant_id,
            server = %tenant.erp_server,
            database = %tenant.erp_database,
            max_size = self.pool_max_size,
            "ERP connection pool established"
        );

        let handle = Arc::new(MssqlErpHandle {
            pool,
            tenant_id: tenant.tenant_id.clone(),
            company_code: tenant.erp_company_code.clone(),
            query_timeout: self.query_timeout,
        });

        Ok(ErpChannels {
            read: handle.clone(),
            admin: handle,
        })
    }
}

/// One tenant's pooled ERP connection, implementing both capabilities.
/// Consumers only ever see it as `Arc<dyn ErpRead>` or `Arc<dyn ErpAdmin>`.
struct MssqlErpHandle {
    pool: Pool<ConnectionManager>,
    tenant_id: String,
    company_code: String,
    query_timeout: Duration,
}

impl MssqlErpHandle {
    async fn query(&self, sql: &str, params: &[&dyn ToSql]) -> PortalResult<Vec<Row>> {
        debug!(tenant_id = %self.tenant_id, sql = %sql, "Executing ERP query");
        let round_trip = async {
            let mut conn = self
                .pool
                .get()
                .await
                .map_err(|e| PortalError::upstream(&self.tenant_id, e))?;
            let stream = conn
                .query(sql, params)
                .await
                .map_err(|e| PortalError::upstream(&self.tenant_id, e))?;
            stream
                .into_first_result()
                .await
                .map_err(|e| PortalError::upstream(&self.tenant_id, e))
        };
        self.bounded(round_trip).await
    }

    async fn execute(&self, sql: &str, params: &[&dyn ToSql]) -> PortalResult<u64> {
        debug!(tenant_id = %self.tenant_id, sql = %sql, "Executing ERP statement");
        let round_trip = async {
            let mut conn = self
                .pool
                .get()
                .await
                .map_err(|e| PortalError::upstream(&self.tenant_id, e))?;
            let result = conn
                .execute(sql, params)
                .await
                .map_err(|e| PortalError::upstream(&self.tenant_id, e))?;
            Ok(result.total())
        };
        self.bounded(round_trip).await
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = PortalResult<T>> + Send,
    ) -> PortalResult<T> {
        match tokio::time::timeout(self.query_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(PortalError::upstream(
                &self.tenant_id,
                format!(
                    "ERP round trip exceeded {}ms",
                    self.query_timeout.as_millis()
                ),
            )),
        }
    }

    fn document_from_row(&self, kind: EntityKind, row: &Row) -> PortalResult<ErpDocument> {
        let mov: &str = self.required(row, "Mov")?;
        let mov_id: &str = self.required(row, "MovID")?;
        let provider_code: &str = self.required(row, "Proveedor")?;
        let issued: NaiveDateTime = self.required(row, "FechaEmision")?;
        let due: Option<NaiveDateTime> = row
            .try_get("Vencimiento")
            .map_err(|e| PortalError::upstream(&self.tenant_id, e))?;
        let amount: Decimal = self.required(row, "Importe")?;
        let balance: Option<Decimal> = row
            .try_get("Saldo")
            .map_err(|e| PortalError::upstream(&self.tenant_id, e))?;
        let currency: &str = self.required(row, "Moneda")?;
        let status: &str = self.required(row, "Estatus")?;

        Ok(ErpDocument {
            kind,
            natural_key: format!("{mov} {mov_id}"),
            provider_code: provider_code.to_string(),
            issued_on: issued.date(),
            due_on: due.map(|d| d.date()),
            amount,
            balance: balance.unwrap_or(amount),
            currency: currency.to_string(),
            status: status_from_erp(status),
        })
    }

    fn required<'a, T: tiberius::FromSql<'a>>(
        &self,
        row: &'a Row,
        column: &str,
    ) -> PortalResult<T> {
        row.try_get(column)
            .map_err(|e| PortalError::upstream(&self.tenant_id, e))?
            .ok_or_else(|| {
                PortalError::upstream(&self.tenant_id, format!("NULL in ERP column '{column}'"))
            })
    }
}

#[async_trait]
impl ErpRead for MssqlErpHandle {
    async fn lookup_provider_companies(&self, rfc: &str) -> PortalResult<Vec<CompanyCandidate>> {
        // Shared lookup procedure on the primary ERP; enumerates the
        // company databases an RFC is registered in.
        let rows = self
            .query("EXEC spPortalProvEmpresas @RFC = @P1", &[&rfc])
            .await?;
        rows.iter()
            .map(|row| {
                Ok(CompanyCandidate {
                    company_code: self.required::<&str>(row, "Empresa")?.to_string(),
                    database_name: self.required::<&str>(row, "BaseDatos")?.to_string(),
                    company_name: self.required::<&str>(row, "Nombre")?.to_string(),
                })
            })
            .collect()
    }

    async fn find_provider_by_rfc(&self, rfc: &str) -> PortalResult<Option<ErpProvider>> {
        let rows = self
            .query(
                "SELECT Proveedor, Nombre, RFC FROM Prov WHERE RFC = @P1 AND Estatus = 'ALTA'",
                &[&rfc],
            )
            .await?;
        rows.first()
            .map(|row| {
                Ok(ErpProvider {
                    provider_code: self.required::<&str>(row, "Proveedor")?.to_string(),
                    name: self.required::<&str>(row, "Nombre")?.to_string(),
                    rfc: self.required::<&str>(row, "RFC")?.to_string(),
                })
            })
            .transpose()
    }

    async fn list_documents(
        &self,
        kind: EntityKind,
        provider_code: &str,
        filters: &EntityFilters,
    ) -> PortalResult<Vec<ErpDocument>> {
        let sql = listing_sql(kind, filters);

        let issued_from = filters.issued_from.map(start_of_day);
        let issued_to = filters.issued_to.map(start_of_day);

        let mut params: Vec<&dyn ToSql> = vec![&self.company_code, &provider_code];
        if let Some(ref from) = issued_from {
            params.push(from);
        }
        if let Some(ref to) = issued_to {
            params.push(to);
        }

        let rows = self.query(&sql, &params).await?;
        rows.iter()
            .map(|row| self.document_from_row(kind, row))
            .collect()
    }

    async fn get_document(
        &self,
        kind: EntityKind,
        natural_key: &str,
    ) -> PortalResult<Option<ErpDocument>> {
        let (mov, mov_id) = split_natural_key(natural_key)?;
        let sql = format!(
            "SELECT Mov, MovID, Proveedor, FechaEmision, Vencimiento, Importe, Saldo, Moneda, Estatus \
             FROM {} WHERE Empresa = @P1 AND Mov = @P2 AND MovID = @P3",
            table_for(kind)
        );
        let rows = self
            .query(&sql, &[&self.company_code, &mov, &mov_id])
            .await?;
        rows.first()
            .map(|row| self.document_from_row(kind, row))
            .transpose()
    }
}

#[async_trait]
impl ErpAdmin for MssqlErpHandle {
    async fn attach_document_reference(
        &self,
        kind: EntityKind,
        natural_key: &str,
        reference: &str,
    ) -> PortalResult<()> {
        let (mov, mov_id) = split_natural_key(natural_key)?;
        // AnexoMov is the ERP's own attachment ledger; storing the blob
        // reference there keeps attachments visible to ERP-side users.
        let affected = self
            .execute(
                "INSERT INTO AnexoMov (Empresa, Modulo, Mov, MovID, Direccion) \
                 VALUES (@P1, @P2, @P3, @P4, @P5)",
                &[
                    &self.company_code,
                    &module_for(kind),
                    &mov,
                    &mov_id,
                    &reference,
                ],
            )
            .await?;
        debug!(
            tenant_id = %self.tenant_id,
            natural_key = %natural_key,
            rows = affected,
            "Attached document reference in ERP"
        );
        Ok(())
    }

    async fn create_provider_record(&self, record: &NewProviderRecord) -> PortalResult<()> {
        self.execute(
            "INSERT INTO Prov (Empresa, Proveedor, Nombre, RFC, Estatus) \
             VALUES (@P1, @P2, @P3, @P4, 'ALTA')",
            &[
                &self.company_code,
                &record.provider_code,
                &record.name,
                &record.rfc,
            ],
        )
        .await?;
        info!(
            tenant_id = %self.tenant_id,
            provider_code = %record.provider_code,
            "Created ERP provider record"
        );
        Ok(())
    }
}

fn table_for(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Order => "Compra",
        EntityKind::Invoice | EntityKind::Payment => "Cxp",
    }
}

fn module_for(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Order => "COMS",
        EntityKind::Invoice | EntityKind::Payment => "CXP",
    }
}

/// Fixed predicate distinguishing invoices from payments inside the shared
/// `Cxp` ledger. Constant SQL fragments only.
fn kind_predicate(kind: EntityKind) -> Option<&'static str> {
    match kind {
        EntityKind::Order => None,
        EntityKind::Invoice => Some("Mov = 'Factura'"),
        EntityKind::Payment => Some("Mov = 'Pago'"),
    }
}

/// Builds the listing statement with sequential `@Pn` placeholders matching
/// the parameter order used by `list_documents`.
fn listing_sql(kind: EntityKind, filters: &EntityFilters) -> String {
    let mut sql = format!(
        "SELECT Mov, MovID, Proveedor, FechaEmision, Vencimiento, Importe, Saldo, Moneda, Estatus \
         FROM {} WHERE Empresa = @P1 AND Proveedor = @P2",
        table_for(kind)
    );
    if let Some(predicate) = kind_predicate(kind) {
        sql.push_str(" AND ");
        sql.push_str(predicate);
    }
    let mut next_param = 3;
    if filters.issued_from.is_some() {
        sql.push_str(&format!(" AND FechaEmision >= @P{next_param}"));
        next_param += 1;
    }
    if filters.issued_to.is_some() {
        sql.push_str(&format!(" AND FechaEmision <= @P{next_param}"));
    }
    if let Some(status) = filters.status {
        sql.push_str(" AND ");
        sql.push_str(status_predicate(status));
    }
    sql.push_str(" ORDER BY FechaEmision, MovID");
    sql
}

fn status_from_erp(status: &str) -> ErpDocumentStatus {
    match status.to_ascii_uppercase().as_str() {
        "CANCELADO" => ErpDocumentStatus::Cancelled,
        "CONCLUIDO" | "PAGADO" => ErpDocumentStatus::Settled,
        _ => ErpDocumentStatus::Open,
    }
}

/// Constant predicate for one lifecycle state, the exact SQL complement of
/// [`status_from_erp`]: `Open` is everything not classified as settled or
/// cancelled, so filtered listings and the classifier always agree. No
/// request-originating values, constant fragments only.
fn status_predicate(status: ErpDocumentStatus) -> &'static str {
    match status {
        ErpDocumentStatus::Open => "Estatus NOT IN ('CONCLUIDO', 'PAGADO', 'CANCELADO')",
        ErpDocumentStatus::Settled => "Estatus IN ('CONCLUIDO', 'PAGADO')",
        ErpDocumentStatus::Cancelled => "Estatus = 'CANCELADO'",
    }
}

fn start_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_hms_opt(0, 0, 0).unwrap_or_default()
}
