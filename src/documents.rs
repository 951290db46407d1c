//! Invoice document intake.
//!
//! Suppliers upload the CFDI (the SAT-stamped electronic invoice XML) that
//! backs an ERP invoice. The portal does not parse CFDI XML itself; a
//! [`CfdiValidator`] collaborator returns a structured summary which is
//! cross-checked against the ERP row before anything is stored. The final
//! step is one of the two whitelisted ERP writes: recording the attachment
//! reference in the ERP's document ledger.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sea_orm::DatabaseConnection;
use tracing::info;
use uuid::Uuid;

use crate::erp::{EntityKind, ErpAdmin, ErpRead};
use crate::error::{PortalError, PortalResult};
use crate::repositories::{OverlayChange, OverlayRepository};

/// Structured result of validating a CFDI document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CfdiSummary {
    /// SAT folio fiscal (UUID) of the stamped document.
    pub uuid: String,
    pub issuer_rfc: String,
    pub receiver_rfc: String,
    pub total: Decimal,
}

/// External CFDI validation collaborator. Implementations own the XML
/// parsing and SAT-status verification; this crate only consumes the
/// summary.
#[async_trait]
pub trait CfdiValidator: Send + Sync {
    async fn validate(&self, bytes: &[u8]) -> PortalResult<CfdiSummary>;
}

/// Opaque blob storage. `put` returns the storage reference that both the
/// overlay row and the ERP ledger will carry.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> PortalResult<String>;
}

/// Intake pipeline for one tenant: validate, cross-check, store, record.
pub struct DocumentService {
    tenant_id: String,
    erp_read: Arc<dyn ErpRead>,
    erp_admin: Arc<dyn ErpAdmin>,
    portal: DatabaseConnection,
    validator: Arc<dyn CfdiValidator>,
    blobs: Arc<dyn BlobStore>,
}

impl DocumentService {
    pub fn new(
        tenant_id: impl Into<String>,
        erp_read: Arc<dyn ErpRead>,
        erp_admin: Arc<dyn ErpAdmin>,
        portal: DatabaseConnection,
        validator: Arc<dyn CfdiValidator>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            erp_read,
            erp_admin,
            portal,
            validator,
            blobs,
        }
    }

    /// Links an uploaded CFDI to an ERP invoice.
    ///
    /// The CFDI must validate, its issuer RFC must resolve to the provider
    /// the invoice belongs to, and its total must equal the invoice amount.
    /// Only then is the blob stored, the overlay row updated, and the
    /// reference pushed into the ERP ledger.
    pub async fn link_invoice_document(
        &self,
        natural_key: &str,
        bytes: &[u8],
        actor: Uuid,
    ) -> PortalResult<String> {
        let summary = self.validator.validate(bytes).await?;

        let invoice = self
            .erp_read
            .get_document(EntityKind::Invoice, natural_key)
            .await?
            .ok_or_else(|| PortalError::not_found(format!("invoice {natural_key}")))?;

        let issuer = self
            .erp_read
            .find_provider_by_rfc(&summary.issuer_rfc)
            .await?
            .ok_or_else(|| PortalError::ValidationFailed {
                reason: format!(
                    "cfdi issuer rfc {} is not a registered provider",
                    summary.issuer_rfc
                ),
            })?;
        if issuer.provider_code != invoice.provider_code {
            return Err(PortalError::ValidationFailed {
                reason: format!(
                    "cfdi issuer {} does not own invoice {natural_key}",
                    summary.issuer_rfc
                ),
            });
        }
        if summary.total != invoice.amount {
            return Err(PortalError::ValidationFailed {
                reason: format!(
                    "cfdi total {} does not match invoice amount {}",
                    summary.total, invoice.amount
                ),
            });
        }

        let key = format!("{}/invoice/{}/{}.xml", self.tenant_id, natural_key, summary.uuid);
        let reference = self.blobs.put(&key, bytes).await?;

        OverlayRepository::new(&self.portal)
            .upsert(
                &self.tenant_id,
                EntityKind::Invoice,
                natural_key,
                OverlayChange {
                    document_ref: Some(reference.clone()),
                    updated_by: Some(actor),
                    ..Default::default()
                },
            )
            .await?;

        self.erp_admin
            .attach_document_reference(EntityKind::Invoice, natural_key, &reference)
            .await?;

        info!(
            tenant_id = %self.tenant_id,
            natural_key = %natural_key,
            cfdi_uuid = %summary.uuid,
            reference = %reference,
            "Linked CFDI document to invoice"
        );
        Ok(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::erp::types::{
        CompanyCandidate, EntityFilters, ErpDocument, ErpDocumentStatus, ErpProvider,
        NewProviderRecord,
    };
    use chrono::NaiveDate;
    use migration::MigratorTrait;
    use rust_decimal::prelude::FromPrimitive;
    use sea_orm::Database;
    use std::sync::Mutex;

    struct FixtureErp {
        invoice: Option<ErpDocument>,
        provider: Option<ErpProvider>,
    }

    #[async_trait]
    impl ErpRead for FixtureErp {
        async fn lookup_provider_companies(
            &self,
            _rfc: &str,
        ) -> PortalResult<Vec<CompanyCandidate>> {
            Ok(Vec::new())
        }

        async fn find_provider_by_rfc(&self, rfc: &str) -> PortalResult<Option<ErpProvider>> {
            Ok(self.provider.clone().filter(|p| p.rfc == rfc))
        }

        async fn list_documents(
            &self,
            _kind: EntityKind,
            _provider_code: &str,
            _filters: &EntityFilters,
        ) -> PortalResult<Vec<ErpDocument>> {
            Ok(Vec::new())
        }

        async fn get_document(
            &self,
            _kind: EntityKind,
            natural_key: &str,
        ) -> PortalResult<Option<ErpDocument>> {
            Ok(self
                .invoice
                .clone()
                .filter(|d| d.natural_key == natural_key))
        }
    }

    #[derive(Default)]
    struct RecordingAdmin {
        attachments: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl ErpAdmin for RecordingAdmin {
        async fn attach_document_reference(
            &self,
            _kind: EntityKind,
            natural_key: &str,
            reference: &str,
        ) -> PortalResult<()> {
            self.attachments
                .lock()
                .unwrap()
                .push((natural_key.to_string(), reference.to_string()));
            Ok(())
        }

        async fn create_provider_record(&self, _record: &NewProviderRecord) -> PortalResult<()> {
            Ok(())
        }
    }

    struct FixedValidator(CfdiSummary);

    #[async_trait]
    impl CfdiValidator for FixedValidator {
        async fn validate(&self, _bytes: &[u8]) -> PortalResult<CfdiSummary> {
            Ok(self.0.clone())
        }
    }

    struct MemoryBlobs;

    #[async_trait]
    impl BlobStore for MemoryBlobs {
        async fn put(&self, key: &str, _bytes: &[u8]) -> PortalResult<String> {
            Ok(format!("blob://{key}"))
        }
    }

    fn invoice(amount: i64) -> ErpDocument {
        ErpDocument {
            kind: EntityKind::Invoice,
            natural_key: "Factura 12345".to_string(),
            provider_code: "P00443".to_string(),
            issued_on: NaiveDate::from_ymd_opt(2025, 5, 2).unwrap(),
            due_on: None,
            amount: Decimal::from_i64(amount).unwrap(),
            balance: Decimal::from_i64(amount).unwrap(),
            currency: "MXN".to_string(),
            status: ErpDocumentStatus::Open,
        }
    }

    fn provider() -> ErpProvider {
        ErpProvider {
            provider_code: "P00443".to_string(),
            name: "Anonima SA de CV".to_string(),
            rfc: "ANO010203XYZ".to_string(),
        }
    }

    fn summary(total: i64, issuer: &str) -> CfdiSummary {
        CfdiSummary {
            uuid: "11111111-2222-3333-4444-555555555555".to_string(),
            issuer_rfc: issuer.to_string(),
            receiver_rfc: "LCA990101AAA".to_string(),
            total: Decimal::from_i64(total).unwrap(),
        }
    }

    async fn service(
        erp: FixtureErp,
        admin: Arc<RecordingAdmin>,
        cfdi: CfdiSummary,
    ) -> DocumentService {
        let portal = Database::connect("sqlite::memory:").await.unwrap();
        migration::Migrator::up(&portal, None).await.unwrap();
        DocumentService::new(
            "la-cantera",
            Arc::new(erp),
            admin,
            portal,
            Arc::new(FixedValidator(cfdi)),
            Arc::new(MemoryBlobs),
        )
    }

    #[tokio::test]
    async fn valid_cfdi_is_stored_and_recorded_in_erp_ledger() {
        let admin = Arc::new(RecordingAdmin::default());
        let svc = service(
            FixtureErp {
                invoice: Some(invoice(1500)),
                provider: Some(provider()),
            },
            admin.clone(),
            summary(1500, "ANO010203XYZ"),
        )
        .await;

        let reference = svc
            .link_invoice_document("Factura 12345", b"<cfdi/>", Uuid::new_v4())
            .await
            .unwrap();

        assert!(reference.starts_with("blob://la-cantera/invoice/Factura 12345/"));
        let attachments = admin.attachments.lock().unwrap();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].0, "Factura 12345");
        assert_eq!(attachments[0].1, reference);
    }

    #[tokio::test]
    async fn total_mismatch_is_rejected_before_any_write() {
        let admin = Arc::new(RecordingAdmin::default());
        let svc = service(
            FixtureErp {
                invoice: Some(invoice(1500)),
                provider: Some(provider()),
            },
            admin.clone(),
            summary(1400, "ANO010203XYZ"),
        )
        .await;

        let err = svc
            .link_invoice_document("Factura 12345", b"<cfdi/>", Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::ValidationFailed { .. }));
        assert!(admin.attachments.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn foreign_issuer_rfc_is_rejected() {
        let admin = Arc::new(RecordingAdmin::default());
        let svc = service(
            FixtureErp {
                invoice: Some(invoice(1500)),
                provider: Some(provider()),
            },
            admin.clone(),
            summary(1500, "XXX010101XXX"),
        )
        .await;

        let err = svc
            .link_invoice_document("Factura 12345", b"<cfdi/>", Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::ValidationFailed { .. }));
        assert!(admin.attachments.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_invoice_is_not_found() {
        let admin = Arc::new(RecordingAdmin::default());
        let svc = service(
            FixtureErp {
                invoice: None,
                provider: Some(provider()),
            },
            admin,
            summary(1500, "ANO010203XYZ"),
        )
        .await;

        let err = svc
            .link_invoice_document("Factura 12345", b"<cfdi/>", Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::NotFound { .. }));
    }
}
