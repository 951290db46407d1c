//! Hybrid ERP + overlay query engine.
//!
//! Reads merge two sources of truth: transactional documents from the
//! tenant's ERP and the portal-owned workflow overlay. The merge is a left
//! join from the ERP side. A document missing from the ERP does not exist,
//! no matter what the overlay table says, and financial fields always come
//! from the ERP row.
//!
//! The write path only ever touches the overlay. The engine holds an
//! [`ErpRead`] capability and nothing else, so an ERP write from here is
//! not a policy violation, it is a compile error.

use std::sync::Arc;

use rust_decimal::Decimal;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::context::TenantContext;
use crate::erp::{EntityFilters, EntityKind, ErpDocument, ErpDocumentStatus, ErpRead};
use crate::error::{PortalError, PortalResult};
use crate::models::workflow_overlay::Model as OverlayModel;
use crate::repositories::{OverlayChange, OverlayRepository};

/// Portal-side workflow status of a document. Lives only in the overlay;
/// `None` is the implicit state of every document never acted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    None,
    Accepted,
    Rejected,
    InReview,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::None => "none",
            WorkflowStatus::Accepted => "accepted",
            WorkflowStatus::Rejected => "rejected",
            WorkflowStatus::InReview => "in_review",
        }
    }
}

impl std::str::FromStr for WorkflowStatus {
    type Err = PortalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(WorkflowStatus::None),
            "accepted" => Ok(WorkflowStatus::Accepted),
            "rejected" => Ok(WorkflowStatus::Rejected),
            "in_review" => Ok(WorkflowStatus::InReview),
            other => Err(PortalError::ValidationFailed {
                reason: format!("unknown workflow status '{other}'"),
            }),
        }
    }
}

/// A workflow action a portal user can apply to a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowAction {
    Accept { notes: Option<String> },
    Reject { notes: Option<String> },
    StartReview { notes: Option<String> },
}

impl WorkflowAction {
    fn status(&self) -> WorkflowStatus {
        match self {
            WorkflowAction::Accept { .. } => WorkflowStatus::Accepted,
            WorkflowAction::Reject { .. } => WorkflowStatus::Rejected,
            WorkflowAction::StartReview { .. } => WorkflowStatus::InReview,
        }
    }

    fn notes(&self) -> Option<&str> {
        match self {
            WorkflowAction::Accept { notes }
            | WorkflowAction::Reject { notes }
            | WorkflowAction::StartReview { notes } => notes.as_deref(),
        }
    }
}

/// Portal-side decoration of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub status: WorkflowStatus,
    pub notes: Option<String>,
    pub document_ref: Option<String>,
    pub updated_by: Option<Uuid>,
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self {
            status: WorkflowStatus::None,
            notes: None,
            document_ref: None,
            updated_by: None,
        }
    }
}

impl WorkflowState {
    fn from_overlay(overlay: &OverlayModel) -> PortalResult<Self> {
        Ok(Self {
            status: overlay.status.parse()?,
            notes: overlay.notes.clone(),
            document_ref: overlay.document_ref.clone(),
            updated_by: overlay.updated_by,
        })
    }
}

/// One merged row: ERP truth plus workflow decoration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HybridEntity {
    #[serde(flatten)]
    pub document: ErpDocument,
    pub workflow: WorkflowState,
}

/// Per-tenant query engine over one ERP read capability and the portal
/// overlay tables.
pub struct HybridQueryEngine {
    tenant_id: String,
    /// Provider scope for supplier sessions; `None` queries unscoped.
    provider_scope: Option<String>,
    erp: Arc<dyn ErpRead>,
    portal: DatabaseConnection,
}

impl HybridQueryEngine {
    pub fn new(
        tenant_id: impl Into<String>,
        provider_scope: Option<String>,
        erp: Arc<dyn ErpRead>,
        portal: DatabaseConnection,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            provider_scope,
            erp,
            portal,
        }
    }

    /// Assembles an engine for a resolved tenant context.
    pub fn for_context(ctx: &TenantContext, erp: Arc<dyn ErpRead>, portal: DatabaseConnection) -> Self {
        Self::new(
            ctx.tenant.tenant_id.clone(),
            ctx.provider_code.clone(),
            erp,
            portal,
        )
    }

    /// Lists documents of one kind for a provider, merged with overlay
    /// state. Overlay rows with no surviving ERP document are silently
    /// dropped.
    pub async fn list_entities(
        &self,
        kind: EntityKind,
        provider_code: &str,
        filters: &EntityFilters,
    ) -> PortalResult<Vec<HybridEntity>> {
        self.check_scope(provider_code)?;
        let documents = self.erp.list_documents(kind, provider_code, filters).await?;

        let keys: Vec<String> = documents.iter().map(|d| d.natural_key.clone()).collect();
        let overlays = OverlayRepository::new(&self.portal)
            .for_keys(&self.tenant_id, kind, &keys)
            .await?;

        documents
            .into_iter()
            .map(|document| {
                let workflow = match overlays.get(&document.natural_key) {
                    Some(overlay) => WorkflowState::from_overlay(overlay)?,
                    None => WorkflowState::default(),
                };
                Ok(HybridEntity { document, workflow })
            })
            .collect()
    }

    /// Fetches one merged document by natural key. Out-of-scope documents
    /// are reported as missing rather than forbidden, to avoid confirming
    /// their existence to the wrong supplier.
    pub async fn get_entity(
        &self,
        kind: EntityKind,
        natural_key: &str,
    ) -> PortalResult<HybridEntity> {
        let document = self
            .erp
            .get_document(kind, natural_key)
            .await?
            .filter(|d| self.in_scope(&d.provider_code))
            .ok_or_else(|| PortalError::not_found(format!("{kind} {natural_key}")))?;

        let workflow = match OverlayRepository::new(&self.portal)
            .find(&self.tenant_id, kind, natural_key)
            .await?
        {
            Some(overlay) => WorkflowState::from_overlay(&overlay)?,
            None => WorkflowState::default(),
        };
        Ok(HybridEntity { document, workflow })
    }

    /// Applies a workflow action to a document. The ERP row is consulted to
    /// prove the document exists (an overlay row is never fabricated for a
    /// key the ERP does not know) and then left untouched; the action lands
    /// on the overlay only.
    pub async fn apply_workflow_action(
        &self,
        kind: EntityKind,
        natural_key: &str,
        action: WorkflowAction,
        actor: Uuid,
    ) -> PortalResult<HybridEntity> {
        let document = self
            .erp
            .get_document(kind, natural_key)
            .await?
            .filter(|d| self.in_scope(&d.provider_code))
            .ok_or_else(|| PortalError::not_found(format!("{kind} {natural_key}")))?;

        let overlay = OverlayRepository::new(&self.portal)
            .upsert(
                &self.tenant_id,
                kind,
                natural_key,
                OverlayChange {
                    status: Some(action.status().as_str().to_string()),
                    notes: action.notes().map(str::to_string),
                    updated_by: Some(actor),
                    ..Default::default()
                },
            )
            .await?;

        info!(
            tenant_id = %self.tenant_id,
            kind = %kind,
            natural_key = %natural_key,
            status = %overlay.status,
            actor = %actor,
            "Applied workflow action"
        );
        Ok(HybridEntity {
            document,
            workflow: WorkflowState::from_overlay(&overlay)?,
        })
    }

    /// Records a document reference on the overlay row for an existing ERP
    /// document. Used by document intake after blob upload.
    pub async fn record_document_ref(
        &self,
        kind: EntityKind,
        natural_key: &str,
        reference: &str,
        actor: Uuid,
    ) -> PortalResult<()> {
        OverlayRepository::new(&self.portal)
            .upsert(
                &self.tenant_id,
                kind,
                natural_key,
                OverlayChange {
                    document_ref: Some(reference.to_string()),
                    updated_by: Some(actor),
                    ..Default::default()
                },
            )
            .await?;
        Ok(())
    }

    /// Total outstanding balance for a provider, computed strictly from ERP
    /// invoice balances. Settled and cancelled documents contribute nothing;
    /// overlay state is irrelevant to money.
    pub async fn outstanding_balance(&self, provider_code: &str) -> PortalResult<Decimal> {
        self.check_scope(provider_code)?;
        let invoices = self
            .erp
            .list_documents(EntityKind::Invoice, provider_code, &EntityFilters::default())
            .await?;
        Ok(invoices
            .iter()
            .filter(|d| d.status == ErpDocumentStatus::Open)
            .map(|d| d.balance)
            .sum())
    }

    fn in_scope(&self, provider_code: &str) -> bool {
        match &self.provider_scope {
            Some(scope) => scope == provider_code,
            None => true,
        }
    }

    fn check_scope(&self, provider_code: &str) -> PortalResult<()> {
        if self.in_scope(provider_code) {
            Ok(())
        } else {
            Err(PortalError::Unauthorized {
                tenant_id: self.tenant_id.clone(),
                reason: format!("provider {provider_code} is outside the session scope"),
            })
        }
    }
}
