//! # Overlay Repository
//!
//! Persistence for [`crate::models::workflow_overlay`] rows. Overlay rows
//! are created lazily on the first workflow action against a document, so
//! the upsert has to survive two actors racing on the same natural key:
//! the unique index on `(tenant_id, entity_kind, natural_key)` arbitrates
//! and the loser retries as an update.

use std::collections::HashMap;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    Set,
};
use uuid::Uuid;

use crate::erp::types::EntityKind;
use crate::error::{PortalError, PortalResult, is_unique_violation};
use crate::models::workflow_overlay::{
    ActiveModel as OverlayActiveModel, Column, Entity as Overlay, Model as OverlayModel,
};

/// A partial update to one overlay row. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct OverlayChange {
    pub status: Option<String>,
    pub notes: Option<String>,
    pub document_ref: Option<String>,
    pub updated_by: Option<Uuid>,
}

/// Repository for workflow overlay database operations
pub struct OverlayRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> OverlayRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// One overlay row, if a workflow action ever touched this document.
    pub async fn find(
        &self,
        tenant_id: &str,
        kind: EntityKind,
        natural_key: &str,
    ) -> PortalResult<Option<OverlayModel>> {
        let overlay = Overlay::find()
            .filter(Column::TenantId.eq(tenant_id))
            .filter(Column::EntityKind.eq(kind.as_str()))
            .filter(Column::NaturalKey.eq(natural_key))
            .one(self.db)
            .await?;
        Ok(overlay)
    }

    /// Overlay rows for a set of natural keys, indexed by key. Keys with no
    /// overlay are simply absent from the map.
    pub async fn for_keys(
        &self,
        tenant_id: &str,
        kind: EntityKind,
        keys: &[String],
    ) -> PortalResult<HashMap<String, OverlayModel>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = Overlay::find()
            .filter(Column::TenantId.eq(tenant_id))
            .filter(Column::EntityKind.eq(kind.as_str()))
            .filter(Column::NaturalKey.is_in(keys.iter().map(String::as_str)))
            .all(self.db)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| (row.natural_key.clone(), row))
            .collect())
    }

    /// Applies a change to the overlay row for one document, creating the
    /// row if it does not exist yet. Last write wins per field.
    pub async fn upsert(
        &self,
        tenant_id: &str,
        kind: EntityKind,
        natural_key: &str,
        change: OverlayChange,
    ) -> PortalResult<OverlayModel> {
        if let Some(existing) = self.find(tenant_id, kind, natural_key).await? {
            return self.apply(existing, change).await;
        }

        let now = Utc::now();
        let insert = OverlayActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(tenant_id.to_string()),
            entity_kind: Set(kind.as_str().to_string()),
            natural_key: Set(natural_key.to_string()),
            status: Set(change
                .status
                .clone()
                .unwrap_or_else(|| "none".to_string())),
            notes: Set(change.notes.clone()),
            document_ref: Set(change.document_ref.clone()),
            updated_by: Set(change.updated_by),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        match insert.insert(self.db).await {
            Ok(row) => Ok(row),
            // Another actor created the row between our lookup and insert;
            // fall back to updating theirs.
            Err(e) if is_unique_violation(&e) => {
                let existing = self
                    .find(tenant_id, kind, natural_key)
                    .await?
                    .ok_or_else(|| PortalError::Database(e))?;
                self.apply(existing, change).await
            }
            Err(e) => Err(PortalError::Database(e)),
        }
    }

    async fn apply(
        &self,
        existing: OverlayModel,
        change: OverlayChange,
    ) -> PortalResult<OverlayModel> {
        let mut active = existing.into_active_model();
        if let Some(status) = change.status {
            active.status = Set(status);
        }
        if let Some(notes) = change.notes {
            active.notes = Set(Some(notes));
        }
        if let Some(document_ref) = change.document_ref {
            active.document_ref = Set(Some(document_ref));
        }
        if change.updated_by.is_some() {
            active.updated_by = Set(change.updated_by);
        }
        active.updated_at = Set(Utc::now().into());
        Ok(active.update(self.db).await?)
    }
}
