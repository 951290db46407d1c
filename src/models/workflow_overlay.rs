//! Workflow overlay entity model
//!
//! Portal-owned decoration of an ERP document, keyed by the ERP natural
//! key plus tenant. Carries workflow state only; financial fields stay in
//! the ERP and are never mirrored here.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "workflow_overlays")]
pub struct Model {
    /// Unique identifier for the overlay row (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Portal-facing tenant id
    pub tenant_id: String,

    /// Entity kind discriminator ("order" | "invoice" | "payment")
    pub entity_kind: String,

    /// ERP natural key, `"{mov} {mov_id}"`
    pub natural_key: String,

    /// Workflow status ("none" | "accepted" | "rejected" | "in_review")
    pub status: String,

    /// Free-text notes entered in the portal
    pub notes: Option<String>,

    /// Reference to the latest uploaded document in blob storage
    pub document_ref: Option<String>,

    /// Portal user who applied the last workflow action
    pub updated_by: Option<Uuid>,

    /// Timestamp when the overlay row was lazily created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp of the last workflow action
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
