//! Provider mapping entity model
//!
//! Durable many-to-many link between a portal user and the ERP provider
//! identity they hold inside one tenant. Rows are soft-deactivated, never
//! deleted, to preserve the registration audit trail.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "provider_mappings")]
pub struct Model {
    /// Unique identifier for the mapping (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Portal user holding this identity
    pub portal_user_id: Uuid,

    /// Portal-facing tenant id
    pub tenant_id: String,

    /// ERP-internal provider code within that tenant's company database
    pub erp_provider_code: String,

    /// Whether the mapping currently grants access
    pub active: bool,

    /// Timestamp when the mapping was first created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp of the last activation/deactivation
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
