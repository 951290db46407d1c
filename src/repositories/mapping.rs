//! # Mapping Repository
//!
//! Persistence for [`crate::models::provider_mapping`] rows. This is the
//! single transactional path through which provider mappings are created,
//! reactivated and deactivated; keeping every mutation here is what makes
//! the "one active claim per (tenant, provider code)" invariant enforceable.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    Set, TransactionTrait,
};
use uuid::Uuid;

use crate::error::{PortalError, PortalResult, is_unique_violation};
use crate::models::provider_mapping::{
    ActiveModel as MappingActiveModel, Column, Entity as Mapping, Model as MappingModel,
};

/// One (tenant, provider code) identity to be claimed for a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingClaim {
    pub tenant_id: String,
    pub provider_code: String,
}

/// Repository for provider mapping database operations
pub struct MappingRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> MappingRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// All active mappings held by a portal user.
    pub async fn active_for_user(&self, portal_user_id: Uuid) -> PortalResult<Vec<MappingModel>> {
        let mappings = Mapping::find()
            .filter(Column::PortalUserId.eq(portal_user_id))
            .filter(Column::Active.eq(true))
            .all(self.db)
            .await?;
        Ok(mappings)
    }

    /// The user's active mapping inside one tenant, if any.
    pub async fn active_for_user_in_tenant(
        &self,
        portal_user_id: Uuid,
        tenant_id: &str,
    ) -> PortalResult<Option<MappingModel>> {
        let mapping = Mapping::find()
            .filter(Column::PortalUserId.eq(portal_user_id))
            .filter(Column::TenantId.eq(tenant_id))
            .filter(Column::Active.eq(true))
            .one(self.db)
            .await?;
        Ok(mapping)
    }

    /// Claims the given identities for a user inside one transaction.
    ///
    /// For each claim: if another user holds an active mapping for the same
    /// `(tenant, provider code)` the whole transaction aborts with
    /// [`PortalError::MappingConflict`]; an existing row for this user is
    /// reactivated/touched in place (idempotent re-registration); otherwise
    /// a fresh row is inserted.
    ///
    /// The holder lookup gives the friendly error; the race where two
    /// transactions pass the lookup simultaneously is settled by the
    /// `ux_provider_mappings_active_claim` partial unique index, whose
    /// violation is reported as the same conflict.
    pub async fn claim_mappings(
        &self,
        portal_user_id: Uuid,
        claims: &[MappingClaim],
    ) -> PortalResult<Vec<MappingModel>> {
        let txn = self.db.begin().await?;
        let now = Utc::now();
        let mut result = Vec::with_capacity(claims.len());

        for claim in claims {
            let holder = Mapping::find()
                .filter(Column::TenantId.eq(&claim.tenant_id))
                .filter(Column::ErpProviderCode.eq(&claim.provider_code))
                .filter(Column::Active.eq(true))
                .filter(Column::PortalUserId.ne(portal_user_id))
                .one(&txn)
                .await?;
            if holder.is_some() {
                txn.rollback().await?;
                return Err(PortalError::MappingConflict {
                    tenant_id: claim.tenant_id.clone(),
                    provider_code: claim.provider_code.clone(),
                });
            }

            let existing = Mapping::find()
                .filter(Column::PortalUserId.eq(portal_user_id))
                .filter(Column::TenantId.eq(&claim.tenant_id))
                .filter(Column::ErpProviderCode.eq(&claim.provider_code))
                .one(&txn)
                .await?;

            let conflict = |e: sea_orm::DbErr| {
                if is_unique_violation(&e) {
                    PortalError::MappingConflict {
                        tenant_id: claim.tenant_id.clone(),
                        provider_code: claim.provider_code.clone(),
                    }
                } else {
                    PortalError::Database(e)
                }
            };

            let saved = match existing {
                Some(row) => {
                    let mut active = row.into_active_model();
                    active.active = Set(true);
                    active.updated_at = Set(now.into());
                    active.update(&txn).await.map_err(conflict)?
                }
                None => {
                    let insert = MappingActiveModel {
                        id: Set(Uuid::new_v4()),
                        portal_user_id: Set(portal_user_id),
                        tenant_id: Set(claim.tenant_id.clone()),
                        erp_provider_code: Set(claim.provider_code.clone()),
                        active: Set(true),
                        created_at: Set(now.into()),
                        updated_at: Set(now.into()),
                    };
                    insert.insert(&txn).await.map_err(conflict)?
                }
            };
            result.push(saved);
        }

        txn.commit().await?;
        Ok(result)
    }

    /// Soft-deactivates all of a user's mappings. Rows stay in place for
    /// audit history.
    pub async fn deactivate_for_user(&self, portal_user_id: Uuid) -> PortalResult<u64> {
        let txn = self.db.begin().await?;
        let now = Utc::now();
        let active = Mapping::find()
            .filter(Column::PortalUserId.eq(portal_user_id))
            .filter(Column::Active.eq(true))
            .all(&txn)
            .await?;
        let count = active.len() as u64;
        for row in active {
            let mut model = row.into_active_model();
            model.active = Set(false);
            model.updated_at = Set(now.into());
            model.update(&txn).await?;
        }
        txn.commit().await?;
        Ok(count)
    }
}
