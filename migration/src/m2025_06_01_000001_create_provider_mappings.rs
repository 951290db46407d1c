//! Migration to create the provider_mappings table.
//!
//! One row per (portal user, tenant, ERP provider code). Rows are
//! soft-deactivated via the `active` flag, never deleted. A partial unique
//! index over `(tenant_id, erp_provider_code) WHERE active` makes the
//! single-active-claim invariant hold under concurrent registrations while
//! still allowing any number of inactive history rows.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ProviderMappings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProviderMappings::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ProviderMappings::PortalUserId)
                            .uuid()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ProviderMappings::TenantId).text().not_null())
                    .col(
                        ColumnDef::new(ProviderMappings::ErpProviderCode)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProviderMappings::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(ProviderMappings::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ProviderMappings::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ux_provider_mappings_user_tenant_code")
                    .table(ProviderMappings::Table)
                    .col(ProviderMappings::PortalUserId)
                    .col(ProviderMappings::TenantId)
                    .col(ProviderMappings::ErpProviderCode)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ix_provider_mappings_tenant_code")
                    .table(ProviderMappings::Table)
                    .col(ProviderMappings::TenantId)
                    .col(ProviderMappings::ErpProviderCode)
                    .to_owned(),
            )
            .await?;

        // Partial unique index: at most one *active* claim per identity,
        // any number of inactive history rows. sea-query's index builder
        // has no WHERE clause, so this one is raw SQL; the syntax is shared
        // by Postgres and SQLite.
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX ux_provider_mappings_active_claim \
                 ON provider_mappings (tenant_id, erp_provider_code) WHERE active",
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ProviderMappings::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ProviderMappings {
    Table,
    Id,
    PortalUserId,
    TenantId,
    ErpProviderCode,
    Active,
    CreatedAt,
    UpdatedAt,
}
