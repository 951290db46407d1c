//! Migration to create the workflow_overlays table.
//!
//! Portal-owned decoration of ERP entities, keyed by the ERP natural key
//! plus tenant. The unique index makes the overlay upsert race-safe.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(WorkflowOverlays::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WorkflowOverlays::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(WorkflowOverlays::TenantId).text().not_null())
                    .col(
                        ColumnDef::new(WorkflowOverlays::EntityKind)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WorkflowOverlays::NaturalKey)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WorkflowOverlays::Status)
                            .text()
                            .not_null()
                            .default("none"),
                    )
                    .col(ColumnDef::new(WorkflowOverlays::Notes).text().null())
                    .col(ColumnDef::new(WorkflowOverlays::DocumentRef).text().null())
                    .col(ColumnDef::new(WorkflowOverlays::UpdatedBy).uuid().null())
                    .col(
                        ColumnDef::new(WorkflowOverlays::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(WorkflowOverlays::UpdatedAt)
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
                    .name("ux_workflow_overlays_tenant_kind_key")
                    .table(WorkflowOverlays::Table)
                    .col(WorkflowOverlays::TenantId)
                    .col(WorkflowOverlays::EntityKind)
                    .col(WorkflowOverlays::NaturalKey)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(WorkflowOverlays::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum WorkflowOverlays {
    Table,
    Id,
    TenantId,
    EntityKind,
    NaturalKey,
    Status,
    Notes,
    DocumentRef,
    UpdatedBy,
    CreatedAt,
    UpdatedAt,
}
