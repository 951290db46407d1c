//! Database migrations for the supplier portal.
//!
//! Covers only Portal-owned tables. ERP schemas belong to the ERP and are
//! never migrated from here.

pub use sea_orm_migration::prelude::*;

mod m2025_06_01_000001_create_provider_mappings;
mod m2025_06_01_000002_create_workflow_overlays;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_06_01_000001_create_provider_mappings::Migration),
            Box::new(m2025_06_01_000002_create_workflow_overlays::Migration),
        ]
    }
}
