//! # Data Models
//!
//! SeaORM entity models for the Portal-owned tables. ERP rows never appear
//! here; they cross the ERP seam as plain value types instead.

pub mod provider_mapping;
pub mod workflow_overlay;

pub use provider_mapping::Entity as ProviderMapping;
pub use workflow_overlay::Entity as WorkflowOverlay;
