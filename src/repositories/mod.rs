//! # Repository Layer
//!
//! Repository implementations encapsulating SeaORM operations for the
//! Portal-owned tables, providing tenant-aware data access. All mutations
//! of shared rows go through transactions owned here.

pub mod mapping;
pub mod overlay;

pub use mapping::{MappingClaim, MappingRepository};
pub use overlay::{OverlayChange, OverlayRepository};
