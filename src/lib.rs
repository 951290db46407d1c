//! # Supplier Portal Data-Access Library
//!
//! Multi-tenant data-access layer bridging the supplier portal and the
//! per-company Intelisis ERP databases: tenant catalog, pooled ERP and
//! portal connections, provider identity resolution, and hybrid
//! ERP-plus-overlay queries.

pub mod config;
pub mod context;
pub mod documents;
pub mod erp;
pub mod error;
pub mod hybrid;
pub mod identity;
pub mod logging;
pub mod models;
pub mod pool;
pub mod repositories;
pub mod tenants;
pub use migration;
