//! Value types crossing the ERP seam.
//!
//! These are plain data carriers: rows read out of the ERP become these
//! structs at the driver boundary so the rest of the crate never touches
//! driver row types.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::PortalError;

/// Kinds of ERP-owned transactional entities exposed to the portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Order,
    Invoice,
    Payment,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Order => "order",
            EntityKind::Invoice => "invoice",
            EntityKind::Payment => "payment",
        }
    }
}

impl std::str::FromStr for EntityKind {
    type Err = PortalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "order" => Ok(EntityKind::Order),
            "invoice" => Ok(EntityKind::Invoice),
            "payment" => Ok(EntityKind::Payment),
            other => Err(PortalError::ValidationFailed {
                reason: format!("unknown entity kind '{other}'"),
            }),
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of an ERP document, as the ERP reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErpDocumentStatus {
    Open,
    Settled,
    Cancelled,
}

/// One ERP-owned transactional row (order, invoice or payment).
///
/// Financial fields here are authoritative; the portal overlay never
/// overrides them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErpDocument {
    pub kind: EntityKind,
    /// Natural key inside the tenant's ERP, `"{mov} {mov_id}"` (e.g.
    /// `"Factura 12345"`). Unique per tenant and kind.
    pub natural_key: String,
    pub provider_code: String,
    pub issued_on: NaiveDate,
    pub due_on: Option<NaiveDate>,
    pub amount: Decimal,
    /// Outstanding balance as carried by the ERP.
    pub balance: Decimal,
    pub currency: String,
    pub status: ErpDocumentStatus,
}

/// Raw company-membership row returned by the primary ERP's RFC lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanyCandidate {
    pub company_code: String,
    pub database_name: String,
    pub company_name: String,
}

/// Provider master-data row from one company's ERP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErpProvider {
    pub provider_code: String,
    pub name: String,
    pub rfc: String,
}

/// Request-originating filters for document listings. Every field is bound
/// as a query parameter, never interpolated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityFilters {
    pub issued_from: Option<NaiveDate>,
    pub issued_to: Option<NaiveDate>,
    pub status: Option<ErpDocumentStatus>,
}

/// Payload for the one-time, whitelisted provider-record creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProviderRecord {
    pub provider_code: String,
    pub name: String,
    pub rfc: String,
}

/// Splits a `"{mov} {mov_id}"` natural key into its ERP components.
pub fn split_natural_key(natural_key: &str) -> Result<(&str, &str), PortalError> {
    natural_key
        .rsplit_once(' ')
        .filter(|(mov, id)| !mov.is_empty() && !id.is_empty())
        .ok_or_else(|| PortalError::ValidationFailed {
            reason: format!("malformed natural key '{natural_key}'"),
        })
}
