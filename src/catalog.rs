use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::CaptureError;
use crate::models::{
    CountLinePayload, ExistingCountLine, Item, UnknownItemReport, VarianceReason,
};

/// Result of the already-counted check for one item in one session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckCountedResponse {
    pub already_counted: bool,
    #[serde(default)]
    pub count_lines: Vec<ExistingCountLine>,
}

/// Identifier of a created count line, as returned by the collaborator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreatedCountLine {
    pub id: String,
}

/// Details attached to a best-effort verification mark.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationDetails {
    pub session_id: String,
    pub verified_by: Option<String>,
}

/// Catalog lookups consumed by the engine. Implemented by the host over
/// whatever transport it uses; the engine only sees these shapes.
///
/// Transport failures should be surfaced as [`CaptureError::Network`] so the
/// session can return to `Editing` with a retry affordance.
#[async_trait]
pub trait CatalogApi: Send + Sync {
    /// Resolve a scanned or typed barcode to an item. `retries` is a hint
    /// for the transport layer; the engine never retries on its own.
    async fn lookup_item_by_barcode(&self, code: &str, retries: u32)
        -> Result<Item, CaptureError>;

    async fn search_items(&self, query: &str) -> Result<Vec<Item>, CaptureError>;

    async fn check_item_counted(
        &self,
        session_id: &str,
        item_code: &str,
    ) -> Result<CheckCountedResponse, CaptureError>;

    async fn list_variance_reasons(&self) -> Result<Vec<VarianceReason>, CaptureError>;
}

/// Count-line persistence consumed by the engine on submission.
#[async_trait]
pub trait CountLineApi: Send + Sync {
    async fn create_count_line(
        &self,
        payload: &CountLinePayload,
    ) -> Result<CreatedCountLine, CaptureError>;

    async fn add_quantity_to_count_line(
        &self,
        line_id: &str,
        qty: Decimal,
    ) -> Result<(), CaptureError>;

    /// Best-effort verification mark. Failures are logged and emitted as
    /// events but never roll back an accepted submission.
    async fn mark_item_verified(
        &self,
        item_code: &str,
        details: &VerificationDetails,
    ) -> Result<(), CaptureError>;

    async fn report_unknown_item(&self, report: &UnknownItemReport) -> Result<(), CaptureError>;
}
