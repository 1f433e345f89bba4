use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::info;

use crate::catalog::{CatalogApi, CheckCountedResponse};
use crate::errors::CaptureError;
use crate::events::{Event, EventSender};
use crate::models::{CountDraft, Item, UnknownItemReport, VarianceReason};

/// Resolves scanned or typed identifiers to catalog items and detects prior
/// counts of the same item within the session.
pub struct ItemResolver {
    catalog: Arc<dyn CatalogApi>,
    events: EventSender,
    lookup_retries: u32,
}

impl ItemResolver {
    pub fn new(catalog: Arc<dyn CatalogApi>, events: EventSender, lookup_retries: u32) -> Self {
        Self {
            catalog,
            events,
            lookup_retries,
        }
    }

    /// Resolve a scanned barcode to an item.
    pub async fn resolve_barcode(&self, code: &str) -> Result<Item, CaptureError> {
        let item = self
            .catalog
            .lookup_item_by_barcode(code, self.lookup_retries)
            .await?;
        info!(item_code = %item.item_code, "item resolved from barcode");
        self.events.emit(Event::ItemResolved {
            item_code: item.item_code.clone(),
            via_barcode: true,
        });
        Ok(item)
    }

    /// Free-text search. Debouncing and single-flight cancellation are the
    /// session's concern; this is the raw lookup.
    pub async fn search(&self, query: &str) -> Result<Vec<Item>, CaptureError> {
        self.catalog.search_items(query).await
    }

    /// Check whether the item already has count lines in this session. On a
    /// hit the session must enter the duplicate-decision state; only
    /// add-quantity or recount may leave it.
    pub async fn check_duplicate(
        &self,
        session_id: &str,
        item_code: &str,
    ) -> Result<CheckCountedResponse, CaptureError> {
        let response = self.catalog.check_item_counted(session_id, item_code).await?;
        if response.already_counted {
            info!(
                item_code,
                prior_lines = response.count_lines.len(),
                "item already counted in session"
            );
            self.events.emit(Event::DuplicateDetected {
                item_code: item_code.to_string(),
                prior_line_count: response.count_lines.len(),
            });
        }
        Ok(response)
    }

    pub async fn list_reasons(&self) -> Result<Vec<VarianceReason>, CaptureError> {
        self.catalog.list_variance_reasons().await
    }
}

/// Assemble an unknown-item report from whatever the operator managed to
/// capture before resolution failed. The first non-empty serial (if any)
/// rides along for later identification.
pub fn unknown_report_from_draft(
    session_id: &str,
    barcode: Option<String>,
    description: &str,
    draft: &CountDraft,
) -> UnknownItemReport {
    UnknownItemReport {
        session_id: session_id.to_string(),
        barcode,
        description: description.to_string(),
        counted_qty: draft.parsed_qty().unwrap_or(Decimal::ZERO),
        remark: (!draft.remark.is_empty()).then(|| draft.remark.clone()),
        item_name: None,
        mrp: draft.parsed_mrp().flatten(),
        serial: draft
            .serials
            .iter()
            .find(|s| s.is_active())
            .map(|s| s.value.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SerialInput;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    #[test]
    fn unknown_report_captures_draft_fragments() {
        let mut draft = CountDraft::default();
        draft.counted_qty_text = "2".into();
        draft.mrp_text = "49.50".into();
        draft.remark = "torn label".into();
        draft.serials.push(SerialInput {
            id: Uuid::new_v4(),
            label: "Serial #1".into(),
            value: "SN-77".into(),
        });

        let report =
            unknown_report_from_draft("sess-1", Some("890999".into()), "blue carton, no tag", &draft);
        assert_eq!(report.counted_qty, dec!(2));
        assert_eq!(report.mrp, Some(dec!(49.50)));
        assert_eq!(report.serial.as_deref(), Some("SN-77"));
        assert_eq!(report.remark.as_deref(), Some("torn label"));
        assert_eq!(report.barcode.as_deref(), Some("890999"));
    }

    #[test]
    fn unknown_report_defaults_zero_qty() {
        let draft = CountDraft::default();
        let report = unknown_report_from_draft("sess-1", None, "unlabeled box", &draft);
        assert_eq!(report.counted_qty, dec!(0));
        assert!(report.serial.is_none());
        assert!(report.remark.is_none());
    }
}
