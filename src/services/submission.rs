use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::catalog::{CountLineApi, CreatedCountLine, VerificationDetails};
use crate::errors::CaptureError;
use crate::events::{Event, EventSender};
use crate::models::{CountDraft, CountLinePayload, SerialEntry};
use crate::services::{mrp_matcher, photo_proofs, serial_slots, variance};

/// Orchestrates final validation and payload assembly for one count line.
///
/// Validation is first-failure-wins so the operator gets exactly one
/// actionable message at a time. The `saving` guard makes a repeated submit
/// while one is in flight a no-op rather than a queued retry, so a double
/// tap can never create two lines.
pub struct CountSubmissionAssembler {
    api: Arc<dyn CountLineApi>,
    events: EventSender,
    mrp_tolerance: Decimal,
    camera_available: bool,
    saving: AtomicBool,
}

/// Outcome of a submit attempt.
#[derive(Clone, Debug, PartialEq)]
pub enum SubmitOutcome {
    Saved(CreatedCountLine),
    /// A submission was already in flight; this call did nothing
    AlreadySaving,
}

impl CountSubmissionAssembler {
    pub fn new(
        api: Arc<dyn CountLineApi>,
        events: EventSender,
        mrp_tolerance: Decimal,
        camera_available: bool,
    ) -> Self {
        Self {
            api,
            events,
            mrp_tolerance,
            camera_available,
            saving: AtomicBool::new(false),
        }
    }

    pub fn is_saving(&self) -> bool {
        self.saving.load(Ordering::SeqCst)
    }

    /// Validate the draft and assemble the wire payload.
    ///
    /// Validation order (each failure returns immediately):
    /// 1. counted quantity parses as a positive number
    /// 2. MRP text, if present, parses as a non-negative number
    /// 3. nonzero variance has a selected reason
    /// 4. no serial shortfall
    /// 5. no serial surplus
    /// 6. no photo-proof shortfall
    pub fn assemble(
        &self,
        session_id: &str,
        draft: &CountDraft,
    ) -> Result<CountLinePayload, CaptureError> {
        let item = draft
            .item
            .as_ref()
            .ok_or_else(|| CaptureError::InvalidOperation("no item resolved for draft".into()))?;

        let counted_qty = draft.parsed_qty().ok_or(CaptureError::InvalidQuantity)?;

        let entered_mrp = match draft.parsed_mrp() {
            None => None,
            Some(None) => return Err(CaptureError::InvalidMrp),
            Some(Some(value)) => Some(value),
        };

        // Authoritative re-evaluation at submit time
        let variance = variance::evaluate(counted_qty, draft.damaged_qty, item.stock_qty);
        if variance.reason_required && draft.variance_reason.is_none() {
            return Err(CaptureError::ReasonRequired);
        }

        let expected = serial_slots::expected_serial_count(draft);
        let active = draft.active_serial_count();
        if expected > 0 && active < expected {
            return Err(CaptureError::SerialsMissing(expected - active));
        }
        if expected > 0 && active > expected {
            return Err(CaptureError::SerialCountMismatch {
                expected,
                actual: active,
            });
        }

        let serial_photos_on = photo_proofs::serial_photos_enabled(
            draft.serial_capture_enabled,
            active,
            self.camera_available,
        );
        let photo_shortfall = photo_proofs::shortfall(active, &draft.photo_proofs, serial_photos_on);
        if photo_shortfall > 0 {
            return Err(CaptureError::PhotoProofsMissing(photo_shortfall));
        }

        // Pricing fields ride along only when the entered MRP actually
        // differs from the system MRP beyond tolerance
        let changed_mrp = entered_mrp
            .filter(|mrp| mrp_matcher::mrp_changed(*mrp, item.mrp, self.mrp_tolerance));
        let variant = changed_mrp.and(draft.matched_variant.as_ref());

        // One timestamp for the whole batch, taken at assembly time rather
        // than scan time, so a long edit session cannot skew ordering
        let stamped_at = Utc::now();
        let serial_numbers: Vec<SerialEntry> = draft
            .serials
            .iter()
            .filter(|s| s.is_active())
            .map(|s| SerialEntry {
                label: s.label.clone(),
                value: s.value.clone(),
                captured_at: stamped_at,
            })
            .collect();

        Ok(CountLinePayload {
            session_id: session_id.to_string(),
            item_code: item.item_code.clone(),
            counted_qty,
            damaged_qty: draft.damaged_qty,
            non_returnable_damaged_qty: draft.non_returnable_damaged_qty,
            variance_reason: draft.variance_reason.as_ref().map(|r| r.code.clone()),
            variance_note: (!draft.variance_note.is_empty()).then(|| draft.variance_note.clone()),
            remark: (!draft.remark.is_empty()).then(|| draft.remark.clone()),
            item_condition: draft.item_condition.clone(),
            serial_numbers: (!serial_numbers.is_empty()).then_some(serial_numbers),
            photo_proofs: (!draft.photo_proofs.is_empty()).then(|| draft.photo_proofs.clone()),
            mrp_counted: changed_mrp,
            mrp_source: variant.and_then(|v| v.source.clone()),
            variant_id: variant.and_then(|v| v.id.clone()),
            variant_barcode: variant.and_then(|v| v.barcode.clone()),
            floor_no: draft.floor_no.clone(),
            rack_no: draft.rack_no.clone(),
            mark_location: draft.mark_location.clone(),
            sr_no: draft.sr_no.clone(),
            manufacturing_date: draft.manufacturing_date.clone(),
        })
    }

    /// Validate, assemble, and send one count line. Returns
    /// [`SubmitOutcome::AlreadySaving`] without touching the collaborator
    /// when a submission is already in flight.
    pub async fn submit(
        &self,
        session_id: &str,
        draft: &CountDraft,
    ) -> Result<SubmitOutcome, CaptureError> {
        if self.saving.swap(true, Ordering::SeqCst) {
            return Ok(SubmitOutcome::AlreadySaving);
        }

        let result = self.submit_inner(session_id, draft).await;
        self.saving.store(false, Ordering::SeqCst);
        result
    }

    async fn submit_inner(
        &self,
        session_id: &str,
        draft: &CountDraft,
    ) -> Result<SubmitOutcome, CaptureError> {
        let payload = match self.assemble(session_id, draft) {
            Ok(payload) => payload,
            Err(err) => {
                self.events.emit(Event::SubmissionFailed {
                    item_code: draft
                        .item
                        .as_ref()
                        .map(|i| i.item_code.clone())
                        .unwrap_or_default(),
                    error_code: err.error_code().to_string(),
                });
                return Err(err);
            }
        };

        let created = match self.api.create_count_line(&payload).await {
            Ok(created) => created,
            Err(err) => {
                self.events.emit(Event::SubmissionFailed {
                    item_code: payload.item_code.clone(),
                    error_code: err.error_code().to_string(),
                });
                return Err(err);
            }
        };

        let item = draft.item.as_ref();
        let stock_qty = item.map(|i| i.stock_qty).unwrap_or_default();
        let variance = variance::evaluate(payload.counted_qty, payload.damaged_qty, stock_qty);
        info!(
            line_id = %created.id,
            item_code = %payload.item_code,
            counted_qty = %payload.counted_qty,
            "count line submitted"
        );
        self.events.emit(Event::CountLineSubmitted {
            line_id: created.id.clone(),
            item_code: payload.item_code.clone(),
            counted_qty: payload.counted_qty,
            variance: variance.variance,
        });

        self.mark_verified_best_effort(payload.item_code.clone(), session_id.to_string());

        Ok(SubmitOutcome::Saved(created))
    }

    /// Add quantity to an existing line (the duplicate-decision fast path).
    /// Shares the saving guard with full submission.
    pub async fn add_quantity(
        &self,
        line_id: &str,
        item_code: &str,
        qty: Decimal,
    ) -> Result<SubmitOutcome, CaptureError> {
        if qty <= Decimal::ZERO {
            return Err(CaptureError::InvalidQuantity);
        }
        if self.saving.swap(true, Ordering::SeqCst) {
            return Ok(SubmitOutcome::AlreadySaving);
        }

        let result = self.api.add_quantity_to_count_line(line_id, qty).await;
        self.saving.store(false, Ordering::SeqCst);

        match result {
            Ok(()) => {
                info!(line_id, item_code, added = %qty, "quantity added to existing line");
                self.events.emit(Event::QuantityAddedToLine {
                    line_id: line_id.to_string(),
                    item_code: item_code.to_string(),
                    added_qty: qty,
                });
                Ok(SubmitOutcome::Saved(CreatedCountLine {
                    id: line_id.to_string(),
                }))
            }
            Err(err) => {
                self.events.emit(Event::SubmissionFailed {
                    item_code: item_code.to_string(),
                    error_code: err.error_code().to_string(),
                });
                Err(err)
            }
        }
    }

    /// Fire-and-forget verification mark after an accepted submission. A
    /// failure here is logged and emitted but never rolls back the line and
    /// is never retried synchronously.
    fn mark_verified_best_effort(&self, item_code: String, session_id: String) {
        let api = Arc::clone(&self.api);
        let events = self.events.clone();
        tokio::spawn(async move {
            let details = VerificationDetails {
                session_id,
                verified_by: None,
            };
            if let Err(err) = api.mark_item_verified(&item_code, &details).await {
                warn!(item_code, %err, "best-effort verification mark failed");
                events.emit(Event::ItemVerificationFailed {
                    item_code,
                    reason: err.to_string(),
                });
            }
        });
    }
}
