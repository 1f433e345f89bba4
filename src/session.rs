use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::{debug, info};
use uuid::Uuid;

use crate::catalog::{CatalogApi, CountLineApi};
use crate::config::EngineConfig;
use crate::errors::CaptureError;
use crate::events::{Event, EventSender};
use crate::models::{
    CountDraft, ExistingCountLine, Item, PhotoProof, VarianceReason,
};
use crate::scan_gate::{ScanDecision, ScanEventGate, ScanKind};
use crate::services::item_resolver::{unknown_report_from_draft, ItemResolver};
use crate::services::submission::{CountSubmissionAssembler, SubmitOutcome};
use crate::services::{mrp_matcher, photo_proofs, serial_slots, variance};
use crate::services::serial_slots::SerialSlotManager;

/// Overall workflow state for one capture session.
///
/// `Failed` keeps the draft intact; the next edit (or an explicit
/// `resume_editing`) returns to `Editing`. Only `Saved` or cancel goes back
/// to `Idle`.
#[derive(Clone, Debug, PartialEq)]
pub enum CaptureState {
    Idle,
    Resolving,
    DuplicateDecision { prior_lines: Vec<ExistingCountLine> },
    Editing,
    Submitting,
    Saved { line_id: String },
    Failed(CaptureError),
}

/// Result of feeding one raw item scan into the session.
#[derive(Clone, Debug, PartialEq)]
pub enum ScanOutcome {
    /// Item resolved; the session is now `Editing` (or `DuplicateDecision`)
    Resolved { item_code: String },
    /// Camera re-trigger absorbed; nothing changed
    Debounced,
    /// Rolling-window limit hit; the host should show a cooldown and
    /// disable continuous-scan mode. Draft data is untouched.
    RateLimited,
}

/// One capture session: a reducer-style store over a single [`CountDraft`]
/// plus the workflow state machine around it.
///
/// All derived values (expected serial count, variance, photo shortfall)
/// are recomputed from the draft on demand; nothing derived is cached, so
/// edits can arrive in any order without stale-value bugs.
pub struct CaptureSession {
    session_id: String,
    config: EngineConfig,
    mrp_tolerance: Decimal,
    gate: ScanEventGate,
    resolver: ItemResolver,
    assembler: CountSubmissionAssembler,
    count_lines: Arc<dyn CountLineApi>,
    events: EventSender,
    slots: SerialSlotManager,
    draft: CountDraft,
    state: CaptureState,
    /// Monotonic token for search single-flight; a lookup only reports its
    /// results while it still holds the latest generation
    search_generation: AtomicU64,
    variance_reasons: Vec<VarianceReason>,
}

impl CaptureSession {
    pub fn new(
        session_id: impl Into<String>,
        catalog: Arc<dyn CatalogApi>,
        count_lines: Arc<dyn CountLineApi>,
        config: EngineConfig,
        events: EventSender,
    ) -> Self {
        let mrp_tolerance = config.mrp_tolerance_decimal();
        let gate = ScanEventGate::from_config(&config);
        let resolver = ItemResolver::new(Arc::clone(&catalog), events.clone(), config.lookup_retries);
        let assembler = CountSubmissionAssembler::new(
            Arc::clone(&count_lines),
            events.clone(),
            mrp_tolerance,
            config.camera_available,
        );
        Self {
            session_id: session_id.into(),
            config,
            mrp_tolerance,
            gate,
            resolver,
            assembler,
            count_lines,
            events,
            slots: SerialSlotManager::new(),
            draft: CountDraft::default(),
            state: CaptureState::Idle,
            search_generation: AtomicU64::new(0),
            variance_reasons: Vec::new(),
        }
    }

    pub fn state(&self) -> &CaptureState {
        &self.state
    }

    pub fn draft(&self) -> &CountDraft {
        &self.draft
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    // ---- derived values, recomputed on demand ----

    pub fn expected_serial_count(&self) -> u32 {
        serial_slots::expected_serial_count(&self.draft)
    }

    pub fn variance(&self) -> Option<variance::VarianceResult> {
        let item = self.draft.item.as_ref()?;
        let counted = self.draft.parsed_qty()?;
        Some(variance::evaluate(counted, self.draft.damaged_qty, item.stock_qty))
    }

    pub fn photo_shortfall(&self) -> u32 {
        let active = self.draft.active_serial_count();
        let enabled = photo_proofs::serial_photos_enabled(
            self.draft.serial_capture_enabled,
            active,
            self.config.camera_available,
        );
        photo_proofs::shortfall(active, &self.draft.photo_proofs, enabled)
    }

    // ---- resolution ----

    /// Feed one raw item scan. Debounce and rate limiting run before any
    /// network lookup; a debounced scan never reaches the resolver.
    pub async fn handle_item_scan(
        &mut self,
        code: &str,
        timestamp_ms: u64,
    ) -> Result<ScanOutcome, CaptureError> {
        match self.gate.register_scan(code, ScanKind::Item, timestamp_ms) {
            ScanDecision::Debounced => return Ok(ScanOutcome::Debounced),
            ScanDecision::RateLimited => {
                self.events.emit(Event::ScanRateLimited { code: code.to_string() });
                return Ok(ScanOutcome::RateLimited);
            }
            ScanDecision::Accepted => {}
        }

        self.state = CaptureState::Resolving;
        let item = match self.resolver.resolve_barcode(code).await {
            Ok(item) => item,
            Err(err) => {
                self.fail_resolution(err.clone());
                return Err(err);
            }
        };
        let item_code = item.item_code.clone();
        self.enter_capture(item).await?;
        Ok(ScanOutcome::Resolved { item_code })
    }

    /// Select an item from search results (same duplicate check as a scan,
    /// minus the gate).
    pub async fn select_item(&mut self, item: Item) -> Result<(), CaptureError> {
        self.state = CaptureState::Resolving;
        self.enter_capture(item).await
    }

    async fn enter_capture(&mut self, item: Item) -> Result<(), CaptureError> {
        let check = match self
            .resolver
            .check_duplicate(&self.session_id, &item.item_code)
            .await
        {
            Ok(check) => check,
            Err(err) => {
                self.fail_resolution(err.clone());
                return Err(err);
            }
        };

        self.begin_draft(item);
        if check.already_counted {
            self.draft.duplicate_of = Some(check.count_lines.clone());
            self.state = CaptureState::DuplicateDecision {
                prior_lines: check.count_lines,
            };
        } else {
            self.state = CaptureState::Editing;
        }
        Ok(())
    }

    /// Land a failed resolution somewhere recoverable. A mis-scan while a
    /// draft is open must not strand the entered data: the session parks in
    /// `Failed` and the next edit resumes it. Only when nothing has been
    /// captured yet does the session fall back to `Idle`.
    fn fail_resolution(&mut self, err: CaptureError) {
        if self.draft.item.is_some() {
            self.state = CaptureState::Failed(err);
        } else {
            self.state = CaptureState::Idle;
        }
    }

    fn begin_draft(&mut self, item: Item) {
        self.draft = CountDraft::for_item(item);
        self.slots = SerialSlotManager::new();
        self.recompute();
    }

    /// Debounced, single-flight search-as-you-type. Issuing a new query
    /// invalidates any in-flight prior one; a superseded query resolves to
    /// `Ok(None)` rather than an error, since cancellation is routine.
    pub async fn search(&self, query: &str) -> Result<Option<Vec<Item>>, CaptureError> {
        let generation = self.search_generation.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(Duration::from_millis(self.config.search_debounce_ms)).await;
        if self.search_generation.load(Ordering::SeqCst) != generation {
            debug!(query, "search superseded during debounce");
            return Ok(None);
        }

        let items = self.resolver.search(query).await?;
        if self.search_generation.load(Ordering::SeqCst) != generation {
            debug!(query, "stale search result discarded");
            return Ok(None);
        }
        Ok(Some(items))
    }

    /// Load (and cache) the collaborator's variance-reason list.
    pub async fn variance_reasons(&mut self) -> Result<&[VarianceReason], CaptureError> {
        if self.variance_reasons.is_empty() {
            self.variance_reasons = self.resolver.list_reasons().await?;
        }
        Ok(&self.variance_reasons)
    }

    // ---- duplicate decision ----

    /// Duplicate decision, branch one: add quantity to the most recent
    /// prior line, bypassing full recapture.
    pub async fn decide_add_quantity(&mut self, qty: Decimal) -> Result<(), CaptureError> {
        let CaptureState::DuplicateDecision { prior_lines } = &self.state else {
            return Err(CaptureError::InvalidOperation(
                "no duplicate decision pending".into(),
            ));
        };
        let latest = prior_lines
            .iter()
            .max_by_key(|l| l.created_at)
            .cloned()
            .ok_or_else(|| CaptureError::InvalidOperation("no prior line to extend".into()))?;

        self.state = CaptureState::Submitting;
        match self
            .assembler
            .add_quantity(&latest.id, &latest.item_code, qty)
            .await
        {
            Ok(SubmitOutcome::Saved(line)) => {
                self.state = CaptureState::Saved { line_id: line.id };
                self.draft = CountDraft::default();
                Ok(())
            }
            Ok(SubmitOutcome::AlreadySaving) => Ok(()),
            Err(err) => {
                self.state = CaptureState::Failed(err.clone());
                Err(err)
            }
        }
    }

    /// Duplicate decision, branch two: intentionally record a second,
    /// independent line. Clears the prior-line reference and proceeds as a
    /// normal fresh capture.
    pub fn decide_recount(&mut self) -> Result<(), CaptureError> {
        if !matches!(self.state, CaptureState::DuplicateDecision { .. }) {
            return Err(CaptureError::InvalidOperation(
                "no duplicate decision pending".into(),
            ));
        }
        info!(session_id = %self.session_id, "recount chosen for already-counted item");
        self.draft.duplicate_of = None;
        self.state = CaptureState::Editing;
        Ok(())
    }

    // ---- editing ----

    fn ensure_editable(&mut self) -> Result<(), CaptureError> {
        match &self.state {
            CaptureState::Editing => Ok(()),
            // Any edit after a failure resumes the draft
            CaptureState::Failed(_) => {
                self.state = CaptureState::Editing;
                Ok(())
            }
            other => Err(CaptureError::InvalidOperation(format!(
                "cannot edit in state {:?}",
                other
            ))),
        }
    }

    /// Recompute every derived collection after an edit: variant rematch
    /// and serial-slot reconciliation. Variance and photo shortfall are
    /// computed on read.
    fn recompute(&mut self) {
        mrp_matcher::rematch_draft(&mut self.draft, self.mrp_tolerance);
        self.slots.reconcile(&mut self.draft);
    }

    pub fn set_counted_qty(&mut self, text: &str) -> Result<(), CaptureError> {
        self.ensure_editable()?;
        self.draft.counted_qty_text = text.to_string();
        self.recompute();
        Ok(())
    }

    pub fn set_damaged_qty(&mut self, qty: Decimal) -> Result<(), CaptureError> {
        self.ensure_editable()?;
        self.draft.damaged_qty = qty;
        self.recompute();
        Ok(())
    }

    pub fn set_non_returnable_damaged_qty(&mut self, qty: Decimal) -> Result<(), CaptureError> {
        self.ensure_editable()?;
        self.draft.non_returnable_damaged_qty = qty;
        self.recompute();
        Ok(())
    }

    pub fn set_mrp_text(&mut self, text: &str) -> Result<(), CaptureError> {
        self.ensure_editable()?;
        self.draft.mrp_text = text.to_string();
        self.recompute();
        Ok(())
    }

    /// Manual condition pick; blocks further variant propagation.
    pub fn set_item_condition(&mut self, condition: Option<String>) -> Result<(), CaptureError> {
        self.ensure_editable()?;
        self.draft.item_condition = condition;
        self.draft.condition_overridden = true;
        Ok(())
    }

    pub fn set_variance_reason(&mut self, reason: Option<VarianceReason>) -> Result<(), CaptureError> {
        self.ensure_editable()?;
        self.draft.variance_reason = reason;
        Ok(())
    }

    pub fn set_variance_note(&mut self, note: &str) -> Result<(), CaptureError> {
        self.ensure_editable()?;
        self.draft.variance_note = note.to_string();
        Ok(())
    }

    pub fn set_remark(&mut self, remark: &str) -> Result<(), CaptureError> {
        self.ensure_editable()?;
        self.draft.remark = remark.to_string();
        Ok(())
    }

    pub fn set_location(
        &mut self,
        floor_no: Option<String>,
        rack_no: Option<String>,
        mark_location: Option<String>,
    ) -> Result<(), CaptureError> {
        self.ensure_editable()?;
        self.draft.floor_no = floor_no;
        self.draft.rack_no = rack_no;
        self.draft.mark_location = mark_location;
        Ok(())
    }

    /// Toggle optional serial capture. Disabling is rejected while the
    /// item's requirement makes capture mandatory.
    pub fn set_serial_capture_enabled(&mut self, enabled: bool) -> Result<(), CaptureError> {
        self.ensure_editable()?;
        if !enabled {
            if let Some(item) = &self.draft.item {
                if item.serial_requirement.capture_is_mandatory() {
                    return Err(CaptureError::InvalidOperation(
                        "serial capture cannot be disabled for this item".into(),
                    ));
                }
            }
        }
        self.draft.serial_capture_enabled = enabled;
        self.recompute();
        Ok(())
    }

    pub fn set_serial_value(&mut self, slot_id: Uuid, raw: &str) -> Result<(), CaptureError> {
        self.ensure_editable()?;
        self.slots.set_value(&mut self.draft, slot_id, raw)
    }

    pub fn remove_serial_slot(&mut self, slot_id: Uuid) -> Result<(), CaptureError> {
        self.ensure_editable()?;
        self.slots.remove(&mut self.draft, slot_id)
    }

    /// Slot the next hardware scan should fill; `None` means every slot is
    /// filled and the host should prompt for review instead.
    pub fn next_scan_target(&mut self, current: Option<Uuid>) -> Option<Uuid> {
        self.slots.next_scan_target(&self.draft, current)
    }

    /// Feed one raw serial scan during edit. Debounce absorbs gun
    /// re-triggers; duplicates are rejected per slot rules.
    pub fn handle_serial_scan(
        &mut self,
        code: &str,
        timestamp_ms: u64,
    ) -> Result<Option<Uuid>, CaptureError> {
        self.ensure_editable()?;
        match self.gate.register_scan(code, ScanKind::Serial, timestamp_ms) {
            ScanDecision::Debounced => return Ok(None),
            ScanDecision::RateLimited => {
                self.events.emit(Event::ScanRateLimited { code: code.to_string() });
                return Err(CaptureError::RateLimited);
            }
            ScanDecision::Accepted => {}
        }

        let current = self.slots.pending_scan_target();
        let target = match current.filter(|id| {
            self.draft
                .serials
                .iter()
                .any(|s| s.id == *id && !s.is_active())
        }) {
            Some(id) => id,
            None => match self.slots.next_scan_target(&self.draft, current) {
                Some(id) => id,
                None => return Ok(None),
            },
        };

        self.slots.set_value(&mut self.draft, target, code)?;
        self.slots.next_scan_target(&self.draft, Some(target));
        Ok(Some(target))
    }

    pub fn add_photo_proof(&mut self, proof: PhotoProof) -> Result<(), CaptureError> {
        self.ensure_editable()?;
        self.draft.photo_proofs.push(proof);
        Ok(())
    }

    pub fn remove_photo_proof(&mut self, proof_id: Uuid) -> Result<(), CaptureError> {
        self.ensure_editable()?;
        self.draft.photo_proofs.retain(|p| p.id != proof_id);
        Ok(())
    }

    // ---- submission ----

    /// Validate and submit the draft. While a submission is in flight a
    /// repeated call is a no-op. On success the draft is destroyed and the
    /// session lands in `Saved`; on failure the draft survives and the
    /// session lands in `Failed`.
    pub async fn submit(&mut self) -> Result<Option<String>, CaptureError> {
        match &self.state {
            CaptureState::Editing | CaptureState::Failed(_) => {}
            CaptureState::Submitting => return Ok(None),
            other => {
                return Err(CaptureError::InvalidOperation(format!(
                    "cannot submit in state {:?}",
                    other
                )))
            }
        }

        self.state = CaptureState::Submitting;
        match self.assembler.submit(&self.session_id, &self.draft).await {
            Ok(SubmitOutcome::Saved(line)) => {
                self.draft = CountDraft::default();
                self.state = CaptureState::Saved {
                    line_id: line.id.clone(),
                };
                Ok(Some(line.id))
            }
            Ok(SubmitOutcome::AlreadySaving) => Ok(None),
            Err(err) => {
                self.state = CaptureState::Failed(err.clone());
                Err(err)
            }
        }
    }

    /// Explicitly return from `Failed` to `Editing` (edits do this
    /// implicitly).
    pub fn resume_editing(&mut self) -> Result<(), CaptureError> {
        match &self.state {
            CaptureState::Failed(_) => {
                self.state = CaptureState::Editing;
                Ok(())
            }
            _ => Err(CaptureError::InvalidOperation("session has not failed".into())),
        }
    }

    /// Acknowledge a save (or abandon the draft) and return to `Idle`.
    pub fn reset(&mut self) {
        self.draft = CountDraft::default();
        self.slots = SerialSlotManager::new();
        self.state = CaptureState::Idle;
    }

    // ---- unknown items ----

    /// Report an unresolvable identifier as an unknown item, carrying along
    /// whatever the operator already entered.
    pub async fn report_unknown(
        &mut self,
        barcode: Option<String>,
        description: &str,
    ) -> Result<(), CaptureError> {
        let report =
            unknown_report_from_draft(&self.session_id, barcode, description, &self.draft);
        self.count_lines.report_unknown_item(&report).await?;
        self.events.emit(Event::UnknownItemReported {
            session_id: self.session_id.clone(),
            description: description.to_string(),
            reported_at: chrono::Utc::now(),
        });
        self.reset();
        Ok(())
    }
}
