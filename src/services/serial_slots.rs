use rust_decimal::prelude::ToPrimitive;
use tracing::debug;
use uuid::Uuid;

use crate::errors::CaptureError;
use crate::models::{CountDraft, SerialInput};

/// Normalized form of a raw serial entry: surrounding whitespace stripped.
/// Idempotent by construction.
pub fn normalize(raw: &str) -> String {
    raw.trim().to_string()
}

/// Comparison key for duplicate detection: normalized and case-folded.
pub fn comparison_key(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Serials required for the draft's quantity and requirement policy.
///
/// Serials attach to physical units, so only the integral part of a
/// fractional counted quantity is considered.
pub fn expected_serial_count(draft: &CountDraft) -> u32 {
    let Some(item) = draft.item.as_ref() else {
        return 0;
    };
    let per_unit = item
        .serial_requirement
        .serials_per_unit(draft.serial_capture_enabled);
    let units = draft
        .parsed_qty()
        .and_then(|q| q.trunc().to_u32())
        .unwrap_or(0);
    units.saturating_mul(per_unit)
}

/// Minimum number of slots that must exist (and survive removal) for the
/// current draft. Zero when serial capture is off; otherwise at least one
/// slot per unit-requirement even before a quantity is entered.
pub fn minimum_slot_count(draft: &CountDraft) -> u32 {
    let Some(item) = draft.item.as_ref() else {
        return 0;
    };
    let mandatory = item.serial_requirement.capture_is_mandatory();
    if !mandatory && !draft.serial_capture_enabled {
        return 0;
    }
    let per_unit = item.serial_requirement.serials_per_unit(true);
    expected_serial_count(draft).max(per_unit)
}

/// Maintains the ordered collection of serial-number input slots for the
/// current item and quantity, and tracks which slot the next hardware scan
/// should fill.
#[derive(Debug, Default)]
pub struct SerialSlotManager {
    pending_scan_target: Option<Uuid>,
}

impl SerialSlotManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_scan_target(&self) -> Option<Uuid> {
        self.pending_scan_target
    }

    /// Resize the slot array to `max(expected, minimum)` and relabel
    /// sequentially. Truncates from the end when oversized, appends fresh
    /// slots when short. Existing values and ids survive relabeling.
    pub fn reconcile(&mut self, draft: &mut CountDraft) {
        let target = expected_serial_count(draft).max(minimum_slot_count(draft)) as usize;

        if draft.serials.len() > target {
            draft.serials.truncate(target);
        }
        while draft.serials.len() < target {
            let position = draft.serials.len() + 1;
            draft.serials.push(SerialInput::empty(position));
        }
        for (i, slot) in draft.serials.iter_mut().enumerate() {
            slot.label = format!("Serial #{}", i + 1);
        }

        // A truncated slot may have been the scan target
        if let Some(target_id) = self.pending_scan_target {
            if !draft.serials.iter().any(|s| s.id == target_id) {
                self.pending_scan_target = None;
            }
        }
        debug!(slots = draft.serials.len(), "serial slots reconciled");
    }

    /// Set one slot's value from operator input or a scan. An empty
    /// normalized value clears the slot; a value colliding with another
    /// active slot (after case-folding) is rejected and the slot is left
    /// unchanged.
    pub fn set_value(
        &mut self,
        draft: &mut CountDraft,
        slot_id: Uuid,
        raw: &str,
    ) -> Result<(), CaptureError> {
        let normalized = normalize(raw);

        if !normalized.is_empty() {
            let key = comparison_key(&normalized);
            let collision = draft
                .serials
                .iter()
                .any(|s| s.id != slot_id && s.is_active() && comparison_key(&s.value) == key);
            if collision {
                return Err(CaptureError::DuplicateSerial(normalized));
            }
        }

        let slot = draft
            .serials
            .iter_mut()
            .find(|s| s.id == slot_id)
            .ok_or_else(|| CaptureError::InvalidOperation(format!("no serial slot {}", slot_id)))?;
        slot.value = normalized;
        Ok(())
    }

    /// Remove a slot. Rejected when capture is mandatory or enabled and
    /// removal would leave fewer slots than the current minimum. Clears the
    /// pending scan target if it pointed at the removed slot, then
    /// relabels the remainder.
    pub fn remove(&mut self, draft: &mut CountDraft, slot_id: Uuid) -> Result<(), CaptureError> {
        let index = draft
            .serials
            .iter()
            .position(|s| s.id == slot_id)
            .ok_or_else(|| CaptureError::InvalidOperation(format!("no serial slot {}", slot_id)))?;

        let minimum = minimum_slot_count(draft) as usize;
        if minimum > 0 && draft.serials.len() <= minimum {
            return Err(CaptureError::SlotRemovalBlocked(format!(
                "at least {} serial slot(s) required for this item",
                minimum
            )));
        }

        draft.serials.remove(index);
        if self.pending_scan_target == Some(slot_id) {
            self.pending_scan_target = None;
        }
        for (i, slot) in draft.serials.iter_mut().enumerate() {
            slot.label = format!("Serial #{}", i + 1);
        }
        Ok(())
    }

    /// Pick the slot the next hardware scan should fill: the first empty
    /// slot after the current target, falling back to the first empty slot
    /// overall. Returns `None` when every slot is filled, in which case the
    /// caller should prompt for review rather than continue scanning.
    pub fn next_scan_target(&mut self, draft: &CountDraft, current: Option<Uuid>) -> Option<Uuid> {
        let current_index = current
            .and_then(|id| draft.serials.iter().position(|s| s.id == id));

        let after_current = current_index.and_then(|idx| {
            draft.serials[idx + 1..]
                .iter()
                .find(|s| !s.is_active())
                .map(|s| s.id)
        });

        let target = after_current.or_else(|| {
            draft
                .serials
                .iter()
                .find(|s| !s.is_active())
                .map(|s| s.id)
        });

        self.pending_scan_target = target;
        target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Item, SerialRequirement};
    use rust_decimal_macros::dec;

    fn item(requirement: SerialRequirement) -> Item {
        Item {
            item_code: "ITM-1".into(),
            item_name: "Widget".into(),
            barcode: "890100".into(),
            stock_qty: dec!(10),
            mrp: dec!(100),
            serial_requirement: requirement,
            mrp_variants: vec![],
            category: None,
            warehouse: None,
            uom_code: None,
            uom_name: None,
            floor: None,
            rack: None,
            verified: false,
            verified_by: None,
            verified_at: None,
        }
    }

    fn draft(requirement: SerialRequirement, qty: &str) -> CountDraft {
        let mut d = CountDraft::for_item(item(requirement));
        d.counted_qty_text = qty.to_string();
        d
    }

    #[test]
    fn expected_count_per_requirement() {
        assert_eq!(expected_serial_count(&draft(SerialRequirement::Dual, "3")), 6);
        assert_eq!(expected_serial_count(&draft(SerialRequirement::Single, "4")), 4);
        assert_eq!(expected_serial_count(&draft(SerialRequirement::Required, "4")), 4);

        let mut optional_off = draft(SerialRequirement::Optional, "4");
        optional_off.serial_capture_enabled = false;
        assert_eq!(expected_serial_count(&optional_off), 0);

        let mut optional_on = draft(SerialRequirement::Optional, "4");
        optional_on.serial_capture_enabled = true;
        assert_eq!(expected_serial_count(&optional_on), 4);
    }

    #[test]
    fn fractional_qty_uses_integral_part() {
        assert_eq!(expected_serial_count(&draft(SerialRequirement::Dual, "3.9")), 6);
    }

    #[test]
    fn reconcile_grows_and_relabels() {
        let mut d = draft(SerialRequirement::Dual, "2");
        let mut mgr = SerialSlotManager::new();
        mgr.reconcile(&mut d);
        assert_eq!(d.serials.len(), 4);
        assert_eq!(d.serials[0].label, "Serial #1");
        assert_eq!(d.serials[3].label, "Serial #4");
    }

    #[test]
    fn reconcile_truncates_preserving_earlier_values() {
        let mut d = draft(SerialRequirement::Single, "3");
        let mut mgr = SerialSlotManager::new();
        mgr.reconcile(&mut d);
        let first = d.serials[0].id;
        mgr.set_value(&mut d, first, "SN-001").unwrap();

        d.counted_qty_text = "1".into();
        mgr.reconcile(&mut d);
        assert_eq!(d.serials.len(), 1);
        assert_eq!(d.serials[0].id, first);
        assert_eq!(d.serials[0].value, "SN-001");
        assert_eq!(d.serials[0].label, "Serial #1");
    }

    #[test]
    fn minimum_one_slot_before_quantity_entered() {
        let mut d = draft(SerialRequirement::Single, "");
        let mut mgr = SerialSlotManager::new();
        mgr.reconcile(&mut d);
        assert_eq!(d.serials.len(), 1);

        let mut dual = draft(SerialRequirement::Dual, "");
        mgr.reconcile(&mut dual);
        assert_eq!(dual.serials.len(), 2);
    }

    #[test]
    fn duplicate_serial_rejected_case_insensitively() {
        let mut d = draft(SerialRequirement::Single, "2");
        let mut mgr = SerialSlotManager::new();
        mgr.reconcile(&mut d);
        let (a, b) = (d.serials[0].id, d.serials[1].id);
        mgr.set_value(&mut d, a, " SN-ABC ").unwrap();
        assert_eq!(d.serials[0].value, "SN-ABC");

        let err = mgr.set_value(&mut d, b, "sn-abc").unwrap_err();
        assert_eq!(err.error_code(), "DUPLICATE_SERIAL");
        assert_eq!(d.serials[1].value, "");
    }

    #[test]
    fn rewriting_same_slot_with_same_value_is_not_a_duplicate() {
        let mut d = draft(SerialRequirement::Single, "1");
        let mut mgr = SerialSlotManager::new();
        mgr.reconcile(&mut d);
        let a = d.serials[0].id;
        mgr.set_value(&mut d, a, "SN-1").unwrap();
        mgr.set_value(&mut d, a, "SN-1").unwrap();
        assert_eq!(d.serials[0].value, "SN-1");
    }

    #[test]
    fn empty_value_clears_slot() {
        let mut d = draft(SerialRequirement::Single, "1");
        let mut mgr = SerialSlotManager::new();
        mgr.reconcile(&mut d);
        let a = d.serials[0].id;
        mgr.set_value(&mut d, a, "SN-1").unwrap();
        mgr.set_value(&mut d, a, "   ").unwrap();
        assert!(!d.serials[0].is_active());
    }

    #[test]
    fn normalization_is_idempotent() {
        let once = normalize("  SN-7 ");
        assert_eq!(normalize(&once), once);
        assert_eq!(comparison_key("SN-7"), comparison_key(" sn-7 "));
    }

    #[test]
    fn remove_last_slot_blocked_when_mandatory() {
        let mut d = draft(SerialRequirement::Single, "");
        let mut mgr = SerialSlotManager::new();
        mgr.reconcile(&mut d);
        assert_eq!(d.serials.len(), 1);
        let a = d.serials[0].id;
        let err = mgr.remove(&mut d, a).unwrap_err();
        assert_eq!(err.error_code(), "SLOT_REMOVAL_BLOCKED");
        assert_eq!(d.serials.len(), 1);
    }

    #[test]
    fn remove_extra_slot_relabels_and_clears_scan_target() {
        let mut d = draft(SerialRequirement::Optional, "");
        d.serial_capture_enabled = true;
        let mut mgr = SerialSlotManager::new();
        mgr.reconcile(&mut d);
        // Add a spare slot beyond the minimum by hand
        d.serials.push(SerialInput::empty(2));
        let spare = d.serials[1].id;
        // Fill the first so the spare becomes the target
        let first = d.serials[0].id;
        mgr.set_value(&mut d, first, "SN-1").unwrap();
        mgr.next_scan_target(&d, Some(first));
        assert_eq!(mgr.pending_scan_target(), Some(spare));

        mgr.remove(&mut d, spare).unwrap();
        assert_eq!(mgr.pending_scan_target(), None);
        assert_eq!(d.serials.len(), 1);
        assert_eq!(d.serials[0].label, "Serial #1");
    }

    #[test]
    fn next_scan_target_prefers_slot_after_current() {
        let mut d = draft(SerialRequirement::Single, "3");
        let mut mgr = SerialSlotManager::new();
        mgr.reconcile(&mut d);
        let ids: Vec<Uuid> = d.serials.iter().map(|s| s.id).collect();

        // Fill slot 0; from slot 1 the next target is slot 2... fill 1 first
        mgr.set_value(&mut d, ids[1], "SN-B").unwrap();
        assert_eq!(mgr.next_scan_target(&d, Some(ids[1])), Some(ids[2]));

        // From the last slot with an earlier gap, fall back to the first empty
        mgr.set_value(&mut d, ids[2], "SN-C").unwrap();
        assert_eq!(mgr.next_scan_target(&d, Some(ids[2])), Some(ids[0]));

        // All filled -> none, prompt for review
        mgr.set_value(&mut d, ids[0], "SN-A").unwrap();
        assert_eq!(mgr.next_scan_target(&d, Some(ids[0])), None);
    }
}
