use rust_decimal::Decimal;

use crate::models::{CountDraft, MrpVariant};

/// Finds the first variant whose value is within `tolerance` of the parsed
/// MRP entry. Returns `None` for no match; an empty or unparsable entry is
/// handled by the caller clearing the match (MRP is optional unless
/// changed).
pub fn match_variant(
    parsed_mrp: Decimal,
    variants: &[MrpVariant],
    tolerance: Decimal,
) -> Option<&MrpVariant> {
    variants
        .iter()
        .find(|v| (v.value - parsed_mrp).abs() < tolerance)
}

/// Re-runs variant matching against the draft's current MRP text and
/// updates the matched variant and, unless the operator overrode it,
/// the draft condition from the variant's condition tag.
pub fn rematch_draft(draft: &mut CountDraft, tolerance: Decimal) {
    let variants = match draft.item.as_ref() {
        Some(item) => item.mrp_variants.clone(),
        None => return,
    };

    let matched = draft
        .parsed_mrp()
        .flatten()
        .and_then(|mrp| match_variant(mrp, &variants, tolerance).cloned());

    if let Some(variant) = &matched {
        if !draft.condition_overridden {
            if let Some(condition) = &variant.condition {
                draft.item_condition = Some(condition.clone());
            }
        }
    }
    draft.matched_variant = matched;
}

/// Whether the entered MRP differs from the item's system MRP by at least
/// `tolerance` (and therefore belongs in the submission payload).
pub fn mrp_changed(parsed_mrp: Decimal, system_mrp: Decimal, tolerance: Decimal) -> bool {
    (parsed_mrp - system_mrp).abs() >= tolerance
}
