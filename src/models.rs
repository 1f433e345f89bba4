use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;
use validator::Validate;

/// Per-item rule for how many serial numbers must be captured per unit counted.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SerialRequirement {
    /// Serial capture is up to the operator
    #[default]
    Optional,
    /// Exactly one serial per unit
    Single,
    /// One serial per unit, capture cannot be disabled
    Required,
    /// Two serials per unit (e.g. paired components)
    Dual,
}

impl SerialRequirement {
    /// Serials required per counted unit. For `Optional` this depends on
    /// whether the operator has enabled capture for the draft.
    pub fn serials_per_unit(self, capture_enabled: bool) -> u32 {
        match self {
            Self::Dual => 2,
            Self::Single | Self::Required => 1,
            Self::Optional => {
                if capture_enabled {
                    1
                } else {
                    0
                }
            }
        }
    }

    /// Whether the operator may turn serial capture off.
    pub fn capture_is_mandatory(self) -> bool {
        !matches!(self, Self::Optional)
    }
}

/// A known (price, condition, origin) tuple for an item, used to validate
/// an operator-entered MRP.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MrpVariant {
    pub id: Option<String>,
    pub value: Decimal,
    pub barcode: Option<String>,
    pub source: Option<String>,
    pub condition: Option<String>,
}

/// A catalog item as resolved for one capture. Owned by the external
/// catalog; read-only to the engine for the life of the draft.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
pub struct Item {
    #[validate(length(min = 1))]
    pub item_code: String,
    pub item_name: String,
    pub barcode: String,
    pub stock_qty: Decimal,
    pub mrp: Decimal,
    pub serial_requirement: SerialRequirement,
    #[serde(default)]
    pub mrp_variants: Vec<MrpVariant>,
    pub category: Option<String>,
    pub warehouse: Option<String>,
    pub uom_code: Option<String>,
    pub uom_name: Option<String>,
    pub floor: Option<String>,
    pub rack: Option<String>,
    #[serde(default)]
    pub verified: bool,
    pub verified_by: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
}

/// One serial-number input slot. Labels are positional and regenerated on
/// every resize; values are stored raw-normalized (trimmed).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SerialInput {
    pub id: Uuid,
    pub label: String,
    pub value: String,
}

impl SerialInput {
    pub fn empty(position: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: format!("Serial #{}", position),
            value: String::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        !self.value.is_empty()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PhotoProofType {
    Item,
    Shelf,
    Serial,
    Damage,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhotoProof {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub proof_type: PhotoProofType,
    /// Opaque payload from the host camera layer (base64, URL, file ref)
    pub payload: String,
    pub captured_at: DateTime<Utc>,
}

/// A variance reason from the collaborator's reason list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarianceReason {
    pub code: String,
    pub description: String,
}

/// Opaque snapshot of a prior count line for the same item in the same
/// session. Drives the duplicate-scan decision only; never mutated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExistingCountLine {
    pub id: String,
    pub item_code: String,
    pub counted_qty: Decimal,
    pub created_at: DateTime<Utc>,
}

/// The mutable aggregate for one in-progress capture.
///
/// All derived values (expected serial count, variance, photo shortfall)
/// are recomputed from this struct by pure functions; nothing derived is
/// cached here.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CountDraft {
    pub item: Option<Item>,
    pub counted_qty_text: String,
    pub damaged_qty: Decimal,
    pub non_returnable_damaged_qty: Decimal,
    pub mrp_text: String,
    pub matched_variant: Option<MrpVariant>,
    pub item_condition: Option<String>,
    /// Set when the operator picked a condition by hand; blocks variant
    /// condition propagation
    pub condition_overridden: bool,
    pub variance_reason: Option<VarianceReason>,
    pub variance_note: String,
    pub remark: String,
    /// Operator toggle; forced on when the requirement is mandatory
    pub serial_capture_enabled: bool,
    pub serials: Vec<SerialInput>,
    pub photo_proofs: Vec<PhotoProof>,
    pub floor_no: Option<String>,
    pub rack_no: Option<String>,
    pub mark_location: Option<String>,
    pub sr_no: Option<String>,
    pub manufacturing_date: Option<String>,
    pub duplicate_of: Option<Vec<ExistingCountLine>>,
}

impl CountDraft {
    /// Fresh draft for a newly resolved item. Location fields are seeded
    /// from the catalog record; serial capture starts enabled whenever the
    /// requirement makes it mandatory.
    pub fn for_item(item: Item) -> Self {
        Self {
            counted_qty_text: String::new(),
            serial_capture_enabled: item.serial_requirement.capture_is_mandatory(),
            floor_no: item.floor.clone(),
            rack_no: item.rack.clone(),
            item_condition: None,
            item: Some(item),
            ..Default::default()
        }
    }

    /// Parsed counted quantity, if the text is a valid positive number.
    pub fn parsed_qty(&self) -> Option<Decimal> {
        let parsed: Decimal = self.counted_qty_text.trim().parse().ok()?;
        (parsed > Decimal::ZERO).then_some(parsed)
    }

    /// Parsed MRP entry. `None` when the field is empty (MRP is optional),
    /// `Some(None)` when present but unparsable.
    pub fn parsed_mrp(&self) -> Option<Option<Decimal>> {
        let trimmed = self.mrp_text.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(trimmed.parse::<Decimal>().ok().filter(|v| !v.is_sign_negative()))
    }

    pub fn active_serial_count(&self) -> u32 {
        self.serials.iter().filter(|s| s.is_active()).count() as u32
    }
}

/// One serial entry on the wire, stamped at assembly time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SerialEntry {
    pub label: String,
    pub value: String,
    pub captured_at: DateTime<Utc>,
}

/// The validated submission payload for count-line creation.
///
/// Field names follow the collaborator's wire schema. Pricing fields are
/// present only when the entered MRP differs from the system MRP beyond
/// tolerance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CountLinePayload {
    pub session_id: String,
    pub item_code: String,
    pub counted_qty: Decimal,
    pub damaged_qty: Decimal,
    pub non_returnable_damaged_qty: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variance_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variance_note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_condition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_numbers: Option<Vec<SerialEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_proofs: Option<Vec<PhotoProof>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mrp_counted: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mrp_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant_barcode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub floor_no: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rack_no: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mark_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sr_no: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturing_date: Option<String>,
}

/// Report assembled when an identifier cannot be resolved and the operator
/// records the item as unknown instead.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnknownItemReport {
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub barcode: Option<String>,
    pub description: String,
    pub counted_qty: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mrp: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn serials_per_unit_by_requirement() {
        assert_eq!(SerialRequirement::Dual.serials_per_unit(false), 2);
        assert_eq!(SerialRequirement::Single.serials_per_unit(false), 1);
        assert_eq!(SerialRequirement::Required.serials_per_unit(false), 1);
        assert_eq!(SerialRequirement::Optional.serials_per_unit(false), 0);
        assert_eq!(SerialRequirement::Optional.serials_per_unit(true), 1);
    }

    #[test]
    fn parsed_qty_rejects_zero_and_garbage() {
        let mut draft = CountDraft::default();
        draft.counted_qty_text = "0".into();
        assert_eq!(draft.parsed_qty(), None);
        draft.counted_qty_text = "abc".into();
        assert_eq!(draft.parsed_qty(), None);
        draft.counted_qty_text = " 3.5 ".into();
        assert_eq!(draft.parsed_qty(), Some(dec!(3.5)));
    }

    #[test]
    fn parsed_mrp_distinguishes_empty_from_invalid() {
        let mut draft = CountDraft::default();
        assert_eq!(draft.parsed_mrp(), None);
        draft.mrp_text = "  ".into();
        assert_eq!(draft.parsed_mrp(), None);
        draft.mrp_text = "95".into();
        assert_eq!(draft.parsed_mrp(), Some(Some(dec!(95))));
        draft.mrp_text = "x95".into();
        assert_eq!(draft.parsed_mrp(), Some(None));
        draft.mrp_text = "-1".into();
        assert_eq!(draft.parsed_mrp(), Some(None));
    }

    #[test]
    fn payload_omits_absent_pricing_fields() {
        let payload = CountLinePayload {
            session_id: "s1".into(),
            item_code: "ITM-1".into(),
            counted_qty: dec!(4),
            damaged_qty: dec!(0),
            non_returnable_damaged_qty: dec!(0),
            variance_reason: None,
            variance_note: None,
            remark: None,
            item_condition: None,
            serial_numbers: None,
            photo_proofs: None,
            mrp_counted: None,
            mrp_source: None,
            variant_id: None,
            variant_barcode: None,
            floor_no: None,
            rack_no: None,
            mark_location: None,
            sr_no: None,
            manufacturing_date: None,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("mrp_counted").is_none());
        assert!(json.get("serial_numbers").is_none());
        assert_eq!(json["item_code"], "ITM-1");
    }
}
