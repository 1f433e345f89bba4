pub mod item_resolver;
pub mod mrp_matcher;
pub mod photo_proofs;
pub mod serial_slots;
pub mod submission;
pub mod variance;
