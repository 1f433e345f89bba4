//! Stocktake Capture Engine
//!
//! Pure workflow logic for capturing one physical count line at a time:
//! scan gating, item resolution with duplicate-count decisions, serial-slot
//! management, MRP variant matching, variance evaluation, photo-proof
//! tracking, and validated submission assembly. The host UI owns rendering,
//! camera hardware, and the transport behind the collaborator traits.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod catalog;
pub mod config;
pub mod errors;
pub mod events;
pub mod logging;
pub mod models;
pub mod scan_gate;
pub mod services;
pub mod session;

pub use catalog::{CatalogApi, CheckCountedResponse, CountLineApi, CreatedCountLine, VerificationDetails};
pub use config::EngineConfig;
pub use errors::CaptureError;
pub use events::{Event, EventSender};
pub use models::{
    CountDraft, CountLinePayload, ExistingCountLine, Item, MrpVariant, PhotoProof, PhotoProofType,
    SerialEntry, SerialInput, SerialRequirement, UnknownItemReport, VarianceReason,
};
pub use scan_gate::{ScanDecision, ScanEventGate, ScanKind};
pub use session::{CaptureSession, CaptureState, ScanOutcome};
