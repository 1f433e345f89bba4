use serde::Serialize;

/// Engine-wide error taxonomy.
///
/// Every variant carries a stable machine code (see [`CaptureError::error_code`])
/// so the host UI can map errors to localized operator messages without
/// string-matching display text. Validation errors are always recoverable:
/// the capture session returns to `Editing` with the error attached rather
/// than discarding the draft.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
pub enum CaptureError {
    #[error("Counted quantity must be a positive number")]
    InvalidQuantity,

    #[error("MRP must be a non-negative number")]
    InvalidMrp,

    #[error("A variance reason is required when counted quantity differs from stock")]
    ReasonRequired,

    #[error("Serial number already entered: {0}")]
    DuplicateSerial(String),

    #[error("{0} serial number(s) still required")]
    SerialsMissing(u32),

    #[error("More serial numbers entered than the counted quantity allows (expected {expected}, got {actual})")]
    SerialCountMismatch { expected: u32, actual: u32 },

    #[error("{0} photo proof(s) still required")]
    PhotoProofsMissing(u32),

    #[error("Item not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Scanning too fast, please wait a moment")]
    RateLimited,

    #[error("Cannot remove serial slot: {0}")]
    SlotRemovalBlocked(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

impl CaptureError {
    /// Stable machine-readable code for host-side error mapping.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidQuantity => "INVALID_QUANTITY",
            Self::InvalidMrp => "INVALID_MRP",
            Self::ReasonRequired => "REASON_REQUIRED",
            Self::DuplicateSerial(_) => "DUPLICATE_SERIAL",
            Self::SerialsMissing(_) => "SERIALS_MISSING",
            Self::SerialCountMismatch { .. } => "SERIAL_COUNT_MISMATCH",
            Self::PhotoProofsMissing(_) => "PHOTO_PROOFS_MISSING",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Network(_) => "NETWORK",
            Self::RateLimited => "RATE_LIMITED",
            Self::SlotRemovalBlocked(_) => "SLOT_REMOVAL_BLOCKED",
            Self::InvalidOperation(_) => "INVALID_OPERATION",
        }
    }

    /// Whether the error leaves the draft intact and editable.
    ///
    /// Everything except lookup failures is recoverable in place; `NotFound`
    /// means there is no draft to return to yet.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::NotFound(_))
    }

    /// Helper mirroring how collaborator transport failures are wrapped.
    pub fn network<E: std::fmt::Display>(err: E) -> Self {
        Self::Network(err.to_string())
    }
}
