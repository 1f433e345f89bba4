use config::{Config, ConfigError, Environment};
use serde::Deserialize;
use validator::Validate;

/// Default values for engine tunables
const DEFAULT_SCAN_WINDOW_MS: u64 = 15_000;
const DEFAULT_SCAN_THRESHOLD: u32 = 5;
const DEFAULT_ITEM_DEBOUNCE_MS: u64 = 1_000;
const DEFAULT_SERIAL_DEBOUNCE_MS: u64 = 1_000;
const DEFAULT_SEARCH_DEBOUNCE_MS: u64 = 500;
const DEFAULT_MRP_TOLERANCE: &str = "0.01";

fn default_scan_window_ms() -> u64 {
    DEFAULT_SCAN_WINDOW_MS
}

fn default_scan_threshold() -> u32 {
    DEFAULT_SCAN_THRESHOLD
}

fn default_item_debounce_ms() -> u64 {
    DEFAULT_ITEM_DEBOUNCE_MS
}

fn default_serial_debounce_ms() -> u64 {
    DEFAULT_SERIAL_DEBOUNCE_MS
}

fn default_search_debounce_ms() -> u64 {
    DEFAULT_SEARCH_DEBOUNCE_MS
}

fn default_mrp_tolerance() -> String {
    DEFAULT_MRP_TOLERANCE.to_string()
}

fn default_camera_available() -> bool {
    true
}

fn default_lookup_retries() -> u32 {
    2
}

/// Engine configuration with validation.
///
/// All values have working defaults; hosts override via an
/// `STOCKTAKE__`-prefixed environment (e.g. `STOCKTAKE__SCAN_THRESHOLD=10`)
/// or by constructing the struct directly.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Rolling window for per-code scan rate limiting, in milliseconds
    #[serde(default = "default_scan_window_ms")]
    #[validate(range(min = 1000))]
    pub scan_window_ms: u64,

    /// Maximum scans of one code allowed inside the rolling window
    #[serde(default = "default_scan_threshold")]
    #[validate(range(min = 1))]
    pub scan_threshold: u32,

    /// Debounce window for repeated identical item scans, in milliseconds
    #[serde(default = "default_item_debounce_ms")]
    pub item_debounce_ms: u64,

    /// Debounce window for repeated identical serial scans, in milliseconds
    #[serde(default = "default_serial_debounce_ms")]
    pub serial_debounce_ms: u64,

    /// Debounce for search-as-you-type lookups, in milliseconds
    #[serde(default = "default_search_debounce_ms")]
    pub search_debounce_ms: u64,

    /// Absolute tolerance for matching a typed MRP against known variants,
    /// in currency units (decimal string to avoid float drift)
    #[serde(default = "default_mrp_tolerance")]
    pub mrp_tolerance: String,

    /// Whether the host platform can capture photos. When false, the
    /// serial-photo requirement is waived as an explicit policy relaxation.
    #[serde(default = "default_camera_available")]
    pub camera_available: bool,

    /// Retry count passed to the collaborator for barcode lookups
    #[serde(default = "default_lookup_retries")]
    pub lookup_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scan_window_ms: default_scan_window_ms(),
            scan_threshold: default_scan_threshold(),
            item_debounce_ms: default_item_debounce_ms(),
            serial_debounce_ms: default_serial_debounce_ms(),
            search_debounce_ms: default_search_debounce_ms(),
            mrp_tolerance: default_mrp_tolerance(),
            camera_available: default_camera_available(),
            lookup_retries: default_lookup_retries(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from the environment, falling back to defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let cfg = Config::builder()
            .add_source(Environment::with_prefix("STOCKTAKE").separator("__"))
            .build()?;

        let engine_config: EngineConfig = cfg.try_deserialize()?;

        engine_config
            .validate()
            .map_err(|e| ConfigError::Message(format!("Invalid engine configuration: {}", e)))?;

        Ok(engine_config)
    }

    /// Parsed MRP tolerance; falls back to the default when the configured
    /// string is not a valid decimal.
    pub fn mrp_tolerance_decimal(&self) -> rust_decimal::Decimal {
        self.mrp_tolerance
            .parse()
            .unwrap_or_else(|_| DEFAULT_MRP_TOLERANCE.parse().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn defaults_match_documented_limits() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.scan_window_ms, 15_000);
        assert_eq!(cfg.scan_threshold, 5);
        assert_eq!(cfg.item_debounce_ms, 1_000);
        assert_eq!(cfg.search_debounce_ms, 500);
        assert_eq!(cfg.mrp_tolerance_decimal(), dec!(0.01));
        assert!(cfg.camera_available);
    }

    #[test]
    fn malformed_environment_is_an_error() {
        std::env::set_var("STOCKTAKE__SCAN_THRESHOLD", "not-a-number");
        let result = EngineConfig::load();
        std::env::remove_var("STOCKTAKE__SCAN_THRESHOLD");
        assert!(result.is_err());
    }

    #[test]
    fn bad_tolerance_string_falls_back() {
        let cfg = EngineConfig {
            mrp_tolerance: "not-a-number".into(),
            ..Default::default()
        };
        assert_eq!(cfg.mrp_tolerance_decimal(), dec!(0.01));
    }
}
