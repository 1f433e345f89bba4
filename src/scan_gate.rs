use dashmap::DashMap;
use tracing::{debug, warn};

/// Kind of scan being gated. Item and serial scans carry separate debounce
/// windows so a serial gun re-trigger during edit cannot suppress an item
/// scan (or vice versa).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ScanKind {
    Item,
    Serial,
}

/// Outcome of admitting one raw scan signal.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ScanDecision {
    /// Pass the scan through to the resolver / serial slot
    Accepted,
    /// Same raw value re-triggered inside the debounce window; drop
    /// silently, no rate-limit slot consumed
    Debounced,
    /// Too many scans of this code inside the rolling window; the host
    /// should show a cooldown message and disable continuous-scan mode
    RateLimited,
}

impl ScanDecision {
    pub fn is_rate_limited(self) -> bool {
        matches!(self, Self::RateLimited)
    }
}

#[derive(Debug, Default)]
struct CodeHistory {
    /// Scan timestamps inside the rolling window, oldest first
    timestamps_ms: Vec<u64>,
}

#[derive(Debug, Clone)]
struct LastValue {
    code: String,
    timestamp_ms: u64,
}

/// Rate-limits and deduplicates raw scan signals before they reach the
/// business logic.
///
/// Two independent mechanisms:
/// - a per-code rolling window (default 15 s / 5 scans) that flags abusive
///   rapid scanning of one code, and
/// - a last-value debounce (default 1 s) that silently absorbs camera
///   re-triggers: a scan is dropped only when its raw value equals the
///   immediately preceding scanned value of the same kind. An alternating
///   sequence (A, B, A) passes untouched. Debounced scans never count
///   against the rolling window.
///
/// Callers supply timestamps in epoch milliseconds, which keeps the gate
/// deterministic under test.
#[derive(Debug)]
pub struct ScanEventGate {
    window_ms: u64,
    threshold: u32,
    item_debounce_ms: u64,
    serial_debounce_ms: u64,
    histories: DashMap<String, CodeHistory>,
    /// Most recent non-debounced scan per kind; the debounce compares only
    /// against this, not against older scans of the same code
    last_value: DashMap<ScanKind, LastValue>,
}

impl ScanEventGate {
    pub fn new(window_ms: u64, threshold: u32, item_debounce_ms: u64, serial_debounce_ms: u64) -> Self {
        Self {
            window_ms,
            threshold,
            item_debounce_ms,
            serial_debounce_ms,
            histories: DashMap::new(),
            last_value: DashMap::new(),
        }
    }

    pub fn from_config(config: &crate::config::EngineConfig) -> Self {
        Self::new(
            config.scan_window_ms,
            config.scan_threshold,
            config.item_debounce_ms,
            config.serial_debounce_ms,
        )
    }

    /// Admit one raw scan of `code` observed at `timestamp_ms`.
    pub fn register_scan(&self, code: &str, kind: ScanKind, timestamp_ms: u64) -> ScanDecision {
        if self.is_retrigger(code, kind, timestamp_ms) {
            debug!(code, "scan debounced as camera re-trigger");
            return ScanDecision::Debounced;
        }

        self.last_value.insert(
            kind,
            LastValue {
                code: code.to_string(),
                timestamp_ms,
            },
        );

        let mut entry = self.histories.entry(code.to_string()).or_default();
        let window_ms = self.window_ms;
        entry
            .timestamps_ms
            .retain(|&t| timestamp_ms.saturating_sub(t) < window_ms);
        entry.timestamps_ms.push(timestamp_ms);

        if entry.timestamps_ms.len() as u32 > self.threshold {
            warn!(code, count = entry.timestamps_ms.len(), "scan rate limit exceeded");
            return ScanDecision::RateLimited;
        }

        ScanDecision::Accepted
    }

    /// Whether this scan repeats the immediately preceding scanned value of
    /// its kind inside the debounce window.
    fn is_retrigger(&self, code: &str, kind: ScanKind, timestamp_ms: u64) -> bool {
        let Some(last) = self.last_value.get(&kind) else {
            return false;
        };
        if last.code != code {
            return false;
        }
        let debounce = match kind {
            ScanKind::Item => self.item_debounce_ms,
            ScanKind::Serial => self.serial_debounce_ms,
        };
        timestamp_ms.saturating_sub(last.timestamp_ms) < debounce
    }

    /// Drops all recorded history, e.g. when a session closes.
    pub fn reset(&self) {
        self.histories.clear();
        self.last_value.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> ScanEventGate {
        ScanEventGate::new(15_000, 5, 1_000, 1_000)
    }

    #[test]
    fn sixth_scan_in_window_is_rate_limited() {
        let gate = gate();
        // Spaced beyond the debounce window but inside the rolling window
        for i in 0..5u64 {
            assert_eq!(
                gate.register_scan("ABC123", ScanKind::Item, i * 2_000),
                ScanDecision::Accepted
            );
        }
        assert_eq!(
            gate.register_scan("ABC123", ScanKind::Item, 10_000),
            ScanDecision::RateLimited
        );
    }

    #[test]
    fn window_expiry_frees_slots() {
        let gate = gate();
        for i in 0..5u64 {
            gate.register_scan("ABC123", ScanKind::Item, i * 2_000);
        }
        // 8000ms into the window; by 24_000 the first four scans have aged out
        assert_eq!(
            gate.register_scan("ABC123", ScanKind::Item, 24_000),
            ScanDecision::Accepted
        );
    }

    #[test]
    fn identical_value_within_debounce_is_dropped_silently() {
        let gate = gate();
        assert_eq!(
            gate.register_scan("SN-9", ScanKind::Serial, 1_000),
            ScanDecision::Accepted
        );
        assert_eq!(
            gate.register_scan("SN-9", ScanKind::Serial, 1_400),
            ScanDecision::Debounced
        );
        // After the window the same value is a fresh scan again
        assert_eq!(
            gate.register_scan("SN-9", ScanKind::Serial, 2_500),
            ScanDecision::Accepted
        );
    }

    #[test]
    fn alternating_values_are_never_debounced() {
        let gate = gate();
        assert_eq!(
            gate.register_scan("A", ScanKind::Item, 0),
            ScanDecision::Accepted
        );
        assert_eq!(
            gate.register_scan("B", ScanKind::Item, 500),
            ScanDecision::Accepted
        );
        // A again 900ms after its first scan: the immediately preceding
        // value is B, so this is a deliberate re-scan, not a re-trigger
        assert_eq!(
            gate.register_scan("A", ScanKind::Item, 900),
            ScanDecision::Accepted
        );
    }

    #[test]
    fn debounced_scans_do_not_consume_rate_limit_slots() {
        let gate = gate();
        gate.register_scan("ABC123", ScanKind::Item, 0);
        // Ten rapid re-triggers, all debounced
        for i in 1..=10u64 {
            assert_eq!(
                gate.register_scan("ABC123", ScanKind::Item, i * 50),
                ScanDecision::Debounced
            );
        }
        // Only one slot used so far; four more spaced scans stay under the limit
        for i in 1..=4u64 {
            assert_eq!(
                gate.register_scan("ABC123", ScanKind::Item, 1_000 + i * 1_500),
                ScanDecision::Accepted
            );
        }
        assert_eq!(
            gate.register_scan("ABC123", ScanKind::Item, 10_000),
            ScanDecision::RateLimited
        );
    }

    #[test]
    fn distinct_codes_have_independent_windows() {
        let gate = gate();
        for i in 0..5u64 {
            gate.register_scan("A", ScanKind::Item, i * 2_000);
        }
        assert_eq!(
            gate.register_scan("B", ScanKind::Item, 10_000),
            ScanDecision::Accepted
        );
    }

    #[test]
    fn item_and_serial_debounce_are_independent() {
        let gate = gate();
        assert_eq!(
            gate.register_scan("X1", ScanKind::Item, 0),
            ScanDecision::Accepted
        );
        // Same raw value as a serial scan is not a re-trigger of the item scan
        assert_eq!(
            gate.register_scan("X1", ScanKind::Serial, 200),
            ScanDecision::Accepted
        );
    }
}
