use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

/// Events emitted by the capture engine for the host to observe
/// (analytics, toasts, session dashboards). Delivery is best-effort; a
/// full or closed channel never blocks the workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    ItemResolved {
        item_code: String,
        via_barcode: bool,
    },
    DuplicateDetected {
        item_code: String,
        prior_line_count: usize,
    },
    ScanRateLimited {
        code: String,
    },
    CountLineSubmitted {
        line_id: String,
        item_code: String,
        counted_qty: Decimal,
        variance: Decimal,
    },
    QuantityAddedToLine {
        line_id: String,
        item_code: String,
        added_qty: Decimal,
    },
    SubmissionFailed {
        item_code: String,
        error_code: String,
    },
    ItemVerificationFailed {
        item_code: String,
        reason: String,
    },
    UnknownItemReported {
        session_id: String,
        description: String,
        reported_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Convenience pair for hosts that just want a channel.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self::new(tx), rx)
    }

    /// Sends an event without blocking the capture workflow. Drops the
    /// event (with a log line) when the host is not keeping up.
    pub fn emit(&self, event: Event) {
        if let Err(e) = self.sender.try_send(event) {
            warn!("Dropping engine event, receiver not keeping up: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn emit_delivers_to_receiver() {
        let (sender, mut rx) = EventSender::channel(8);
        sender.emit(Event::ItemResolved {
            item_code: "ITM-1".into(),
            via_barcode: true,
        });
        match rx.recv().await {
            Some(Event::ItemResolved { item_code, via_barcode }) => {
                assert_eq!(item_code, "ITM-1");
                assert!(via_barcode);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn emit_does_not_block_when_full() {
        let (sender, _rx) = EventSender::channel(1);
        sender.emit(Event::ScanRateLimited { code: "A".into() });
        // Second emit overflows the buffer and must return immediately
        sender.emit(Event::CountLineSubmitted {
            line_id: "l1".into(),
            item_code: "ITM-1".into(),
            counted_qty: dec!(1),
            variance: dec!(0),
        });
    }
}
