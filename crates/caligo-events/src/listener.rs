//! event stream listener
//!
//! pulls log notifications from a transport, decodes each payload, and
//! hands typed events to a sink. one notification = one settlement
//! transaction; its events are delivered together and in order. decode
//! failures are logged and skipped — the listener never dies over one
//! bad payload, and transport errors trigger bounded backoff instead of
//! terminating the process.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::decoder::{EventDecoder, PoolEvent};
use crate::error::EventError;

const INITIAL_BACKOFF: Duration = Duration::from_millis(250);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// one transport notification: every event payload emitted by a single
/// settlement transaction
#[derive(Clone, Debug)]
pub struct LogNotification {
    pub settlement_ref: String,
    pub payloads: Vec<Vec<u8>>,
}

/// transport producing log notifications
///
/// `Ok(None)` means the stream ended cleanly; errors are treated as
/// transient and retried with backoff.
pub trait EventSource {
    fn next_notification(
        &mut self,
    ) -> impl Future<Output = Result<Option<LogNotification>, EventError>> + Send;
}

/// consumer of decoded events
///
/// called synchronously, in wire order, for every event of a
/// notification before the next notification is pulled.
pub trait EventSink {
    fn handle(&mut self, settlement_ref: &str, event: PoolEvent) -> Result<(), EventError>;
}

pub struct EventListener<S, K> {
    source: S,
    sink: K,
    decoder: EventDecoder,
}

impl<S: EventSource, K: EventSink> EventListener<S, K> {
    pub fn new(source: S, sink: K) -> Self {
        Self {
            source,
            sink,
            decoder: EventDecoder::new(),
        }
    }

    /// run until the source ends; returns the sink for inspection
    pub async fn run(mut self) -> K {
        let mut backoff = INITIAL_BACKOFF;
        loop {
            match self.source.next_notification().await {
                Ok(Some(notification)) => {
                    backoff = INITIAL_BACKOFF;
                    self.dispatch(&notification);
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("event stream transport error, retrying in {:?}: {}", backoff, e);
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
        self.sink
    }

    fn dispatch(&mut self, notification: &LogNotification) {
        for payload in &notification.payloads {
            match self.decoder.decode(payload) {
                Ok(Some(event)) => {
                    debug!(
                        "decoded {} event in {}",
                        event.name(),
                        notification.settlement_ref
                    );
                    if let Err(e) = self.sink.handle(&notification.settlement_ref, event) {
                        warn!(
                            "sink rejected event in {}: {}",
                            notification.settlement_ref, e
                        );
                    }
                }
                Ok(None) => {
                    debug!(
                        "ignoring unknown event discriminator in {}",
                        notification.settlement_ref
                    );
                }
                Err(e) => {
                    warn!(
                        "skipping undecodable event in {}: {}",
                        notification.settlement_ref, e
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caligo_core::FieldElement;

    use crate::decoder::{DepositEvent, EventDecoder};

    /// scripted source: plays back a fixed sequence of results
    struct ScriptedSource {
        steps: std::vec::IntoIter<Result<Option<LogNotification>, EventError>>,
    }

    impl EventSource for ScriptedSource {
        async fn next_notification(
            &mut self,
        ) -> Result<Option<LogNotification>, EventError> {
            self.steps.next().unwrap_or(Ok(None))
        }
    }

    #[derive(Default)]
    struct CollectingSink {
        seen: Vec<(String, PoolEvent)>,
    }

    impl EventSink for CollectingSink {
        fn handle(&mut self, settlement_ref: &str, event: PoolEvent) -> Result<(), EventError> {
            self.seen.push((settlement_ref.to_string(), event));
            Ok(())
        }
    }

    fn deposit_wire(n: u64) -> Vec<u8> {
        let decoder = EventDecoder::new();
        decoder.encode(&PoolEvent::Deposit(DepositEvent {
            deposit_hash: FieldElement::from_u64(n),
            owner_key: FieldElement::from_u64(2),
            commitment: FieldElement::from_u64(3),
            old_root: FieldElement::from_u64(4),
            new_root: FieldElement::from_u64(5),
            next_leaf_index: n,
            asset_id: FieldElement::from_u64(1),
        }))
    }

    #[tokio::test]
    async fn test_bad_payload_does_not_stop_the_stream() {
        let source = ScriptedSource {
            steps: vec![
                Ok(Some(LogNotification {
                    settlement_ref: "tx-1".into(),
                    payloads: vec![deposit_wire(1), vec![0xde, 0xad], deposit_wire(2)],
                })),
                Ok(Some(LogNotification {
                    settlement_ref: "tx-2".into(),
                    payloads: vec![deposit_wire(3)],
                })),
            ]
            .into_iter(),
        };

        let listener = EventListener::new(source, CollectingSink::default());
        let sink = listener.run().await;

        // the malformed payload was skipped, everything else delivered
        // in order
        assert_eq!(sink.seen.len(), 3);
        assert_eq!(sink.seen[0].0, "tx-1");
        assert_eq!(sink.seen[1].0, "tx-1");
        assert_eq!(sink.seen[2].0, "tx-2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_retries_with_backoff() {
        let source = ScriptedSource {
            steps: vec![
                Err(EventError::Transport("connection reset".into())),
                Ok(Some(LogNotification {
                    settlement_ref: "tx-9".into(),
                    payloads: vec![deposit_wire(9)],
                })),
            ]
            .into_iter(),
        };

        let listener = EventListener::new(source, CollectingSink::default());
        let sink = listener.run().await;

        assert_eq!(sink.seen.len(), 1);
        assert_eq!(sink.seen[0].0, "tx-9");
    }
}
