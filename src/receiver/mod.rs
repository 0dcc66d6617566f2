//! # Receiver Module
//!
//! The write path: broker payloads are parsed, gated and appended to the store.
//!
//! This module handles:
//! - Decoding and parsing every inbound payload
//! - Threading the [`GatekeeperState`] through each evaluation
//! - Appending persisted rows, with an explicit policy for failed appends
//! - Keeping the latest reading or parse failure as the live status
//! - The indefinite receive loop over a [`PayloadSource`]
//!
//! One failing payload never stops the loop: parse failures and store write
//! failures are logged and the next payload is processed as usual.

pub mod mqtt;
pub mod source;

pub use source::PayloadSource;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::WriteFailurePolicy;
use crate::error::{ParseError, Result};
use crate::gatekeeper::{Decision, Gatekeeper, GatekeeperState, SkipReason};
use crate::station::format::PersistedRow;
use crate::station::parser::parse_payload;
use crate::station::protocol::{Reading, COL_TIME};
use crate::store::RowStore;

/// Number of received messages between status log messages
pub const LOG_INTERVAL_MESSAGES: u64 = 100;

/// What the receiver last saw, for display only; never persisted
#[derive(Debug, Clone, PartialEq, Default)]
pub enum LiveStatus {
    /// Nothing received yet
    #[default]
    Waiting,
    /// Last payload parsed into this reading
    Reading(Reading),
    /// Last payload failed to parse
    Error(ParseError),
}

/// Result of handling one payload
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// Payload did not parse
    Rejected(ParseError),
    /// Reading parsed but the gatekeeper held it back
    Skipped(SkipReason),
    /// Row appended to the store
    Persisted(PersistedRow),
    /// The append failed; `queued` tells whether the row was kept for retry
    WriteFailed { row: PersistedRow, queued: bool },
}

/// Message counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub received: u64,
    pub rejected: u64,
    pub skipped: u64,
    pub persisted: u64,
    pub write_failures: u64,
}

/// Parse → gate → store pipeline, owning the gatekeeper state
pub struct Ingestor<S: RowStore + ?Sized> {
    store: Arc<S>,
    gatekeeper: Gatekeeper,
    state: GatekeeperState,
    write_failure: WriteFailurePolicy,
    max_pending: usize,
    pending: VecDeque<PersistedRow>,
    status: watch::Sender<LiveStatus>,
    stats: IngestStats,
}

impl<S: RowStore + ?Sized> Ingestor<S> {
    /// Creates an ingestor that drops rows whose append fails
    ///
    /// # Arguments
    ///
    /// * `store` - Row store shared with the dashboard
    /// * `gatekeeper` - Persistence policy
    /// * `state` - Initial state, empty or seeded from the store
    pub fn new(store: Arc<S>, gatekeeper: Gatekeeper, state: GatekeeperState) -> Self {
        Self {
            store,
            gatekeeper,
            state,
            write_failure: WriteFailurePolicy::Drop,
            max_pending: 0,
            pending: VecDeque::new(),
            status: watch::channel(LiveStatus::Waiting).0,
            stats: IngestStats::default(),
        }
    }

    /// Choose what happens to a row whose append fails.
    ///
    /// With [`WriteFailurePolicy::Queue`] up to `max_pending` rows are kept and
    /// written, oldest first, ahead of the next row; beyond that the oldest is
    /// discarded.
    #[must_use]
    pub fn with_write_failure_policy(mut self, policy: WriteFailurePolicy, max_pending: usize) -> Self {
        self.write_failure = policy;
        self.max_pending = max_pending;
        self
    }

    /// Latest reading or parse failure
    pub fn status(&self) -> LiveStatus {
        self.status.borrow().clone()
    }

    /// Watch the live status from another task.
    ///
    /// The receiver sees every update made after this call, including while
    /// the ingestor runs inside a spawned receive loop.
    pub fn subscribe_status(&self) -> watch::Receiver<LiveStatus> {
        self.status.subscribe()
    }

    /// Message counters since start
    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    /// Current gatekeeper state
    pub fn state(&self) -> &GatekeeperState {
        &self.state
    }

    /// Rows waiting for a successful append
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Handle one raw payload
    ///
    /// # Arguments
    ///
    /// * `payload` - Raw message bytes
    /// * `now` - Arrival instant, used for the cooldown
    pub async fn handle_payload(&mut self, payload: &[u8], now: Instant) -> IngestOutcome {
        self.stats.received += 1;

        let reading = match parse_payload(payload) {
            Ok(reading) => reading,
            Err(e) => {
                warn!("Discarding payload: {}", e);
                self.stats.rejected += 1;
                self.status.send_replace(LiveStatus::Error(e.clone()));
                return IngestOutcome::Rejected(e);
            }
        };
        self.status.send_replace(LiveStatus::Reading(reading.clone()));

        let (decision, state) = self
            .gatekeeper
            .evaluate(reading, std::mem::take(&mut self.state), now);
        self.state = state;

        match decision {
            Decision::Skip(reason) => {
                debug!("Skipping reading: {:?}", reason);
                self.stats.skipped += 1;
                IngestOutcome::Skipped(reason)
            }
            Decision::Persist(row) => match self.persist(row.clone()).await {
                Ok(()) => {
                    info!("Persisted reading {} {}", row.date(), row.cell(COL_TIME));
                    self.stats.persisted += 1;
                    IngestOutcome::Persisted(row)
                }
                Err(e) => {
                    self.stats.write_failures += 1;
                    let queued = self.write_failure == WriteFailurePolicy::Queue;
                    warn!("Failed to store reading ({}): {}", if queued { "queued" } else { "dropped" }, e);
                    IngestOutcome::WriteFailed { row, queued }
                }
            },
        }
    }

    /// Append a row according to the write-failure policy.
    ///
    /// # Errors
    ///
    /// Returns the store's `StoreWrite` error. Under the queue policy the row
    /// is kept pending, behind any rows that are still unsent.
    pub async fn persist(&mut self, row: PersistedRow) -> Result<()> {
        match self.write_failure {
            WriteFailurePolicy::Drop => self.store.append_row(&row).await,
            WriteFailurePolicy::Queue => {
                if let Err(e) = self.flush_pending().await {
                    self.enqueue(row);
                    return Err(e);
                }
                if let Err(e) = self.store.append_row(&row).await {
                    self.enqueue(row);
                    return Err(e);
                }
                Ok(())
            }
        }
    }

    fn enqueue(&mut self, row: PersistedRow) {
        if self.pending.len() >= self.max_pending {
            if let Some(oldest) = self.pending.pop_front() {
                warn!("Pending queue full, discarding row {} {}", oldest.date(), oldest.cell(COL_TIME));
            }
        }
        self.pending.push_back(row);
    }

    /// Write queued rows in order, stopping at the first failure
    async fn flush_pending(&mut self) -> Result<()> {
        while let Some(row) = self.pending.front() {
            self.store.append_row(row).await?;
            debug!("Wrote queued row {} {}", row.date(), row.cell(COL_TIME));
            self.pending.pop_front();
        }
        Ok(())
    }
}

/// Gatekeeper state rebuilt from the store's last row.
///
/// A store that cannot be read yields the empty state; startup goes on and
/// the first reading is persisted as if the store were new.
pub async fn seed_state<S: RowStore + ?Sized>(store: &S) -> GatekeeperState {
    match store.last_row().await {
        Ok(last_row) => GatekeeperState::seed(last_row),
        Err(e) => {
            warn!("Failed to read last stored row, starting unseeded: {}", e);
            GatekeeperState::default()
        }
    }
}

/// Receive loop: feed every payload from `source` into `ingestor`.
///
/// Transport errors are logged and followed by `retry_delay` before polling
/// again; reconnecting itself is left to the source. Returns only when the
/// source closes.
pub async fn run<P, S>(source: &mut P, ingestor: &mut Ingestor<S>, retry_delay: Duration)
where
    P: PayloadSource + ?Sized,
    S: RowStore + ?Sized,
{
    loop {
        match source.next_payload().await {
            Ok(Some(payload)) => {
                debug!("Received payload ({} bytes)", payload.len());
                ingestor.handle_payload(&payload, Instant::now()).await;

                let stats = ingestor.stats();
                if stats.received % LOG_INTERVAL_MESSAGES == 0 {
                    info!(
                        "Received {} messages: {} persisted, {} skipped, {} rejected, {} write failures",
                        stats.received, stats.persisted, stats.skipped, stats.rejected, stats.write_failures
                    );
                }
            }
            Ok(None) => {
                info!("Payload source closed");
                break;
            }
            Err(e) => {
                warn!("Transport error: {}", e);
                tokio::time::sleep(retry_delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AwsMonitorError;
    use crate::receiver::source::mocks::ScriptedSource;
    use crate::store::store_trait::mocks::MemoryRowStore;
    use crate::store::store_trait::MockRowStore;

    const SAMPLE: &str = "12:00:00 01-01-2024 Temp=25.35 Kelembaban=60 W.Speed=3.2 W.Dir=180 \
                          Press=1012.4 Hujan=0.5 Rad=120.0 Signal=-70";

    fn sample_with_temperature(temperature: &str) -> String {
        SAMPLE.replace("25.35", temperature)
    }

    fn ingestor(store: &MemoryRowStore) -> Ingestor<MemoryRowStore> {
        Ingestor::new(Arc::new(store.clone()), Gatekeeper::default(), GatekeeperState::default())
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[tokio::test]
    async fn test_end_to_end_sample_row() {
        let store = MemoryRowStore::new();
        let mut ingestor = ingestor(&store);

        let outcome = ingestor.handle_payload(SAMPLE.as_bytes(), Instant::now()).await;

        assert!(matches!(outcome, IngestOutcome::Persisted(_)));
        let rows = store.data_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].cells(),
            &["01-01-2024", "12:00:00", "25.3", "60", "3.2", "180", "1012.4", "0.5", "120.0", "-70"]
                .map(String::from)
        );
    }

    #[tokio::test]
    async fn test_identical_payloads_persist_once() {
        let store = MemoryRowStore::new();
        let mut ingestor = ingestor(&store);
        let t0 = Instant::now();

        ingestor.handle_payload(SAMPLE.as_bytes(), t0).await;
        let second = ingestor.handle_payload(SAMPLE.as_bytes(), t0 + secs(10)).await;

        assert_eq!(second, IngestOutcome::Skipped(SkipReason::Duplicate));
        assert_eq!(store.data_rows().len(), 1);
    }

    #[tokio::test]
    async fn test_rate_limited_payloads() {
        let store = MemoryRowStore::new();
        let mut ingestor = ingestor(&store);
        let t0 = Instant::now();

        ingestor.handle_payload(sample_with_temperature("25.0").as_bytes(), t0).await;
        ingestor.handle_payload(sample_with_temperature("26.0").as_bytes(), t0 + secs(10)).await;
        assert_eq!(store.data_rows().len(), 1);
        assert_eq!(store.data_rows()[0].cell(2), "25.0");

        ingestor.handle_payload(sample_with_temperature("27.0").as_bytes(), t0 + secs(70)).await;
        let rows = store.data_rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].cell(2), "27.0");
    }

    #[tokio::test]
    async fn test_parse_failure_sets_error_status_and_is_not_stored() {
        let store = MemoryRowStore::new();
        let mut ingestor = ingestor(&store);
        let t0 = Instant::now();

        ingestor.handle_payload(SAMPLE.as_bytes(), t0).await;
        assert!(matches!(ingestor.status(), LiveStatus::Reading(_)));

        let outcome = ingestor.handle_payload(b"Temp=25.0 garbage", t0 + secs(100)).await;

        assert!(matches!(outcome, IngestOutcome::Rejected(ParseError::MissingField { .. })));
        assert!(matches!(ingestor.status(), LiveStatus::Error(_)));
        assert_eq!(store.data_rows().len(), 1);
        assert_eq!(ingestor.stats().rejected, 1);
    }

    #[tokio::test]
    async fn test_status_is_visible_to_subscribers() {
        let store = MemoryRowStore::new();
        let mut ingestor = ingestor(&store);
        let mut status = ingestor.subscribe_status();
        assert_eq!(*status.borrow(), LiveStatus::Waiting);

        ingestor.handle_payload(b"Temp=oops", Instant::now()).await;
        assert!(status.has_changed().unwrap());
        assert!(matches!(
            &*status.borrow_and_update(),
            LiveStatus::Error(ParseError::InvalidNumber { field: "Temp", .. })
        ));

        ingestor.handle_payload(SAMPLE.as_bytes(), Instant::now()).await;
        assert!(matches!(&*status.borrow_and_update(), LiveStatus::Reading(r) if r.signal == -70));
    }

    #[tokio::test]
    async fn test_status_survives_spawned_receive_loop() {
        let store = MemoryRowStore::new();
        let mut ingestor = ingestor(&store);
        let status = ingestor.subscribe_status();
        let mut source = ScriptedSource::new().payload(SAMPLE).payload("Kelembaban=60");

        tokio::spawn(async move {
            run(&mut source, &mut ingestor, Duration::from_millis(1)).await;
        })
        .await
        .unwrap();

        assert!(matches!(
            &*status.borrow(),
            LiveStatus::Error(ParseError::MissingField { field: "Temp" })
        ));
        assert_eq!(store.data_rows().len(), 1);
    }

    #[tokio::test]
    async fn test_parse_failure_does_not_touch_gatekeeper_state() {
        let store = MemoryRowStore::new();
        let mut ingestor = ingestor(&store);
        let t0 = Instant::now();

        ingestor.handle_payload(SAMPLE.as_bytes(), t0).await;
        let before = ingestor.state().clone();
        ingestor.handle_payload(&[0xFF, 0xFE], t0 + secs(1)).await;

        assert_eq!(ingestor.state(), &before);
    }

    #[tokio::test]
    async fn test_write_failure_is_dropped_by_default() {
        let store = MemoryRowStore::new();
        store.set_fail_writes(true);
        let mut ingestor = ingestor(&store);

        let outcome = ingestor.handle_payload(SAMPLE.as_bytes(), Instant::now()).await;

        assert!(matches!(outcome, IngestOutcome::WriteFailed { queued: false, .. }));
        assert_eq!(ingestor.pending(), 0);
        assert_eq!(ingestor.stats().write_failures, 1);
    }

    #[tokio::test]
    async fn test_queued_rows_are_written_in_order_after_recovery() {
        let store = MemoryRowStore::new();
        let mut ingestor = ingestor(&store).with_write_failure_policy(WriteFailurePolicy::Queue, 10);
        let t0 = Instant::now();

        store.set_fail_writes(true);
        let first = ingestor.handle_payload(sample_with_temperature("25.0").as_bytes(), t0).await;
        ingestor.handle_payload(sample_with_temperature("26.0").as_bytes(), t0 + secs(61)).await;
        assert!(matches!(first, IngestOutcome::WriteFailed { queued: true, .. }));
        assert_eq!(ingestor.pending(), 2);

        store.set_fail_writes(false);
        let outcome = ingestor.handle_payload(sample_with_temperature("27.0").as_bytes(), t0 + secs(122)).await;

        assert!(matches!(outcome, IngestOutcome::Persisted(_)));
        assert_eq!(ingestor.pending(), 0);
        let temperatures: Vec<String> = store.data_rows().iter().map(|r| r.cell(2).to_string()).collect();
        assert_eq!(temperatures, ["25.0", "26.0", "27.0"]);
    }

    #[tokio::test]
    async fn test_queue_discards_oldest_when_full() {
        let store = MemoryRowStore::new();
        let mut ingestor = ingestor(&store).with_write_failure_policy(WriteFailurePolicy::Queue, 2);
        let t0 = Instant::now();

        store.set_fail_writes(true);
        for (i, temperature) in ["20.0", "21.0", "22.0"].into_iter().enumerate() {
            let now = t0 + secs(61 * i as u64);
            ingestor.handle_payload(sample_with_temperature(temperature).as_bytes(), now).await;
        }
        assert_eq!(ingestor.pending(), 2);

        store.set_fail_writes(false);
        ingestor.handle_payload(sample_with_temperature("23.0").as_bytes(), t0 + secs(200)).await;

        let temperatures: Vec<String> = store.data_rows().iter().map(|r| r.cell(2).to_string()).collect();
        assert_eq!(temperatures, ["21.0", "22.0", "23.0"]);
    }

    #[tokio::test]
    async fn test_write_failure_reported_by_mocked_store() {
        let mut store = MockRowStore::new();
        store
            .expect_append_row()
            .times(1)
            .returning(|_| Err(AwsMonitorError::StoreWrite("sheet unavailable".to_string())));
        let mut ingestor = Ingestor::new(Arc::new(store), Gatekeeper::default(), GatekeeperState::default());

        let outcome = ingestor.handle_payload(SAMPLE.as_bytes(), Instant::now()).await;

        let IngestOutcome::WriteFailed { row, queued } = outcome else {
            panic!("expected WriteFailed, got {:?}", outcome);
        };
        assert!(!queued);
        assert_eq!(row.cell(2), "25.3");
    }

    #[tokio::test]
    async fn test_mocked_store_receives_canonical_row() {
        let mut store = MockRowStore::new();
        store
            .expect_append_row()
            .withf(|row: &PersistedRow| row.cell(2) == "25.3" && row.cell(9) == "-70")
            .times(1)
            .returning(|_| Ok(()));
        let mut ingestor = Ingestor::new(Arc::new(store), Gatekeeper::default(), GatekeeperState::default());

        let outcome = ingestor.handle_payload(SAMPLE.as_bytes(), Instant::now()).await;
        assert!(matches!(outcome, IngestOutcome::Persisted(_)));
    }

    #[tokio::test]
    async fn test_run_survives_bad_payloads_and_transport_errors() {
        let store = MemoryRowStore::new();
        let mut ingestor = ingestor(&store);
        let mut source = ScriptedSource::new()
            .payload("not a reading")
            .raw(&[0xC3, 0x28])
            .transport_error("connection reset")
            .payload(SAMPLE)
            .payload(SAMPLE);

        run(&mut source, &mut ingestor, Duration::from_millis(1)).await;

        assert_eq!(source.remaining(), 0);
        let stats = ingestor.stats();
        assert_eq!(stats.received, 4);
        assert_eq!(stats.rejected, 2);
        assert_eq!(stats.persisted, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(store.data_rows().len(), 1);
        assert!(matches!(ingestor.status(), LiveStatus::Reading(_)));
    }

    #[tokio::test]
    async fn test_seed_state_from_store() {
        let store = MemoryRowStore::new();
        let mut first = ingestor(&store);
        first.handle_payload(SAMPLE.as_bytes(), Instant::now()).await;

        let state = seed_state(&store).await;
        assert_eq!(state.last_persisted_row(), store.data_rows().last());
        assert_eq!(state.last_persisted_at(), None);

        // Restarted ingestor does not write the same reading again
        let mut restarted = Ingestor::new(Arc::new(store.clone()), Gatekeeper::default(), state);
        let outcome = restarted.handle_payload(SAMPLE.as_bytes(), Instant::now()).await;
        assert_eq!(outcome, IngestOutcome::Skipped(SkipReason::Duplicate));
    }

    #[tokio::test]
    async fn test_seed_state_falls_back_when_store_unreadable() {
        let mut store = MockRowStore::new();
        store
            .expect_last_row()
            .times(1)
            .returning(|| Err(AwsMonitorError::StoreRead("corrupt".to_string())));

        assert_eq!(seed_state(&store).await, GatekeeperState::default());
    }

    #[tokio::test]
    async fn test_run_returns_when_source_closes() {
        let store = MemoryRowStore::new();
        let mut ingestor = ingestor(&store);
        let mut source = ScriptedSource::new();

        run(&mut source, &mut ingestor, Duration::from_millis(1)).await;

        assert_eq!(ingestor.stats(), IngestStats::default());
        assert_eq!(ingestor.status(), LiveStatus::Waiting);
    }
}
