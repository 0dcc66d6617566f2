//! # Persistence Gatekeeper
//!
//! Decides whether a freshly parsed [`Reading`] is written to the row store.
//!
//! Two rules run on every reading, in order:
//!
//! 1. **Day rollover**: when the reading's date differs from the last date seen,
//!    the cumulative rain counter is forced to `0.0` (the physical gauge resets
//!    at local midnight). The very first dated reading only initializes the
//!    remembered date.
//! 2. **Dedup gate**: the reading is formatted into its canonical
//!    [`PersistedRow`] and persisted only if that row differs from the last
//!    persisted row *and* more than the cooldown (60 s by default) has passed
//!    since the last write. This caps the write rate at one row per cooldown
//!    while still capturing every distinct reading that outlives it.
//!
//! ## Usage
//!
//! ```
//! use std::time::{Duration, Instant};
//! use aws_monitor::gatekeeper::{Decision, Gatekeeper, GatekeeperState};
//! use aws_monitor::station::parser::parse;
//!
//! let gatekeeper = Gatekeeper::new(Duration::from_secs(60), true);
//! let reading = parse(
//!     "12:00:00 01-01-2024 Temp=25.35 Kelembaban=60 W.Speed=3.2 W.Dir=180 \
//!      Press=1012.4 Hujan=0.5 Rad=120.0 Signal=-70",
//! ).unwrap();
//!
//! let (decision, state) = gatekeeper.evaluate(reading.clone(), GatekeeperState::default(), Instant::now());
//! assert!(matches!(decision, Decision::Persist(_)));
//!
//! // The same reading right after is a duplicate
//! let (decision, _) = gatekeeper.evaluate(reading, state, Instant::now());
//! assert!(matches!(decision, Decision::Skip(_)));
//! ```

mod state;

pub use state::GatekeeperState;

use std::time::{Duration, Instant};

use tracing::debug;

use crate::station::format::PersistedRow;
use crate::station::protocol::Reading;

/// Default minimum time between two persisted rows
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// Why a reading was not persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Formatted row equals the last persisted row
    Duplicate,
    /// Row changed, but the cooldown since the last write has not elapsed
    Cooldown,
}

/// Outcome of evaluating one reading
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Append this row to the store
    Persist(PersistedRow),
    /// Do not write anything
    Skip(SkipReason),
}

/// Persistence policy: cooldown length and the day-rollover rule.
///
/// Holds no mutable state; the remembered state is a [`GatekeeperState`]
/// value threaded through [`Gatekeeper::evaluate`] by its owner.
#[derive(Debug, Clone, Copy)]
pub struct Gatekeeper {
    cooldown: Duration,
    reset_rain_on_new_day: bool,
}

impl Default for Gatekeeper {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN, true)
    }
}

impl Gatekeeper {
    /// Creates a gatekeeper
    ///
    /// # Arguments
    ///
    /// * `cooldown` - A changed row is only persisted once strictly more than this has elapsed
    /// * `reset_rain_on_new_day` - Apply the day-rollover rain reset
    #[must_use]
    pub fn new(cooldown: Duration, reset_rain_on_new_day: bool) -> Self {
        Self {
            cooldown,
            reset_rain_on_new_day,
        }
    }

    /// Returns the configured cooldown
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Evaluate one reading against the remembered state
    ///
    /// # Arguments
    ///
    /// * `reading` - Freshly parsed reading
    /// * `state` - State left by the previous evaluation (or seeded from the store)
    /// * `now` - Current monotonic instant
    ///
    /// # Returns
    ///
    /// The decision and the state to pass to the next call. On `Skip` only the
    /// remembered date may have changed; on `Persist` the row and instant are
    /// recorded as the last write.
    pub fn evaluate(
        &self,
        mut reading: Reading,
        mut state: GatekeeperState,
        now: Instant,
    ) -> (Decision, GatekeeperState) {
        if let Some(date) = reading.date {
            match state.last_seen_date {
                Some(previous) if previous != date => {
                    if self.reset_rain_on_new_day {
                        debug!("Date changed {} -> {}, resetting rain from {}", previous, date, reading.rain_mm);
                        reading.rain_mm = 0.0;
                    }
                    state.last_seen_date = Some(date);
                }
                Some(_) => {}
                None => state.last_seen_date = Some(date),
            }
        }

        let row = PersistedRow::from_reading(&reading);

        if state.last_persisted_row.as_ref() == Some(&row) {
            return (Decision::Skip(SkipReason::Duplicate), state);
        }

        if !self.cooldown_elapsed(&state, now) {
            return (Decision::Skip(SkipReason::Cooldown), state);
        }

        state.last_persisted_row = Some(row.clone());
        state.last_persisted_at = Some(now);
        (Decision::Persist(row), state)
    }

    fn cooldown_elapsed(&self, state: &GatekeeperState, now: Instant) -> bool {
        match state.last_persisted_at {
            Some(at) => now.saturating_duration_since(at) > self.cooldown,
            None => true,
        }
    }
}
