//! Remembered gatekeeper state.

use std::time::Instant;

use chrono::NaiveDate;
use tracing::debug;

use crate::station::format::PersistedRow;
use crate::station::protocol::DATE_FORMAT;

/// What the gatekeeper remembers between readings.
///
/// Lives only in memory and is owned by exactly one receiver. After a restart
/// it can be rebuilt from the store's last row with [`GatekeeperState::seed`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GatekeeperState {
    pub(super) last_persisted_row: Option<PersistedRow>,
    pub(super) last_persisted_at: Option<Instant>,
    pub(super) last_seen_date: Option<NaiveDate>,
}

impl GatekeeperState {
    /// Rebuild state from the last row found in the store.
    ///
    /// The row becomes the duplicate reference and its date the last seen date.
    /// The write instant stays unset: the previous process's cooldown does not
    /// carry over, so the next distinct reading is written right away.
    pub fn seed(last_row: Option<PersistedRow>) -> Self {
        let Some(row) = last_row else {
            return Self::default();
        };

        let last_seen_date = NaiveDate::parse_from_str(row.date(), DATE_FORMAT).ok();
        debug!("Seeded gatekeeper from stored row dated {:?}", last_seen_date);

        Self {
            last_persisted_row: Some(row),
            last_persisted_at: None,
            last_seen_date,
        }
    }

    /// Last row handed out for persisting
    pub fn last_persisted_row(&self) -> Option<&PersistedRow> {
        self.last_persisted_row.as_ref()
    }

    /// Instant of the last persist decision
    pub fn last_persisted_at(&self) -> Option<Instant> {
        self.last_persisted_at
    }

    /// Date of the most recent dated reading
    pub fn last_seen_date(&self) -> Option<NaiveDate> {
        self.last_seen_date
    }
}
