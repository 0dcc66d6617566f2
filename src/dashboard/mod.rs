//! # Dashboard Module
//!
//! The read path: show the latest stored reading.
//!
//! Each refresh (timer tick or manual) reads the store's last row. A row that
//! differs from the one already on screen is rendered as ten labeled cards;
//! otherwise a "no new data" notice is shown. The dashboard never looks at the
//! receiver's memory, only at the store, so it stays correct across restarts
//! and when the receiver runs in another process.

pub mod cards;

use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::station::format::PersistedRow;
use crate::store::RowStore;

/// What one refresh produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A row not shown before
    Updated(PersistedRow),
    /// Store unchanged since the last refresh (or still empty)
    NoNewData,
}

/// Last row put on screen, used only to suppress redundant renders
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayState {
    last_shown: Option<PersistedRow>,
}

impl DisplayState {
    /// Compare the store's latest row against what is on screen.
    ///
    /// A different row becomes the shown row and yields [`Frame::Updated`].
    pub fn update(&mut self, latest: Option<PersistedRow>) -> Frame {
        match latest {
            Some(row) if self.last_shown.as_ref() != Some(&row) => {
                self.last_shown = Some(row.clone());
                Frame::Updated(row)
            }
            _ => Frame::NoNewData,
        }
    }

    /// Row currently on screen
    pub fn last_shown(&self) -> Option<&PersistedRow> {
        self.last_shown.as_ref()
    }
}

/// Presentation reader over a shared row store
pub struct Dashboard<S: RowStore + ?Sized> {
    store: Arc<S>,
    display: DisplayState,
}

impl<S: RowStore + ?Sized> Dashboard<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            display: DisplayState::default(),
        }
    }

    /// Read the last stored row and decide what to show
    ///
    /// # Errors
    ///
    /// Returns the store's read error; the display state is left untouched.
    pub async fn refresh(&mut self) -> Result<Frame> {
        let latest = self.store.last_row().await?;
        let frame = self.display.update(latest);
        debug!("Dashboard refresh: {}", if matches!(frame, Frame::Updated(_)) { "updated" } else { "no new data" });
        Ok(frame)
    }

    pub fn display(&self) -> &DisplayState {
        &self.display
    }
}
