//! Trait abstraction for the row store to enable testing

use async_trait::async_trait;

use crate::error::Result;
use crate::station::format::PersistedRow;

/// Append-only table of [`PersistedRow`]s under a fixed 10-column header.
///
/// Rows are never edited or removed; row order is append order. Writers only
/// append and readers only look at the last row, so a store may be shared
/// between the receiver and the dashboard without further locking.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RowStore: Send + Sync {
    /// Write the header row if the store does not start with one.
    ///
    /// Returns `true` when the header was written.
    async fn ensure_header(&self) -> Result<bool>;

    /// Most recently appended data row, or `None` if there is none
    async fn last_row(&self) -> Result<Option<PersistedRow>>;

    /// Append one full row at the end of the store
    async fn append_row(&self, row: &PersistedRow) -> Result<()>;
}
