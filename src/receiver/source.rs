//! Trait abstraction for inbound payloads to enable testing

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Stream of raw message payloads from one subscribed topic
#[async_trait]
pub trait PayloadSource: Send {
    /// Wait for the next payload.
    ///
    /// `Ok(None)` means the source is closed for good. An `Err` is a transport
    /// problem; the source stays usable and the caller may poll again.
    async fn next_payload(&mut self) -> Result<Option<Bytes>>;
}
