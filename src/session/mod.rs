//! Publish side of a stream
//!
//! A publisher is anything that yields [`Packet`]s in arrival order: an RTMP
//! connection's chunk decoder, a relay pull, or an FLV file. [`PublishSession`]
//! drives one such [`PacketSource`] into the registry.

pub mod flv_reader;
pub mod publish;

use std::future::Future;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::media::Packet;
use crate::pool::BufferPool;

pub use flv_reader::FlvReader;
pub use publish::{PublishSession, PublishSummary};

/// Error produced by a packet source
#[derive(Debug, Error)]
pub enum SourceError {
    /// Underlying transport failed
    #[error("source I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Input is not in the expected container format
    #[error("invalid stream header: {0}")]
    InvalidHeader(&'static str),

    /// Input ended in the middle of a packet
    #[error("stream truncated inside a tag")]
    Truncated,
}

/// Producer of live packets
///
/// `next_packet` yields packets in arrival order, `Ok(None)` once the
/// publisher has finished. Payload buffers should be taken from `pool`.
pub trait PacketSource: Send {
    fn next_packet(
        &mut self,
        pool: &dyn BufferPool,
    ) -> impl Future<Output = Result<Option<Packet>, SourceError>> + Send;
}

/// Packets already decoded elsewhere and handed over through a channel
impl PacketSource for mpsc::Receiver<Packet> {
    async fn next_packet(
        &mut self,
        _pool: &dyn BufferPool,
    ) -> Result<Option<Packet>, SourceError> {
        Ok(self.recv().await)
    }
}
