//! Subscriber sinks
//!
//! Every downstream consumer (HLS segmenter, FLV/RTMP relay writer, control
//! plane tap, player connection) is a [`PacketSink`]. The registry only ever
//! talks to this trait. Each attached sink is driven by its own task fed
//! through a bounded queue, so a slow sink can never hold up the publisher or
//! the other sinks.

mod worker;

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::media::Packet;

pub(crate) use worker::{SinkHandle, WorkerParams};

/// Identifier of an attached sink, unique within a registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SinkId(pub u64);

impl std::fmt::Display for SinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sink-{}", self.0)
    }
}

/// Role of a sink, checked against per-application enable flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    /// RTMP play connection
    Player,
    /// HLS segmenter
    Segmenter,
    /// HTTP-FLV or RTMP relay writer
    Relay,
    /// Control-plane observer
    Tap,
}

/// Error returned by a sink
#[derive(Debug, Error)]
pub enum SinkError {
    /// I/O error on the sink's transport
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Sink has been closed
    #[error("sink closed")]
    Closed,

    /// Write did not complete in time
    #[error("sink write timed out after {0:?}")]
    Timeout(Duration),

    /// Sink's delivery queue overflowed
    #[error("sink queue full")]
    Overflow,

    /// Sink refused the packet
    #[error("sink rejected packet: {0}")]
    Rejected(String),
}

/// Downstream consumer of live packets
///
/// `write` and `close` are called from the sink's delivery task. A sink must
/// not keep the packet's payload around expecting to mutate it; use
/// [`Packet::payload_mut`] for a private copy.
pub trait PacketSink: Send {
    /// Deliver one packet
    fn write(&mut self, packet: Packet) -> impl Future<Output = Result<(), SinkError>> + Send;

    /// Release the sink's resources; no more writes follow
    fn close(&mut self) -> impl Future<Output = Result<(), SinkError>> + Send;

    /// Role of this sink
    fn kind(&self) -> SinkKind {
        SinkKind::Player
    }
}

/// Collects packets in memory
///
/// Used to snapshot caches; never fails.
impl PacketSink for Vec<Packet> {
    async fn write(&mut self, packet: Packet) -> Result<(), SinkError> {
        self.push(packet);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Sink that forwards packets into a channel
///
/// Handy for taps and for connection tasks that already own a receive loop.
/// Closing drops the sender, so the receiver sees the end of the stream.
pub struct ChannelSink {
    tx: Option<mpsc::Sender<Packet>>,
    kind: SinkKind,
}

impl ChannelSink {
    /// Create a sink and the receiver for its packets
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Packet>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                tx: Some(tx),
                kind: SinkKind::Player,
            },
            rx,
        )
    }

    /// Set the role reported by this sink
    pub fn with_kind(mut self, kind: SinkKind) -> Self {
        self.kind = kind;
        self
    }
}

impl PacketSink for ChannelSink {
    async fn write(&mut self, packet: Packet) -> Result<(), SinkError> {
        let tx = self.tx.as_ref().ok_or(SinkError::Closed)?;
        tx.send(packet).await.map_err(|_| SinkError::Closed)
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        self.tx = None;
        Ok(())
    }

    fn kind(&self) -> SinkKind {
        self.kind
    }
}
