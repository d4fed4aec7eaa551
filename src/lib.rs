//! Live stream packet cache and fan-out core
//!
//! Sits between an RTMP (or any other) ingest and its consumers. One
//! publisher per stream pushes [`Packet`](media::Packet)s into a
//! [`StreamRegistry`]; every attached [`PacketSink`](sink::PacketSink) gets
//! them in order, and sinks that join late first receive the stream's
//! metadata, codec sequence headers and most recent GOP so they can start
//! decoding at a keyframe.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use rtmp_fanout::media::Packet;
//! use rtmp_fanout::sink::ChannelSink;
//! use rtmp_fanout::{StreamKey, StreamRegistry};
//!
//! # async fn example() -> rtmp_fanout::Result<()> {
//! let registry = Arc::new(StreamRegistry::new());
//! let key = StreamKey::new("live", "cam1");
//!
//! registry.publish(&key, 1).await?;
//!
//! let (sink, mut packets) = ChannelSink::new(256);
//! registry.attach(&key, sink).await?;
//!
//! registry
//!     .dispatch(&key, Packet::video(0, bytes::Bytes::from_static(&[0x17, 0x01]), true))
//!     .await?;
//! assert!(packets.recv().await.is_some());
//!
//! registry.unpublish(&key, 1).await?;
//! # Ok(())
//! # }
//! ```
//!
//! Slow or failing sinks are detached without holding up the publisher or
//! the other sinks.

pub mod error;
pub mod media;
pub mod pool;
pub mod registry;
pub mod session;
pub mod sink;

pub use error::{Error, Result};
pub use registry::{RegistryConfig, StreamKey, StreamRegistry};
