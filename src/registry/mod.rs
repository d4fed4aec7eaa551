//! Stream registry for pub/sub routing
//!
//! The registry manages active streams and routes media from publishers to
//! subscribers.
//!
//! # Architecture
//!
//! ```text
//!                          Arc<StreamRegistry>
//!                     ┌─────────────────────────┐
//!                     │ streams: HashMap<Key,   │
//!                     │   Mutex<StreamEntry {   │
//!                     │     cache,              │
//!                     │     sinks,              │
//!                     │   }>                    │
//!                     │ >                       │
//!                     └───────────┬─────────────┘
//!                                 │
//!         ┌───────────────────────┼───────────────────────┐
//!         │                       │                       │
//!         ▼                       ▼                       ▼
//!    [Publisher]            [Sink worker]           [Sink worker]
//!    dispatch()             queue.recv()            queue.recv()
//!         │                       │                       │
//!         └──► cache + try_send ──┴──► sink.write() ──────┘
//! ```
//!
//! # Copy-on-distribute
//!
//! Payloads are `bytes::Bytes`: every cache and every sink holds its own
//! handle, and none of them can write through it. A sink that rewrites
//! payloads in place takes a private copy with
//! [`Packet::payload_mut`](crate::media::Packet::payload_mut).

pub mod config;
pub mod entry;
pub mod error;
pub mod key;
pub mod store;

pub use config::{Application, ConfigError, RegistryConfig};
pub use entry::{StreamEntry, StreamPhase, StreamStats};
pub use error::RegistryError;
pub use key::StreamKey;
pub use store::{DispatchOutcome, StreamRegistry};
