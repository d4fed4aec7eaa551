//! Media packets and the caches that serve late joiners
//!
//! This module provides:
//! - The [`Packet`] type routed from publisher to subscribers
//! - FLV payload header inspection
//! - Special (single-slot) caches for metadata and sequence headers
//! - The GOP cache that lets subscribers start on a keyframe

pub mod cache;
pub mod flv;
pub mod gop;
pub mod packet;
pub mod special;

pub use cache::PacketCache;
pub use gop::GopCache;
pub use packet::{Packet, PacketKind};
pub use special::SpecialCache;
