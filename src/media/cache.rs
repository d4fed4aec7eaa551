//! Per-stream packet cache
//!
//! Groups the caches a late joiner needs, replayed in this order:
//!
//! 1. stream metadata
//! 2. video sequence header
//! 3. audio sequence header
//! 4. retained GOPs
//!
//! so the consumer can set up its decoders before the first frame arrives.

use crate::sink::{PacketSink, SinkError};

use super::gop::GopCache;
use super::packet::{Packet, PacketKind};
use super::special::SpecialCache;

/// Everything replayed to a newly attached sink
#[derive(Debug, Clone, Default)]
pub struct PacketCache {
    metadata: SpecialCache,
    video_header: SpecialCache,
    audio_header: SpecialCache,
    gop: GopCache,
}

impl PacketCache {
    /// Create a cache with the given GOP limits
    ///
    /// Without `max_gop_bytes` the GOP cache is bounded by count only.
    pub fn new(max_gops: usize, max_gop_bytes: Option<usize>) -> Self {
        Self {
            gop: GopCache::with_limits(max_gops, max_gop_bytes.unwrap_or(usize::MAX)),
            ..Self::default()
        }
    }

    /// Route a packet to the cache that owns its kind
    pub fn write(&mut self, packet: Packet) {
        match packet.kind {
            PacketKind::Metadata => self.metadata.write(packet),
            PacketKind::Video if packet.is_header => self.video_header.write(packet),
            PacketKind::Audio if packet.is_header => self.audio_header.write(packet),
            PacketKind::Video | PacketKind::Audio => self.gop.write(packet),
        }
    }

    /// Replay the cache to `sink`, stopping at the first error
    pub async fn send<S: PacketSink + ?Sized>(&self, sink: &mut S) -> Result<(), SinkError> {
        self.metadata.send(sink).await?;
        self.video_header.send(sink).await?;
        self.audio_header.send(sink).await?;
        self.gop.send_to(sink).await
    }

    /// Collect the replay sequence
    pub async fn catchup(&self) -> Vec<Packet> {
        let mut packets = Vec::with_capacity(self.gop.packet_count() + 3);
        // Collecting into a Vec cannot fail
        let _ = self.send(&mut packets).await;
        packets
    }

    /// Drop everything
    pub fn clear(&mut self) {
        self.metadata.clear();
        self.video_header.clear();
        self.audio_header.clear();
        self.gop.clear();
    }

    pub fn metadata(&self) -> Option<&Packet> {
        self.metadata.get()
    }

    pub fn video_header(&self) -> Option<&Packet> {
        self.video_header.get()
    }

    pub fn audio_header(&self) -> Option<&Packet> {
        self.audio_header.get()
    }

    pub fn gop(&self) -> &GopCache {
        &self.gop
    }

    /// Whether nothing is cached
    pub fn is_empty(&self) -> bool {
        !self.metadata.is_full()
            && !self.video_header.is_full()
            && !self.audio_header.is_full()
            && self.gop.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[tokio::test]
    async fn test_replay_order() {
        let mut cache = PacketCache::new(1, None);

        cache.write(Packet::video(33, Bytes::from_static(&[0x17, 0x01]), true));
        cache.write(Packet::audio(40, Bytes::from_static(&[0xAF, 0x01])));
        cache.write(Packet::audio(0, Bytes::from_static(&[0xAF, 0x00])).header());
        cache.write(Packet::video(0, Bytes::from_static(&[0x17, 0x00]), true).header());
        cache.write(Packet::metadata(Bytes::from_static(b"onMetaData")));

        let packets = cache.catchup().await;

        assert_eq!(packets.len(), 5);
        assert!(packets[0].is_metadata());
        assert!(packets[1].is_video() && packets[1].is_header);
        assert!(packets[2].is_audio() && packets[2].is_header);
        assert!(packets[3].is_keyframe);
        assert_eq!(packets[4].timestamp, 40);
    }

    #[tokio::test]
    async fn test_header_is_not_a_gop_boundary() {
        let mut cache = PacketCache::new(1, None);

        cache.write(Packet::video(0, Bytes::from_static(&[0x17, 0x01]), true));
        cache.write(Packet::video(33, Bytes::from_static(&[0x27, 0x01]), false));
        // A keyframe-flagged sequence header must not reset the GOP
        cache.write(Packet::video(40, Bytes::from_static(&[0x17, 0x00]), true).header());

        assert_eq!(cache.gop().packet_count(), 2);
        assert!(cache.video_header().is_some());
    }

    #[tokio::test]
    async fn test_clear() {
        let mut cache = PacketCache::new(1, None);
        cache.write(Packet::metadata(Bytes::from_static(b"meta")));
        cache.write(Packet::video(0, Bytes::from_static(&[0x17, 0x01]), true));
        assert!(!cache.is_empty());

        cache.clear();

        assert!(cache.is_empty());
        assert!(cache.catchup().await.is_empty());
    }
}
