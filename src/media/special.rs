//! Single-slot packet cache
//!
//! Holds the most recent packet of one special kind (stream metadata or a
//! codec sequence header). Each write replaces the previous packet; late
//! joiners get the stored packet before any media.

use crate::sink::{PacketSink, SinkError};

use super::packet::Packet;

/// Cache for the latest packet of one kind
#[derive(Debug, Clone, Default)]
pub struct SpecialCache {
    packet: Option<Packet>,
}

impl SpecialCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored packet
    pub fn write(&mut self, packet: Packet) {
        self.packet = Some(packet);
    }

    /// Deliver a copy of the stored packet to `sink`
    ///
    /// Does nothing if no packet has been written yet. Errors come from the
    /// sink and mean the sink is unhealthy.
    pub async fn send<S: PacketSink + ?Sized>(&self, sink: &mut S) -> Result<(), SinkError> {
        match &self.packet {
            Some(packet) => sink.write(packet.clone()).await,
            None => Ok(()),
        }
    }

    /// Get the stored packet
    pub fn get(&self) -> Option<&Packet> {
        self.packet.as_ref()
    }

    /// Whether a packet is stored
    pub fn is_full(&self) -> bool {
        self.packet.is_some()
    }

    pub fn clear(&mut self) {
        self.packet = None;
    }
}
