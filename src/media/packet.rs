//! Media packets routed through the distributor
//!
//! A [`Packet`] is one decoded media unit as produced by the protocol codec.
//! Its payload is a `Bytes`, so cloning a packet is a reference-count bump
//! and no holder can mutate bytes another holder is reading. Consumers that
//! need to rewrite the payload take their own copy with
//! [`Packet::payload_mut`].

use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use super::flv;
use crate::registry::StreamKey;

/// Kind of media carried by a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    /// Audio frame
    Audio,
    /// Video frame
    Video,
    /// Stream metadata (onMetaData / @setDataFrame)
    Metadata,
}

/// One media unit
#[derive(Debug, Clone)]
pub struct Packet {
    /// Kind of media
    pub kind: PacketKind,
    /// Stream-relative timestamp in milliseconds
    pub timestamp: u32,
    /// Payload bytes (FLV tag body)
    pub payload: Bytes,
    /// Whether this is a keyframe (video only)
    pub is_keyframe: bool,
    /// Whether this is a codec sequence header
    pub is_header: bool,
    /// Stream the packet was published on, set on dispatch
    pub stream: Option<Arc<StreamKey>>,
}

impl Packet {
    /// Create a video packet
    pub fn video(timestamp: u32, payload: Bytes, is_keyframe: bool) -> Self {
        Self {
            kind: PacketKind::Video,
            timestamp,
            payload,
            is_keyframe,
            is_header: false,
            stream: None,
        }
    }

    /// Create an audio packet
    pub fn audio(timestamp: u32, payload: Bytes) -> Self {
        Self {
            kind: PacketKind::Audio,
            timestamp,
            payload,
            is_keyframe: false,
            is_header: false,
            stream: None,
        }
    }

    /// Create a metadata packet
    pub fn metadata(payload: Bytes) -> Self {
        Self {
            kind: PacketKind::Metadata,
            timestamp: 0,
            payload,
            is_keyframe: false,
            is_header: false,
            stream: None,
        }
    }

    /// Mark this packet as a codec sequence header
    pub fn header(mut self) -> Self {
        self.is_header = true;
        self
    }

    /// Classify an RTMP message body
    ///
    /// Returns `None` for message types that carry no media.
    pub fn from_rtmp(message_type: u8, timestamp: u32, payload: Bytes) -> Option<Self> {
        let packet = match message_type {
            flv::MSG_VIDEO => {
                let is_keyframe = flv::is_video_keyframe(&payload);
                let is_header = flv::is_video_sequence_header(&payload);
                Self {
                    is_header,
                    ..Self::video(timestamp, payload, is_keyframe)
                }
            }
            flv::MSG_AUDIO => {
                let is_header = flv::is_audio_sequence_header(&payload);
                Self {
                    is_header,
                    ..Self::audio(timestamp, payload)
                }
            }
            flv::MSG_DATA_AMF0 | flv::MSG_DATA_AMF3 => Self {
                timestamp,
                ..Self::metadata(payload)
            },
            _ => return None,
        };
        Some(packet)
    }

    /// Copy the payload into a buffer the caller may mutate freely
    pub fn payload_mut(&self) -> BytesMut {
        BytesMut::from(&self.payload[..])
    }

    /// Size of the payload in bytes
    pub fn size(&self) -> usize {
        self.payload.len()
    }

    pub fn is_video(&self) -> bool {
        self.kind == PacketKind::Video
    }

    pub fn is_audio(&self) -> bool {
        self.kind == PacketKind::Audio
    }

    pub fn is_metadata(&self) -> bool {
        self.kind == PacketKind::Metadata
    }
}
