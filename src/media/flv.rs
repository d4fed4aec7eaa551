//! FLV payload header inspection
//!
//! RTMP audio and video messages carry FLV tag bodies. The first byte (and
//! for AVC/AAC the second) tells the distributor everything it needs to route
//! a packet: whether it is a keyframe and whether it is a codec sequence
//! header.
//!
//! RTMP Video Data:
//! ```text
//! +----------+----------+----------------+
//! | FrameType| CodecID  | AVCPacketType  | ...
//! | (4 bits) | (4 bits) | (8 bits, AVC)  |
//! +----------+----------+----------------+
//! ```
//!
//! RTMP Audio Data:
//! ```text
//! +-----------+----------+----------+----------+----------------+
//! |SoundFormat|SoundRate |SoundSize |SoundType | AACPacketType  | ...
//! | (4 bits)  | (2 bits) | (1 bit)  | (1 bit)  | (8 bits, AAC)  |
//! +-----------+----------+----------+----------+----------------+
//! ```

/// RTMP message type id for audio
pub const MSG_AUDIO: u8 = 8;
/// RTMP message type id for video
pub const MSG_VIDEO: u8 = 9;
/// RTMP message type id for AMF0 data (onMetaData / @setDataFrame)
pub const MSG_DATA_AMF0: u8 = 18;
/// RTMP message type id for AMF3 data
pub const MSG_DATA_AMF3: u8 = 15;

/// Video frame type (upper 4 bits of first byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoFrameType {
    /// Keyframe (for AVC, a seekable frame)
    Keyframe = 1,
    /// Inter frame (for AVC, a non-seekable frame)
    InterFrame = 2,
    /// Disposable inter frame (H.263 only)
    DisposableInterFrame = 3,
    /// Generated keyframe (reserved for server use)
    GeneratedKeyframe = 4,
    /// Video info/command frame
    VideoInfoFrame = 5,
}

impl VideoFrameType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match (b >> 4) & 0x0F {
            1 => Some(VideoFrameType::Keyframe),
            2 => Some(VideoFrameType::InterFrame),
            3 => Some(VideoFrameType::DisposableInterFrame),
            4 => Some(VideoFrameType::GeneratedKeyframe),
            5 => Some(VideoFrameType::VideoInfoFrame),
            _ => None,
        }
    }

    pub fn is_keyframe(&self) -> bool {
        matches!(
            self,
            VideoFrameType::Keyframe | VideoFrameType::GeneratedKeyframe
        )
    }
}

/// Video codec ID (lower 4 bits of first byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    SorensonH263 = 2,
    ScreenVideo = 3,
    Vp6 = 4,
    Vp6Alpha = 5,
    ScreenVideoV2 = 6,
    /// AVC (H.264)
    Avc = 7,
    /// HEVC (H.265), legacy FLV extension id
    Hevc = 12,
}

impl VideoCodec {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b & 0x0F {
            2 => Some(VideoCodec::SorensonH263),
            3 => Some(VideoCodec::ScreenVideo),
            4 => Some(VideoCodec::Vp6),
            5 => Some(VideoCodec::Vp6Alpha),
            6 => Some(VideoCodec::ScreenVideoV2),
            7 => Some(VideoCodec::Avc),
            12 => Some(VideoCodec::Hevc),
            _ => None,
        }
    }

    /// Codecs whose second byte is a packet type (0 = sequence header)
    fn has_packet_type(&self) -> bool {
        matches!(self, VideoCodec::Avc | VideoCodec::Hevc)
    }
}

/// Audio format (upper 4 bits of first byte); only the formats the
/// distributor cares about are named.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Mp3,
    Aac,
    Other(u8),
}

impl AudioFormat {
    pub fn from_byte(b: u8) -> Self {
        match (b >> 4) & 0x0F {
            2 => AudioFormat::Mp3,
            10 => AudioFormat::Aac,
            other => AudioFormat::Other(other),
        }
    }
}

/// Check whether a video payload starts a decodable picture
pub fn is_video_keyframe(data: &[u8]) -> bool {
    data.first()
        .and_then(|&b| VideoFrameType::from_byte(b))
        .map(|ft| ft.is_keyframe())
        .unwrap_or(false)
}

/// Check whether a video payload is a decoder configuration record
pub fn is_video_sequence_header(data: &[u8]) -> bool {
    match data {
        [first, packet_type, ..] => {
            VideoCodec::from_byte(*first).is_some_and(|c| c.has_packet_type()) && *packet_type == 0
        }
        _ => false,
    }
}

/// Check whether an audio payload is an AAC AudioSpecificConfig
pub fn is_audio_sequence_header(data: &[u8]) -> bool {
    match data {
        [first, packet_type, ..] => {
            AudioFormat::from_byte(*first) == AudioFormat::Aac && *packet_type == 0
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_frame_type() {
        assert_eq!(
            VideoFrameType::from_byte(0x17),
            Some(VideoFrameType::Keyframe)
        );
        assert_eq!(VideoCodec::from_byte(0x17), Some(VideoCodec::Avc));
        assert_eq!(
            VideoFrameType::from_byte(0x27),
            Some(VideoFrameType::InterFrame)
        );
        assert_eq!(VideoFrameType::from_byte(0x00), None);
        assert_eq!(VideoFrameType::from_byte(0x60), None);
    }

    #[test]
    fn test_keyframe_detection() {
        assert!(is_video_keyframe(&[0x17, 0x01]));
        assert!(is_video_keyframe(&[0x47]));
        assert!(!is_video_keyframe(&[0x27, 0x01]));
        assert!(!is_video_keyframe(&[]));
    }

    #[test]
    fn test_avc_sequence_header() {
        assert!(is_video_sequence_header(&[0x17, 0x00, 0x00, 0x00, 0x00]));
        assert!(!is_video_sequence_header(&[0x17, 0x01, 0x00, 0x00, 0x00]));
        assert!(is_video_sequence_header(&[0x1C, 0x00]));
        // Sorenson has no packet type byte
        assert!(!is_video_sequence_header(&[0x12, 0x00]));
        assert!(!is_video_sequence_header(&[0x17]));
    }

    #[test]
    fn test_aac_sequence_header() {
        assert!(is_audio_sequence_header(&[0xAF, 0x00, 0x12, 0x10]));
        assert!(!is_audio_sequence_header(&[0xAF, 0x01, 0x21, 0x00]));
        assert!(!is_audio_sequence_header(&[0x2F, 0x00]));
        assert!(!is_audio_sequence_header(&[0xAF]));
    }

    #[test]
    fn test_audio_format() {
        assert_eq!(AudioFormat::from_byte(0xA0), AudioFormat::Aac);
        assert_eq!(AudioFormat::from_byte(0x2F), AudioFormat::Mp3);
        assert_eq!(AudioFormat::from_byte(0x90), AudioFormat::Other(9));
    }
}
