//! FLV file source
//!
//! ```text
//! +============+==================+==============+==================+
//! | FLV Header | PrevTagSize0 (0) | Tag 1        | PrevTagSize1 ... |
//! | (9 bytes)  | (4 bytes)        | (11+N bytes) | (4 bytes)        |
//! +============+==================+==============+==================+
//!
//! Tag header (11 bytes):
//! | type (1) | data size (3) | timestamp (3) | ts ext (1) | stream id (3) |
//! ```
//!
//! Tag bodies are the same as RTMP message bodies, so each tag maps directly
//! onto a [`Packet`].

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::{PacketSource, SourceError};
use crate::media::Packet;
use crate::pool::BufferPool;

/// FLV file signature: "FLV" in ASCII
const FLV_SIGNATURE: [u8; 3] = [0x46, 0x4C, 0x56];

const FLV_HEADER_SIZE: usize = 9;
const TAG_HEADER_SIZE: usize = 11;

/// Reads packets out of an FLV byte stream
pub struct FlvReader<R> {
    reader: R,
    header_read: bool,
}

impl<R> FlvReader<R>
where
    R: AsyncRead + Unpin + Send,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            header_read: false,
        }
    }

    async fn read_header(&mut self) -> Result<(), SourceError> {
        let mut header = [0u8; FLV_HEADER_SIZE];
        self.reader.read_exact(&mut header).await?;

        if header[..3] != FLV_SIGNATURE {
            return Err(SourceError::InvalidHeader("missing FLV signature"));
        }
        let data_offset = u32::from_be_bytes([header[5], header[6], header[7], header[8]]) as usize;
        if data_offset < FLV_HEADER_SIZE {
            return Err(SourceError::InvalidHeader("data offset inside header"));
        }

        // Extension bytes after the header, then PreviousTagSize0
        let skip = (data_offset - FLV_HEADER_SIZE) as u64 + 4;
        let mut extension = (&mut self.reader).take(skip);
        let skipped = tokio::io::copy(&mut extension, &mut tokio::io::sink()).await?;
        if skipped != skip {
            return Err(SourceError::Truncated);
        }

        self.header_read = true;
        Ok(())
    }

    /// Read the next tag; `None` at a clean end of input
    async fn read_tag(
        &mut self,
        pool: &dyn BufferPool,
    ) -> Result<Option<(u8, u32, Bytes)>, SourceError> {
        let mut tag = [0u8; TAG_HEADER_SIZE];
        if self.reader.read(&mut tag[..1]).await? == 0 {
            return Ok(None);
        }
        read_exact_or_truncated(&mut self.reader, &mut tag[1..]).await?;

        let tag_type = tag[0] & 0x1F;
        let data_size = u32::from_be_bytes([0, tag[1], tag[2], tag[3]]) as usize;
        let timestamp = u32::from_be_bytes([tag[7], tag[4], tag[5], tag[6]]);

        let mut body = pool.acquire(data_size);
        if let Err(e) = read_exact_or_truncated(&mut self.reader, &mut body[..]).await {
            pool.release(body);
            return Err(e);
        }
        let payload = pool.freeze(body);

        // PreviousTagSize; the last one may be missing
        let mut prev = [0u8; 4];
        match self.reader.read_exact(&mut prev).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {}
            Err(e) => return Err(e.into()),
        }

        Ok(Some((tag_type, timestamp, payload)))
    }
}

async fn read_exact_or_truncated<R>(reader: &mut R, buf: &mut [u8]) -> Result<(), SourceError>
where
    R: AsyncRead + Unpin,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(SourceError::Truncated),
        Err(e) => Err(e.into()),
    }
}

impl<R> PacketSource for FlvReader<R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn next_packet(&mut self, pool: &dyn BufferPool) -> Result<Option<Packet>, SourceError> {
        if !self.header_read {
            self.read_header().await?;
        }

        while let Some((tag_type, timestamp, payload)) = self.read_tag(pool).await? {
            match Packet::from_rtmp(tag_type, timestamp, payload) {
                Some(packet) => return Ok(Some(packet)),
                None => tracing::trace!(tag_type = tag_type, "Skipping non-media FLV tag"),
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use bytes::{BufMut, BytesMut};

    use super::*;
    use crate::pool::{PoolConfig, PoolStrategy};

    fn flv_header() -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_slice(&FLV_SIGNATURE);
        buf.put_u8(1); // version
        buf.put_u8(0x05); // audio + video
        buf.put_u32(FLV_HEADER_SIZE as u32);
        buf.put_u32(0); // PreviousTagSize0
        buf
    }

    fn put_tag(buf: &mut BytesMut, tag_type: u8, timestamp: u32, data: &[u8]) {
        let size = data.len() as u32;
        buf.put_u8(tag_type);
        buf.put_slice(&size.to_be_bytes()[1..]);
        buf.put_slice(&timestamp.to_be_bytes()[1..]);
        buf.put_u8((timestamp >> 24) as u8);
        buf.put_slice(&[0, 0, 0]);
        buf.put_slice(data);
        buf.put_u32(TAG_HEADER_SIZE as u32 + size);
    }

    async fn read_all(data: &[u8]) -> Result<Vec<Packet>, SourceError> {
        let pool = PoolConfig::default().build();
        let mut reader = FlvReader::new(data);
        let mut packets = Vec::new();
        while let Some(packet) = reader.next_packet(pool.as_ref()).await? {
            packets.push(packet);
        }
        Ok(packets)
    }

    #[tokio::test]
    async fn test_reads_tags_in_order() {
        let mut buf = flv_header();
        put_tag(&mut buf, 18, 0, b"\x02\x00\x0aonMetaData");
        put_tag(&mut buf, 9, 0, &[0x17, 0x00, 0x00, 0x00, 0x00]);
        put_tag(&mut buf, 8, 0, &[0xAF, 0x00, 0x12, 0x10]);
        put_tag(&mut buf, 9, 40, &[0x17, 0x01, 0x00, 0x00, 0x00, 0xAA]);
        put_tag(&mut buf, 9, 0x0100_0010, &[0x27, 0x01, 0x00, 0x00, 0x00, 0xBB]);

        let packets = read_all(&buf).await.unwrap();

        assert_eq!(packets.len(), 5);
        assert!(packets[0].is_metadata());
        assert!(packets[1].is_video() && packets[1].is_header);
        assert!(packets[2].is_audio() && packets[2].is_header);
        assert!(packets[3].is_keyframe && !packets[3].is_header);
        assert_eq!(packets[3].timestamp, 40);
        assert_eq!(packets[4].timestamp, 0x0100_0010);
        assert_eq!(&packets[4].payload[..], &[0x27, 0x01, 0x00, 0x00, 0x00, 0xBB]);
    }

    #[tokio::test]
    async fn test_skips_unknown_tags() {
        let mut buf = flv_header();
        put_tag(&mut buf, 0x42, 0, &[1, 2, 3]);
        put_tag(&mut buf, 8, 10, &[0xAF, 0x01, 0x55]);

        let packets = read_all(&buf).await.unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].timestamp, 10);
    }

    #[tokio::test]
    async fn test_empty_body_is_end_of_stream() {
        let packets = read_all(&flv_header()).await.unwrap();
        assert!(packets.is_empty());
    }

    #[tokio::test]
    async fn test_rejects_bad_signature() {
        let mut buf = flv_header();
        buf[0] = b'X';

        let result = read_all(&buf).await;
        assert!(matches!(result, Err(SourceError::InvalidHeader(_))));
    }

    #[tokio::test]
    async fn test_truncated_tag() {
        let mut buf = flv_header();
        put_tag(&mut buf, 9, 0, &[0x17, 0x01, 0x00, 0x00, 0x00, 0xAA]);
        buf.truncate(buf.len() - 8);

        let result = read_all(&buf).await;
        assert!(matches!(result, Err(SourceError::Truncated)));
    }

    #[tokio::test]
    async fn test_payloads_do_not_alias_with_recycling_pool() {
        let mut buf = flv_header();
        put_tag(&mut buf, 8, 0, &[0xAF, 0x01, 0x11]);
        put_tag(&mut buf, 8, 23, &[0xAF, 0x01, 0x22]);

        let pool = PoolConfig::default()
            .strategy(PoolStrategy::Recycling)
            .max_pooled_size(64)
            .build();
        let mut reader = FlvReader::new(&buf[..]);
        let first = reader.next_packet(pool.as_ref()).await.unwrap().unwrap();
        let second = reader.next_packet(pool.as_ref()).await.unwrap().unwrap();

        assert_eq!(&first.payload[..], &[0xAF, 0x01, 0x11]);
        assert_eq!(&second.payload[..], &[0xAF, 0x01, 0x22]);
    }
}
