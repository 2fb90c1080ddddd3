//! `tokio_util` codec adapter for async byte streams.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{KlvError, Result};
use crate::framer::{FramerConfig, KlvFramer};
use crate::record::KlvRecord;

/// KLV framing for `FramedRead` / `FramedWrite`.
///
/// Decoding hands each buffered chunk to a [`KlvFramer`], so records and
/// stream offsets match the blocking reader exactly.
#[derive(Debug, Default)]
pub struct KlvCodec {
    framer: KlvFramer,
}

impl KlvCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: FramerConfig) -> Self {
        Self {
            framer: KlvFramer::with_config(config),
        }
    }
}

impl Decoder for KlvCodec {
    type Item = KlvRecord;
    type Error = KlvError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<KlvRecord>> {
        if !src.is_empty() {
            self.framer.push(src.split().freeze());
        }
        self.framer.next_record()
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<KlvRecord>> {
        if let Some(record) = self.decode(src)? {
            return Ok(Some(record));
        }
        self.framer.finish()?;
        Ok(None)
    }
}

impl Encoder<KlvRecord> for KlvCodec {
    type Error = KlvError;

    fn encode(&mut self, record: KlvRecord, dst: &mut BytesMut) -> Result<()> {
        if record.length != record.value.len() as u64 {
            return Err(KlvError::LengthMismatch {
                declared: record.length,
                actual: record.value.len(),
            });
        }
        crate::ber::encode_key_and_length(
            &record.key,
            record.length,
            record.length_field_width,
            dst,
        )?;
        for part in record.value.parts() {
            dst.extend_from_slice(part);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;
    use crate::ul::Label;

    fn key(n: u8) -> Label {
        Label([
            0x06, 0x0e, 0x2b, 0x34, 0x01, 0x01, 0x01, 0x02, 0x03, 0x01, 0x02, 0x10, 0x01, 0x00,
            0x00, n,
        ])
    }

    #[tokio::test]
    async fn framed_roundtrip() {
        let mut writer = FramedWrite::new(Vec::new(), KlvCodec::new());
        writer
            .send(KlvRecord::new(key(1), b"fill".to_vec(), 4))
            .await
            .unwrap();
        writer
            .send(KlvRecord::new(key(2), vec![7u8; 300], 9))
            .await
            .unwrap();
        let bytes = writer.into_inner();

        let mut reader = FramedRead::new(bytes.as_slice(), KlvCodec::new());
        let first = reader.next().await.unwrap().unwrap();
        let second = reader.next().await.unwrap().unwrap();
        assert!(reader.next().await.is_none());

        assert_eq!(first.flatten().as_ref(), b"fill");
        assert_eq!(first.stream_offset, 20);
        assert_eq!(second.length, 300);
        assert_eq!(second.length_field_width, 9);
        assert_eq!(second.stream_offset, 24 + 25);
    }

    #[tokio::test]
    async fn truncated_stream_errors_at_eof() {
        let mut bytes = BytesMut::new();
        Encoder::encode(
            &mut KlvCodec::new(),
            KlvRecord::new(key(1), vec![1u8; 10], 4),
            &mut bytes,
        )
        .unwrap();
        bytes.truncate(bytes.len() - 1);

        let mut reader = FramedRead::new(&bytes[..], KlvCodec::new());
        let err = reader.next().await.unwrap().unwrap_err();
        assert!(matches!(err, KlvError::Truncated { offset: 0, .. }));
    }
}
