use std::io::{ErrorKind, Write};

use bytes::BytesMut;

use crate::ber::{encode_key_and_length, MAX_HEADER_SIZE};
use crate::error::{KlvError, Result};
use crate::record::KlvRecord;

/// Writes KLV records to any `Write` sink.
///
/// Each record keeps the length-field width it carries, so a decoded stream
/// written back out reproduces the source bytes.
pub struct KlvWriter<W> {
    inner: W,
    header: BytesMut,
    position: u64,
}

impl<W: Write> KlvWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            header: BytesMut::with_capacity(MAX_HEADER_SIZE),
            position: 0,
        }
    }

    /// Write one record. Returns the stream offset of its value.
    pub fn write_record(&mut self, record: &KlvRecord) -> Result<u64> {
        if record.length != record.value.len() as u64 {
            return Err(KlvError::LengthMismatch {
                declared: record.length,
                actual: record.value.len(),
            });
        }

        self.header.clear();
        encode_key_and_length(
            &record.key,
            record.length,
            record.length_field_width,
            &mut self.header,
        )?;

        let header = std::mem::take(&mut self.header);
        let written = self.write_all(&header);
        self.header = header;
        written?;

        let value_offset = self.position;
        for part in record.value.parts() {
            self.write_all(part)?;
        }
        Ok(value_offset)
    }

    /// Write bytes that are already KLV encoded.
    pub fn write_encoded(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_all(bytes)
    }

    /// Flush the underlying sink.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(KlvError::Io(err)),
            }
        }
    }

    /// Bytes written so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let mut offset = 0usize;
        while offset < bytes.len() {
            match self.inner.write(&bytes[offset..]) {
                Ok(0) => return Err(KlvError::Io(ErrorKind::WriteZero.into())),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(KlvError::Io(err)),
            }
        }
        self.position += bytes.len() as u64;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::Bytes;

    use super::*;
    use crate::error::LengthEncodingError;
    use crate::reader::KlvReader;
    use crate::record::Fragments;
    use crate::ul::Label;

    fn key(n: u8) -> Label {
        Label([
            0x06, 0x0e, 0x2b, 0x34, 0x01, 0x02, 0x01, 0x01, 0x0d, 0x01, 0x03, 0x01, 0x16, 0x01,
            0x01, n,
        ])
    }

    #[test]
    fn records_keep_their_length_width() {
        let mut writer = KlvWriter::new(Vec::new());
        let first = writer
            .write_record(&KlvRecord::new(key(1), b"abc".to_vec(), 1))
            .unwrap();
        let second = writer
            .write_record(&KlvRecord::new(key(2), b"defg".to_vec(), 8))
            .unwrap();
        assert_eq!(first, 17);
        assert_eq!(second, 20 + 24);
        assert_eq!(writer.position(), 20 + 28);

        let bytes = writer.into_inner();
        let records: Vec<_> = KlvReader::new(Cursor::new(bytes))
            .collect::<crate::Result<_>>()
            .unwrap();
        assert_eq!(records[0].length_field_width, 1);
        assert_eq!(records[1].length_field_width, 8);
        assert_eq!(records[1].stream_offset, second);
        assert_eq!(records[1].flatten().as_ref(), b"defg");
    }

    #[test]
    fn fragmented_values_are_written_in_order() {
        let mut value = Fragments::new();
        value.push(Bytes::from_static(b"frag"));
        value.push(Bytes::from_static(b"mented"));
        let mut writer = KlvWriter::new(Vec::new());
        writer.write_record(&KlvRecord::new(key(3), value, 4)).unwrap();
        assert_eq!(&writer.get_ref()[20..], b"fragmented");
    }

    #[test]
    fn mismatched_length_is_rejected() {
        let mut record = KlvRecord::new(key(1), b"abc".to_vec(), 4);
        record.length = 10;
        let mut writer = KlvWriter::new(Vec::new());
        let err = writer.write_record(&record).unwrap_err();
        assert!(matches!(
            err,
            KlvError::LengthMismatch {
                declared: 10,
                actual: 3
            }
        ));
        assert!(!err.is_fatal());
        assert!(writer.get_ref().is_empty());
    }

    #[test]
    fn too_narrow_width_is_rejected() {
        let record = KlvRecord::new(key(1), vec![0u8; 200], 1);
        let mut writer = KlvWriter::new(Vec::new());
        let err = writer.write_record(&record).unwrap_err();
        assert!(matches!(
            err,
            KlvError::InvalidLengthEncoding(LengthEncodingError::WidthTooSmall(200))
        ));
    }

    #[test]
    fn zero_length_write_reports_io_error() {
        let mut writer = KlvWriter::new(ZeroWriter);
        let err = writer.write_encoded(b"x").unwrap_err();
        assert!(matches!(err, KlvError::Io(e) if e.kind() == ErrorKind::WriteZero));
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
