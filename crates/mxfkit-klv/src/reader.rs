use std::io::{ErrorKind, Read};

use crate::error::{KlvError, Result};
use crate::framer::{FramerConfig, KlvFramer};
use crate::record::KlvRecord;

/// Reads complete KLV records from any `Read` source.
///
/// Partial reads are handled internally; callers always get whole records.
pub struct KlvReader<R> {
    inner: R,
    framer: KlvFramer,
    done: bool,
}

impl<R: Read> KlvReader<R> {
    /// Create a new reader with default configuration.
    pub fn new(inner: R) -> Self {
        Self::with_config(inner, FramerConfig::default())
    }

    /// Create a new reader with explicit configuration.
    pub fn with_config(inner: R, config: FramerConfig) -> Self {
        Self {
            inner,
            framer: KlvFramer::with_config(config),
            done: false,
        }
    }

    /// Read the next complete record (blocking).
    ///
    /// Returns `Ok(None)` at a clean end of stream and
    /// `Err(KlvError::Truncated)` when the source ends inside a record.
    pub fn read_record(&mut self) -> Result<Option<KlvRecord>> {
        loop {
            if let Some(record) = self.framer.next_record()? {
                return Ok(Some(record));
            }
            if self.done {
                return Ok(None);
            }

            let mut chunk = vec![0u8; self.framer.config().read_chunk_size.max(1)];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(KlvError::Io(err)),
            };

            if read == 0 {
                self.done = true;
                self.framer.finish()?;
                return Ok(None);
            }

            chunk.truncate(read);
            self.framer.push(chunk);
        }
    }

    /// Absolute stream position of the next unread byte.
    pub fn offset(&self) -> u64 {
        self.framer.offset()
    }

    /// Borrow the underlying source.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Mutably borrow the underlying source.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Consume the reader and return the inner source.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Iterator for KlvReader<R> {
    type Item = Result<KlvRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_record().transpose()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::BytesMut;

    use super::*;
    use crate::ber::encode_key_and_length;
    use crate::ul::Label;

    fn key(n: u8) -> Label {
        Label([
            0x06, 0x0e, 0x2b, 0x34, 0x02, 0x53, 0x01, 0x01, 0x0d, 0x01, 0x01, 0x01, 0x01, 0x01,
            0x30, n,
        ])
    }

    fn wire(values: &[&[u8]]) -> Vec<u8> {
        let mut wire = BytesMut::new();
        for (i, value) in values.iter().enumerate() {
            encode_key_and_length(&key(i as u8), value.len() as u64, 4, &mut wire).unwrap();
            wire.extend_from_slice(value);
        }
        wire.to_vec()
    }

    #[test]
    fn read_multiple_records() {
        let mut reader = KlvReader::new(Cursor::new(wire(&[b"one", b"two", b"three"])));

        let r1 = reader.read_record().unwrap().unwrap();
        let r2 = reader.read_record().unwrap().unwrap();
        let r3 = reader.read_record().unwrap().unwrap();

        assert_eq!((r1.key, r1.flatten().as_ref()), (key(0), b"one".as_ref()));
        assert_eq!((r2.key, r2.flatten().as_ref()), (key(1), b"two".as_ref()));
        assert_eq!((r3.key, r3.flatten().as_ref()), (key(2), b"three".as_ref()));
        assert!(reader.read_record().unwrap().is_none());
        assert!(reader.read_record().unwrap().is_none());
    }

    #[test]
    fn partial_read_handling() {
        let bytes = wire(&[b"slow", b"reader"]);
        let total = bytes.len() as u64;
        let mut reader = KlvReader::new(ByteByByteReader { bytes, pos: 0 });

        let records: Vec<_> = reader.by_ref().collect::<Result<_>>().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].flatten().as_ref(), b"reader");
        assert_eq!(records[1].stream_offset, 20 + 4 + 20);
        assert_eq!(reader.offset(), total);
    }

    #[test]
    fn empty_source_is_clean_eof() {
        let mut reader = KlvReader::new(Cursor::new(Vec::<u8>::new()));
        assert!(reader.read_record().unwrap().is_none());
    }

    #[test]
    fn eof_mid_record_is_truncated() {
        let mut bytes = wire(&[b"complete-value"]);
        bytes.truncate(bytes.len() - 4);
        let mut reader = KlvReader::new(Cursor::new(bytes));
        let err = reader.read_record().unwrap_err();
        assert!(matches!(err, KlvError::Truncated { offset: 0, .. }));
        assert!(reader.read_record().unwrap().is_none());
    }

    #[test]
    fn interrupted_read_retries() {
        let reader = InterruptedOnce {
            interrupted: false,
            inner: Cursor::new(wire(&[b"ok"])),
        };
        let mut reader = KlvReader::new(reader);
        let record = reader.read_record().unwrap().unwrap();
        assert_eq!(record.flatten().as_ref(), b"ok");
    }

    #[test]
    fn io_errors_propagate() {
        let mut reader = KlvReader::new(FailingReader);
        let err = reader.read_record().unwrap_err();
        assert!(matches!(err, KlvError::Io(e) if e.kind() == ErrorKind::PermissionDenied));
    }

    #[test]
    fn accessors_and_into_inner() {
        let mut reader = KlvReader::new(Cursor::new(vec![1u8, 2, 3]));
        assert_eq!(reader.get_ref().get_ref().len(), 3);
        reader.get_mut().set_position(1);
        assert_eq!(reader.into_inner().position(), 1);
    }

    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct InterruptedOnce {
        interrupted: bool,
        inner: Cursor<Vec<u8>>,
    }

    impl Read for InterruptedOnce {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.inner.read(buf)
        }
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::PermissionDenied))
        }
    }
}
