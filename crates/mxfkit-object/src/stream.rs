use std::io::{Read, Write};
use std::sync::Arc;

use mxfkit_klv::{FramerConfig, KlvReader, KlvRecord, KlvWriter};
use mxfkit_types::TypeRegistry;
use tracing::warn;

use crate::detail::{Detailer, DetailerConfig};
use crate::encode::{Encoder, EncoderConfig};
use crate::error::{Result, StreamError};
use crate::object::{Decoded, MxfObject};

/// Decodes objects from a blocking byte source.
///
/// A record that fails to decode yields [`StreamError::Record`] and reading
/// continues with the next record. Framing errors end the stream.
pub struct ObjectReader<R> {
    records: KlvReader<R>,
    detailer: Detailer,
    done: bool,
}

impl<R: Read> ObjectReader<R> {
    pub fn new(inner: R, registry: Arc<TypeRegistry>) -> Self {
        Self::with_config(inner, registry, FramerConfig::default(), DetailerConfig::default())
    }

    pub fn with_config(
        inner: R,
        registry: Arc<TypeRegistry>,
        framer: FramerConfig,
        detailer: DetailerConfig,
    ) -> Self {
        Self {
            records: KlvReader::with_config(inner, framer),
            detailer: Detailer::with_config(registry, detailer),
            done: false,
        }
    }

    /// Next decoded record, `Ok(None)` at end of stream.
    pub fn read_object(&mut self) -> std::result::Result<Option<Decoded>, StreamError> {
        if self.done {
            return Ok(None);
        }
        let record = match self.records.read_record() {
            Ok(Some(record)) => record,
            Ok(None) => {
                self.done = true;
                return Ok(None);
            }
            Err(err) => {
                self.done = true;
                return Err(StreamError::Framing(err));
            }
        };

        let offset = record.stream_offset;
        self.detailer.detail(record).map(Some).map_err(|error| {
            warn!(offset, error = %error, "record failed to decode");
            StreamError::Record { offset, error }
        })
    }

    pub fn detailer(&self) -> &Detailer {
        &self.detailer
    }

    pub fn detailer_mut(&mut self) -> &mut Detailer {
        &mut self.detailer
    }

    /// Bytes consumed from the source so far.
    pub fn offset(&self) -> u64 {
        self.records.offset()
    }

    pub fn into_inner(self) -> R {
        self.records.into_inner()
    }
}

impl<R: Read> Iterator for ObjectReader<R> {
    type Item = std::result::Result<Decoded, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_object().transpose()
    }
}

/// Encodes objects onto a blocking byte sink.
pub struct ObjectWriter<W> {
    records: KlvWriter<W>,
    encoder: Encoder,
}

impl<W: Write> ObjectWriter<W> {
    pub fn new(inner: W, registry: Arc<TypeRegistry>) -> Self {
        Self::with_config(inner, registry, EncoderConfig::default())
    }

    pub fn with_config(inner: W, registry: Arc<TypeRegistry>, config: EncoderConfig) -> Self {
        Self {
            records: KlvWriter::new(inner),
            encoder: Encoder::with_config(registry, config),
        }
    }

    /// Encode and write one object. Returns the stream offset of its value.
    pub fn write_object(&mut self, object: &MxfObject) -> Result<u64> {
        let record = self.encoder.encode(object)?;
        Ok(self.records.write_record(&record)?)
    }

    /// Encode and write a header metadata batch with its primer pack.
    pub fn write_header(&mut self, objects: &[MxfObject]) -> Result<()> {
        for record in self.encoder.encode_header(objects)? {
            self.records.write_record(&record)?;
        }
        Ok(())
    }

    /// Write a record that needs no encoding, such as one passed through
    /// by a reader.
    pub fn write_record(&mut self, record: &KlvRecord) -> Result<u64> {
        Ok(self.records.write_record(record)?)
    }

    pub fn flush(&mut self) -> Result<()> {
        Ok(self.records.flush()?)
    }

    pub fn encoder(&self) -> &Encoder {
        &self.encoder
    }

    pub fn encoder_mut(&mut self) -> &mut Encoder {
        &mut self.encoder
    }

    /// Bytes written so far.
    pub fn position(&self) -> u64 {
        self.records.position()
    }

    pub fn into_inner(self) -> W {
        self.records.into_inner()
    }
}
