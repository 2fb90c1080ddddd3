//! Streaming KLV reassembly.
//!
//! [`KlvFramer`] accepts byte chunks of any size and hands back complete
//! [`KlvRecord`]s. Chunk boundaries may fall anywhere, including inside the
//! key or the BER length of a record; the emitted records and their stream
//! offsets never depend on how the input was split.

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};
use tracing::{debug, trace, warn};

use crate::ber::{self, HeaderSize, MAX_HEADER_SIZE, MIN_HEADER_SIZE};
use crate::error::{KlvError, Result};
use crate::record::{Fragments, KlvRecord};
use crate::ul::{Label, LABEL_SIZE};

/// Default maximum value size: unbounded. Clip-wrapped essence routinely
/// exceeds a gigabyte in a single value.
pub const DEFAULT_MAX_VALUE_SIZE: usize = usize::MAX;

/// Default read size for the blocking reader: 64 KiB.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 64 * 1024;

/// Configuration for KLV framing.
#[derive(Debug, Clone, Copy)]
pub struct FramerConfig {
    /// Largest value length accepted before the stream is considered corrupt.
    /// Set a cap to bound memory for untrusted input.
    pub max_value_size: usize,
    /// Bytes requested per `read` call by [`KlvReader`](crate::KlvReader).
    pub read_chunk_size: usize,
}

impl Default for FramerConfig {
    fn default() -> Self {
        Self {
            max_value_size: DEFAULT_MAX_VALUE_SIZE,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
        }
    }
}

#[derive(Debug)]
struct PendingValue {
    key: Label,
    length: u64,
    width: u8,
    value_offset: u64,
    fragments: Fragments,
    remaining: usize,
}

#[derive(Debug)]
enum State {
    Header,
    Value(PendingValue),
}

/// Resumable KLV record reassembler.
#[derive(Debug)]
pub struct KlvFramer {
    config: FramerConfig,
    input: VecDeque<Bytes>,
    buffered: usize,
    header: BytesMut,
    state: State,
    offset: u64,
}

impl Default for KlvFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl KlvFramer {
    pub fn new() -> Self {
        Self::with_config(FramerConfig::default())
    }

    pub fn with_config(config: FramerConfig) -> Self {
        Self {
            config,
            input: VecDeque::new(),
            buffered: 0,
            header: BytesMut::with_capacity(MAX_HEADER_SIZE),
            state: State::Header,
            offset: 0,
        }
    }

    /// Queue a chunk of input. No parsing happens until [`next_record`](Self::next_record).
    pub fn push(&mut self, chunk: impl Into<Bytes>) {
        let chunk = chunk.into();
        if chunk.is_empty() {
            return;
        }
        self.buffered += chunk.len();
        self.input.push_back(chunk);
    }

    /// Queue a chunk and return every record it completes.
    pub fn feed(&mut self, chunk: impl Into<Bytes>) -> Result<Vec<KlvRecord>> {
        self.push(chunk);
        let mut records = Vec::new();
        while let Some(record) = self.next_record()? {
            records.push(record);
        }
        Ok(records)
    }

    /// Next complete record, or `Ok(None)` when more input is needed.
    pub fn next_record(&mut self) -> Result<Option<KlvRecord>> {
        loop {
            match std::mem::replace(&mut self.state, State::Header) {
                State::Header => {
                    if !self.fill_header()? {
                        return Ok(None);
                    }
                    self.state = State::Value(self.start_value()?);
                }
                State::Value(mut pending) => {
                    while pending.remaining > 0 {
                        let Some(part) = self.take(pending.remaining) else {
                            self.state = State::Value(pending);
                            return Ok(None);
                        };
                        pending.remaining -= part.len();
                        pending.fragments.push(part);
                    }

                    trace!(
                        key = %pending.key,
                        length = pending.length,
                        offset = pending.value_offset,
                        fragments = pending.fragments.parts().len(),
                        "framed KLV record"
                    );
                    return Ok(Some(KlvRecord {
                        key: pending.key,
                        length: pending.length,
                        value: pending.fragments,
                        length_field_width: pending.width,
                        stream_offset: pending.value_offset,
                    }));
                }
            }
        }
    }

    /// Signal end of input.
    ///
    /// Call once [`next_record`](Self::next_record) has returned `Ok(None)`.
    /// Any bytes still held belong to an incomplete record; they are discarded
    /// and reported as [`KlvError::Truncated`].
    pub fn finish(&mut self) -> Result<()> {
        let pending = self.pending();
        if pending == 0 {
            return Ok(());
        }

        let offset = match &self.state {
            State::Header => self.offset - self.header.len() as u64,
            State::Value(value) => {
                value.value_offset - (LABEL_SIZE + value.width as usize) as u64
            }
        };
        warn!(offset, pending, "discarding incomplete KLV record at end of stream");

        self.offset += self.buffered as u64;
        self.input.clear();
        self.buffered = 0;
        self.header.clear();
        self.state = State::Header;
        Err(KlvError::Truncated { offset, pending })
    }

    /// Absolute stream position of the next byte the framer will consume.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Bytes received but not yet emitted as part of a record.
    pub fn pending(&self) -> usize {
        let value = match &self.state {
            State::Header => 0,
            State::Value(value) => LABEL_SIZE + value.width as usize + value.fragments.len(),
        };
        self.buffered + self.header.len() + value
    }

    pub fn config(&self) -> &FramerConfig {
        &self.config
    }

    /// Copy exactly as many bytes as the header needs. Returns `false` when
    /// the input ran out first.
    fn fill_header(&mut self) -> Result<bool> {
        loop {
            let need = self.header_need()?;
            if need == 0 {
                return Ok(true);
            }
            match self.take(need) {
                Some(part) => self.header.extend_from_slice(&part),
                None => {
                    if !self.header.is_empty() {
                        debug!(
                            offset = self.offset - self.header.len() as u64,
                            have = self.header.len(),
                            "KLV header wraps around chunk boundary"
                        );
                    }
                    return Ok(false);
                }
            }
        }
    }

    fn header_need(&self) -> Result<usize> {
        match ber::header_size(&self.header, 0) {
            None => Ok(MIN_HEADER_SIZE - self.header.len()),
            Some(HeaderSize::Known(size)) => Ok(size - self.header.len()),
            Some(HeaderSize::Corrupt(tail)) => Err(KlvError::CorruptLength {
                offset: self.offset - self.header.len() as u64,
                tail,
            }),
        }
    }

    fn start_value(&mut self) -> Result<PendingValue> {
        let key_offset = self.offset - self.header.len() as u64;
        let parsed = match ber::read_key_and_length(&self.header, 0) {
            Ok(Some(parsed)) => parsed,
            Ok(None) | Err(HeaderSize::Known(_)) => {
                return Err(KlvError::Truncated {
                    offset: key_offset,
                    pending: self.header.len(),
                })
            }
            Err(HeaderSize::Corrupt(tail)) => {
                return Err(KlvError::CorruptLength {
                    offset: key_offset,
                    tail,
                })
            }
        };
        self.header.clear();

        if parsed.length > self.config.max_value_size as u64 {
            return Err(KlvError::ValueTooLarge {
                offset: key_offset,
                size: parsed.length,
                max: self.config.max_value_size,
            });
        }

        Ok(PendingValue {
            key: parsed.key,
            length: parsed.length,
            width: parsed.length_field_width,
            value_offset: self.offset,
            fragments: Fragments::new(),
            remaining: parsed.length as usize,
        })
    }

    /// Take up to `max` bytes from the front of the input without copying.
    fn take(&mut self, max: usize) -> Option<Bytes> {
        let mut chunk = self.input.pop_front()?;
        let part = if chunk.len() > max {
            let part = chunk.split_to(max);
            self.input.push_front(chunk);
            part
        } else {
            chunk
        };
        self.buffered -= part.len();
        self.offset += part.len() as u64;
        Some(part)
    }
}
