//! Reference-guided decoder: turns containers into alignment records, lazily.
//!
//! The decoder is a pull-based state machine:
//!
//! ```text
//! Ready --container--> Decoding --drained--> Ready --EOF container--> Exhausted
//!   \________________________any error____________________________--> Failed
//! ```
//!
//! `Exhausted` is reached only through the EOF container; a stream that simply
//! stops is `DecodeError::IncompleteStream`, even if every record was emitted.

use std::collections::VecDeque;
use std::io::{self, Read, Seek};
use std::sync::Arc;
use std::vec;

use noodles::sam::alignment::record::Flags;
use thiserror::Error;
use tracing::{debug, warn};

use crate::container::codec::{BlockCodec, DeflateCodec};
use crate::container::index::{ContainerDescriptor, ContainerPlan};
use crate::container::reader::{ContainerReader, NextContainer};
use crate::container::{StoredRecord, SubstitutionMatrix};
use crate::core::interval::Interval;
use crate::core::record::{AlignmentRecord, Tags};
use crate::core::reference::ReferenceStore;

pub mod reconstruct;

use reconstruct::{reconstruct, ReconstructError};

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid container stream: {0}")]
    InvalidFormat(String),

    #[error("Container at offset {offset} is truncated")]
    Truncated { offset: u64 },

    #[error("Container at offset {offset} failed its checksum (expected {expected:#010x}, found {actual:#010x})")]
    Checksum {
        offset: u64,
        expected: u32,
        actual: u32,
    },

    #[error("Container at offset {offset} cannot be decoded: {reason}")]
    Corrupt { offset: u64, reason: String },

    #[error("Container at offset {offset} declares {declared} records but holds {actual}")]
    RecordCount {
        offset: u64,
        declared: u32,
        actual: usize,
    },

    #[error("Record '{record}' cannot be reconstructed: {source}")]
    Reconstruct {
        record: String,
        #[source]
        source: ReconstructError,
    },

    #[error("Stream ended without an EOF container")]
    IncompleteStream,
}

enum Walk {
    Sequential,
    Seek(VecDeque<ContainerDescriptor>),
}

struct ActiveContainer {
    matrix: SubstitutionMatrix,
    records: vec::IntoIter<StoredRecord>,
    /// 1-based global number of the next record
    next_counter: u64,
}

enum State {
    Ready,
    Decoding(ActiveContainer),
    Exhausted,
    Failed,
}

/// Lazily decodes the records of a container stream.
///
/// The file header must already have been consumed from the reader.
pub struct Decoder<R, C = DeflateCodec> {
    reader: ContainerReader<R, C>,
    reference: Arc<ReferenceStore>,
    walk: Walk,
    interval: Option<Interval>,
    name_prefix: String,
    state: State,
    containers_decoded: usize,
}

impl<R, C> Decoder<R, C>
where
    R: Read + Seek,
    C: BlockCodec,
{
    pub fn new(reader: ContainerReader<R, C>, reference: Arc<ReferenceStore>, plan: ContainerPlan) -> Self {
        let walk = match plan {
            ContainerPlan::Sequential => Walk::Sequential,
            ContainerPlan::Seek(descriptors) => Walk::Seek(descriptors.into()),
        };

        Self {
            reader,
            reference,
            walk,
            interval: None,
            name_prefix: String::new(),
            state: State::Ready,
            containers_decoded: 0,
        }
    }

    /// Only yield records admitted by `interval`
    #[must_use]
    pub fn with_interval(mut self, interval: Option<Interval>) -> Self {
        self.interval = interval;
        self
    }

    /// Prefix for names synthesized for unnamed records
    #[must_use]
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    pub fn containers_decoded(&self) -> usize {
        self.containers_decoded
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.state, State::Exhausted)
    }

    /// Next admitted record, or `None` once the EOF container has been reached.
    ///
    /// After an error the decoder is failed and yields nothing more.
    ///
    /// # Errors
    ///
    /// Returns a `DecodeError` for any damaged container or record, or
    /// `IncompleteStream` if the stream ends without its EOF container.
    pub fn next_record(&mut self) -> Result<Option<AlignmentRecord>, DecodeError> {
        loop {
            // Anything that returns early through `?` leaves the decoder failed
            match std::mem::replace(&mut self.state, State::Failed) {
                State::Exhausted => {
                    self.state = State::Exhausted;
                    return Ok(None);
                }
                State::Failed => return Ok(None),
                State::Ready => {
                    self.state = match self.next_container()? {
                        Some(container) => State::Decoding(container),
                        None => State::Exhausted,
                    };
                }
                State::Decoding(mut container) => {
                    let Some(stored) = container.records.next() else {
                        self.state = State::Ready;
                        continue;
                    };
                    let counter = container.next_counter;
                    container.next_counter += 1;

                    let record = self.decode_record(&container.matrix, counter, stored)?;
                    self.state = State::Decoding(container);

                    if self.admits(&record) {
                        return Ok(Some(record));
                    }
                }
            }
        }
    }

    fn next_container(&mut self) -> Result<Option<ActiveContainer>, DecodeError> {
        let next = match &mut self.walk {
            Walk::Sequential => self.reader.read_container()?,
            Walk::Seek(pending) => match pending.pop_front() {
                Some(descriptor) => {
                    self.reader.seek(descriptor.offset)?;
                    match self.reader.read_container()? {
                        NextContainer::Eof => {
                            return Err(DecodeError::Corrupt {
                                offset: descriptor.offset,
                                reason: "index points at the EOF container".to_string(),
                            })
                        }
                        container => container,
                    }
                }
                None => {
                    if !self.reader.has_eof_marker()? {
                        warn!("Container stream has no EOF container");
                        return Err(DecodeError::IncompleteStream);
                    }
                    NextContainer::Eof
                }
            },
        };

        match next {
            NextContainer::Eof => {
                debug!(containers = self.containers_decoded, "Reached EOF container");
                Ok(None)
            }
            NextContainer::Container {
                offset,
                header,
                body,
            } => {
                debug!(
                    offset,
                    reference_id = header.reference_id,
                    records = header.record_count,
                    "Decoding container"
                );
                self.containers_decoded += 1;
                Ok(Some(ActiveContainer {
                    matrix: body.substitution_matrix,
                    records: body.records.into_iter(),
                    next_counter: header.record_counter + 1,
                }))
            }
        }
    }

    fn decode_record(
        &self,
        matrix: &SubstitutionMatrix,
        counter: u64,
        stored: StoredRecord,
    ) -> Result<AlignmentRecord, DecodeError> {
        let name = stored
            .name
            .clone()
            .unwrap_or_else(|| format!("{}:{counter}", self.name_prefix));

        let (sequence, cigar) = if stored.is_unmapped() {
            (stored.bases, Vec::new())
        } else {
            reconstruct(&stored, matrix, &self.reference).map_err(|source| {
                DecodeError::Reconstruct {
                    record: name.clone(),
                    source,
                }
            })?
        };

        Ok(AlignmentRecord {
            name: Some(name),
            flags: Flags::from(stored.flags),
            reference_id: stored.reference_id,
            position: stored.alignment_start,
            mapping_quality: stored.mapping_quality,
            cigar,
            sequence,
            quality_scores: stored.quality_scores,
            mate: stored.mate,
            tags: stored.tags.into_iter().collect::<Tags>(),
        })
    }

    fn admits(&self, record: &AlignmentRecord) -> bool {
        self.interval.as_ref().map_or(true, |interval| {
            interval.admits(record.reference_id, record.position, record.is_unmapped())
        })
    }
}

impl<R, C> Iterator for Decoder<R, C>
where
    R: Read + Seek,
    C: BlockCodec,
{
    type Item = Result<AlignmentRecord, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}
