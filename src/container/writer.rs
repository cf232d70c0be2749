//! Writing container streams and their index.
//!
//! The transcoder itself only reads streams; the writer exists so fixtures and
//! round-trip checks can produce them.

use std::io::{self, Write};

use noodles::sam::alignment::record::cigar::op::Kind;
use tracing::debug;

use crate::container::codec::{crc32, BlockCodec, DeflateCodec};
use crate::container::index::{ContainerIndex, IndexRecord};
use crate::container::{
    ContainerBody, ContainerHeader, Feature, StoredRecord, SubstitutionMatrix, CONTAINER_HEADER_LEN,
    FORMAT_VERSION, MAGIC, UNMAPPED_REFERENCE_ID,
};
use crate::core::record::AlignmentRecord;
use crate::core::reference::{ReferenceError, ReferenceStore};

/// Records per container unless configured otherwise
pub const DEFAULT_RECORDS_PER_CONTAINER: usize = 10_000;

/// Buffers records into containers and writes them with their index rows.
pub struct ContainerWriter<W: Write, C = DeflateCodec> {
    inner: W,
    codec: C,
    position: u64,
    records_per_container: usize,
    substitution_matrix: SubstitutionMatrix,
    pending: Vec<StoredRecord>,
    record_counter: u64,
    index: Vec<IndexRecord>,
}

impl<W: Write> ContainerWriter<W> {
    /// Start a stream, writing the file header.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the header cannot be written.
    pub fn new(inner: W, header_text: &str) -> io::Result<Self> {
        Self::with_codec(inner, header_text, DeflateCodec::default())
    }
}

impl<W: Write, C: BlockCodec> ContainerWriter<W, C> {
    /// Start a stream with a custom codec.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the header cannot be written.
    pub fn with_codec(mut inner: W, header_text: &str, codec: C) -> io::Result<Self> {
        let len = u32::try_from(header_text.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "header text too long"))?;

        inner.write_all(MAGIC)?;
        inner.write_all(&[FORMAT_VERSION])?;
        inner.write_all(&len.to_le_bytes())?;
        inner.write_all(header_text.as_bytes())?;

        Ok(Self {
            inner,
            codec,
            position: (MAGIC.len() + 1 + 4 + header_text.len()) as u64,
            records_per_container: DEFAULT_RECORDS_PER_CONTAINER,
            substitution_matrix: SubstitutionMatrix::default(),
            pending: Vec::new(),
            record_counter: 0,
            index: Vec::new(),
        })
    }

    #[must_use]
    pub fn with_records_per_container(mut self, n: usize) -> Self {
        self.records_per_container = n.max(1);
        self
    }

    /// Add a record. A container is flushed when the reference changes or it is full.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if a flushed container cannot be written.
    pub fn push(&mut self, record: StoredRecord) -> io::Result<()> {
        if let Some(last) = self.pending.last() {
            if placement(last) != placement(&record) {
                self.flush_container()?;
            }
        }

        self.pending.push(record);

        if self.pending.len() >= self.records_per_container {
            self.flush_container()?;
        }
        Ok(())
    }

    /// Flush pending records, write the EOF container, and return the sink and index.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if writing fails.
    pub fn finish(mut self) -> io::Result<(W, ContainerIndex)> {
        self.flush_container()?;
        self.write_header(&ContainerHeader::eof())?;
        self.inner.flush()?;
        Ok((self.inner, ContainerIndex::new(self.index)))
    }

    fn flush_container(&mut self) -> io::Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let records = std::mem::take(&mut self.pending);
        let reference_id = placement(&records[0]);
        let (alignment_start, alignment_span) = if reference_id == UNMAPPED_REFERENCE_ID {
            (0, 0)
        } else {
            let start = records
                .iter()
                .filter_map(|r| r.alignment_start)
                .min()
                .unwrap_or(0);
            let end = records
                .iter()
                .filter_map(|r| r.alignment_start.map(|s| s.saturating_add(reference_span(r).max(1)) - 1))
                .max()
                .unwrap_or(start);
            (start, end.saturating_add(1) - start)
        };

        let record_count = u32::try_from(records.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "too many records"))?;
        let body = ContainerBody {
            substitution_matrix: self.substitution_matrix,
            records,
        };
        let raw = bincode::serialize(&body).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let payload = self.codec.encode(&raw)?;
        let payload_length = u32::try_from(payload.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "container payload too large"))?;

        let header = ContainerHeader {
            reference_id,
            alignment_start: i64::try_from(alignment_start).unwrap_or(i64::MAX),
            alignment_span: i64::try_from(alignment_span).unwrap_or(i64::MAX),
            record_count,
            record_counter: self.record_counter,
            payload_length,
            checksum: crc32(&payload),
        };

        let offset = self.position;
        self.write_header(&header)?;
        self.inner.write_all(&payload)?;
        self.position += payload.len() as u64;

        self.index.push(IndexRecord {
            reference_id,
            alignment_start: alignment_start as u64,
            alignment_span: alignment_span as u64,
            container_offset: offset,
            slice_offset: CONTAINER_HEADER_LEN as u64,
            slice_length: payload.len() as u64,
        });

        debug!(offset, reference_id, records = record_count, "Wrote container");
        self.record_counter += u64::from(record_count);
        Ok(())
    }

    fn write_header(&mut self, header: &ContainerHeader) -> io::Result<()> {
        let buf = bincode::serialize(header).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.inner.write_all(&buf)?;
        self.position += buf.len() as u64;
        Ok(())
    }
}

/// Reference id a record is filed under, `-1` when unplaced
fn placement(record: &StoredRecord) -> i32 {
    match (record.reference_id, record.alignment_start) {
        (Some(id), Some(_)) => i32::try_from(id).unwrap_or(UNMAPPED_REFERENCE_ID),
        _ => UNMAPPED_REFERENCE_ID,
    }
}

/// Reference bases consumed by a record's features
fn reference_span(record: &StoredRecord) -> usize {
    if record.is_unmapped() {
        return 0;
    }

    let mut read_only: usize = 0;
    let mut reference_only: usize = 0;
    for feature in &record.features {
        match feature {
            Feature::Insertion { bases, .. } | Feature::SoftClip { bases, .. } => {
                read_only = read_only.saturating_add(bases.len());
            }
            Feature::InsertBase { .. } => read_only = read_only.saturating_add(1),
            Feature::Deletion { len, .. } | Feature::ReferenceSkip { len, .. } => {
                reference_only = reference_only.saturating_add(*len);
            }
            _ => {}
        }
    }
    record.read_length.saturating_sub(read_only).saturating_add(reference_only)
}

/// Express an alignment record as stored features against the reference.
///
/// Unmapped records keep their bases verbatim. `=`/`X` operations are stored as
/// matches and come back as `M`.
///
/// # Errors
///
/// Returns a `ReferenceError` if the alignment runs off its reference.
pub fn encode_record(
    record: &AlignmentRecord,
    reference: &ReferenceStore,
    matrix: &SubstitutionMatrix,
) -> Result<StoredRecord, ReferenceError> {
    let mut stored = StoredRecord {
        name: record.name.clone(),
        flags: record.flags.bits(),
        reference_id: record.reference_id,
        alignment_start: record.position,
        mapping_quality: record.mapping_quality,
        read_length: record.sequence.len(),
        features: Vec::new(),
        bases: Vec::new(),
        quality_scores: record.quality_scores.clone(),
        mate: record.mate,
        tags: record.tags.iter().cloned().collect(),
    };

    let (Some(reference_id), Some(start), false) =
        (record.reference_id, record.position, record.is_unmapped())
    else {
        stored.bases = record.sequence.clone();
        return Ok(stored);
    };

    // 0-based reference cursor, 1-based read cursor
    let mut r = start - 1;
    let mut p = 1;
    for op in &record.cigar {
        let len = op.len();
        match op.kind() {
            Kind::Match | Kind::SequenceMatch | Kind::SequenceMismatch => {
                for i in 0..len {
                    let read_base = record.sequence.get(p - 1 + i).map_or(b'N', u8::to_ascii_uppercase);
                    let reference_base = reference.base_at(reference_id, r + i)?;
                    if read_base == b'=' || read_base == reference_base {
                        continue;
                    }
                    let position = p + i;
                    stored.features.push(match matrix.code(reference_base, read_base) {
                        Some(code) => Feature::Substitution { position, code },
                        None => Feature::ReadBase {
                            position,
                            base: read_base,
                        },
                    });
                }
                p += len;
                r += len;
            }
            Kind::Insertion => {
                let bases = read_bases(&record.sequence, p, len);
                stored.features.push(if len == 1 {
                    Feature::InsertBase {
                        position: p,
                        base: bases.first().copied().unwrap_or(b'N'),
                    }
                } else {
                    Feature::Insertion {
                        position: p,
                        bases: bases.to_vec(),
                    }
                });
                p += len;
            }
            Kind::SoftClip => {
                stored.features.push(Feature::SoftClip {
                    position: p,
                    bases: read_bases(&record.sequence, p, len).to_vec(),
                });
                p += len;
            }
            Kind::Deletion => {
                stored.features.push(Feature::Deletion { position: p, len });
                r += len;
            }
            Kind::Skip => {
                stored.features.push(Feature::ReferenceSkip { position: p, len });
                r += len;
            }
            Kind::Pad => stored.features.push(Feature::Padding { position: p, len }),
            Kind::HardClip => stored.features.push(Feature::HardClip { position: p, len }),
        }
    }

    Ok(stored)
}

/// `len` read bases from 1-based `position`, clamped to the sequence
fn read_bases(sequence: &[u8], position: usize, len: usize) -> &[u8] {
    let start = (position - 1).min(sequence.len());
    let end = start.saturating_add(len).min(sequence.len());
    &sequence[start..end]
}
