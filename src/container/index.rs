//! Container index: maps reference intervals to container offsets.
//!
//! The index is a `.crai` sidecar next to the stream: gzip-compressed,
//! tab-separated rows of
//!
//! ```text
//! reference_id  alignment_start  alignment_span  container_offset  slice_offset  slice_length
//! ```
//!
//! `reference_id` is `-1` for unplaced reads and `-2` for rows whose container spans
//! several references. Pruning is conservative: a container is kept whenever any
//! of its rows could hold an admitted record.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use thiserror::Error;
use tracing::debug;

use crate::container::{MULTI_REFERENCE_ID, UNMAPPED_REFERENCE_ID};
use crate::core::interval::{Interval, RegionTarget};

/// Suffix appended to the stream path to locate its index
pub const INDEX_SUFFIX: &str = "crai";

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Failed to read index '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Invalid index line {line}: {reason}")]
    InvalidFormat { line: usize, reason: String },
}

/// One row of the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRecord {
    pub reference_id: i32,
    /// 1-based, 0 for unplaced rows
    pub alignment_start: u64,
    pub alignment_span: u64,
    pub container_offset: u64,
    pub slice_offset: u64,
    pub slice_length: u64,
}

/// Coverage of one container on one reference, used only for pruning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coverage {
    pub reference_id: i32,
    pub min_pos: u64,
    pub max_pos: u64,
}

/// A container selected for decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDescriptor {
    pub offset: u64,
    pub coverage: Vec<Coverage>,
}

/// How the decoder walks the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerPlan {
    /// Every container in storage order
    Sequential,
    /// Only these containers, in ascending offset
    Seek(Vec<ContainerDescriptor>),
}

/// Parsed `.crai` index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerIndex {
    records: Vec<IndexRecord>,
}

/// Index path for a stream path (`<input>.crai`)
pub fn index_path(input: &Path) -> PathBuf {
    let mut path = input.as_os_str().to_owned();
    path.push(".");
    path.push(INDEX_SUFFIX);
    PathBuf::from(path)
}

impl ContainerIndex {
    #[must_use]
    pub fn new(records: Vec<IndexRecord>) -> Self {
        Self { records }
    }

    /// Load the index that sits next to `input`, if there is one.
    ///
    /// # Errors
    ///
    /// A missing index is `Ok(None)`; an unreadable or malformed one is an error.
    pub fn load(input: &Path) -> Result<Option<Self>, IndexError> {
        let path = index_path(input);
        if !path.exists() {
            debug!(path = %path.display(), "No container index found");
            return Ok(None);
        }

        let io_error = |source| IndexError::Io {
            path: path.display().to_string(),
            source,
        };
        let file = File::open(&path).map_err(io_error)?;
        let index = Self::read(BufReader::new(MultiGzDecoder::new(file))).map_err(|e| match e {
            IndexError::Io { source, .. } => io_error(source),
            other => other,
        })?;

        debug!(path = %path.display(), rows = index.records.len(), "Loaded container index");
        Ok(Some(index))
    }

    /// Parse uncompressed index rows.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::InvalidFormat` for rows without six integer fields or
    /// whose span runs past the largest position.
    pub fn read<R: BufRead>(reader: R) -> Result<Self, IndexError> {
        let mut records = Vec::new();

        for (i, line) in reader.lines().enumerate() {
            let line = line.map_err(|source| IndexError::Io {
                path: String::new(),
                source,
            })?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let invalid = |reason: String| IndexError::InvalidFormat {
                line: i + 1,
                reason,
            };

            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() != 6 {
                return Err(invalid(format!("expected 6 fields, found {}", fields.len())));
            }

            let unsigned = |s: &str| {
                s.parse::<u64>()
                    .map_err(|_| invalid(format!("invalid integer '{s}'")))
            };

            let record = IndexRecord {
                reference_id: fields[0]
                    .parse()
                    .map_err(|_| invalid(format!("invalid reference id '{}'", fields[0])))?,
                alignment_start: unsigned(fields[1])?,
                alignment_span: unsigned(fields[2])?,
                container_offset: unsigned(fields[3])?,
                slice_offset: unsigned(fields[4])?,
                slice_length: unsigned(fields[5])?,
            };
            if record.alignment_start.checked_add(record.alignment_span).is_none() {
                return Err(invalid(format!(
                    "alignment span {} overflows start {}",
                    record.alignment_span, record.alignment_start
                )));
            }
            records.push(record);
        }

        Ok(Self { records })
    }

    /// Write the index gzip-compressed.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if writing fails.
    pub fn write<W: Write>(&self, writer: W) -> io::Result<()> {
        let mut encoder = GzEncoder::new(writer, Compression::default());
        for r in &self.records {
            writeln!(
                encoder,
                "{}\t{}\t{}\t{}\t{}\t{}",
                r.reference_id,
                r.alignment_start,
                r.alignment_span,
                r.container_offset,
                r.slice_offset,
                r.slice_length
            )?;
        }
        encoder.finish()?.flush()
    }

    pub fn records(&self) -> &[IndexRecord] {
        &self.records
    }

    /// Containers that may hold records admitted by `interval`, ascending by offset.
    pub fn containers_overlapping(&self, interval: &Interval) -> Vec<ContainerDescriptor> {
        let mut matching: Vec<&IndexRecord> = self
            .records
            .iter()
            .filter(|r| row_may_overlap(r, interval))
            .collect();
        matching.sort_by_key(|r| r.container_offset);

        let mut descriptors: Vec<ContainerDescriptor> = Vec::new();
        for r in matching {
            let coverage = Coverage {
                reference_id: r.reference_id,
                min_pos: r.alignment_start,
                max_pos: max_pos(r),
            };
            match descriptors.last_mut() {
                Some(last) if last.offset == r.container_offset => last.coverage.push(coverage),
                _ => descriptors.push(ContainerDescriptor {
                    offset: r.container_offset,
                    coverage: vec![coverage],
                }),
            }
        }
        descriptors
    }
}

/// Choose how to walk the stream. Pruning needs both an index and an interval.
pub fn select_containers(index: Option<&ContainerIndex>, interval: Option<&Interval>) -> ContainerPlan {
    match (index, interval) {
        (Some(index), Some(interval)) => ContainerPlan::Seek(index.containers_overlapping(interval)),
        _ => ContainerPlan::Sequential,
    }
}

fn max_pos(r: &IndexRecord) -> u64 {
    r.alignment_start
        .saturating_add(r.alignment_span.saturating_sub(1))
}

fn row_may_overlap(r: &IndexRecord, interval: &Interval) -> bool {
    if r.reference_id == MULTI_REFERENCE_ID {
        return true;
    }
    match interval.target {
        RegionTarget::Unmapped => r.reference_id == UNMAPPED_REFERENCE_ID,
        RegionTarget::Reference(_) => match usize::try_from(r.reference_id) {
            Ok(reference_id) => interval.overlaps(
                reference_id,
                usize::try_from(r.alignment_start).unwrap_or(usize::MAX),
                usize::try_from(max_pos(r)).unwrap_or(usize::MAX),
            ),
            Err(_) => false,
        },
    }
}
