//! Transcode session: wires the stages together for one run.
//!
//! Order of operations:
//!
//! 1. open the input and read its header; resolve the region against it
//! 2. load the reference and conform it to the header dictionary
//! 3. load the container index, only when a region was requested
//! 4. open the output, write the header with an added `@PG` line
//! 5. pull records through decode, tag synthesis, and the sink
//! 6. finish the sink only when the decoder reached its EOF container
//!
//! Configuration problems are reported before any output is opened.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::container::index::{select_containers, ContainerIndex, ContainerPlan, IndexError};
use crate::container::reader::ContainerReader;
use crate::core::header::{add_program_line, parse_sam_header, HeaderError, ProgramInfo, ReferenceDictionary};
use crate::core::interval::{Region, RegionError, RegionTarget};
use crate::core::reference::{ReferenceError, ReferenceStore};
use crate::decode::{DecodeError, Decoder};
use crate::output::{AlignmentSink, AlignmentWriter, OutputFormat};
use crate::tags::{TagError, TagSynthesizer};
use crate::utils::validation::{validate_compression_level, ValidationError};

/// Everything one run needs; fixed before the run starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub input: PathBuf,
    pub reference: PathBuf,
    /// `None` writes to stdout
    pub output: Option<PathBuf>,
    pub region: Option<Region>,
    pub recompute_tags: bool,
    /// Prefix for synthesized read names; the input file name when `None`
    pub name_prefix: Option<String>,
    pub output_format: OutputFormat,
    pub compression_level: Option<u8>,
    pub program: ProgramInfo,
}

impl SessionConfig {
    pub fn new(input: impl Into<PathBuf>, reference: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            reference: reference.into(),
            output: None,
            region: None,
            recompute_tags: false,
            name_prefix: None,
            output_format: OutputFormat::Sam,
            compression_level: None,
            program: ProgramInfo::new(""),
        }
    }

    /// The configured prefix, or the input's file name
    pub fn effective_name_prefix(&self) -> String {
        self.name_prefix.clone().unwrap_or_else(|| {
            self.input
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default()
        })
    }
}

/// Failure classes reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Resource,
    Decode,
    TagComputation,
    IncompleteStream,
}

#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("Invalid region: {0}")]
    Region(#[from] RegionError),

    #[error("Invalid option: {0}")]
    Validation(#[from] ValidationError),

    #[error("Failed to open input '{path}': {source}")]
    OpenInput {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read the header of '{path}': {source}")]
    InputHeader {
        path: String,
        #[source]
        source: DecodeError,
    },

    #[error("Invalid stream header: {0}")]
    Header(#[from] HeaderError),

    #[error(transparent)]
    Reference(#[from] ReferenceError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("Failed to open output '{path}': {source}")]
    OpenOutput {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write output: {0}")]
    Output(#[source] io::Error),

    #[error("Decoding failed: {0}")]
    Decode(#[source] DecodeError),

    #[error("Tag computation failed: {0}")]
    Tags(#[from] TagError),

    #[error("Input '{path}' ended without its EOF container; the output is incomplete")]
    IncompleteStream { path: String },
}

impl TranscodeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Region(_) | Self::Validation(_) => ErrorKind::Configuration,
            Self::OpenInput { .. }
            | Self::Header(_)
            | Self::Reference(_)
            | Self::Index(_)
            | Self::OpenOutput { .. }
            | Self::Output(_) => ErrorKind::Resource,
            Self::InputHeader { .. } | Self::Decode(_) => ErrorKind::Decode,
            Self::Tags(_) => ErrorKind::TagComputation,
            Self::IncompleteStream { .. } => ErrorKind::IncompleteStream,
        }
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscodeSummary {
    pub records_written: u64,
    pub containers_decoded: usize,
}

pub struct TranscodeSession {
    config: SessionConfig,
}

impl TranscodeSession {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Run into the configured output file or stdout.
    ///
    /// # Errors
    ///
    /// Returns a `TranscodeError`; the output is then left without its end-of-stream
    /// marker.
    pub fn run(&self) -> Result<TranscodeSummary, TranscodeError> {
        self.run_with(|config| {
            AlignmentWriter::create(
                config.output.as_deref(),
                config.output_format,
                config.compression_level,
            )
        })
    }

    /// Run into a sink opened by `open_sink` once the inputs have been validated.
    ///
    /// # Errors
    ///
    /// Returns a `TranscodeError`; the sink is dropped without `finish` on any failure.
    pub fn run_with<S, F>(&self, open_sink: F) -> Result<TranscodeSummary, TranscodeError>
    where
        S: AlignmentSink,
        F: FnOnce(&SessionConfig) -> io::Result<S>,
    {
        let config = &self.config;
        let input = config.input.display().to_string();

        if let Some(level) = config.compression_level {
            validate_compression_level(level)?;
        }

        let mut reader = ContainerReader::open(&config.input).map_err(|source| TranscodeError::OpenInput {
            path: input.clone(),
            source,
        })?;
        let header_text = reader
            .read_file_header()
            .map_err(|source| TranscodeError::InputHeader {
                path: input.clone(),
                source,
            })?;
        let dictionary = ReferenceDictionary::from_header_text(&header_text)?;
        debug!(contigs = dictionary.len(), "Read stream header");

        let interval = config
            .region
            .as_ref()
            .map(|region| region.resolve(&dictionary))
            .transpose()?;
        if let (Some(region), Some(interval)) = (&config.region, &interval) {
            match interval.target {
                RegionTarget::Unmapped => info!(region = %region, "Restricting to unplaced reads"),
                RegionTarget::Reference(id) => info!(
                    region = %region,
                    reference_id = id,
                    start = interval.start,
                    end = interval.end,
                    "Restricting to region"
                ),
            }
        }

        let reference = Arc::new(ReferenceStore::load(&config.reference)?.conform_to(&dictionary)?);

        let plan = match &interval {
            Some(interval) => {
                let index = ContainerIndex::load(&config.input)?;
                if index.is_none() {
                    warn!(input = %input, "No container index; scanning the whole stream");
                }
                select_containers(index.as_ref(), Some(interval))
            }
            None => ContainerPlan::Sequential,
        };
        if let ContainerPlan::Seek(descriptors) = &plan {
            debug!(containers = descriptors.len(), "Selected containers from index");
        }

        let mut decoder = Decoder::new(reader, Arc::clone(&reference), plan)
            .with_interval(interval)
            .with_name_prefix(config.effective_name_prefix());
        let synthesizer = config
            .recompute_tags
            .then(|| TagSynthesizer::new(Arc::clone(&reference)));

        let header = parse_sam_header(&add_program_line(&header_text, &config.program))?;

        let mut sink = open_sink(config).map_err(|source| TranscodeError::OpenOutput {
            path: config
                .output
                .as_ref()
                .map_or_else(|| "-".to_string(), |p| p.display().to_string()),
            source,
        })?;
        sink.write_header(&header).map_err(TranscodeError::Output)?;

        let mut records_written = 0u64;
        while let Some(mut record) = decoder.next_record().map_err(|e| match e {
            DecodeError::IncompleteStream => TranscodeError::IncompleteStream {
                path: input.clone(),
            },
            other => TranscodeError::Decode(other),
        })? {
            if let Some(synthesizer) = &synthesizer {
                synthesizer.apply(&mut record)?;
            }
            sink.write_record(&header, &record).map_err(TranscodeError::Output)?;
            records_written += 1;
        }

        sink.finish(&header).map_err(TranscodeError::Output)?;

        let summary = TranscodeSummary {
            records_written,
            containers_decoded: decoder.containers_decoded(),
        };
        info!(
            records = summary.records_written,
            containers = summary.containers_decoded,
            "Transcode complete"
        );
        Ok(summary)
    }
}
