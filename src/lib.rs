//! # cram-to-sam
//!
//! Reference-guided transcoding of container-packed alignment records to SAM or BAM.
//!
//! Mapped records in a container stream do not carry their bases. They carry a list
//! of edits (substitutions, insertions, deletions, clips) against a reference, and
//! are rebuilt by replaying those edits over the reference FASTA. This crate reads
//! such a stream, optionally restricted to a region through its `.crai` index,
//! rebuilds every record, optionally recomputes MD/NM, and streams the result in
//! order into a SAM or BAM writer.
//!
//! ## Example
//!
//! ```rust,no_run
//! use cram_to_sam::core::interval::Region;
//! use cram_to_sam::output::OutputFormat;
//! use cram_to_sam::session::{SessionConfig, TranscodeSession};
//!
//! let mut config = SessionConfig::new("sample.ctr", "ref.fa");
//! config.region = Some(Region::parse("chr1:1000-2000").unwrap());
//! config.output = Some("region.bam".into());
//! config.output_format = OutputFormat::Bam;
//!
//! let summary = TranscodeSession::new(config).run().unwrap();
//! println!("{} records", summary.records_written);
//! ```
//!
//! ## Modules
//!
//! - [`core`]: reference store, regions, header dictionary, and the record model
//! - [`container`]: the on-disk container stream, its codec, reader, writer, and index
//! - [`decode`]: the reference-guided decoder
//! - [`tags`]: MD/NM recomputation
//! - [`output`]: SAM/BAM sinks and the BGZF block writer
//! - [`session`]: one configured transcode run
//! - [`cli`]: command-line interface implementation

pub mod cli;
pub mod container;
pub mod core;
pub mod decode;
pub mod output;
pub mod session;
pub mod tags;
pub mod utils;

// Re-export commonly used types for convenience
pub use crate::core::interval::{Interval, Region};
pub use crate::core::record::AlignmentRecord;
pub use crate::core::reference::ReferenceStore;
pub use output::{AlignmentSink, OutputFormat};
pub use session::{ErrorKind, SessionConfig, TranscodeError, TranscodeSession, TranscodeSummary};
