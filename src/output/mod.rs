//! Output sinks: SAM text or BGZF-compressed BAM through noodles.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use noodles::bam;
use noodles::core::Position;
use noodles::sam;
use noodles::sam::alignment::io::Write as AlignmentWrite;
use noodles::sam::alignment::record::data::field::Tag;
use noodles::sam::alignment::record::MappingQuality;
use noodles::sam::alignment::record_buf::data::field::Value as BufValue;
use noodles::sam::alignment::record_buf::{Cigar, QualityScores, Sequence};
use noodles::sam::alignment::RecordBuf;
use tracing::debug;

use crate::core::record::{AlignmentRecord, TagValue};

pub mod bgzf;

use bgzf::BgzfBlockWriter;

/// BAM compression level when none is given
pub const DEFAULT_COMPRESSION_LEVEL: u8 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Sam,
    Bam,
}

/// Destination for transcoded records.
///
/// `finish` is called only after every record was written; a sink dropped without
/// it must not look complete.
pub trait AlignmentSink {
    /// # Errors
    ///
    /// Returns an I/O error if the header cannot be written.
    fn write_header(&mut self, header: &sam::Header) -> io::Result<()>;

    /// # Errors
    ///
    /// Returns an I/O error if the record cannot be written.
    fn write_record(&mut self, header: &sam::Header, record: &AlignmentRecord) -> io::Result<()>;

    /// # Errors
    ///
    /// Returns an I/O error if the stream cannot be finalized.
    fn finish(&mut self, header: &sam::Header) -> io::Result<()>;
}

impl<S: AlignmentSink + ?Sized> AlignmentSink for &mut S {
    fn write_header(&mut self, header: &sam::Header) -> io::Result<()> {
        (**self).write_header(header)
    }

    fn write_record(&mut self, header: &sam::Header, record: &AlignmentRecord) -> io::Result<()> {
        (**self).write_record(header, record)
    }

    fn finish(&mut self, header: &sam::Header) -> io::Result<()> {
        (**self).finish(header)
    }
}

/// noodles-backed SAM or BAM writer.
pub enum AlignmentWriter {
    Sam(sam::io::Writer<Box<dyn Write>>),
    Bam(bam::io::Writer<BgzfBlockWriter<Box<dyn Write>>>),
}

impl AlignmentWriter {
    /// Open `path`, or stdout when `None`.
    ///
    /// The compression level applies to BAM only.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be created.
    pub fn create(path: Option<&Path>, format: OutputFormat, compression_level: Option<u8>) -> io::Result<Self> {
        let inner: Box<dyn Write> = match path {
            Some(path) => Box::new(BufWriter::new(File::create(path)?)),
            None => Box::new(BufWriter::new(io::stdout().lock())),
        };
        Ok(Self::new(inner, format, compression_level))
    }

    pub fn new(inner: Box<dyn Write>, format: OutputFormat, compression_level: Option<u8>) -> Self {
        match format {
            OutputFormat::Sam => {
                if let Some(level) = compression_level {
                    debug!(level, "Compression level ignored for SAM output");
                }
                Self::Sam(sam::io::Writer::new(inner))
            }
            OutputFormat::Bam => {
                let level = compression_level.unwrap_or(DEFAULT_COMPRESSION_LEVEL);
                Self::Bam(bam::io::Writer::from(BgzfBlockWriter::new(inner, u32::from(level))))
            }
        }
    }
}

impl AlignmentSink for AlignmentWriter {
    fn write_header(&mut self, header: &sam::Header) -> io::Result<()> {
        match self {
            Self::Sam(writer) => writer.write_header(header),
            Self::Bam(writer) => writer.write_header(header),
        }
    }

    fn write_record(&mut self, header: &sam::Header, record: &AlignmentRecord) -> io::Result<()> {
        let record = to_record_buf(record);
        match self {
            Self::Sam(writer) => writer.write_alignment_record(header, &record),
            Self::Bam(writer) => writer.write_alignment_record(header, &record),
        }
    }

    fn finish(&mut self, _header: &sam::Header) -> io::Result<()> {
        match self {
            Self::Sam(writer) => writer.get_mut().flush(),
            Self::Bam(writer) => writer.get_mut().finish(),
        }
    }
}

/// Collects records in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub header: Option<sam::Header>,
    pub records: Vec<AlignmentRecord>,
    pub finished: bool,
}

impl AlignmentSink for MemorySink {
    fn write_header(&mut self, header: &sam::Header) -> io::Result<()> {
        self.header = Some(header.clone());
        Ok(())
    }

    fn write_record(&mut self, _header: &sam::Header, record: &AlignmentRecord) -> io::Result<()> {
        self.records.push(record.clone());
        Ok(())
    }

    fn finish(&mut self, _header: &sam::Header) -> io::Result<()> {
        self.finished = true;
        Ok(())
    }
}

/// Convert to the noodles record model
pub fn to_record_buf(record: &AlignmentRecord) -> RecordBuf {
    let mut buf = RecordBuf::default();

    *buf.name_mut() = record.name.as_deref().map(Into::into);
    *buf.flags_mut() = record.flags;
    *buf.reference_sequence_id_mut() = record.reference_id;
    *buf.alignment_start_mut() = record.position.and_then(|p| Position::try_from(p).ok());
    *buf.mapping_quality_mut() = record.mapping_quality.and_then(MappingQuality::new);
    *buf.cigar_mut() = Cigar::from(record.cigar.clone());
    *buf.mate_reference_sequence_id_mut() = record.mate.reference_id;
    *buf.mate_alignment_start_mut() = record.mate.position.and_then(|p| Position::try_from(p).ok());
    *buf.template_length_mut() = record.mate.template_length;
    *buf.sequence_mut() = Sequence::from(record.sequence.clone());
    *buf.quality_scores_mut() = QualityScores::from(record.quality_scores.clone());

    let data = buf.data_mut();
    for (key, value) in record.tags.iter() {
        data.insert(Tag::from(key.0), to_buf_value(value));
    }

    buf
}

fn to_buf_value(value: &TagValue) -> BufValue {
    match value {
        TagValue::Character(c) => BufValue::Character(*c),
        TagValue::Int(n) => BufValue::from(*n),
        TagValue::Float(f) => BufValue::from(*f),
        TagValue::String(s) => BufValue::from(s.as_str()),
        TagValue::UInt8Array(values) => BufValue::from(values.clone()),
        TagValue::IntArray(values) => BufValue::from(values.clone()),
        TagValue::FloatArray(values) => BufValue::from(values.clone()),
    }
}
