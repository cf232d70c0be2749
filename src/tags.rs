//! Recompute MD and NM tags against the reference.
//!
//! MD follows the SAM convention: match-run lengths separated by the mismatching
//! reference base, `^` plus the deleted reference bases for deletions, and a run
//! length (possibly `0`) at both ends and between every edit. NM counts mismatches
//! plus inserted and deleted bases.
//!
//! An `N` on either side never matches; `=` in the read always does.

use std::sync::Arc;

use noodles::sam::alignment::record::cigar::op::Kind;
use thiserror::Error;

use crate::core::record::{AlignmentRecord, TagKey, TagValue};
use crate::core::reference::{ReferenceError, ReferenceStore};

#[derive(Error, Debug)]
pub enum TagError {
    #[error("CIGAR of record '{record}' needs {needed} read bases but the sequence has {length}")]
    SequenceOverrun {
        record: String,
        needed: usize,
        length: usize,
    },

    #[error("Record '{record}' is mapped but has no reference placement")]
    MissingPlacement { record: String },

    #[error("Record '{record}' runs off its reference: {source}")]
    Reference {
        record: String,
        #[source]
        source: ReferenceError,
    },
}

/// MD and NM values for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalculatedTags {
    pub md: String,
    pub nm: u32,
}

/// Sets MD and NM on records that can carry them.
#[derive(Debug, Clone)]
pub struct TagSynthesizer {
    reference: Arc<ReferenceStore>,
}

impl TagSynthesizer {
    pub fn new(reference: Arc<ReferenceStore>) -> Self {
        Self { reference }
    }

    /// Replace any existing MD/NM on `record` with recomputed values.
    ///
    /// Unmapped records and records without a CIGAR or sequence are left untouched.
    ///
    /// # Errors
    ///
    /// Returns a `TagError` if the CIGAR overruns the sequence or the reference.
    pub fn apply(&self, record: &mut AlignmentRecord) -> Result<(), TagError> {
        if let Some(tags) = compute(record, &self.reference)? {
            record
                .tags
                .insert(TagKey::MISMATCHED_POSITIONS, TagValue::String(tags.md));
            record.tags.insert(
                TagKey::EDIT_DISTANCE,
                TagValue::Int(i32::try_from(tags.nm).unwrap_or(i32::MAX)),
            );
        }
        Ok(())
    }
}

/// Compute MD and NM, or `None` for records that do not get them.
///
/// # Errors
///
/// Returns a `TagError` if the CIGAR overruns the sequence or the reference.
pub fn compute(record: &AlignmentRecord, reference: &ReferenceStore) -> Result<Option<CalculatedTags>, TagError> {
    if record.is_unmapped() || record.cigar.is_empty() || record.sequence.is_empty() {
        return Ok(None);
    }

    let record_name = || record.name.clone().unwrap_or_else(|| "*".to_string());
    let (Some(reference_id), Some(start)) = (record.reference_id, record.position) else {
        return Err(TagError::MissingPlacement {
            record: record_name(),
        });
    };

    let reference_error = |source| TagError::Reference {
        record: record_name(),
        source,
    };
    let read_bases = |from: usize, len: usize| {
        record
            .sequence
            .get(from..from.saturating_add(len))
            .ok_or_else(|| TagError::SequenceOverrun {
                record: record_name(),
                needed: from.saturating_add(len),
                length: record.sequence.len(),
            })
    };

    let mut md = String::new();
    let mut run = 0usize;
    let mut nm = 0u32;
    let mut read_pos = 0usize;
    // 0-based
    let mut ref_pos = start.saturating_sub(1);

    for op in &record.cigar {
        let len = op.len();
        match op.kind() {
            Kind::Match | Kind::SequenceMatch | Kind::SequenceMismatch => {
                let read = read_bases(read_pos, len)?;
                let bases = reference
                    .slice(reference_id, ref_pos, ref_pos.saturating_add(len))
                    .map_err(reference_error)?;

                for (&read_base, &reference_base) in read.iter().zip(bases) {
                    let reference_base = reference_base.to_ascii_uppercase();
                    if bases_match(read_base, reference_base) {
                        run += 1;
                    } else {
                        md.push_str(&run.to_string());
                        md.push(char::from(reference_base));
                        run = 0;
                        nm += 1;
                    }
                }
                read_pos += len;
                ref_pos += len;
            }
            Kind::Insertion => {
                read_bases(read_pos, len)?;
                nm = nm.saturating_add(edit_count(len));
                read_pos += len;
            }
            Kind::SoftClip => {
                read_bases(read_pos, len)?;
                read_pos += len;
            }
            Kind::Deletion => {
                let bases = reference
                    .slice(reference_id, ref_pos, ref_pos.saturating_add(len))
                    .map_err(reference_error)?;
                md.push_str(&run.to_string());
                md.push('^');
                md.extend(bases.iter().map(|b| char::from(b.to_ascii_uppercase())));
                run = 0;
                nm = nm.saturating_add(edit_count(len));
                ref_pos += len;
            }
            Kind::Skip => {
                ref_pos = ref_pos.saturating_add(len);
                let length = reference.contig_length(reference_id).map_err(reference_error)?;
                if ref_pos > length {
                    return Err(reference_error(ReferenceError::OutOfRange {
                        name: reference.name(reference_id).unwrap_or_default().to_string(),
                        position: ref_pos,
                        length,
                    }));
                }
            }
            Kind::HardClip | Kind::Pad => {}
        }
    }
    md.push_str(&run.to_string());

    Ok(Some(CalculatedTags { md, nm }))
}

fn edit_count(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

fn bases_match(read_base: u8, reference_base: u8) -> bool {
    let read_base = read_base.to_ascii_uppercase();
    read_base == b'=' || (read_base == reference_base && read_base != b'N')
}
