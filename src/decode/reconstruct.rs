//! Rebuild read bases and CIGAR from stored features and the reference.

use noodles::sam::alignment::record::cigar::op::Kind;
use noodles::sam::alignment::record::cigar::Op;
use thiserror::Error;

use crate::container::{Feature, StoredRecord, SubstitutionMatrix};
use crate::core::reference::{ReferenceError, ReferenceStore};
use crate::utils::validation::{validate_read_length, ValidationError};

#[derive(Error, Debug)]
pub enum ReconstructError {
    #[error("Feature at read position {position} follows read position {previous}")]
    FeatureOrder { position: usize, previous: usize },

    #[error("Feature at read position {position} is outside a read of length {read_length}")]
    FeatureOutOfRange { position: usize, read_length: usize },

    #[error("Features produce {actual} bases for a read of length {read_length}")]
    Overrun { read_length: usize, actual: usize },

    #[error("Invalid substitution code {code} at read position {position}")]
    SubstitutionCode { position: usize, code: u8 },

    #[error("Feature at read position {position} overflows the reference or CIGAR length")]
    LengthOverflow { position: usize },

    #[error("Mapped record has no reference placement")]
    MissingPlacement,

    #[error(transparent)]
    Reference(#[from] ReferenceError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Read bases and CIGAR of a mapped record.
///
/// Reference bases are copied into every gap between features; features are
/// applied in ascending read position. Adjacent operations of one kind are merged.
///
/// # Errors
///
/// Returns a `ReconstructError` for malformed feature lists or a reference overrun.
pub fn reconstruct(
    record: &StoredRecord,
    matrix: &SubstitutionMatrix,
    reference: &ReferenceStore,
) -> Result<(Vec<u8>, Vec<Op>), ReconstructError> {
    let (Some(reference_id), Some(start)) = (record.reference_id, record.alignment_start) else {
        return Err(ReconstructError::MissingPlacement);
    };
    if start == 0 {
        return Err(ReconstructError::MissingPlacement);
    }

    let read_length = validate_read_length(record.read_length)?;
    let mut read = Read {
        bases: Vec::with_capacity(read_length),
        cigar: Vec::new(),
        read_length,
    };
    // 0-based reference cursor
    let mut r = start - 1;
    let mut previous = 1;

    for feature in &record.features {
        let position = feature.position();
        if position == 0 || position > read_length + 1 {
            return Err(ReconstructError::FeatureOutOfRange {
                position,
                read_length,
            });
        }

        let next = read.bases.len() + 1;
        if position < previous || position < next {
            return Err(ReconstructError::FeatureOrder {
                position,
                previous: previous.max(next - 1),
            });
        }

        read.copy_reference(reference, reference_id, &mut r, position - next)?;

        match feature {
            Feature::Substitution { code, .. } => {
                let reference_base = reference.base_at(reference_id, r)?;
                let base = matrix
                    .read_base(reference_base, *code)
                    .ok_or(ReconstructError::SubstitutionCode {
                        position,
                        code: *code,
                    })?;
                read.push(Kind::Match, &[base])?;
                advance(reference, reference_id, &mut r, 1, position)?;
            }
            Feature::ReadBase { base, .. } => {
                read.push(Kind::Match, &[*base])?;
                advance(reference, reference_id, &mut r, 1, position)?;
            }
            Feature::Insertion { bases, .. } => read.push(Kind::Insertion, bases)?,
            Feature::InsertBase { base, .. } => read.push(Kind::Insertion, &[*base])?,
            Feature::SoftClip { bases, .. } => read.push(Kind::SoftClip, bases)?,
            Feature::Deletion { len, .. } => {
                read.op(Kind::Deletion, *len)?;
                advance(reference, reference_id, &mut r, *len, position)?;
            }
            Feature::ReferenceSkip { len, .. } => {
                read.op(Kind::Skip, *len)?;
                advance(reference, reference_id, &mut r, *len, position)?;
            }
            Feature::Padding { len, .. } => read.op(Kind::Pad, *len)?,
            Feature::HardClip { len, .. } => read.op(Kind::HardClip, *len)?,
        }

        previous = position;
    }

    let remaining = read_length - read.bases.len();
    read.copy_reference(reference, reference_id, &mut r, remaining)?;

    Ok((read.bases, read.cigar))
}

/// Move the 0-based reference cursor `len` bases forward, staying within the contig.
fn advance(
    reference: &ReferenceStore,
    reference_id: usize,
    r: &mut usize,
    len: usize,
    position: usize,
) -> Result<(), ReconstructError> {
    let next = r
        .checked_add(len)
        .ok_or(ReconstructError::LengthOverflow { position })?;
    let length = reference.contig_length(reference_id)?;
    if next > length {
        return Err(ReferenceError::OutOfRange {
            name: reference.name(reference_id).unwrap_or_default().to_string(),
            position: next,
            length,
        }
        .into());
    }
    *r = next;
    Ok(())
}

struct Read {
    bases: Vec<u8>,
    cigar: Vec<Op>,
    read_length: usize,
}

impl Read {
    fn push(&mut self, kind: Kind, bases: &[u8]) -> Result<(), ReconstructError> {
        let actual = self.bases.len() + bases.len();
        if actual > self.read_length {
            return Err(ReconstructError::Overrun {
                read_length: self.read_length,
                actual,
            });
        }
        self.bases.extend_from_slice(bases);
        self.op(kind, bases.len())
    }

    fn copy_reference(
        &mut self,
        reference: &ReferenceStore,
        reference_id: usize,
        r: &mut usize,
        len: usize,
    ) -> Result<(), ReconstructError> {
        if len == 0 {
            return Ok(());
        }
        let end = r.checked_add(len).ok_or(ReconstructError::LengthOverflow {
            position: self.bases.len() + 1,
        })?;
        let bases: Vec<u8> = reference
            .slice(reference_id, *r, end)?
            .iter()
            .map(u8::to_ascii_uppercase)
            .collect();
        self.push(Kind::Match, &bases)?;
        *r = end;
        Ok(())
    }

    fn op(&mut self, kind: Kind, len: usize) -> Result<(), ReconstructError> {
        if len == 0 {
            return Ok(());
        }
        match self.cigar.last_mut() {
            Some(last) if last.kind() == kind => {
                let merged = last.len().checked_add(len).ok_or(ReconstructError::LengthOverflow {
                    position: self.bases.len() + 1,
                })?;
                *last = Op::new(kind, merged);
            }
            _ => self.cigar.push(Op::new(kind, len)),
        }
        Ok(())
    }
}
