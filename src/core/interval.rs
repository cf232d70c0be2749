//! Region requests and the genomic intervals they resolve to.
//!
//! Accepted region forms:
//!
//! | Form              | Interval                          |
//! |-------------------|-----------------------------------|
//! | `name`            | whole contig (`usize::MIN..=MAX`) |
//! | `name:pos`        | `pos..=pos`                       |
//! | `name:start-end`  | `start..=end`                     |
//! | `*`               | unplaced reads only               |
//!
//! Positions are 1-based and inclusive, as in SAM `POS`.

use std::fmt;

use thiserror::Error;

/// Reference name that selects unplaced reads instead of a contig
pub const UNMAPPED_WILDCARD: &str = "*";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegionError {
    #[error("Malformed range format: '{0}'")]
    MalformedRange(String),

    #[error("Unknown reference name '{0}'")]
    UnknownReference(String),
}

/// Anything that can map a contig name to its reference id.
pub trait ContigLookup {
    fn reference_id(&self, name: &str) -> Option<usize>;
}

/// What an interval selects on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionTarget {
    Reference(usize),
    /// Unplaced reads only
    Unmapped,
}

/// A resolved genomic interval, 1-based inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub target: RegionTarget,
    pub start: usize,
    pub end: usize,
}

impl Interval {
    /// The interval covering a whole reference
    #[must_use]
    pub fn whole(reference_id: usize) -> Self {
        Self {
            target: RegionTarget::Reference(reference_id),
            start: usize::MIN,
            end: usize::MAX,
        }
    }

    /// The unmapped-reads sentinel interval
    #[must_use]
    pub fn unmapped() -> Self {
        Self {
            target: RegionTarget::Unmapped,
            start: usize::MIN,
            end: usize::MAX,
        }
    }

    /// True if a record on `reference_id` at 1-based `position` falls inside this interval.
    ///
    /// The unmapped sentinel admits unplaced reads only; an unmapped read placed next
    /// to its mate belongs to its mate's reference.
    pub fn admits(&self, reference_id: Option<usize>, position: Option<usize>, unmapped: bool) -> bool {
        match self.target {
            RegionTarget::Unmapped => unmapped && (reference_id.is_none() || position.is_none()),
            RegionTarget::Reference(id) => match (reference_id, position) {
                (Some(rid), Some(pos)) => rid == id && self.start <= pos && pos <= self.end,
                _ => false,
            },
        }
    }

    /// True if positions `min_pos..=max_pos` on `reference_id` can hold admitted records.
    pub fn overlaps(&self, reference_id: usize, min_pos: usize, max_pos: usize) -> bool {
        match self.target {
            RegionTarget::Unmapped => false,
            RegionTarget::Reference(id) => {
                id == reference_id && min_pos <= self.end && self.start <= max_pos
            }
        }
    }
}

/// A parsed but not yet resolved region request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    raw: String,
    name: String,
    range: Option<(usize, usize)>,
}

impl Region {
    /// Parse `name`, `name:pos`, or `name:start-end`.
    ///
    /// The last `:` separates the name from the range. Because some contig names
    /// contain `:`, [`Region::resolve`] first tries the whole string as a name.
    ///
    /// # Errors
    ///
    /// Returns `RegionError::MalformedRange` for an empty name, non-numeric or negative
    /// positions, more than two numeric fields, or `start > end`.
    pub fn parse(raw: &str) -> Result<Self, RegionError> {
        let malformed = || RegionError::MalformedRange(raw.to_string());

        let (name, range) = match raw.rsplit_once(':') {
            Some((name, range)) => (name, Some(parse_range(range).ok_or_else(malformed)?)),
            None => (raw, None),
        };

        if name.is_empty() {
            return Err(malformed());
        }

        Ok(Self {
            raw: raw.to_string(),
            name: name.to_string(),
            range,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn range(&self) -> Option<(usize, usize)> {
        self.range
    }

    /// Resolve the name against a contig dictionary.
    ///
    /// # Errors
    ///
    /// Returns `RegionError::UnknownReference` if neither the raw string nor the
    /// parsed name names a contig and the name is not the `*` wildcard.
    pub fn resolve(&self, lookup: &impl ContigLookup) -> Result<Interval, RegionError> {
        if self.name == UNMAPPED_WILDCARD {
            return Ok(Interval::unmapped());
        }

        if self.range.is_some() {
            if let Some(id) = lookup.reference_id(&self.raw) {
                return Ok(Interval::whole(id));
            }
        }

        if let Some(id) = lookup.reference_id(&self.name) {
            let (start, end) = self.range.unwrap_or((usize::MIN, usize::MAX));
            return Ok(Interval {
                target: RegionTarget::Reference(id),
                start,
                end,
            });
        }

        Err(RegionError::UnknownReference(self.name.clone()))
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Parse and resolve an optional region string; `None` means no filtering.
///
/// # Errors
///
/// Returns `RegionError` if the string is malformed or names an unknown reference.
pub fn resolve(
    raw: Option<&str>,
    lookup: &impl ContigLookup,
) -> Result<Option<Interval>, RegionError> {
    raw.map(|r| Region::parse(r)?.resolve(lookup)).transpose()
}

fn parse_range(s: &str) -> Option<(usize, usize)> {
    let fields: Vec<&str> = s.split('-').collect();
    let parse = |f: &str| -> Option<usize> {
        if f.is_empty() || !f.bytes().all(|b| b.is_ascii_digit()) {
            None
        } else {
            f.parse().ok()
        }
    };

    let (start, end) = match fields.as_slice() {
        [pos] => {
            let pos = parse(pos)?;
            (pos, pos)
        }
        [start, end] => (parse(start)?, parse(end)?),
        _ => return None,
    };

    (start <= end).then_some((start, end))
}
