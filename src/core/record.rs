//! The reconstructed alignment record handed from stage to stage.

use std::fmt;

use noodles::sam::alignment::record::cigar::Op;
use noodles::sam::alignment::record::Flags;
use serde::{Deserialize, Serialize};

/// Two-character auxiliary tag key (e.g. `MD`, `NM`, `RG`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TagKey(pub [u8; 2]);

impl TagKey {
    pub const MISMATCHED_POSITIONS: Self = Self(*b"MD");
    pub const EDIT_DISTANCE: Self = Self(*b"NM");
}

impl fmt::Display for TagKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", char::from(self.0[0]), char::from(self.0[1]))
    }
}

/// Typed auxiliary tag value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TagValue {
    Character(u8),
    Int(i32),
    Float(f32),
    String(String),
    UInt8Array(Vec<u8>),
    IntArray(Vec<i32>),
    FloatArray(Vec<f32>),
}

/// Auxiliary tags in insertion order with unique keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tags(Vec<(TagKey, TagValue)>);

impl Tags {
    pub fn get(&self, key: TagKey) -> Option<&TagValue> {
        self.0.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    /// Set a tag, replacing any existing value in place.
    pub fn insert(&mut self, key: TagKey, value: TagValue) {
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn remove(&mut self, key: TagKey) -> Option<TagValue> {
        let index = self.0.iter().position(|(k, _)| *k == key)?;
        Some(self.0.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(TagKey, TagValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(TagKey, TagValue)> for Tags {
    fn from_iter<I: IntoIterator<Item = (TagKey, TagValue)>>(iter: I) -> Self {
        let mut tags = Self::default();
        for (key, value) in iter {
            tags.insert(key, value);
        }
        tags
    }
}

/// Mate placement as stored with the record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mate {
    pub reference_id: Option<usize>,
    /// 1-based
    pub position: Option<usize>,
    pub template_length: i32,
}

/// A fully reconstructed alignment record.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentRecord {
    pub name: Option<String>,
    pub flags: Flags,
    pub reference_id: Option<usize>,
    /// 1-based alignment start
    pub position: Option<usize>,
    pub mapping_quality: Option<u8>,
    pub cigar: Vec<Op>,
    pub sequence: Vec<u8>,
    /// Raw Phred scores, not ASCII-offset
    pub quality_scores: Vec<u8>,
    pub mate: Mate,
    pub tags: Tags,
}

impl AlignmentRecord {
    pub fn is_unmapped(&self) -> bool {
        self.flags.is_unmapped()
    }

    /// Number of reference bases covered by the CIGAR
    pub fn reference_span(&self) -> usize {
        use noodles::sam::alignment::record::cigar::op::Kind;

        self.cigar
            .iter()
            .filter(|op| {
                matches!(
                    op.kind(),
                    Kind::Match
                        | Kind::Deletion
                        | Kind::Skip
                        | Kind::SequenceMatch
                        | Kind::SequenceMismatch
                )
            })
            .map(|op| op.len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use noodles::sam::alignment::record::cigar::op::Kind;

    #[test]
    fn test_tags_insert_replaces() {
        let mut tags = Tags::default();
        tags.insert(TagKey(*b"RG"), TagValue::String("rg1".to_string()));
        tags.insert(TagKey::EDIT_DISTANCE, TagValue::Int(3));
        tags.insert(TagKey(*b"RG"), TagValue::String("rg2".to_string()));

        assert_eq!(tags.len(), 2);
        assert_eq!(
            tags.iter().next().unwrap(),
            &(TagKey(*b"RG"), TagValue::String("rg2".to_string()))
        );
        assert_eq!(tags.remove(TagKey::EDIT_DISTANCE), Some(TagValue::Int(3)));
        assert!(tags.get(TagKey::EDIT_DISTANCE).is_none());
    }

    #[test]
    fn test_tag_key_display() {
        assert_eq!(TagKey::MISMATCHED_POSITIONS.to_string(), "MD");
    }

    #[test]
    fn test_reference_span() {
        let record = AlignmentRecord {
            name: None,
            flags: Flags::empty(),
            reference_id: Some(0),
            position: Some(1),
            mapping_quality: None,
            cigar: vec![
                Op::new(Kind::SoftClip, 2),
                Op::new(Kind::Match, 5),
                Op::new(Kind::Insertion, 1),
                Op::new(Kind::Deletion, 3),
                Op::new(Kind::Skip, 10),
                Op::new(Kind::Match, 4),
            ],
            sequence: Vec::new(),
            quality_scores: Vec::new(),
            mate: Mate::default(),
            tags: Tags::default(),
        };
        assert_eq!(record.reference_span(), 22);
    }
}
