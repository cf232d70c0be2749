//! Reference Store: immutable, randomly addressable reference bases per contig.
//!
//! Loaded once from a FASTA file (plain, gzip, or bgzip) and shared read-only
//! between the decoder and the tag synthesizer.

use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use noodles::fasta;
use thiserror::Error;
use tracing::{debug, info};

use crate::core::contig::Contig;
use crate::core::header::ReferenceDictionary;
use crate::core::interval::ContigLookup;
use crate::utils::validation::{check_contig_limit, sequence_md5};

#[derive(Error, Debug)]
pub enum ReferenceError {
    #[error("Failed to load reference '{path}': {reason}")]
    Load { path: String, reason: String },

    #[error("Reference contig '{0}' declared in the header is missing from the FASTA")]
    MissingContig(String),

    #[error("Reference contig '{name}' has length {actual}, header declares {expected}")]
    LengthMismatch {
        name: String,
        expected: u64,
        actual: u64,
    },

    #[error("Reference contig '{name}' has MD5 {actual}, header declares {expected}")]
    Md5Mismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("Unknown reference id {0}")]
    UnknownId(usize),

    #[error("Position {position} is out of range for reference '{name}' (length {length})")]
    OutOfRange {
        name: String,
        position: usize,
        length: usize,
    },
}

#[derive(Debug, Clone)]
struct Sequence {
    name: String,
    bases: Vec<u8>,
}

/// Reference bases indexed by reference id.
#[derive(Debug, Clone, Default)]
pub struct ReferenceStore {
    sequences: Vec<Sequence>,
    name_to_id: HashMap<String, usize>,
}

impl ReferenceStore {
    /// Load every contig of a FASTA file, in file order.
    ///
    /// # Errors
    ///
    /// Returns `ReferenceError::Load` if the file cannot be read, is not valid FASTA,
    /// holds no sequences, or holds duplicate names.
    pub fn load(path: &Path) -> Result<Self, ReferenceError> {
        let load_error = |reason: String| ReferenceError::Load {
            path: path.display().to_string(),
            reason,
        };

        let file = std::fs::File::open(path).map_err(|e| load_error(e.to_string()))?;
        let store = if is_gzipped(path) {
            Self::from_reader(BufReader::new(MultiGzDecoder::new(file)))
        } else {
            Self::from_reader(BufReader::new(file))
        }
        .map_err(load_error)?;

        info!(
            path = %path.display(),
            contigs = store.len(),
            "Loaded reference"
        );
        Ok(store)
    }

    /// Build a store from FASTA text on any buffered reader.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem on malformed or empty input.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, String> {
        let mut fasta_reader = fasta::io::Reader::new(reader);
        let mut sequences = Vec::new();

        for result in fasta_reader.records() {
            let record = result.map_err(|e| format!("Failed to parse FASTA record: {e}"))?;

            if let Some(message) = check_contig_limit(sequences.len()) {
                return Err(message);
            }

            sequences.push(Sequence {
                name: String::from_utf8_lossy(record.name()).to_string(),
                bases: record.sequence().as_ref().to_vec(),
            });
        }

        if sequences.is_empty() {
            return Err("No sequences found in FASTA file".to_string());
        }

        Self::from_sequences(sequences)
    }

    /// Build a store directly from named base sequences.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem if two sequences share a name.
    pub fn from_contigs<I, N>(contigs: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = (N, Vec<u8>)>,
        N: Into<String>,
    {
        Self::from_sequences(
            contigs
                .into_iter()
                .map(|(name, bases)| Sequence {
                    name: name.into(),
                    bases,
                })
                .collect(),
        )
    }

    fn from_sequences(sequences: Vec<Sequence>) -> Result<Self, String> {
        let mut name_to_id = HashMap::with_capacity(sequences.len());
        for (id, sequence) in sequences.iter().enumerate() {
            if name_to_id.insert(sequence.name.clone(), id).is_some() {
                return Err(format!("Duplicate sequence name '{}'", sequence.name));
            }
        }
        Ok(Self {
            sequences,
            name_to_id,
        })
    }

    /// Reorder contigs so reference ids follow the header dictionary.
    ///
    /// Contigs absent from the dictionary are dropped. Lengths are always checked;
    /// MD5s are checked when the dictionary declares one.
    ///
    /// # Errors
    ///
    /// Returns `MissingContig`, `LengthMismatch`, or `Md5Mismatch`.
    pub fn conform_to(mut self, dictionary: &ReferenceDictionary) -> Result<Self, ReferenceError> {
        let mut sequences = Vec::with_capacity(dictionary.len());

        for contig in dictionary.contigs() {
            let id = self
                .find(contig)
                .ok_or_else(|| ReferenceError::MissingContig(contig.name.clone()))?;
            let bases = std::mem::take(&mut self.sequences[id].bases);

            let actual = bases.len() as u64;
            if actual != contig.length {
                return Err(ReferenceError::LengthMismatch {
                    name: contig.name.clone(),
                    expected: contig.length,
                    actual,
                });
            }

            if let Some(expected) = &contig.md5 {
                let actual = sequence_md5(&bases);
                if &actual != expected {
                    return Err(ReferenceError::Md5Mismatch {
                        name: contig.name.clone(),
                        expected: expected.clone(),
                        actual,
                    });
                }
                debug!(contig = %contig.name, "Reference MD5 verified");
            }

            sequences.push(Sequence {
                name: contig.name.clone(),
                bases,
            });
        }

        Self::from_sequences(sequences).map_err(|reason| ReferenceError::Load {
            path: String::new(),
            reason,
        })
    }

    fn find(&self, contig: &Contig) -> Option<usize> {
        std::iter::once(&contig.name)
            .chain(&contig.aliases)
            .find_map(|name| self.name_to_id.get(name).copied())
    }

    /// Reference base at 0-based `position`, uppercased.
    ///
    /// # Errors
    ///
    /// Returns `UnknownId` or `OutOfRange`; callers treat both as fatal.
    pub fn base_at(&self, reference_id: usize, position: usize) -> Result<u8, ReferenceError> {
        let sequence = self.sequence(reference_id)?;
        sequence
            .bases
            .get(position)
            .map(u8::to_ascii_uppercase)
            .ok_or_else(|| ReferenceError::OutOfRange {
                name: sequence.name.clone(),
                position,
                length: sequence.bases.len(),
            })
    }

    /// Bases in the 0-based half-open range `start..end`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownId` or `OutOfRange` if the range runs past the contig.
    pub fn slice(&self, reference_id: usize, start: usize, end: usize) -> Result<&[u8], ReferenceError> {
        let sequence = self.sequence(reference_id)?;
        sequence
            .bases
            .get(start..end)
            .ok_or_else(|| ReferenceError::OutOfRange {
                name: sequence.name.clone(),
                position: end.max(start),
                length: sequence.bases.len(),
            })
    }

    /// # Errors
    ///
    /// Returns `UnknownId` if there is no such reference.
    pub fn contig_length(&self, reference_id: usize) -> Result<usize, ReferenceError> {
        self.sequence(reference_id).map(|s| s.bases.len())
    }

    pub fn name(&self, reference_id: usize) -> Option<&str> {
        self.sequences.get(reference_id).map(|s| s.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    fn sequence(&self, reference_id: usize) -> Result<&Sequence, ReferenceError> {
        self.sequences
            .get(reference_id)
            .ok_or(ReferenceError::UnknownId(reference_id))
    }
}

impl ContigLookup for ReferenceStore {
    fn reference_id(&self, name: &str) -> Option<usize> {
        self.name_to_id.get(name).copied()
    }
}

/// Check if the path is a gzipped file
#[allow(clippy::case_sensitive_file_extension_comparisons)] // Already lowercased
fn is_gzipped(path: &Path) -> bool {
    let path_str = path.to_string_lossy().to_lowercase();
    path_str.ends_with(".gz") || path_str.ends_with(".bgz")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_fasta() {
        let mut temp = NamedTempFile::with_suffix(".fa").unwrap();
        temp.write_all(b">chr1 description\nACGTACGT\nacgt\n>chr2\nGGGG\n")
            .unwrap();
        temp.flush().unwrap();

        let store = ReferenceStore::load(temp.path()).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.reference_id("chr1"), Some(0));
        assert_eq!(store.contig_length(0).unwrap(), 12);
        assert_eq!(store.base_at(0, 8).unwrap(), b'A');
        assert_eq!(store.slice(1, 0, 4).unwrap(), b"GGGG");
    }

    #[test]
    fn test_load_gzipped_fasta() {
        use flate2::write::GzEncoder;
        use flate2::Compression;

        let mut temp = NamedTempFile::with_suffix(".fa.gz").unwrap();
        {
            let mut encoder = GzEncoder::new(temp.as_file_mut(), Compression::default());
            encoder.write_all(b">chr1\nACGT\n").unwrap();
            encoder.finish().unwrap();
        }

        let store = ReferenceStore::load(temp.path()).unwrap();
        assert_eq!(store.slice(0, 0, 4).unwrap(), b"ACGT");
    }

    #[test]
    fn test_load_missing_or_empty() {
        assert!(matches!(
            ReferenceStore::load(Path::new("/nonexistent/ref.fa")),
            Err(ReferenceError::Load { .. })
        ));

        let temp = NamedTempFile::with_suffix(".fa").unwrap();
        assert!(matches!(
            ReferenceStore::load(temp.path()),
            Err(ReferenceError::Load { .. })
        ));
    }

    #[test]
    fn test_base_at_out_of_range() {
        let store = ReferenceStore::from_contigs([("chr1", b"ACGT".to_vec())]).unwrap();
        assert!(matches!(
            store.base_at(0, 4),
            Err(ReferenceError::OutOfRange { position: 4, length: 4, .. })
        ));
        assert!(matches!(store.base_at(1, 0), Err(ReferenceError::UnknownId(1))));
        assert!(store.slice(0, 2, 5).is_err());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let result = ReferenceStore::from_contigs([("chr1", b"A".to_vec()), ("chr1", b"C".to_vec())]);
        assert!(result.is_err());
    }

    #[test]
    fn test_conform_to_dictionary_order() {
        let store = ReferenceStore::from_contigs([
            ("chr2", b"GGGG".to_vec()),
            ("chr1", b"ACGT".to_vec()),
            ("chrX", b"TT".to_vec()),
        ])
        .unwrap();
        let dictionary = ReferenceDictionary::new(vec![
            Contig::new("chr1", 4).with_md5("f1f8f4bf413b16ad135722aa4591043e"),
            Contig::new("chr2", 4),
        ]);

        let store = store.conform_to(&dictionary).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.name(0), Some("chr1"));
        assert_eq!(store.slice(1, 0, 4).unwrap(), b"GGGG");
        assert_eq!(store.reference_id("chrX"), None);
    }

    #[test]
    fn test_conform_to_uses_aliases() {
        let store = ReferenceStore::from_contigs([("MT", b"ACGT".to_vec())]).unwrap();
        let mut contig = Contig::new("chrM", 4);
        contig.aliases = vec!["MT".to_string()];

        let store = store
            .conform_to(&ReferenceDictionary::new(vec![contig]))
            .unwrap();
        assert_eq!(store.name(0), Some("chrM"));
    }

    #[test]
    fn test_conform_to_errors() {
        let store = || ReferenceStore::from_contigs([("chr1", b"ACGT".to_vec())]).unwrap();

        let missing = ReferenceDictionary::new(vec![Contig::new("chr9", 4)]);
        assert!(matches!(
            store().conform_to(&missing),
            Err(ReferenceError::MissingContig(name)) if name == "chr9"
        ));

        let wrong_length = ReferenceDictionary::new(vec![Contig::new("chr1", 5)]);
        assert!(matches!(
            store().conform_to(&wrong_length),
            Err(ReferenceError::LengthMismatch { expected: 5, actual: 4, .. })
        ));

        let wrong_md5 = ReferenceDictionary::new(vec![
            Contig::new("chr1", 4).with_md5("00000000000000000000000000000000")
        ]);
        assert!(matches!(
            store().conform_to(&wrong_md5),
            Err(ReferenceError::Md5Mismatch { .. })
        ));
    }
}
