//! Shared fixtures: a small reference, a container stream built from known
//! records, and its index.

#![allow(dead_code)]

use std::fs::{self, File};
use std::path::PathBuf;

use cram_to_sam::container::index::index_path;
use cram_to_sam::container::writer::{encode_record, ContainerWriter};
use cram_to_sam::container::SubstitutionMatrix;
use cram_to_sam::core::record::{AlignmentRecord, Mate, TagKey, TagValue, Tags};
use cram_to_sam::utils::validation::sequence_md5;
use cram_to_sam::ReferenceStore;
use noodles::sam::alignment::record::cigar::op::Kind;
use noodles::sam::alignment::record::cigar::Op;
use noodles::sam::alignment::record::Flags;
use tempfile::TempDir;

pub const CHR1_LEN: usize = 240;
pub const CHR2_LEN: usize = 120;

pub fn reference_bases(len: usize, seed: usize) -> Vec<u8> {
    (0..len).map(|i| b"ACGT"[(i * 7 + i / 3 + seed) % 4]).collect()
}

pub struct Fixture {
    pub dir: TempDir,
    pub input: PathBuf,
    pub reference: PathBuf,
    /// Records as written, in stream order
    pub records: Vec<AlignmentRecord>,
}

impl Fixture {
    pub fn output(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Records the stream holds once unnamed ones receive their generated names
    pub fn expected_names(&self) -> Vec<String> {
        self.records
            .iter()
            .enumerate()
            .map(|(i, r)| r.name.clone().unwrap_or_else(|| format!("sample.ctr:{}", i + 1)))
            .collect()
    }

    pub fn truncate_input(&self, bytes: usize) {
        let data = fs::read(&self.input).unwrap();
        fs::write(&self.input, &data[..data.len() - bytes]).unwrap();
    }
}

pub struct FixtureBuilder {
    records_per_container: usize,
    index: bool,
    wrong_md5: bool,
}

impl Default for FixtureBuilder {
    fn default() -> Self {
        Self {
            records_per_container: 2,
            index: true,
            wrong_md5: false,
        }
    }
}

impl FixtureBuilder {
    pub fn records_per_container(mut self, n: usize) -> Self {
        self.records_per_container = n;
        self
    }

    pub fn without_index(mut self) -> Self {
        self.index = false;
        self
    }

    pub fn with_wrong_md5(mut self) -> Self {
        self.wrong_md5 = true;
        self
    }

    pub fn build(self) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let chr1 = reference_bases(CHR1_LEN, 0);
        let chr2 = reference_bases(CHR2_LEN, 1);

        let reference = dir.path().join("ref.fa");
        let mut fasta = String::new();
        for (name, bases) in [("chr2", &chr2), ("chr1", &chr1)] {
            fasta.push_str(&format!(">{name} test contig\n"));
            for line in bases.chunks(60) {
                fasta.push_str(std::str::from_utf8(line).unwrap());
                fasta.push('\n');
            }
        }
        fs::write(&reference, fasta).unwrap();

        let md5 = |bases: &[u8]| {
            if self.wrong_md5 {
                "0".repeat(32)
            } else {
                sequence_md5(bases)
            }
        };
        let mut header = String::from("@HD\tVN:1.6\tSO:coordinate\n");
        for (name, bases) in [("chr1", &chr1), ("chr2", &chr2)] {
            header.push_str(&format!("@SQ\tSN:{name}\tLN:{}\tM5:{}\n", bases.len(), md5(bases)));
        }
        header.push_str("@RG\tID:rg1\tSM:sample\n");

        let records = records(&chr1, &chr2);

        let store = ReferenceStore::from_contigs([("chr1", chr1.clone()), ("chr2", chr2.clone())]).unwrap();
        let matrix = SubstitutionMatrix::default();
        let input = dir.path().join("sample.ctr");
        let mut writer = ContainerWriter::new(File::create(&input).unwrap(), &header)
            .unwrap()
            .with_records_per_container(self.records_per_container);
        for record in &records {
            writer.push(encode_record(record, &store, &matrix).unwrap()).unwrap();
        }
        let (_, index) = writer.finish().unwrap();

        if self.index {
            index.write(File::create(index_path(&input)).unwrap()).unwrap();
        }

        Fixture {
            dir,
            input,
            reference,
            records,
        }
    }
}

pub fn fixture() -> Fixture {
    FixtureBuilder::default().build()
}

fn mapped(
    name: Option<&str>,
    reference_id: usize,
    position: usize,
    cigar: &[(Kind, usize)],
    reference: &[u8],
    mismatches: &[usize],
) -> AlignmentRecord {
    let mut sequence = Vec::new();
    let mut r = position - 1;
    for &(kind, len) in cigar {
        match kind {
            Kind::Match => {
                sequence.extend_from_slice(&reference[r..r + len]);
                r += len;
            }
            Kind::Insertion => sequence.extend(std::iter::repeat(b'T').take(len)),
            Kind::SoftClip => sequence.extend(std::iter::repeat(b'N').take(len)),
            Kind::Deletion | Kind::Skip => r += len,
            _ => {}
        }
    }
    for &i in mismatches {
        sequence[i] = if sequence[i] == b'A' { b'C' } else { b'A' };
    }

    let tags: Tags = [(TagKey(*b"RG"), TagValue::String("rg1".to_string()))]
        .into_iter()
        .collect();

    AlignmentRecord {
        name: name.map(str::to_string),
        flags: Flags::empty(),
        reference_id: Some(reference_id),
        position: Some(position),
        mapping_quality: Some(60),
        cigar: cigar.iter().map(|&(kind, len)| Op::new(kind, len)).collect(),
        quality_scores: vec![35; sequence.len()],
        sequence,
        mate: Mate::default(),
        tags,
    }
}

fn unplaced(name: &str) -> AlignmentRecord {
    AlignmentRecord {
        name: Some(name.to_string()),
        flags: Flags::UNMAPPED,
        reference_id: None,
        position: None,
        mapping_quality: None,
        cigar: Vec::new(),
        sequence: b"NACGTTGCAN".to_vec(),
        quality_scores: vec![20; 10],
        mate: Mate::default(),
        tags: Tags::default(),
    }
}

/// Coordinate-sorted records: six on chr1, two on chr2, two unplaced
fn records(chr1: &[u8], chr2: &[u8]) -> Vec<AlignmentRecord> {
    vec![
        mapped(Some("r001"), 0, 10, &[(Kind::Match, 20)], chr1, &[]),
        mapped(Some("r002"), 0, 40, &[(Kind::Match, 20)], chr1, &[5]),
        mapped(
            Some("r003"),
            0,
            70,
            &[(Kind::Match, 8), (Kind::Insertion, 2), (Kind::Match, 10)],
            chr1,
            &[],
        ),
        mapped(None, 0, 100, &[(Kind::Match, 10), (Kind::Deletion, 3), (Kind::Match, 10)], chr1, &[15]),
        mapped(
            Some("r005"),
            0,
            130,
            &[(Kind::SoftClip, 3), (Kind::Match, 17)],
            chr1,
            &[],
        ),
        mapped(
            Some("r006"),
            0,
            160,
            &[(Kind::Match, 5), (Kind::Skip, 30), (Kind::Match, 15)],
            chr1,
            &[0, 19],
        ),
        mapped(Some("r007"), 1, 5, &[(Kind::Match, 20)], chr2, &[]),
        mapped(Some("r008"), 1, 60, &[(Kind::Match, 20)], chr2, &[10]),
        unplaced("u001"),
        unplaced("u002"),
    ]
}
