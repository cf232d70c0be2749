//! Core data types shared by every stage.
//!
//! - [`Contig`](contig::Contig): a named reference sequence from the stream header
//! - [`ReferenceDictionary`](header::ReferenceDictionary): the header's `@SQ` lines in order
//! - [`ReferenceStore`](reference::ReferenceStore): reference bases, loaded once
//! - [`Region`](interval::Region) and [`Interval`](interval::Interval): region requests
//! - [`AlignmentRecord`](record::AlignmentRecord): a reconstructed record
//!
//! ## Reference ids
//!
//! A reference id is the index of a contig in the stream header's `@SQ` order. The
//! reference FASTA may list contigs in any order; it is conformed to the header
//! before decoding starts, matching by name and then by `AN` aliases.

pub mod contig;
pub mod header;
pub mod interval;
pub mod record;
pub mod reference;
