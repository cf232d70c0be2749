//! Command-line interface for cram-to-sam.
//!
//! ## Usage
//!
//! ```text
//! # Whole stream to SAM on stdout
//! cram-to-sam sample.ctr ref.fa
//!
//! # One region to BAM at maximum compression, recomputing MD/NM
//! cram-to-sam -b9 -m -r chr1:1000-2000 sample.ctr ref.fa out.bam
//!
//! # Only unplaced reads
//! cram-to-sam -r '*' sample.ctr ref.fa unmapped.sam
//! ```
//!
//! Digit flags follow getopt conventions: `-0` through `-9` pick the BAM compression
//! level, `-u` is `-0`, and flags may be clustered (`-bm9`).

use std::ffi::OsString;
use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use crate::core::header::ProgramInfo;
use crate::core::interval::Region;
use crate::output::OutputFormat;
use crate::session::{SessionConfig, TranscodeSession};

/// Short options that take a value
const VALUE_FLAGS: &[char] = &['p', 'r'];

#[derive(Parser, Debug)]
#[command(name = "cram-to-sam")]
#[command(author = "Fulcrum Genomics")]
#[command(version)]
#[command(about = "Decode a reference-compressed container stream to SAM or BAM")]
#[command(
    long_about = "cram-to-sam rebuilds alignment records from a container stream against its reference FASTA and writes them as SAM or BAM.\n\nWith a region and a <input>.crai index, only the containers that can hold records in the region are decoded."
)]
pub struct Cli {
    /// Input container stream
    pub input: PathBuf,

    /// Reference FASTA (plain, gzip, or bgzip)
    pub reference: PathBuf,

    /// Output file [default: stdout]
    pub output: Option<PathBuf>,

    /// Write BAM instead of SAM
    #[arg(short = 'b', long = "bam")]
    pub bam: bool,

    /// BAM compression level (also -0 to -9; -u is -0)
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=9), overrides_with = "level")]
    pub level: Option<u8>,

    /// Recompute MD and NM tags
    #[arg(short = 'm', long = "calmd")]
    pub calmd: bool,

    /// Prefix for names of unnamed reads [default: input file name]
    #[arg(short = 'p', long = "prefix")]
    pub prefix: Option<String>,

    /// Only output reads in region (name, name:pos, name:start-end, or '*' for unplaced)
    #[arg(short = 'r', long = "region")]
    pub region: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Build the immutable session configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the region string is malformed.
    pub fn to_config(&self, program: ProgramInfo) -> anyhow::Result<SessionConfig> {
        let region = self.region.as_deref().map(Region::parse).transpose()?;

        Ok(SessionConfig {
            input: self.input.clone(),
            reference: self.reference.clone(),
            output: self.output.clone(),
            region,
            recompute_tags: self.calmd,
            name_prefix: self.prefix.clone(),
            output_format: if self.bam {
                OutputFormat::Bam
            } else {
                OutputFormat::Sam
            },
            compression_level: self.level,
            program,
        })
    }
}

/// Rewrite getopt digit flags into `--level N` so clap can parse them.
///
/// `-5` becomes `--level 5`, `-u` becomes `--level 0`, and clusters are split
/// (`-bm9` becomes `-bm --level 9`). Values of `-p`/`-r` and everything after `--`
/// pass through untouched.
pub fn expand_level_flags<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut out = Vec::new();
    let mut args = args.into_iter().map(Into::into);

    // Program name
    if let Some(program) = args.next() {
        out.push(program);
    }

    let mut expect_value = false;
    let mut positional_only = false;

    for arg in args {
        let text = match arg.to_str() {
            Some(text) if !expect_value && !positional_only => text.to_string(),
            _ => {
                expect_value = false;
                out.push(arg);
                continue;
            }
        };

        if text == "--" {
            positional_only = true;
            out.push(arg);
            continue;
        }
        if text.starts_with("--") || !text.starts_with('-') || text == "-" {
            // `--prefix` and `--region` take the next argument
            expect_value = text == "--prefix" || text == "--region";
            out.push(arg);
            continue;
        }

        let mut cluster = String::from("-");
        for (i, c) in text.char_indices().skip(1) {
            if VALUE_FLAGS.contains(&c) {
                let rest = &text[i + c.len_utf8()..];
                cluster.push(c);
                cluster.push_str(rest);
                expect_value = rest.is_empty();
                break;
            }
            if c == 'u' || c.is_ascii_digit() {
                if cluster.len() > 1 {
                    out.push(OsString::from(std::mem::replace(&mut cluster, String::from("-"))));
                }
                out.push(OsString::from("--level"));
                out.push(OsString::from(if c == 'u' { '0' } else { c }.to_string()));
            } else {
                cluster.push(c);
            }
        }
        if cluster.len() > 1 {
            out.push(OsString::from(cluster));
        }
    }

    out
}

/// Run one transcode from parsed arguments.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the transcode fails.
pub fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = cli.to_config(ProgramInfo::from_env())?;
    let summary = TranscodeSession::new(config).run()?;

    info!(
        records = summary.records_written,
        containers = summary.containers_decoded,
        "Done"
    );
    Ok(())
}
