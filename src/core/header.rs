//! Header handling: the reference dictionary declared by `@SQ` lines and the
//! `@PG` provenance line added to every output.

use std::ffi::OsString;

use noodles::sam;
use thiserror::Error;
use tracing::warn;

use crate::core::contig::Contig;
use crate::core::interval::ContigLookup;
use crate::utils::validation::{check_contig_limit, normalize_md5};

#[derive(Error, Debug)]
pub enum HeaderError {
    #[error("Invalid SAM header format: {0}")]
    InvalidFormat(String),

    #[error("noodles error: {0}")]
    Noodles(String),

    #[error("Too many contigs: {0} exceeds maximum allowed (100000)")]
    TooManyContigs(usize),
}

/// Reference sequences in `@SQ` order; a contig's index is its reference id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceDictionary {
    contigs: Vec<Contig>,
}

impl ReferenceDictionary {
    #[must_use]
    pub fn new(contigs: Vec<Contig>) -> Self {
        Self { contigs }
    }

    /// Parse the `@SQ` lines of a SAM header.
    ///
    /// A header without `@SQ` lines yields an empty dictionary, which is valid for
    /// streams holding only unplaced reads.
    ///
    /// # Errors
    ///
    /// Returns `HeaderError::InvalidFormat` if an `@SQ` line lacks `SN` or a numeric `LN`,
    /// or `HeaderError::TooManyContigs` if the limit is exceeded.
    pub fn from_header_text(text: &str) -> Result<Self, HeaderError> {
        let mut contigs = Vec::new();

        for line in text.lines() {
            if !line.starts_with("@SQ") {
                continue;
            }

            let mut name: Option<&str> = None;
            let mut length: Option<u64> = None;
            let mut md5_raw: Option<&str> = None;
            let mut aliases: Vec<String> = Vec::new();

            for field in line.split('\t').skip(1) {
                if let Some((tag, value)) = field.split_once(':') {
                    match tag {
                        "SN" => name = Some(value),
                        "LN" => {
                            length = Some(value.parse().map_err(|_| {
                                HeaderError::InvalidFormat(format!("Invalid LN value: {value}"))
                            })?);
                        }
                        "M5" => md5_raw = Some(value),
                        "AN" => {
                            aliases = value
                                .split(',')
                                .map(|s| s.trim().to_string())
                                .filter(|s| !s.is_empty())
                                .collect();
                        }
                        _ => {}
                    }
                }
            }

            let (Some(name), Some(length)) = (name, length) else {
                return Err(HeaderError::InvalidFormat(format!(
                    "@SQ line requires SN and LN: {line}"
                )));
            };

            if check_contig_limit(contigs.len()).is_some() {
                return Err(HeaderError::TooManyContigs(contigs.len()));
            }

            let mut contig = Contig::new(name, length);
            if let Some(raw) = md5_raw {
                if let Some(normalized) = normalize_md5(raw) {
                    contig.md5 = Some(normalized);
                } else {
                    warn!(contig = %name, md5 = %raw, "Invalid MD5 checksum format, ignoring");
                }
            }
            contig.aliases = aliases;
            contigs.push(contig);
        }

        Ok(Self { contigs })
    }

    pub fn contigs(&self) -> &[Contig] {
        &self.contigs
    }

    pub fn get(&self, reference_id: usize) -> Option<&Contig> {
        self.contigs.get(reference_id)
    }

    pub fn len(&self) -> usize {
        self.contigs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contigs.is_empty()
    }
}

impl ContigLookup for ReferenceDictionary {
    fn reference_id(&self, name: &str) -> Option<usize> {
        self.contigs
            .iter()
            .position(|c| c.name == name)
            .or_else(|| self.contigs.iter().position(|c| c.answers_to(name)))
    }
}

/// Identity written into the `@PG` line of every output header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramInfo {
    pub name: String,
    pub version: String,
    pub command_line: String,
}

impl ProgramInfo {
    pub fn new(command_line: impl Into<String>) -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            command_line: command_line.into(),
        }
    }

    /// Program info carrying the invoking command line of this process
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(command_line(std::env::args_os()))
    }
}

/// Join arguments with spaces; bytes that are not UTF-8 become U+FFFD.
pub fn command_line<I>(args: I) -> String
where
    I: IntoIterator,
    I::Item: Into<OsString>,
{
    args.into_iter()
        .map(|arg| arg.into().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Append a `@PG` line for `program` to `text`.
///
/// The ID is the program name, suffixed `.1`, `.2`, ... when already taken, and `PP`
/// chains to the last existing `@PG` line.
#[must_use]
pub fn add_program_line(text: &str, program: &ProgramInfo) -> String {
    let existing: Vec<&str> = text
        .lines()
        .filter(|line| line.starts_with("@PG"))
        .filter_map(|line| {
            line.split('\t')
                .skip(1)
                .find_map(|field| field.strip_prefix("ID:"))
        })
        .collect();

    let mut id = program.name.clone();
    let mut suffix = 0;
    while existing.contains(&id.as_str()) {
        suffix += 1;
        id = format!("{}.{suffix}", program.name);
    }

    let mut out = String::with_capacity(text.len() + 128);
    out.push_str(text);
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }

    out.push_str(&format!("@PG\tID:{id}\tPN:{}", program.name));
    if let Some(previous) = existing.last() {
        out.push_str(&format!("\tPP:{previous}"));
    }
    out.push_str(&format!(
        "\tVN:{}\tCL:{}\n",
        program.version,
        sanitize_field(&program.command_line)
    ));
    out
}

/// Parse header text into a noodles header for the output writers.
///
/// # Errors
///
/// Returns `HeaderError::Noodles` if noodles rejects the text.
pub fn parse_sam_header(text: &str) -> Result<sam::Header, HeaderError> {
    text.parse::<sam::Header>()
        .map_err(|e| HeaderError::Noodles(e.to_string()))
}

fn sanitize_field(value: &str) -> String {
    value
        .chars()
        .map(|c| if c == '\t' || c == '\n' || c == '\r' { ' ' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line() {
        assert_eq!(command_line(["cram-to-sam", "-b", "in.ctr"]), "cram-to-sam -b in.ctr");
    }

    #[cfg(unix)]
    #[test]
    fn test_command_line_with_non_utf8_argument() {
        use std::os::unix::ffi::OsStringExt;

        let args = vec![
            OsString::from("cram-to-sam"),
            OsString::from_vec(b"/tmp/in\xff.ctr".to_vec()),
        ];
        assert_eq!(command_line(args), "cram-to-sam /tmp/in\u{fffd}.ctr");
    }

    fn program() -> ProgramInfo {
        ProgramInfo {
            name: "cram-to-sam".to_string(),
            version: "0.1.0".to_string(),
            command_line: "cram-to-sam -r chr1 in.ctr ref.fa".to_string(),
        }
    }

    #[test]
    fn test_dictionary_from_header_text() {
        let header = "@HD\tVN:1.6\tSO:coordinate
@SQ\tSN:chr1\tLN:248956422\tM5:6AEF897C3D6FF0C78AFF06AC189178DD
@SQ\tSN:chrM\tLN:16569\tAN:MT,chrMT
@RG\tID:sample1
";

        let dictionary = ReferenceDictionary::from_header_text(header).unwrap();
        assert_eq!(dictionary.len(), 2);
        assert_eq!(dictionary.contigs()[0].name, "chr1");
        assert_eq!(dictionary.contigs()[0].length, 248_956_422);
        assert_eq!(
            dictionary.contigs()[0].md5.as_deref(),
            Some("6aef897c3d6ff0c78aff06ac189178dd")
        );
        assert_eq!(dictionary.reference_id("chrM"), Some(1));
        assert_eq!(dictionary.reference_id("MT"), Some(1));
        assert_eq!(dictionary.reference_id("chr2"), None);
    }

    #[test]
    fn test_dictionary_without_sq_lines_is_empty() {
        let dictionary = ReferenceDictionary::from_header_text("@HD\tVN:1.6\n").unwrap();
        assert!(dictionary.is_empty());
    }

    #[test]
    fn test_dictionary_rejects_sq_without_length() {
        let result = ReferenceDictionary::from_header_text("@SQ\tSN:chr1\n");
        assert!(matches!(result, Err(HeaderError::InvalidFormat(_))));

        let result = ReferenceDictionary::from_header_text("@SQ\tSN:chr1\tLN:ten\n");
        assert!(matches!(result, Err(HeaderError::InvalidFormat(_))));
    }

    #[test]
    fn test_add_program_line() {
        let text = "@HD\tVN:1.6\n@SQ\tSN:chr1\tLN:100\n";
        let out = add_program_line(text, &program());

        assert!(out.starts_with(text));
        assert!(out.ends_with(
            "@PG\tID:cram-to-sam\tPN:cram-to-sam\tVN:0.1.0\tCL:cram-to-sam -r chr1 in.ctr ref.fa\n"
        ));
    }

    #[test]
    fn test_add_program_line_deduplicates_id_and_chains() {
        let text = "@HD\tVN:1.6\n@PG\tID:cram-to-sam\tPN:cram-to-sam\n@PG\tID:cram-to-sam.1\tPP:cram-to-sam\n";
        let out = add_program_line(text, &program());

        let last = out.lines().last().unwrap();
        assert!(last.starts_with("@PG\tID:cram-to-sam.2\tPN:cram-to-sam\tPP:cram-to-sam.1\t"));
    }

    #[test]
    fn test_add_program_line_sanitizes_command_line() {
        let mut info = program();
        info.command_line = "a\tb\nc".to_string();
        let out = add_program_line("", &info);
        assert!(out.ends_with("CL:a b c\n"));
    }

    #[test]
    fn test_parse_sam_header() {
        let text = add_program_line("@HD\tVN:1.6\n@SQ\tSN:chr1\tLN:100\n", &program());
        let header = parse_sam_header(&text).unwrap();
        assert_eq!(header.reference_sequences().len(), 1);
    }
}
