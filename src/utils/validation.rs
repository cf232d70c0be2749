//! Centralized validation and helper functions.

/// Maximum number of contigs allowed in a reference or header dictionary
pub const MAX_CONTIGS: usize = 100_000;

/// Highest compression level accepted for BAM output
pub const MAX_COMPRESSION_LEVEL: u8 = 9;

/// Upper bound on a single read's length, guarding allocations driven by stored lengths
pub const MAX_READ_LENGTH: usize = 1 << 28;

/// Upper bound on one decompressed container payload
pub const MAX_CONTAINER_BYTES: u64 = 256 * 1024 * 1024;

/// Validate that a string is a valid MD5 checksum (32 hex characters).
///
/// # Examples
///
/// ```
/// use cram_to_sam::utils::validation::is_valid_md5;
///
/// assert!(is_valid_md5("6aef897c3d6ff0c78aff06ac189178dd"));
/// assert!(!is_valid_md5("not-an-md5"));
/// assert!(!is_valid_md5("6aef897c3d6ff0c78aff06ac189178d")); // 31 chars
/// ```
#[must_use]
pub fn is_valid_md5(s: &str) -> bool {
    s.len() == 32 && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Normalize an MD5 string to lowercase.
/// Returns None if the input is not a valid MD5.
#[must_use]
pub fn normalize_md5(s: &str) -> Option<String> {
    if is_valid_md5(s) {
        Some(s.to_lowercase())
    } else {
        None
    }
}

/// MD5 of a sequence computed over its uppercase bases, as used by the `@SQ M5` tag.
#[must_use]
pub fn sequence_md5(bases: &[u8]) -> String {
    let uppercase: Vec<u8> = bases.iter().map(u8::to_ascii_uppercase).collect();
    format!("{:x}", md5::compute(&uppercase))
}

/// Check if adding another contig would exceed the maximum allowed.
///
/// Call this with the current count BEFORE adding a new contig.
/// Returns an error message if adding would exceed the limit, None if safe to add.
#[must_use]
pub fn check_contig_limit(count: usize) -> Option<String> {
    if count >= MAX_CONTIGS {
        Some(format!(
            "Too many contigs: adding another would exceed maximum of {MAX_CONTIGS}"
        ))
    } else {
        None
    }
}

/// Input validation error types
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Compression level {0} is out of range (0-{MAX_COMPRESSION_LEVEL})")]
    CompressionLevel(u8),
    #[error("Read length {0} exceeds maximum of {MAX_READ_LENGTH}")]
    ReadLength(usize),
}

/// Validate a BAM compression level.
///
/// # Errors
///
/// Returns `ValidationError::CompressionLevel` if the level is above 9.
pub fn validate_compression_level(level: u8) -> Result<u8, ValidationError> {
    if level > MAX_COMPRESSION_LEVEL {
        Err(ValidationError::CompressionLevel(level))
    } else {
        Ok(level)
    }
}

/// Validate a stored read length before buffers are sized from it.
///
/// # Errors
///
/// Returns `ValidationError::ReadLength` if the length exceeds [`MAX_READ_LENGTH`].
pub fn validate_read_length(length: usize) -> Result<usize, ValidationError> {
    if length > MAX_READ_LENGTH {
        Err(ValidationError::ReadLength(length))
    } else {
        Ok(length)
    }
}
