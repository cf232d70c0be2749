//! Block codec: the opaque compression primitive applied to container payloads.

use std::io::{self, Read, Write};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::{Compression, Crc};

use crate::utils::validation::MAX_CONTAINER_BYTES;

/// Packs and unpacks one container payload.
pub trait BlockCodec {
    /// # Errors
    ///
    /// Returns an I/O error if the block cannot be compressed.
    fn encode(&self, raw: &[u8]) -> io::Result<Vec<u8>>;

    /// # Errors
    ///
    /// Returns an I/O error if the block is not valid codec output.
    fn decode(&self, encoded: &[u8]) -> io::Result<Vec<u8>>;
}

/// Raw deflate, the codec written by [`super::writer::ContainerWriter`].
#[derive(Debug, Clone, Copy)]
pub struct DeflateCodec {
    level: Compression,
    max_decoded_len: u64,
}

impl DeflateCodec {
    #[must_use]
    pub fn new(level: u32) -> Self {
        Self {
            level: Compression::new(level),
            max_decoded_len: MAX_CONTAINER_BYTES,
        }
    }

    /// Refuse to inflate payloads beyond `len` bytes
    #[must_use]
    pub fn with_max_decoded_len(mut self, len: u64) -> Self {
        self.max_decoded_len = len;
        self
    }
}

impl Default for DeflateCodec {
    fn default() -> Self {
        Self {
            level: Compression::default(),
            max_decoded_len: MAX_CONTAINER_BYTES,
        }
    }
}

impl BlockCodec for DeflateCodec {
    fn encode(&self, raw: &[u8]) -> io::Result<Vec<u8>> {
        let mut encoder = DeflateEncoder::new(Vec::with_capacity(raw.len() / 2), self.level);
        encoder.write_all(raw)?;
        encoder.finish()
    }

    fn decode(&self, encoded: &[u8]) -> io::Result<Vec<u8>> {
        let limit = self.max_decoded_len;
        let capacity = encoded.len().saturating_mul(3).min(usize::try_from(limit).unwrap_or(usize::MAX));
        let mut decoded = Vec::with_capacity(capacity);
        DeflateDecoder::new(encoded)
            .take(limit.saturating_add(1))
            .read_to_end(&mut decoded)?;

        if decoded.len() as u64 > limit {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("payload inflates past the {limit}-byte limit"),
            ));
        }
        Ok(decoded)
    }
}

/// CRC32 of a byte block
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = Crc::new();
    crc.update(data);
    crc.sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deflate_codec() {
        let codec = DeflateCodec::default();
        let raw = b"ACGTACGTACGTACGTACGTACGTACGTACGT".repeat(64);

        let encoded = codec.encode(&raw).unwrap();
        assert!(encoded.len() < raw.len());
        assert_eq!(codec.decode(&encoded).unwrap(), raw);
    }

    #[test]
    fn test_deflate_codec_rejects_garbage() {
        let codec = DeflateCodec::new(1);
        assert!(codec.decode(&[0xff, 0xff, 0xff, 0xff]).is_err());
    }

    #[test]
    fn test_decoded_size_limit() {
        let raw = vec![b'A'; 4096];
        let encoded = DeflateCodec::default().encode(&raw).unwrap();

        let codec = DeflateCodec::default().with_max_decoded_len(4096);
        assert_eq!(codec.decode(&encoded).unwrap().len(), 4096);

        let err = DeflateCodec::default()
            .with_max_decoded_len(1000)
            .decode(&encoded)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_crc32() {
        // Standard check value for "123456789"
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }
}
