//! BGZF block writer with a configurable compression level.
//!
//! Each block is a complete gzip member with the `BC` extra subfield:
//!
//! ```text
//! 1f 8b 08 04 | MTIME 0 | XFL 0 | OS ff | XLEN 6 | 'B' 'C' SLEN 2 BSIZE | deflate | CRC32 | ISIZE
//! ```
//!
//! `BSIZE` is the total block size minus one. The stream ends with the fixed empty
//! EOF block, written only by [`BgzfBlockWriter::finish`] so that an interrupted
//! run leaves a detectably truncated file.

use std::io::{self, Write};

use flate2::write::DeflateEncoder;
use flate2::{Compression, Crc};

/// Largest uncompressed payload per block
pub const MAX_BLOCK_SIZE: usize = 65_280;

/// The empty block that terminates a BGZF stream
pub const EOF_BLOCK: [u8; 28] = [
    0x1f, 0x8b, 0x08, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0x06, 0x00, 0x42, 0x43, 0x02, 0x00,
    0x1b, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

const HEADER_LEN: usize = 18;
const FOOTER_LEN: usize = 8;

pub struct BgzfBlockWriter<W: Write> {
    inner: W,
    level: Compression,
    buf: Vec<u8>,
    finished: bool,
}

impl<W: Write> BgzfBlockWriter<W> {
    /// `level` is a deflate level, `0` (stored) through `9`.
    pub fn new(inner: W, level: u32) -> Self {
        Self {
            inner,
            level: Compression::new(level.min(9)),
            buf: Vec::with_capacity(MAX_BLOCK_SIZE),
            finished: false,
        }
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Flush the pending block and append the EOF block.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if writing fails.
    pub fn finish(&mut self) -> io::Result<()> {
        if self.finished {
            return Ok(());
        }
        self.flush_block()?;
        self.inner.write_all(&EOF_BLOCK)?;
        self.inner.flush()?;
        self.finished = true;
        Ok(())
    }

    fn flush_block(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let block = compress_block(&self.buf, self.level)?;
        self.inner.write_all(&block)?;
        self.buf.clear();
        Ok(())
    }
}

impl<W: Write> Write for BgzfBlockWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.finished {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "write after BGZF stream was finished",
            ));
        }

        let n = buf.len().min(MAX_BLOCK_SIZE - self.buf.len());
        self.buf.extend_from_slice(&buf[..n]);
        if self.buf.len() >= MAX_BLOCK_SIZE {
            self.flush_block()?;
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_block()?;
        self.inner.flush()
    }
}

/// Compress one payload into a complete BGZF block.
fn compress_block(data: &[u8], level: Compression) -> io::Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::with_capacity(data.len()), level);
    encoder.write_all(data)?;
    let deflated = encoder.finish()?;

    let total = HEADER_LEN + deflated.len() + FOOTER_LEN;
    let bsize = u16::try_from(total - 1)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "BGZF block exceeds 64 KiB"))?;

    let mut crc = Crc::new();
    crc.update(data);

    let mut block = Vec::with_capacity(total);
    block.extend_from_slice(&[0x1f, 0x8b, 0x08, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff]);
    block.extend_from_slice(&6u16.to_le_bytes());
    block.extend_from_slice(b"BC");
    block.extend_from_slice(&2u16.to_le_bytes());
    block.extend_from_slice(&bsize.to_le_bytes());
    block.extend_from_slice(&deflated);
    block.extend_from_slice(&crc.sum().to_le_bytes());
    // ISIZE is bounded by MAX_BLOCK_SIZE
    block.extend_from_slice(&(data.len() as u32).to_le_bytes());

    Ok(block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::MultiGzDecoder;
    use std::io::Read;

    fn write_all(data: &[u8], level: u32) -> Vec<u8> {
        let mut writer = BgzfBlockWriter::new(Vec::new(), level);
        writer.write_all(data).unwrap();
        writer.finish().unwrap();
        writer.get_ref().clone()
    }

    fn inflate(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        MultiGzDecoder::new(data).read_to_end(&mut out).unwrap();
        out
    }

    /// Sizes of consecutive blocks, read from their BSIZE fields
    fn block_sizes(mut data: &[u8]) -> Vec<usize> {
        let mut sizes = Vec::new();
        while !data.is_empty() {
            let size = usize::from(u16::from_le_bytes([data[16], data[17]])) + 1;
            sizes.push(size);
            data = &data[size..];
        }
        sizes
    }

    #[test]
    fn test_empty_stream_is_eof_block() {
        assert_eq!(write_all(b"", 6), EOF_BLOCK.to_vec());
    }

    #[test]
    fn test_levels_round_trip() {
        let data: Vec<u8> = (0..200_000u32).map(|i| b"ACGT"[(i % 7 % 4) as usize]).collect();
        for level in [0, 1, 6, 9] {
            let out = write_all(&data, level);
            assert_eq!(inflate(&out), data);
            assert!(out.ends_with(&EOF_BLOCK));
        }
    }

    #[test]
    fn test_level_zero_is_stored() {
        let data = vec![b'A'; 10_000];
        let stored = write_all(&data, 0);
        let compressed = write_all(&data, 6);
        assert!(stored.len() > data.len());
        assert!(compressed.len() < stored.len());
    }

    #[test]
    fn test_block_boundaries() {
        let data = vec![b'C'; MAX_BLOCK_SIZE * 2 + 10];
        let out = write_all(&data, 0);
        let sizes = block_sizes(&out);
        assert_eq!(sizes.len(), 4);
        assert_eq!(*sizes.last().unwrap(), EOF_BLOCK.len());
        assert_eq!(sizes.iter().sum::<usize>(), out.len());
    }

    #[test]
    fn test_drop_without_finish_has_no_eof() {
        let mut writer = BgzfBlockWriter::new(Vec::new(), 6);
        writer.write_all(b"partial").unwrap();
        writer.flush().unwrap();
        assert!(!writer.get_ref().ends_with(&EOF_BLOCK));
    }

    #[test]
    fn test_write_after_finish_fails() {
        let mut writer = BgzfBlockWriter::new(Vec::new(), 6);
        writer.finish().unwrap();
        assert!(writer.write_all(b"late").is_err());
    }
}
