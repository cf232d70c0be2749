//! Sequential and positioned reads of a container stream.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::container::codec::{crc32, BlockCodec, DeflateCodec};
use crate::container::{
    ContainerBody, ContainerHeader, CONTAINER_HEADER_LEN, FORMAT_VERSION, MAGIC,
};
use crate::decode::DecodeError;

/// Upper bound on the SAM header text stored in a stream
const MAX_HEADER_TEXT_LEN: u32 = 256 * 1024 * 1024;

/// Result of reading at a container boundary.
#[derive(Debug)]
pub enum NextContainer {
    Container {
        offset: u64,
        header: ContainerHeader,
        body: ContainerBody,
    },
    /// The EOF container was read: a clean end of stream
    Eof,
}

/// Reader over a container stream.
pub struct ContainerReader<R, C = DeflateCodec> {
    inner: R,
    codec: C,
}

impl ContainerReader<BufReader<File>> {
    /// Open a stream file with the default codec.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be opened.
    pub fn open(path: &Path) -> io::Result<Self> {
        File::open(path).map(BufReader::new).map(Self::new)
    }
}

impl<R> ContainerReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_codec(inner, DeflateCodec::default())
    }
}

impl<R, C> ContainerReader<R, C> {
    pub fn with_codec(inner: R, codec: C) -> Self {
        Self { inner, codec }
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }
}

impl<R, C> ContainerReader<R, C>
where
    R: Read + Seek,
    C: BlockCodec,
{
    /// Read the magic, version, and SAM header text at the start of the stream.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError::InvalidFormat` for a foreign or unsupported file, or
    /// `DecodeError::Truncated` if the stream ends inside the file header.
    pub fn read_file_header(&mut self) -> Result<String, DecodeError> {
        let mut magic = [0u8; 5];
        if read_full(&mut self.inner, &mut magic)? < magic.len() {
            return Err(DecodeError::Truncated { offset: 0 });
        }
        if &magic[..4] != MAGIC {
            return Err(DecodeError::InvalidFormat(
                "missing container stream magic".to_string(),
            ));
        }
        if magic[4] != FORMAT_VERSION {
            return Err(DecodeError::InvalidFormat(format!(
                "unsupported format version {}",
                magic[4]
            )));
        }

        let mut len = [0u8; 4];
        if read_full(&mut self.inner, &mut len)? < len.len() {
            return Err(DecodeError::Truncated { offset: 5 });
        }
        let len = u32::from_le_bytes(len);
        if len > MAX_HEADER_TEXT_LEN {
            return Err(DecodeError::InvalidFormat(format!(
                "header text length {len} exceeds limit"
            )));
        }

        let mut text = Vec::new();
        (&mut self.inner).take(u64::from(len)).read_to_end(&mut text)?;
        if text.len() < len as usize {
            return Err(DecodeError::Truncated { offset: 9 });
        }

        String::from_utf8(text)
            .map_err(|_| DecodeError::InvalidFormat("header text is not UTF-8".to_string()))
    }

    /// Byte offset of the next read
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the position cannot be queried.
    pub fn position(&mut self) -> io::Result<u64> {
        self.inner.stream_position()
    }

    /// Position the reader at a container offset taken from the index.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the seek fails.
    pub fn seek(&mut self, offset: u64) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(offset)).map(|_| ())
    }

    /// Read and decode the container at the current position.
    ///
    /// # Errors
    ///
    /// - `IncompleteStream` if the data ends exactly at a container boundary
    /// - `Truncated` if it ends inside a container
    /// - `Checksum`, `Corrupt`, or `RecordCount` for a damaged container
    pub fn read_container(&mut self) -> Result<NextContainer, DecodeError> {
        let offset = self.position()?;

        let mut buf = [0u8; CONTAINER_HEADER_LEN];
        match read_full(&mut self.inner, &mut buf)? {
            0 => return Err(DecodeError::IncompleteStream),
            n if n < CONTAINER_HEADER_LEN => return Err(DecodeError::Truncated { offset }),
            _ => {}
        }

        let header: ContainerHeader =
            bincode::deserialize(&buf).map_err(|e| DecodeError::Corrupt {
                offset,
                reason: e.to_string(),
            })?;

        if header.is_eof() {
            return Ok(NextContainer::Eof);
        }

        let mut payload = Vec::new();
        (&mut self.inner)
            .take(u64::from(header.payload_length))
            .read_to_end(&mut payload)?;
        if payload.len() < header.payload_length as usize {
            return Err(DecodeError::Truncated { offset });
        }

        let actual = crc32(&payload);
        if actual != header.checksum {
            return Err(DecodeError::Checksum {
                offset,
                expected: header.checksum,
                actual,
            });
        }

        let raw = self
            .codec
            .decode(&payload)
            .map_err(|e| DecodeError::Corrupt {
                offset,
                reason: e.to_string(),
            })?;
        let body: ContainerBody = bincode::deserialize(&raw).map_err(|e| DecodeError::Corrupt {
            offset,
            reason: e.to_string(),
        })?;

        if body.records.len() != header.record_count as usize {
            return Err(DecodeError::RecordCount {
                offset,
                declared: header.record_count,
                actual: body.records.len(),
            });
        }

        Ok(NextContainer::Container {
            offset,
            header,
            body,
        })
    }

    /// Check that the stream ends with the EOF container.
    ///
    /// Leaves the reader positioned at the end of the stream.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if seeking or reading fails for reasons other than the
    /// stream being too short.
    pub fn has_eof_marker(&mut self) -> io::Result<bool> {
        let end = self.inner.seek(SeekFrom::End(0))?;
        let len = CONTAINER_HEADER_LEN as u64;
        if end < len {
            return Ok(false);
        }

        self.inner.seek(SeekFrom::Start(end - len))?;
        let mut buf = [0u8; CONTAINER_HEADER_LEN];
        if read_full(&mut self.inner, &mut buf)? < CONTAINER_HEADER_LEN {
            return Ok(false);
        }

        Ok(bincode::deserialize::<ContainerHeader>(&buf)
            .map(|header| header.is_eof())
            .unwrap_or(false))
    }
}

/// Fill `buf` as far as the reader allows, returning the number of bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
