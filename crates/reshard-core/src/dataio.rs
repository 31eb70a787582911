//! Big-endian binary input primitives for Lucene-style codec files.
//!
//! Both the snapshot metadata blobs (ChecksumBlobStoreFormat) and the
//! shard segment files share the same framing: a codec header (magic +
//! codec name + version), a payload, and a CRC32 footer. This module owns
//! the cursor type and the header/footer validation used by the snapshot
//! and migrate crates.

use crate::error::{Error, Result};

/// Magic preceding every codec header.
pub const CODEC_MAGIC: u32 = 0x3FD7_6C17;

/// Magic preceding every codec footer (bitwise complement of the header).
pub const FOOTER_MAGIC: u32 = !CODEC_MAGIC;

/// Footer length: magic (4) + algorithm id (4) + checksum (8).
pub const FOOTER_LEN: usize = 16;

/// A positioned cursor over an in-memory buffer.
#[derive(Debug, Clone)]
pub struct DataInput<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> DataInput<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.buf.len() {
            return Err(truncated("seek past end of buffer"));
        }
        self.pos = pos;
        Ok(())
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.seek(self.pos + n)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let b = *self
            .buf
            .get(self.pos)
            .ok_or_else(|| truncated("unexpected end of input"))?;
        self.pos += 1;
        Ok(b)
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(truncated("unexpected end of input"));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u16_be(&mut self) -> Result<u16> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u32_be(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_u64_be(&mut self) -> Result<u64> {
        let bytes = self.read_bytes(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(bytes);
        Ok(u64::from_be_bytes(arr))
    }

    /// Variable-length unsigned int, 7 bits per byte, at most 5 bytes.
    pub fn read_vint(&mut self) -> Result<u32> {
        let mut value: u32 = 0;
        for shift in (0..35).step_by(7) {
            let b = self.read_u8()?;
            value |= ((b & 0x7F) as u32) << shift;
            if b & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(truncated("vint too long"))
    }

    /// Variable-length unsigned long, 7 bits per byte, at most 10 bytes.
    pub fn read_vlong(&mut self) -> Result<u64> {
        let mut value: u64 = 0;
        for shift in (0..70).step_by(7) {
            let b = self.read_u8()?;
            value |= ((b & 0x7F) as u64) << shift;
            if b & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(truncated("vlong too long"))
    }

    /// Zigzag-encoded signed long (used by stored numeric fields).
    pub fn read_zigzag_vlong(&mut self) -> Result<i64> {
        let raw = self.read_vlong()?;
        Ok(((raw >> 1) as i64) ^ -((raw & 1) as i64))
    }

    /// Length-prefixed UTF-8 string (vint byte length + bytes).
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_vint()? as usize;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| Error::CorruptSegment("invalid utf-8 in string".into()))
    }

    /// Codec header: magic, codec name, version. Returns the version after
    /// validating the name and supported range.
    pub fn check_header(&mut self, expected_codec: &str, min: u32, max: u32) -> Result<u32> {
        let magic = self.read_u32_be()?;
        if magic != CODEC_MAGIC {
            return Err(Error::CorruptSegment(format!(
                "codec header mismatch: expected magic {CODEC_MAGIC:#x}, found {magic:#x}"
            )));
        }
        let codec = self.read_string()?;
        if codec != expected_codec {
            return Err(Error::CorruptSegment(format!(
                "codec mismatch: expected '{expected_codec}', found '{codec}'"
            )));
        }
        let version = self.read_u32_be()?;
        if version < min || version > max {
            return Err(Error::CorruptSegment(format!(
                "unsupported '{expected_codec}' version {version} (supported {min}..={max})"
            )));
        }
        Ok(version)
    }
}

fn truncated(msg: &str) -> Error {
    Error::CorruptSegment(msg.to_string())
}

/// Validate a codec footer at the end of `buf` and return the payload
/// length (everything before the 16-byte footer).
///
/// The trailing checksum covers every byte up to and including the footer
/// magic and algorithm id.
pub fn verify_footer(buf: &[u8]) -> Result<usize> {
    if buf.len() < FOOTER_LEN {
        return Err(truncated("buffer shorter than codec footer"));
    }
    let footer_start = buf.len() - FOOTER_LEN;
    let mut input = DataInput::new(&buf[footer_start..]);
    let magic = input.read_u32_be()?;
    if magic != FOOTER_MAGIC {
        return Err(Error::CorruptSegment(format!(
            "footer mismatch: expected magic {FOOTER_MAGIC:#x}, found {magic:#x}"
        )));
    }
    let algorithm = input.read_u32_be()?;
    if algorithm != 0 {
        return Err(Error::CorruptSegment(format!(
            "unsupported checksum algorithm {algorithm}"
        )));
    }
    let expected = input.read_u64_be()?;
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&buf[..buf.len() - 8]);
    let actual = hasher.finalize() as u64;
    if actual != expected {
        return Err(Error::CorruptSegment(format!(
            "checksum failed: stored {expected:#x}, computed {actual:#x}"
        )));
    }
    Ok(footer_start)
}
