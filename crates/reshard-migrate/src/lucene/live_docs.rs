//! `.liv` live-docs bitset: which documents survived hard deletes.
//!
//! The on-disk layout differs by generation. Gen7 packs the bits into
//! bytes; Gen9 serializes a fixed bitset as big-endian 64-bit words.
//! Both carry the generation's codec version in the header, so reading
//! a file with the wrong generation fails before any bits are decoded.

use std::path::Path;

use reshard_core::dataio::{verify_footer, DataInput};
use reshard_core::{Error, Result};

use super::Generation;

pub const LIVE_DOCS_CODEC: &str = "LiveDocs";

#[derive(Debug, Clone)]
pub struct LiveDocs {
    doc_count: u32,
    words: Vec<u64>,
}

impl LiveDocs {
    pub fn read(path: &Path, generation: Generation) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            Error::CorruptSegment(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::decode(&bytes, generation)
    }

    pub fn decode(bytes: &[u8], generation: Generation) -> Result<Self> {
        let payload_end = verify_footer(bytes)?;
        let mut input = DataInput::new(&bytes[..payload_end]);
        let version = generation.codec_version();
        input.check_header(LIVE_DOCS_CODEC, version, version)?;

        let doc_count = input.read_vint()?;
        let words = match generation {
            Generation::Gen7 => {
                let byte_count = (doc_count as usize).div_ceil(8);
                let bytes = input.read_bytes(byte_count)?;
                let mut words = vec![0u64; (doc_count as usize).div_ceil(64)];
                for (i, &b) in bytes.iter().enumerate() {
                    words[i / 8] |= u64::from(b) << (8 * (i % 8));
                }
                words
            }
            Generation::Gen9 => {
                let word_count = (doc_count as usize).div_ceil(64);
                let mut words = Vec::with_capacity(word_count);
                for _ in 0..word_count {
                    words.push(input.read_u64_be()?);
                }
                words
            }
        };
        Ok(Self { doc_count, words })
    }

    /// Documents past the recorded count are never live.
    pub fn is_live(&self, doc: u32) -> bool {
        if doc >= self.doc_count {
            return false;
        }
        self.words[(doc >> 6) as usize] & (1 << (doc & 63)) != 0
    }

    pub fn live_count(&self) -> u32 {
        (0..self.doc_count).filter(|&d| self.is_live(d)).count() as u32
    }
}
