//! `.fdx`/`.fdt` stored fields: the chunk index and the lz4-compressed
//! chunk data holding every document's stored field values.

use std::path::Path;

use reshard_core::dataio::{verify_footer, DataInput};
use reshard_core::{Error, Result};

use super::Generation;

pub const STORED_FIELDS_INDEX_CODEC: &str = "StoredFieldsIndex";
pub const STORED_FIELDS_DATA_CODEC: &str = "StoredFieldsData";

/// A stored field value. Ids and `_source` bodies are byte fields.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Bytes(Vec<u8>),
    Text(String),
    Long(i64),
}

pub const KIND_BYTES: u8 = 0;
pub const KIND_TEXT: u8 = 1;
pub const KIND_LONG: u8 = 2;

/// One document's stored fields, as (field number, value) pairs.
pub type StoredDoc = Vec<(u32, FieldValue)>;

#[derive(Debug, Clone, Copy)]
struct ChunkEntry {
    first_doc: u32,
    doc_count: u32,
    /// Byte offset within the data file's payload region.
    offset: u64,
}

pub struct StoredFieldsReader {
    chunks: Vec<ChunkEntry>,
    data: Vec<u8>,
    payload_start: usize,
    payload_end: usize,
}

impl StoredFieldsReader {
    pub fn open(dir: &Path, segment: &str, generation: Generation) -> Result<Self> {
        let index_bytes = read_file(&dir.join(format!("{segment}.fdx")))?;
        let data = read_file(&dir.join(format!("{segment}.fdt")))?;
        let version = generation.codec_version();

        let index_end = verify_footer(&index_bytes)?;
        let mut index = DataInput::new(&index_bytes[..index_end]);
        index.check_header(STORED_FIELDS_INDEX_CODEC, version, version)?;
        let chunk_count = index.read_vint()?;
        let mut chunks = Vec::with_capacity(chunk_count as usize);
        for _ in 0..chunk_count {
            chunks.push(ChunkEntry {
                first_doc: index.read_vint()?,
                doc_count: index.read_vint()?,
                offset: index.read_vlong()?,
            });
        }

        let payload_end = verify_footer(&data)?;
        let mut header = DataInput::new(&data[..payload_end]);
        header.check_header(STORED_FIELDS_DATA_CODEC, version, version)?;
        let payload_start = header.position();

        Ok(Self {
            chunks,
            data,
            payload_start,
            payload_end,
        })
    }

    pub fn doc_count(&self) -> u32 {
        self.chunks
            .last()
            .map(|c| c.first_doc + c.doc_count)
            .unwrap_or(0)
    }

    pub(crate) fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Decode chunk `i`, returning its first doc id and its documents.
    pub(crate) fn read_chunk(&self, i: usize) -> Result<(u32, Vec<StoredDoc>)> {
        let entry = *self
            .chunks
            .get(i)
            .ok_or_else(|| Error::CorruptSegment("chunk index out of range".into()))?;
        Ok((entry.first_doc, self.decode_chunk(entry)?))
    }

    pub fn docs(&self) -> DocsIter<'_> {
        DocsIter {
            reader: self,
            chunk_index: 0,
            buffered: Vec::new(),
            buffered_first_doc: 0,
            buffered_pos: 0,
        }
    }

    fn decode_chunk(&self, entry: ChunkEntry) -> Result<Vec<StoredDoc>> {
        let start = self.payload_start + entry.offset as usize;
        if start >= self.payload_end {
            return Err(Error::CorruptSegment("chunk offset past end of data".into()));
        }
        let mut input = DataInput::new(&self.data[start..self.payload_end]);
        let uncompressed_len = input.read_vint()? as usize;
        let compressed_len = input.read_vint()? as usize;
        let compressed = input.read_bytes(compressed_len)?;
        let chunk = lz4_flex::block::decompress(compressed, uncompressed_len)
            .map_err(|e| Error::CorruptSegment(format!("chunk decompression failed: {e}")))?;

        let mut docs = Vec::with_capacity(entry.doc_count as usize);
        let mut fields = DataInput::new(&chunk);
        for _ in 0..entry.doc_count {
            let field_count = fields.read_vint()?;
            let mut doc = Vec::with_capacity(field_count as usize);
            for _ in 0..field_count {
                let number = fields.read_vint()?;
                let value = match fields.read_u8()? {
                    KIND_BYTES => {
                        let len = fields.read_vint()? as usize;
                        FieldValue::Bytes(fields.read_bytes(len)?.to_vec())
                    }
                    KIND_TEXT => {
                        FieldValue::Text(fields.read_string()?)
                    }
                    KIND_LONG => FieldValue::Long(fields.read_zigzag_vlong()?),
                    other => {
                        return Err(Error::CorruptSegment(format!(
                            "unknown stored field kind {other}"
                        )))
                    }
                };
                doc.push((number, value));
            }
            docs.push(doc);
        }
        Ok(docs)
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| Error::CorruptSegment(format!("failed to read {}: {e}", path.display())))
}

/// Single-pass iterator over (doc id, stored doc). A corrupt chunk yields
/// one `Err` and ends iteration; earlier chunks are unaffected.
pub struct DocsIter<'a> {
    reader: &'a StoredFieldsReader,
    chunk_index: usize,
    buffered: Vec<StoredDoc>,
    buffered_first_doc: u32,
    buffered_pos: usize,
}

impl Iterator for DocsIter<'_> {
    type Item = Result<(u32, StoredDoc)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.buffered_pos < self.buffered.len() {
                let doc_id = self.buffered_first_doc + self.buffered_pos as u32;
                let doc = std::mem::take(&mut self.buffered[self.buffered_pos]);
                self.buffered_pos += 1;
                return Some(Ok((doc_id, doc)));
            }
            let entry = *self.reader.chunks.get(self.chunk_index)?;
            self.chunk_index += 1;
            match self.reader.decode_chunk(entry) {
                Ok(docs) => {
                    self.buffered = docs;
                    self.buffered_first_doc = entry.first_doc;
                    self.buffered_pos = 0;
                }
                Err(e) => {
                    // Stop after surfacing the corruption once.
                    self.chunk_index = self.reader.chunks.len();
                    return Some(Err(e));
                }
            }
        }
    }
}
