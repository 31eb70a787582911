//! Version-dispatched segment readers.
//!
//! The reader generation is chosen from the declared source version,
//! never sniffed from disk: ES 6.x shards carry generation-7 segment
//! files, ES 7.x and OS 1.x shards carry generation-9 files with
//! soft-deletes awareness. Both produce a lazy, single-pass stream of
//! [`RawDocument`]s; a malformed document surfaces as one `Err` item, not
//! a shard-level failure.

pub mod field_infos;
pub mod live_docs;
pub mod stored_fields;
pub mod uid;

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use tracing::debug;

use reshard_core::version::matchers;
use reshard_core::{Error, RawDocument, Result, Version};

use field_infos::FieldInfos;
use live_docs::LiveDocs;
use stored_fields::{FieldValue, StoredDoc, StoredFieldsReader};

/// Segment file generation, tied to the source version family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generation {
    /// ES 6.x era segments. Byte-packed live docs.
    Gen7,
    /// ES 7.x / OS 1.x era segments. Word-packed live docs and
    /// soft-deletes awareness.
    Gen9,
}

impl Generation {
    pub fn codec_version(self) -> u32 {
        match self {
            Generation::Gen7 => 7,
            Generation::Gen9 => 9,
        }
    }
}

/// Streams the live documents out of an unpacked shard directory.
pub trait LuceneIndexReader: Send + Sync {
    fn read_documents(
        &self,
    ) -> Result<Box<dyn Iterator<Item = Result<RawDocument>> + Send + '_>>;
}

/// Select a reader for the declared source version.
pub fn reader_for_version(
    source_version: &Version,
    dir: impl Into<PathBuf>,
) -> Result<Box<dyn LuceneIndexReader>> {
    let generation = if matchers::is_es_6_8(source_version) {
        Generation::Gen7
    } else if matchers::is_es_7_x(source_version) || matchers::is_os_1_x(source_version) {
        Generation::Gen9
    } else {
        return Err(Error::Config(format!(
            "no segment reader for source version {source_version}"
        )));
    };
    Ok(Box::new(GenerationReader {
        dir: dir.into(),
        generation,
    }))
}

struct GenerationReader {
    dir: PathBuf,
    generation: Generation,
}

impl LuceneIndexReader for GenerationReader {
    fn read_documents(
        &self,
    ) -> Result<Box<dyn Iterator<Item = Result<RawDocument>> + Send + '_>> {
        let segments = list_segments(&self.dir)?;
        debug!(segments = segments.len(), dir = %self.dir.display(), "Opening shard segments");
        Ok(Box::new(ShardDocsIter {
            dir: self.dir.clone(),
            generation: self.generation,
            segments: segments.into(),
            current: None,
        }))
    }
}

/// Segment names, from the stored-fields data files present. A snapshot
/// shard holds exactly one commit, so every segment has one.
fn list_segments(dir: &Path) -> Result<Vec<String>> {
    let mut segments = Vec::new();
    let entries = std::fs::read_dir(dir)
        .map_err(|e| Error::CorruptSegment(format!("failed to list {}: {e}", dir.display())))?;
    for entry in entries {
        let entry = entry.map_err(|e| Error::CorruptSegment(e.to_string()))?;
        let name = entry.file_name();
        if let Some(segment) = name.to_str().and_then(|n| n.strip_suffix(".fdt")) {
            segments.push(segment.to_string());
        }
    }
    segments.sort();
    Ok(segments)
}

struct ShardDocsIter {
    dir: PathBuf,
    generation: Generation,
    segments: VecDeque<String>,
    current: Option<SegmentDocs>,
}

impl Iterator for ShardDocsIter {
    type Item = Result<RawDocument>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(current) = &mut self.current {
                match current.next() {
                    Some(item) => return Some(item),
                    None => self.current = None,
                }
            }
            let segment = self.segments.pop_front()?;
            match SegmentDocs::open(&self.dir, &segment, self.generation) {
                Ok(docs) => self.current = Some(docs),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Iterates one segment's live documents.
struct SegmentDocs {
    reader: StoredFieldsReader,
    live: Option<LiveDocs>,
    id_field: Option<u32>,
    source_field: Option<u32>,
    soft_deletes_field: Option<u32>,
    chunk_index: usize,
    buffered: Vec<StoredDoc>,
    buffered_first: u32,
    buffered_pos: usize,
}

impl SegmentDocs {
    fn open(dir: &Path, segment: &str, generation: Generation) -> Result<Self> {
        let infos = FieldInfos::read(&dir.join(format!("{segment}.fnm")), generation)?;
        let liv_path = dir.join(format!("{segment}.liv"));
        let live = if liv_path.exists() {
            Some(LiveDocs::read(&liv_path, generation)?)
        } else {
            None
        };
        let reader = StoredFieldsReader::open(dir, segment, generation)?;
        Ok(Self {
            live,
            id_field: infos.number_of("_id"),
            source_field: infos.number_of("_source"),
            soft_deletes_field: infos.soft_deletes_field(),
            reader,
            chunk_index: 0,
            buffered: Vec::new(),
            buffered_first: 0,
            buffered_pos: 0,
        })
    }

    fn assemble(&self, doc_id: u32, doc: StoredDoc) -> Result<RawDocument> {
        let find = |field: Option<u32>| {
            field.and_then(|number| {
                doc.iter()
                    .find(|(n, _)| *n == number)
                    .map(|(_, value)| value)
            })
        };
        let id = match find(self.id_field) {
            Some(FieldValue::Bytes(bytes)) => uid::decode_id(bytes)?,
            Some(FieldValue::Text(s)) => s.clone(),
            _ => {
                return Err(Error::CorruptSegment(format!(
                    "document {doc_id} has no _id"
                )))
            }
        };
        let source = match find(self.source_field) {
            Some(FieldValue::Bytes(bytes)) => serde_json::from_slice(bytes)
                .map_err(|e| Error::CorruptSegment(format!("document '{id}' has bad _source: {e}")))?,
            Some(FieldValue::Text(s)) => serde_json::from_str(s)
                .map_err(|e| Error::CorruptSegment(format!("document '{id}' has bad _source: {e}")))?,
            _ => {
                return Err(Error::CorruptSegment(format!(
                    "document '{id}' has no _source"
                )))
            }
        };
        Ok(RawDocument { id, source })
    }
}

impl Iterator for SegmentDocs {
    type Item = Result<RawDocument>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.buffered_pos < self.buffered.len() {
                let doc_id = self.buffered_first + self.buffered_pos as u32;
                let doc = std::mem::take(&mut self.buffered[self.buffered_pos]);
                self.buffered_pos += 1;

                if let Some(live) = &self.live {
                    if !live.is_live(doc_id) {
                        continue;
                    }
                }
                if let Some(soft) = self.soft_deletes_field {
                    // A stored tombstone value marks the doc soft-deleted.
                    if doc.iter().any(|(n, _)| *n == soft) {
                        continue;
                    }
                }
                return Some(self.assemble(doc_id, doc));
            }
            if self.chunk_index >= self.reader.chunk_count() {
                return None;
            }
            match self.reader.read_chunk(self.chunk_index) {
                Ok((first_doc, docs)) => {
                    self.chunk_index += 1;
                    self.buffered = docs;
                    self.buffered_first = first_doc;
                    self.buffered_pos = 0;
                }
                Err(e) => {
                    self.chunk_index = self.reader.chunk_count();
                    return Some(Err(e));
                }
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testfixtures::{build_segment, DocSpec};
    use super::*;
    use reshard_core::Flavor;
    use serde_json::json;

    fn es_7_10() -> Version {
        Version::new(Flavor::Elasticsearch, 7, 10, 2)
    }

    #[test]
    fn test_reader_dispatch() {
        assert!(reader_for_version(&Version::new(Flavor::Elasticsearch, 6, 8, 23), "/tmp").is_ok());
        assert!(reader_for_version(&Version::new(Flavor::OpenSearch, 1, 3, 16), "/tmp").is_ok());
        assert!(matches!(
            reader_for_version(&Version::new(Flavor::OpenSearch, 2, 11, 0), "/tmp"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_reads_live_documents_across_segments() {
        let dir = tempfile::tempdir().unwrap();
        build_segment(
            dir.path(),
            "_0",
            Generation::Gen9,
            &[
                DocSpec::new("a", json!({"n": 1})),
                DocSpec::new("b", json!({"n": 2})),
            ],
            &[],
        );
        build_segment(
            dir.path(),
            "_1",
            Generation::Gen9,
            &[DocSpec::new("c", json!({"n": 3}))],
            &[],
        );

        let reader = reader_for_version(&es_7_10(), dir.path()).unwrap();
        let docs: Vec<RawDocument> = reader
            .read_documents()
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(docs[2].source, json!({"n": 3}));
    }

    #[test]
    fn test_hard_deleted_documents_skipped() {
        let dir = tempfile::tempdir().unwrap();
        build_segment(
            dir.path(),
            "_0",
            Generation::Gen7,
            &[
                DocSpec::new("keep", json!({})),
                DocSpec::new("dropped", json!({})),
                DocSpec::new("keep2", json!({})),
            ],
            &[1],
        );
        let es_6_8 = Version::new(Flavor::Elasticsearch, 6, 8, 23);
        let reader = reader_for_version(&es_6_8, dir.path()).unwrap();
        let ids: Vec<String> = reader
            .read_documents()
            .unwrap()
            .map(|r| r.unwrap().id)
            .collect();
        assert_eq!(ids, vec!["keep", "keep2"]);
    }

    #[test]
    fn test_hard_deleted_documents_skipped_word_packed() {
        let dir = tempfile::tempdir().unwrap();
        build_segment(
            dir.path(),
            "_0",
            Generation::Gen9,
            &[
                DocSpec::new("keep", json!({})),
                DocSpec::new("dropped", json!({})),
            ],
            &[1],
        );
        let reader = reader_for_version(&es_7_10(), dir.path()).unwrap();
        let ids: Vec<String> = reader
            .read_documents()
            .unwrap()
            .map(|r| r.unwrap().id)
            .collect();
        assert_eq!(ids, vec!["keep"]);
    }

    #[test]
    fn test_soft_deleted_documents_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut tombstoned = DocSpec::new("gone", json!({}));
        tombstoned.soft_deleted = true;
        build_segment(
            dir.path(),
            "_0",
            Generation::Gen9,
            &[DocSpec::new("kept", json!({})), tombstoned],
            &[],
        );
        let reader = reader_for_version(&es_7_10(), dir.path()).unwrap();
        let ids: Vec<String> = reader
            .read_documents()
            .unwrap()
            .map(|r| r.unwrap().id)
            .collect();
        assert_eq!(ids, vec!["kept"]);
    }

    #[test]
    fn test_missing_source_is_per_document_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut no_source = DocSpec::new("naked", json!({}));
        no_source.source = None;
        build_segment(
            dir.path(),
            "_0",
            Generation::Gen9,
            &[DocSpec::new("ok", json!({"n": 1})), no_source],
            &[],
        );
        let reader = reader_for_version(&es_7_10(), dir.path()).unwrap();
        let results: Vec<Result<RawDocument>> =
            reader.read_documents().unwrap().collect();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap().id, "ok");
        assert!(matches!(results[1], Err(Error::CorruptSegment(_))));
    }

    #[test]
    fn test_empty_shard_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let reader = reader_for_version(&es_7_10(), dir.path()).unwrap();
        assert!(reader.read_documents().unwrap().next().is_none());
    }
}
