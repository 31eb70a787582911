//! Shard blob unpacking into a scoped temporary directory.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use tracing::{debug, info};

use reshard_core::logging::{INDEX, SHARD, SHARD_SIZE_BYTES};
use reshard_core::{defaults, Error, Result, ShardMetadata};
use reshard_snapshot::SourceRepo;

/// A shard's segment files on local disk. Dropping this removes the
/// backing directory, so it must outlive every reader over it.
#[derive(Debug)]
pub struct UnpackedShard {
    _workspace: Option<TempDir>,
    path: PathBuf,
}

impl UnpackedShard {
    /// An unpacked view over a directory the caller owns; nothing is
    /// deleted on drop. Used by tests and pre-staged shards.
    pub fn external(path: impl Into<PathBuf>) -> Self {
        Self {
            _workspace: None,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// The seam the documents runner unpacks shards through.
pub trait ShardUnpacker: Send + Sync {
    fn unpack(&self, shard: &ShardMetadata) -> Result<UnpackedShard>;
}

/// Materializes a shard's Lucene files from repository blobs.
pub struct SnapshotShardUnpacker {
    repo: Arc<dyn SourceRepo>,
    max_shard_size_bytes: u64,
}

impl SnapshotShardUnpacker {
    pub fn new(repo: Arc<dyn SourceRepo>) -> Self {
        Self {
            repo,
            max_shard_size_bytes: defaults::MAX_SHARD_SIZE_BYTES,
        }
    }

    pub fn with_max_shard_size(mut self, max_shard_size_bytes: u64) -> Self {
        self.max_shard_size_bytes = max_shard_size_bytes;
        self
    }

    fn write_file(&self, shard: &ShardMetadata, dir: &Path, file_index: usize) -> Result<()> {
        let file = &shard.files[file_index];
        let dest_path = dir.join(&file.physical_name);
        let dest = File::create(&dest_path).map_err(|e| {
            Error::CouldNotUnpackShard(format!(
                "failed to create {}: {e}",
                dest_path.display()
            ))
        })?;
        let mut dest = BufWriter::with_capacity(defaults::UNPACK_BUFFER_BYTES, dest);

        // Virtual files live entirely inside the shard manifest.
        if file.name.starts_with("v__") {
            let contents = file.meta_hash.as_deref().ok_or_else(|| {
                Error::CouldNotUnpackShard(format!(
                    "virtual file {} has no inline contents",
                    file.name
                ))
            })?;
            dest.write_all(contents)
                .and_then(|_| dest.flush())
                .map_err(|e| {
                    Error::CouldNotUnpackShard(format!(
                        "failed to write {}: {e}",
                        dest_path.display()
                    ))
                })?;
            return Ok(());
        }

        for part in 0..file.number_of_parts() {
            let blob_path =
                self.repo
                    .blob_path(&shard.index_id, shard.shard_id, &file.part_name(part));
            let bytes = self.repo.read_file(&blob_path).map_err(|e| {
                Error::CouldNotUnpackShard(format!(
                    "missing blob {} for {}: {e}",
                    file.part_name(part),
                    file.physical_name
                ))
            })?;
            dest.write_all(&bytes).map_err(|e| {
                Error::CouldNotUnpackShard(format!(
                    "failed to write {}: {e}",
                    dest_path.display()
                ))
            })?;
        }
        dest.flush().map_err(|e| {
            Error::CouldNotUnpackShard(format!("failed to flush {}: {e}", dest_path.display()))
        })?;
        debug!(file = file.physical_name, "Unpacked segment file");
        Ok(())
    }
}

impl ShardUnpacker for SnapshotShardUnpacker {
    fn unpack(&self, shard: &ShardMetadata) -> Result<UnpackedShard> {
        // Size gate before any I/O is spent.
        if shard.total_size_bytes > self.max_shard_size_bytes {
            return Err(Error::ShardTooLarge {
                shard_size_bytes: shard.total_size_bytes,
                max_size_bytes: self.max_shard_size_bytes,
            });
        }

        let workspace = TempDir::new().map_err(|e| {
            Error::CouldNotUnpackShard(format!("failed to create shard workspace: {e}"))
        })?;
        fs::create_dir_all(workspace.path()).ok();

        for file_index in 0..shard.files.len() {
            self.write_file(shard, workspace.path(), file_index)?;
        }
        info!(
            { INDEX } = shard.index_name,
            { SHARD } = shard.shard_id,
            { SHARD_SIZE_BYTES } = shard.total_size_bytes,
            files = shard.files.len(),
            "Unpacked shard"
        );
        let path = workspace.path().to_path_buf();
        Ok(UnpackedShard {
            _workspace: Some(workspace),
            path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reshard_core::ShardFileInfo;
    use reshard_snapshot::FileSystemRepo;
    use std::fs;

    fn shard(files: Vec<ShardFileInfo>) -> ShardMetadata {
        let total_size_bytes = files.iter().map(|f| f.length).sum();
        ShardMetadata {
            snapshot_name: "s1".into(),
            index_name: "logs".into(),
            index_id: "id1".into(),
            shard_id: 0,
            total_size_bytes,
            files,
        }
    }

    #[test]
    fn test_oversized_shard_rejected_before_io() {
        // Repo root does not even exist; the size gate fires first.
        let repo = Arc::new(FileSystemRepo::new("/nonexistent"));
        let unpacker = SnapshotShardUnpacker::new(repo).with_max_shard_size(100);
        let result = unpacker.unpack(&shard(vec![ShardFileInfo {
            name: "__0".into(),
            physical_name: "_0.fdt".into(),
            length: 101,
            part_size: None,
            meta_hash: None,
        }]));
        match result {
            Err(Error::ShardTooLarge {
                shard_size_bytes,
                max_size_bytes,
            }) => {
                assert_eq!(shard_size_bytes, 101);
                assert_eq!(max_size_bytes, 100);
            }
            other => panic!("expected ShardTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn test_parts_are_reassembled_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let shard_dir = dir.path().join("indices/id1/0");
        fs::create_dir_all(&shard_dir).unwrap();
        fs::write(shard_dir.join("__0.part0"), b"hello ").unwrap();
        fs::write(shard_dir.join("__0.part1"), b"world").unwrap();

        let repo = Arc::new(FileSystemRepo::new(dir.path()));
        let unpacker = SnapshotShardUnpacker::new(repo);
        let unpacked = unpacker
            .unpack(&shard(vec![ShardFileInfo {
                name: "__0".into(),
                physical_name: "_0.cfs".into(),
                length: 11,
                part_size: Some(6),
                meta_hash: None,
            }]))
            .unwrap();
        let contents = fs::read(unpacked.path().join("_0.cfs")).unwrap();
        assert_eq!(contents, b"hello world");
    }

    #[test]
    fn test_virtual_file_materialized_from_manifest() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("indices/id1/0")).unwrap();
        let repo = Arc::new(FileSystemRepo::new(dir.path()));
        let unpacker = SnapshotShardUnpacker::new(repo);
        let unpacked = unpacker
            .unpack(&shard(vec![ShardFileInfo {
                name: "v__0".into(),
                physical_name: "segments_2".into(),
                length: 4,
                part_size: None,
                meta_hash: Some(vec![9, 8, 7, 6]),
            }]))
            .unwrap();
        assert_eq!(
            fs::read(unpacked.path().join("segments_2")).unwrap(),
            vec![9, 8, 7, 6]
        );
    }

    #[test]
    fn test_virtual_file_without_contents_fails() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Arc::new(FileSystemRepo::new(dir.path()));
        let unpacker = SnapshotShardUnpacker::new(repo);
        let result = unpacker.unpack(&shard(vec![ShardFileInfo {
            name: "v__0".into(),
            physical_name: "segments_2".into(),
            length: 4,
            part_size: None,
            meta_hash: None,
        }]));
        assert!(matches!(result, Err(Error::CouldNotUnpackShard(_))));
    }

    #[test]
    fn test_workspace_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("indices/id1/0")).unwrap();
        let repo = Arc::new(FileSystemRepo::new(dir.path()));
        let unpacker = SnapshotShardUnpacker::new(repo);
        let unpacked = unpacker.unpack(&shard(vec![])).unwrap();
        let path = unpacked.path().to_path_buf();
        assert!(path.exists());
        drop(unpacked);
        assert!(!path.exists());
    }
}
