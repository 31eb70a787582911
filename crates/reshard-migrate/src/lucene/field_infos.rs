//! `.fnm` field infos: field number → name mapping plus per-field flags.

use std::collections::BTreeMap;
use std::path::Path;

use reshard_core::dataio::{verify_footer, DataInput};
use reshard_core::{Error, Result};

use super::Generation;

pub const FIELD_INFOS_CODEC: &str = "FieldInfos";

/// Marks the index's soft-deletes field (newer generations only).
pub const FLAG_SOFT_DELETES: u8 = 0x01;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    pub number: u32,
    pub name: String,
    pub soft_deletes: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FieldInfos {
    by_number: BTreeMap<u32, FieldInfo>,
}

impl FieldInfos {
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
        input.check_header(FIELD_INFOS_CODEC, version, version)?;

        let count = input.read_vint()?;
        let mut by_number = BTreeMap::new();
        for _ in 0..count {
            let name = input.read_string()?;
            let number = input.read_vint()?;
            let flags = input.read_u8()?;
            by_number.insert(
                number,
                FieldInfo {
                    number,
                    name,
                    soft_deletes: flags & FLAG_SOFT_DELETES != 0,
                },
            );
        }
        Ok(Self { by_number })
    }

    pub fn by_number(&self, number: u32) -> Option<&FieldInfo> {
        self.by_number.get(&number)
    }

    pub fn number_of(&self, name: &str) -> Option<u32> {
        self.by_number
            .values()
            .find(|f| f.name == name)
            .map(|f| f.number)
    }

    /// The field number tombstoning soft-deleted documents, if the index
    /// declares one.
    pub fn soft_deletes_field(&self) -> Option<u32> {
        self.by_number
            .values()
            .find(|f| f.soft_deletes)
            .map(|f| f.number)
    }
}
