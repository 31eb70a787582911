//! Checksummed metadata blob decoding.
//!
//! Every `.dat` blob in the repository is framed like a Lucene codec file:
//! header (magic, codec name, version), payload, CRC32 footer. The payload
//! is Smile, optionally deflate-compressed with a `DFL\0` marker prefix.

use std::io::Read;

use flate2::read::DeflateDecoder;
use serde::de::DeserializeOwned;

use reshard_core::dataio::{verify_footer, DataInput};
use reshard_core::{Error, Result};

/// Codec name of global cluster metadata blobs (`meta-*.dat` at the root).
pub const GLOBAL_METADATA_CODEC: &str = "metadata";

/// Codec name of per-index metadata blobs.
pub const INDEX_METADATA_CODEC: &str = "index-metadata";

/// Codec name of snapshot info and shard manifest blobs (`snap-*.dat`).
pub const SNAPSHOT_CODEC: &str = "snapshot";

/// Marker prefix of a deflate-compressed payload.
const DEFLATE_HEADER: &[u8] = b"DFL\0";

/// Widest codec version range seen across supported source versions.
const MIN_CODEC_VERSION: u32 = 0;
const MAX_CODEC_VERSION: u32 = 3;

/// Validate framing and decode the Smile payload of one blob.
///
/// A failure here is scoped to the single item the blob describes; callers
/// record it and continue with the rest of the snapshot.
pub fn parse_blob<T: DeserializeOwned>(expected_codec: &str, bytes: &[u8]) -> Result<T> {
    let payload_end = verify_footer(bytes)?;
    let mut input = DataInput::new(&bytes[..payload_end]);
    input.check_header(expected_codec, MIN_CODEC_VERSION, MAX_CODEC_VERSION)?;
    let payload = &bytes[input.position()..payload_end];
    let payload = maybe_decompress(payload)?;
    serde_smile::from_slice(&payload).map_err(|e| {
        Error::Snapshot(format!("malformed '{expected_codec}' blob payload: {e}"))
    })
}

fn maybe_decompress(payload: &[u8]) -> Result<Vec<u8>> {
    let Some(compressed) = payload.strip_prefix(DEFLATE_HEADER) else {
        return Ok(payload.to_vec());
    };
    let mut out = Vec::new();
    DeflateDecoder::new(compressed)
        .read_to_end(&mut out)
        .map_err(|e| Error::Snapshot(format!("deflate payload failed to decompress: {e}")))?;
    Ok(out)
}
