//! `_id` term decoding.
//!
//! Sources store document ids in one of three encodings, flagged by the
//! first byte: packed decimal digits for purely numeric ids, an escape
//! byte followed by raw bytes rendered as unpadded URL-safe base64, or
//! plain UTF-8 (no flag byte; the id simply does not start with either
//! marker).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use reshard_core::{Error, Result};

const NUMERIC: u8 = 0x01;
const BASE64_ESCAPE: u8 = 0x0e;

pub fn decode_id(bytes: &[u8]) -> Result<String> {
    match bytes.first() {
        None => Err(Error::CorruptSegment("empty _id term".into())),
        Some(&NUMERIC) => decode_numeric(&bytes[1..]),
        Some(&BASE64_ESCAPE) => Ok(URL_SAFE_NO_PAD.encode(&bytes[1..])),
        Some(_) => String::from_utf8(bytes.to_vec())
            .map_err(|_| Error::CorruptSegment("non-utf8 _id term".into())),
    }
}

/// Two decimal digits per byte, high nibble first; a 0x0F nibble ends the
/// number early.
fn decode_numeric(bytes: &[u8]) -> Result<String> {
    let mut id = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        for nibble in [b >> 4, b & 0x0F] {
            match nibble {
                0..=9 => id.push(char::from(b'0' + nibble)),
                0x0F => return finish_numeric(id),
                other => {
                    return Err(Error::CorruptSegment(format!(
                        "invalid digit nibble {other:#x} in numeric _id"
                    )))
                }
            }
        }
    }
    finish_numeric(id)
}

fn finish_numeric(id: String) -> Result<String> {
    if id.is_empty() {
        return Err(Error::CorruptSegment("empty numeric _id".into()));
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_ids_pass_through() {
        assert_eq!(decode_id(b"doc-42").unwrap(), "doc-42");
    }

    #[test]
    fn test_numeric_id_even_digits() {
        // 1234
        assert_eq!(decode_id(&[NUMERIC, 0x12, 0x34]).unwrap(), "1234");
    }

    #[test]
    fn test_numeric_id_odd_digits_terminated() {
        // 123 with terminator nibble
        assert_eq!(decode_id(&[NUMERIC, 0x12, 0x3F]).unwrap(), "123");
    }

    #[test]
    fn test_base64_escape() {
        let raw = [BASE64_ESCAPE, 0xDE, 0xAD, 0xBE, 0xEF];
        assert_eq!(
            decode_id(&raw).unwrap(),
            URL_SAFE_NO_PAD.encode([0xDE, 0xAD, 0xBE, 0xEF])
        );
    }

    #[test]
    fn test_malformed_ids_rejected() {
        assert!(decode_id(&[]).is_err());
        assert!(decode_id(&[NUMERIC, 0xAB]).is_err());
        assert!(decode_id(&[0xFF, 0xFE]).is_err());
    }
}
