//! Inline `data:` URI payloads.

use crate::error::{AssetError, Result};
use base64::Engine;

/// A parsed `data:[<mediatype>][;base64],<data>` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri<'a> {
    /// Media type, possibly empty.
    pub mediatype: &'a str,
    /// Whether the payload is base64 encoded.
    pub base64: bool,
    /// Encoded payload.
    pub data: &'a str,
}

impl<'a> DataUri<'a> {
    /// Parse a data URI. Returns `None` if `uri` is not one.
    pub fn parse(uri: &'a str) -> Option<Self> {
        let rest = uri.strip_prefix("data:")?;
        let (header, data) = rest.split_once(',')?;
        let (mediatype, base64) = match header.strip_suffix(";base64") {
            Some(m) => (m, true),
            None => (header, false),
        };
        // Parameters other than base64 (e.g. ";charset=") are not part of the type.
        let mediatype = mediatype.split(';').next().unwrap_or_default();
        Some(Self {
            mediatype,
            base64,
            data,
        })
    }

    /// Decode the payload. Raw payloads are copied verbatim.
    pub fn decode(&self) -> Result<Vec<u8>> {
        if self.base64 {
            Ok(base64::engine::general_purpose::STANDARD.decode(self.data)?)
        } else {
            Ok(self.data.as_bytes().to_vec())
        }
    }
}

/// Whether `uri` is a data URI.
pub fn is_data_uri(uri: &str) -> bool {
    uri.starts_with("data:")
}

/// Decode a data URI in one step.
pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>> {
    DataUri::parse(uri)
        .ok_or_else(|| AssetError::invalid("invalid data URI"))?
        .decode()
}

/// Encode bytes as a base64 data URI.
pub fn encode_data_uri(mediatype: &str, data: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mediatype,
        base64::engine::general_purpose::STANDARD.encode(data)
    )
}

/// Guess an image media type from magic bytes.
pub fn sniff_image_mime(data: &[u8]) -> Option<&'static str> {
    if data.starts_with(&[0x89, b'P', b'N', b'G']) {
        Some("image/png")
    } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_base64() {
        let uri = "data:application/octet-stream;base64,SGVsbG8=";
        let parsed = DataUri::parse(uri).unwrap();
        assert_eq!(parsed.mediatype, "application/octet-stream");
        assert!(parsed.base64);
        assert_eq!(parsed.decode().unwrap(), b"Hello");
    }

    #[test]
    fn test_decode_raw_payload() {
        assert_eq!(decode_data_uri("data:text/plain;charset=utf-8,abc").unwrap(), b"abc");
        assert_eq!(DataUri::parse("data:,x").unwrap().mediatype, "");
    }

    #[test]
    fn test_not_a_data_uri() {
        assert!(DataUri::parse("buffer.bin").is_none());
        assert!(decode_data_uri("data:nocomma").is_err());
        assert!(matches!(
            decode_data_uri("data:;base64,@@@"),
            Err(AssetError::Base64(_))
        ));
    }

    #[test]
    fn test_sniff_image_mime() {
        assert_eq!(sniff_image_mime(&[0x89, b'P', b'N', b'G', 0x0D]), Some("image/png"));
        assert_eq!(sniff_image_mime(&[0xFF, 0xD8, 0xFF, 0xE0]), Some("image/jpeg"));
        assert_eq!(sniff_image_mime(b"GIF8"), None);
    }

    #[test]
    fn test_encode_round_trips() {
        let uri = encode_data_uri("application/octet-stream", b"\x00\x01\x02");
        assert_eq!(decode_data_uri(&uri).unwrap(), vec![0, 1, 2]);
    }
}
