//! Content-Encoding handling for fetched metadata.

use flate2::read::{GzDecoder, ZlibDecoder};
use std::io::Read;
use tracing::debug;

use super::error::MetadataError;

/// Decompress `raw` according to the reported Content-Encoding.
///
/// `gzip` and `deflate` (zlib-wrapped) are inflated; a missing, `identity` or
/// unrecognised encoding passes the bytes through. A recognised encoding with a
/// corrupt stream is an error, never a pass-through.
pub fn decode(raw: &[u8], content_encoding: Option<&str>) -> Result<Vec<u8>, MetadataError> {
    let encoding = match content_encoding.map(|e| e.trim().to_ascii_lowercase()) {
        Some(encoding) => encoding,
        None => return Ok(raw.to_vec()),
    };

    match encoding.as_str() {
        "gzip" | "x-gzip" => {
            debug!("Metadata document was GZip compressed, decompressing it");
            inflate(GzDecoder::new(raw), &encoding)
        }
        "deflate" => {
            debug!("Metadata document was deflate compressed, decompressing it");
            inflate(ZlibDecoder::new(raw), &encoding)
        }
        "" | "identity" => Ok(raw.to_vec()),
        other => {
            debug!(encoding = %other, "Unrecognised Content-Encoding, using body as-is");
            Ok(raw.to_vec())
        }
    }
}

fn inflate(mut reader: impl Read, encoding: &str) -> Result<Vec<u8>, MetadataError> {
    let mut decoded = Vec::new();
    reader
        .read_to_end(&mut decoded)
        .map_err(|e| MetadataError::Decompression {
            encoding: encoding.to_string(),
            source: e,
        })?;
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::{GzEncoder, ZlibEncoder};
    use flate2::Compression;
    use std::io::Write;

    const BODY: &[u8] = b"<md:EntityDescriptor entityID=\"https://idp.example.org\"/>";

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_gzip() {
        assert_eq!(decode(&gzip(BODY), Some("gzip")).unwrap(), BODY);
        assert_eq!(decode(&gzip(BODY), Some(" GZIP ")).unwrap(), BODY);
    }

    #[test]
    fn test_deflate() {
        assert_eq!(decode(&zlib(BODY), Some("deflate")).unwrap(), BODY);
    }

    #[test]
    fn test_pass_through() {
        assert_eq!(decode(BODY, None).unwrap(), BODY);
        assert_eq!(decode(BODY, Some("identity")).unwrap(), BODY);
        assert_eq!(decode(BODY, Some("br")).unwrap(), BODY);
    }

    #[test]
    fn test_corrupt_stream_fails() {
        let err = decode(BODY, Some("gzip")).unwrap_err();
        assert!(matches!(err, MetadataError::Decompression { ref encoding, .. } if encoding == "gzip"));

        assert!(decode(BODY, Some("deflate")).is_err());
    }
}
