use chunkwise_common::{ChunkwiseError, Result};
use encoding_rs::{Encoding, GBK, UTF_8};
use std::path::Path;
use tracing::{info, warn};

/// Document text decoded from raw bytes
#[derive(Debug, Clone)]
pub struct DecodedDocument {
    /// Decoded text
    pub text: String,

    /// Name of the encoding that decoded it
    pub encoding: &'static str,
}

/// Decode document bytes: byte-order mark if present, otherwise strict
/// UTF-8, otherwise GBK (the usual encoding of non-UTF-8 Chinese books)
pub fn decode_document(bytes: &[u8]) -> Result<DecodedDocument> {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        return decode_with(encoding, &bytes[bom_len..]);
    }

    if let Ok(document) = decode_with(UTF_8, bytes) {
        return Ok(document);
    }

    warn!("UnknownEncoding: input is not valid UTF-8, falling back to {}", GBK.name());
    decode_with(GBK, bytes)
}

fn decode_with(encoding: &'static Encoding, bytes: &[u8]) -> Result<DecodedDocument> {
    let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
    if had_errors {
        return Err(ChunkwiseError::UnknownEncoding(format!(
            "input is not valid {}",
            encoding.name()
        )));
    }

    Ok(DecodedDocument {
        text: text.into_owned(),
        encoding: encoding.name(),
    })
}

/// Read and decode a document file
pub async fn read_document(path: &Path) -> Result<DecodedDocument> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        ChunkwiseError::invalid_input(format!("Failed to read {}: {}", path.display(), e))
    })?;
    let document = decode_document(&bytes)?;
    info!("encoding: {} ({})", document.encoding, path.display());
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8() {
        let document = decode_document("Hello。世界".as_bytes()).unwrap();
        assert_eq!(document.text, "Hello。世界");
        assert_eq!(document.encoding, "UTF-8");
    }

    #[test]
    fn test_utf8_bom_stripped() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice("text".as_bytes());
        assert_eq!(decode_document(&bytes).unwrap().text, "text");
    }

    #[test]
    fn test_gbk_fallback() {
        let (bytes, _, _) = GBK.encode("今天天气很好。");
        let document = decode_document(&bytes).unwrap();
        assert_eq!(document.text, "今天天气很好。");
        assert_eq!(document.encoding, "GBK");
    }

    #[test]
    fn test_undecodable() {
        // Invalid UTF-8 and a truncated GBK lead byte
        let err = decode_document(&[0x61, 0xFF, 0x81]).unwrap_err();
        assert!(matches!(err, ChunkwiseError::UnknownEncoding(_)));
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_document(&dir.path().join("missing.txt")).await.is_err());
    }
}
