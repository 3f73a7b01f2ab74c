/*!
 * Compression support for archive objects
 *
 * Archives are built in memory: records are streamed straight into the
 * encoder and the finished frame is handed to the object store in one piece.
 */

use std::io::Write;

use lz4::EncoderBuilder as Lz4Encoder;
use zstd::stream::Encoder as ZstdEncoder;

use crate::config::CompressionType;
use crate::error::{ExportError, Result};

/// LZ4 level used for archive frames
const LZ4_LEVEL: u32 = 4;

impl CompressionType {
    /// File extension appended after `.json`
    pub fn extension(&self) -> &'static str {
        match self {
            CompressionType::Lz4 => "lz4",
            CompressionType::Zstd { .. } => "zst",
        }
    }

    /// Value for the `Content-Encoding` header
    pub fn content_encoding(&self) -> &'static str {
        match self {
            CompressionType::Lz4 => "lz4",
            CompressionType::Zstd { .. } => "zstd",
        }
    }
}

/// Streaming compressor writing into an in-memory buffer
pub enum FrameEncoder {
    Lz4(lz4::Encoder<Vec<u8>>),
    Zstd(ZstdEncoder<'static, Vec<u8>>),
}

impl FrameEncoder {
    pub fn new(compression: CompressionType) -> Result<Self> {
        match compression {
            CompressionType::Lz4 => Lz4Encoder::new()
                .level(LZ4_LEVEL)
                .build(Vec::new())
                .map(FrameEncoder::Lz4)
                .map_err(|e| ExportError::Compression(e.to_string())),
            CompressionType::Zstd { level } => ZstdEncoder::new(Vec::new(), level)
                .map(FrameEncoder::Zstd)
                .map_err(|e| ExportError::Compression(e.to_string())),
        }
    }

    /// Flush the frame and return the compressed bytes
    pub fn finish(self) -> Result<Vec<u8>> {
        match self {
            FrameEncoder::Lz4(encoder) => {
                let (output, result) = encoder.finish();
                result.map_err(|e| ExportError::Compression(e.to_string()))?;
                Ok(output)
            }
            FrameEncoder::Zstd(encoder) => encoder
                .finish()
                .map_err(|e| ExportError::Compression(e.to_string())),
        }
    }
}

impl Write for FrameEncoder {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            FrameEncoder::Lz4(encoder) => encoder.write(buf),
            FrameEncoder::Zstd(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            FrameEncoder::Lz4(encoder) => encoder.flush(),
            FrameEncoder::Zstd(encoder) => encoder.flush(),
        }
    }
}

/// Decompress a complete frame
#[cfg(any(test, feature = "testing"))]
pub fn decompress(data: &[u8], compression: CompressionType) -> Result<Vec<u8>> {
    use lz4::Decoder as Lz4Decoder;
    use std::io::Read;
    use zstd::stream::Decoder as ZstdDecoder;

    let mut output = Vec::new();
    match compression {
        CompressionType::Lz4 => {
            let mut decoder =
                Lz4Decoder::new(data).map_err(|e| ExportError::Compression(e.to_string()))?;
            decoder
                .read_to_end(&mut output)
                .map_err(|e| ExportError::Compression(e.to_string()))?;
        }
        CompressionType::Zstd { .. } => {
            let mut decoder =
                ZstdDecoder::new(data).map_err(|e| ExportError::Compression(e.to_string()))?;
            decoder
                .read_to_end(&mut output)
                .map_err(|e| ExportError::Compression(e.to_string()))?;
        }
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compress(data: &[u8], compression: CompressionType) -> Result<Vec<u8>> {
        let mut encoder = FrameEncoder::new(compression)?;
        encoder
            .write_all(data)
            .map_err(|e| ExportError::Compression(e.to_string()))?;
        encoder.finish()
    }

    fn sample() -> Vec<u8> {
        b"{\"action\":\"repo.create\"}\n".repeat(200)
    }

    #[test]
    fn test_lz4_compression_roundtrip() {
        let data = sample();
        let compressed = compress(&data, CompressionType::Lz4).unwrap();
        assert!(compressed.len() < data.len());
        assert_eq!(decompress(&compressed, CompressionType::Lz4).unwrap(), data);
    }

    #[test]
    fn test_zstd_compression_roundtrip() {
        let data = sample();
        let compression = CompressionType::Zstd { level: 3 };
        let compressed = compress(&data, compression).unwrap();
        assert!(compressed.len() < data.len());
        assert_eq!(decompress(&compressed, compression).unwrap(), data);
    }

    #[test]
    fn test_extensions_and_encodings() {
        assert_eq!(CompressionType::Lz4.extension(), "lz4");
        assert_eq!(CompressionType::default().extension(), "zst");
        assert_eq!(CompressionType::default().content_encoding(), "zstd");
    }

    #[test]
    fn test_garbage_fails_to_decompress() {
        assert!(decompress(b"not a frame", CompressionType::default()).is_err());
    }
}
