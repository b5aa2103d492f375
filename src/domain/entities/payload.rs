//! Transform output, buffered or lazily streamed.

use std::pin::Pin;

use bytes::Bytes;
use futures_util::Stream;

/// Lazily produced body chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// Payload bytes in one of the two supported shapes.
pub enum PayloadData {
    /// Fully materialised in memory.
    Buffer(Bytes),
    /// Produced on demand, usually read from the source temp file.
    Stream(ByteStream),
}

impl PayloadData {
    /// Returns true for the streaming variant.
    #[must_use]
    pub const fn is_stream(&self) -> bool {
        matches!(self, Self::Stream(_))
    }
}

impl std::fmt::Debug for PayloadData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buffer(bytes) => f.debug_tuple("Buffer").field(&bytes.len()).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Result of a transform.
#[derive(Debug)]
pub struct ImagePayload {
    /// Body bytes.
    pub data: PayloadData,
    /// Extension of the produced content, if known.
    pub extension: Option<String>,
    /// MIME type of the produced content.
    pub mime: String,
}

impl ImagePayload {
    /// In-memory webp output.
    #[must_use]
    pub fn webp(bytes: Vec<u8>) -> Self {
        Self {
            data: PayloadData::Buffer(Bytes::from(bytes)),
            extension: Some("webp".to_string()),
            mime: "image/webp".to_string(),
        }
    }

    /// In-memory png output.
    #[must_use]
    pub fn png(bytes: Vec<u8>) -> Self {
        Self {
            data: PayloadData::Buffer(Bytes::from(bytes)),
            extension: Some("png".to_string()),
            mime: "image/png".to_string(),
        }
    }
}
