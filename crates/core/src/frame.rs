//! Audio frame value type.

use bytes::Bytes;

/// One chunk of audio moving through the pipeline.
///
/// The payload is opaque to the core: frames are relayed byte-for-byte in
/// producer order and only the media-type tag travels with them.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub data: Bytes,
    pub mime_type: String,
}

impl AudioFrame {
    /// Wraps raw PCM bytes, the format both transports use by default.
    pub fn pcm(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            mime_type: "audio/pcm".to_string(),
        }
    }

    pub fn new(data: impl Into<Bytes>, mime_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
