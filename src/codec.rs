//! Codec pipeline for cache values: bincode, then lz4 frame compression, then base64.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{Read, Write};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to serialize value: {0}")]
    Serialize(String),
    #[error("failed to compress value: {0}")]
    Compress(String),
    #[error("failed to decode base64 text: {0}")]
    Base64(String),
    #[error("failed to decompress value: {0}")]
    Decompress(String),
    #[error("failed to deserialize value: {0}")]
    Deserialize(String),
}

/// Encode a value into a text-safe string suitable for a string-valued cache.
pub fn encode<T: Serialize>(value: &T) -> Result<String, CodecError> {
    let raw = bincode::serialize(value).map_err(|e| CodecError::Serialize(e.to_string()))?;
    let compressed = compress_lz4_frame(&raw)?;
    Ok(STANDARD.encode(compressed))
}

/// Reverse [`encode`]. Every stage reports its own failure instead of panicking.
pub fn decode<T: DeserializeOwned>(text: &str) -> Result<T, CodecError> {
    let compressed = STANDARD
        .decode(text.trim())
        .map_err(|e| CodecError::Base64(e.to_string()))?;
    let raw = decompress_lz4_frame(&compressed)?;
    bincode::deserialize(&raw).map_err(|e| CodecError::Deserialize(e.to_string()))
}

fn compress_lz4_frame(input: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut encoder = lz4_flex::frame::FrameEncoder::new(Vec::new());
    encoder
        .write_all(input)
        .map_err(|e| CodecError::Compress(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| CodecError::Compress(e.to_string()))
}

fn decompress_lz4_frame(input: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut decoder = lz4_flex::frame::FrameDecoder::new(input);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| CodecError::Decompress(e.to_string()))?;
    Ok(out)
}
