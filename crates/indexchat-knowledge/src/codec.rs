//! Embedding codec: f32 vectors as little-endian blobs.
//!
//! This is the byte layout of the `documents.embedding` column and of the
//! query parameter handed to `vss_search`.

use byteorder::{ByteOrder, LittleEndian};
use indexchat_core::error::{IndexChatError, Result};

const F32_BYTES: usize = std::mem::size_of::<f32>();

/// Encode a vector as `4 * len` bytes, little-endian IEEE-754, in order.
pub fn serialize_embedding(vector: &[f32]) -> Vec<u8> {
    let mut bytes = vec![0u8; vector.len() * F32_BYTES];
    LittleEndian::write_f32_into(vector, &mut bytes);
    bytes
}

/// Decode a blob produced by [`serialize_embedding`].
pub fn deserialize_embedding(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % F32_BYTES != 0 {
        return Err(IndexChatError::MalformedEmbedding(format!(
            "byte length {} is not a multiple of {F32_BYTES}",
            bytes.len()
        )));
    }
    let mut vector = vec![0f32; bytes.len() / F32_BYTES];
    LittleEndian::read_f32_into(bytes, &mut vector);
    Ok(vector)
}

/// Decode and check the result against an expected dimension.
///
/// NaN or infinite components make the vector unusable for ranking, so they
/// are reported as [`IndexChatError::MalformedEmbedding`].
pub fn deserialize_with_dimension(bytes: &[u8], dimensions: usize) -> Result<Vec<f32>> {
    let vector = deserialize_embedding(bytes)?;
    if vector.len() != dimensions {
        return Err(IndexChatError::dimension_mismatch(dimensions, vector.len()));
    }
    ensure_finite(&vector)?;
    Ok(vector)
}

/// Reject vectors with NaN or infinite components.
pub fn ensure_finite(vector: &[f32]) -> Result<()> {
    match vector.iter().position(|x| !x.is_finite()) {
        Some(i) => Err(IndexChatError::MalformedEmbedding(format!(
            "component {i} is {}",
            vector[i]
        ))),
        None => Ok(()),
    }
}
