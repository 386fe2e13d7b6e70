//! Similarity engine.

use indexchat_core::error::{IndexChatError, Result};

/// Dot product accumulated in f64.
fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| f64::from(x) * f64::from(y))
        .sum()
}

/// Cosine similarity in `[-1, 1]`.
///
/// Unequal lengths are a `DimensionMismatch`. A zero-norm operand has no
/// direction and scores `0`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(IndexChatError::dimension_mismatch(a.len(), b.len()));
    }

    let norm_a = dot(a, a);
    let norm_b = dot(b, b);
    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }

    let cos = dot(a, b) / (norm_a.sqrt() * norm_b.sqrt());
    Ok(cos.clamp(-1.0, 1.0) as f32)
}

/// Scale `v` to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = dot(v, v).sqrt();
    if norm == 0.0 {
        return;
    }
    for x in v.iter_mut() {
        *x = (f64::from(*x) / norm) as f32;
    }
}

/// Map a squared-L2 distance between unit vectors onto cosine similarity.
///
/// sqlite-vss (faiss `IndexFlatL2`) reports `|a - b|²`, which for unit
/// vectors equals `2 - 2·cos`.
pub fn l2_squared_to_similarity(distance: f32) -> f32 {
    (1.0 - distance / 2.0).clamp(-1.0, 1.0)
}
