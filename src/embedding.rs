//! Text embeddings and vector utilities.
//!
//! [`embed`] asks the inference server for one embedding of a whole text
//! (no chunking) through `POST /api/embeddings`. The helpers below encode
//! vectors for SQLite BLOB storage and compare them:
//! - [`cosine_similarity`]: similarity between two embedding vectors
//! - [`vec_to_blob`]: encode a `Vec<f32>` as little-endian bytes
//! - [`blob_to_vec`]: decode a BLOB back into a `Vec<f32>`

use anyhow::{bail, Result};
use serde_json::Value;

use crate::llm::LlmClient;
use crate::request::{ApiType, ResponseFormat};

/// Embed `text` with the routed model.
///
/// Failures propagate; there is no retry.
pub async fn embed(client: &LlmClient, text: &str) -> Result<Vec<f32>> {
    let body = client
        .send(text, "", ApiType::Embeddings, ResponseFormat::None)
        .await?;
    parse_embedding(&body)
}

/// The `embedding` array of an embeddings response, verbatim.
fn parse_embedding(body: &Value) -> Result<Vec<f32>> {
    let Some(values) = body.get("embedding").and_then(|e| e.as_array()) else {
        bail!("Invalid embeddings response: missing embedding array");
    };

    let mut vec = Vec::with_capacity(values.len());
    for v in values {
        match v.as_f64() {
            Some(x) => vec.push(x as f32),
            None => bail!("Invalid embeddings response: non-numeric value {}", v),
        }
    }
    Ok(vec)
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// ```rust
/// use concept_miner::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Reverses [`vec_to_blob`]. Trailing bytes that do not form a whole
/// `f32` are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or a
/// zero vector.
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob_to_vec(&blob), vec);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let sim = cosine_similarity(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]);
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let sim = cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]);
        assert!((sim + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn parses_embedding_array() {
        let body = json!({"embedding": [0.5, -1.0, 2]});
        assert_eq!(parse_embedding(&body).unwrap(), vec![0.5, -1.0, 2.0]);
    }

    #[test]
    fn rejects_malformed_embedding() {
        assert!(parse_embedding(&json!({"response": "x"})).is_err());
        assert!(parse_embedding(&json!({"embedding": [1.0, "x"]})).is_err());
    }
}
