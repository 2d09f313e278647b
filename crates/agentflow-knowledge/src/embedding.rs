use agentflow_core::{AgentflowError, AgentflowResult};
use async_trait::async_trait;
use std::collections::HashMap;

/// Trait for computing text embeddings.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Compute embedding vector for a single text.
    async fn embed(&self, text: &str) -> AgentflowResult<Vec<f32>>;

    /// Compute embeddings for a batch of texts.
    async fn embed_batch(&self, texts: &[&str]) -> AgentflowResult<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Dimension of the vectors produced by this provider.
    fn dimension(&self) -> usize;
}

/// Deterministic hashed bag-of-words embedding. Needs no model or network, so it
/// is the default for tests and the demo binary.
///
/// Each lowercase word of two or more characters contributes its term frequency
/// at three FNV-1a hashed positions; the result is L2-normalised.
pub struct HashEmbedding {
    dimension: usize,
}

impl HashEmbedding {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }
}

impl Default for HashEmbedding {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedding {
    async fn embed(&self, text: &str) -> AgentflowResult<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(AgentflowError::Knowledge(
                "cannot embed empty text".to_string(),
            ));
        }

        let mut vector = vec![0.0f32; self.dimension];
        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.chars().count() > 1)
            .collect();
        if words.is_empty() {
            return Ok(vector);
        }

        let mut freq: HashMap<&str, f32> = HashMap::new();
        for word in &words {
            *freq.entry(word).or_insert(0.0) += 1.0;
        }

        let total = words.len() as f32;
        for (word, count) in &freq {
            let tf = count / total;
            let bytes = word.as_bytes();
            for (salt, weight) in [(None, 1.0f32), (Some(1u8), 0.7), (Some(2u8), 0.5)] {
                let h = match salt {
                    None => fnv1a(bytes),
                    Some(s) => fnv1a(&[bytes, &[s]].concat()),
                };
                vector[h as usize % self.dimension] += tf * weight;
            }
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn fnv1a(data: &[u8]) -> u32 {
    let mut hash: u32 = 2_166_136_261;
    for &byte in data {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(16_777_619);
    }
    hash
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::vector::cosine_similarity;

    #[tokio::test]
    async fn test_dimension_and_norm() {
        let emb = HashEmbedding::new(64);
        let v = emb.embed("the quick brown fox").await.unwrap();
        assert_eq!(v.len(), 64);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_deterministic() {
        let emb = HashEmbedding::default();
        assert_eq!(emb.embed("agents").await.unwrap(), emb.embed("agents").await.unwrap());
    }

    #[tokio::test]
    async fn test_similar_texts_score_higher() {
        let emb = HashEmbedding::default();
        let v1 = emb.embed("rust async runtime scheduling").await.unwrap();
        let v2 = emb.embed("async runtime in rust").await.unwrap();
        let v3 = emb.embed("baking sourdough bread").await.unwrap();
        assert!(cosine_similarity(&v1, &v2) > cosine_similarity(&v1, &v3));
    }

    #[tokio::test]
    async fn test_empty_text_rejected() {
        assert!(HashEmbedding::default().embed("  ").await.is_err());
    }
}
