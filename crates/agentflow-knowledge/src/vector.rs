use agentflow_core::{AgentflowError, AgentflowResult};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Cosine similarity; zero when either vector has no magnitude or lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Brute-force in-memory vector index of fixed dimension.
pub struct VectorIndex {
    dimension: usize,
    vectors: RwLock<HashMap<String, Vec<f32>>>,
}

impl VectorIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: RwLock::new(HashMap::new()),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn check_dimension(&self, vector: &[f32]) -> AgentflowResult<()> {
        if vector.len() != self.dimension {
            return Err(AgentflowError::Knowledge(format!(
                "vector dimensions mismatch: expected {}, got {}",
                self.dimension,
                vector.len()
            )));
        }
        Ok(())
    }

    /// Insert or overwrite.
    pub fn add(&self, id: &str, vector: Vec<f32>) -> AgentflowResult<()> {
        self.check_dimension(&vector)?;
        self.vectors.write().insert(id.to_string(), vector);
        Ok(())
    }

    pub fn update(&self, id: &str, vector: Vec<f32>) -> AgentflowResult<()> {
        self.check_dimension(&vector)?;
        let mut vectors = self.vectors.write();
        match vectors.get_mut(id) {
            Some(slot) => {
                *slot = vector;
                Ok(())
            }
            None => Err(AgentflowError::Knowledge(format!("vector not found: {id}"))),
        }
    }

    pub fn delete(&self, id: &str) -> AgentflowResult<()> {
        self.vectors
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| AgentflowError::Knowledge(format!("vector not found: {id}")))
    }

    /// IDs and scores of the `limit` nearest vectors, best first.
    pub fn search(&self, query: &[f32], limit: usize) -> AgentflowResult<Vec<(String, f32)>> {
        self.check_dimension(query)?;
        let vectors = self.vectors.read();
        let mut scored: Vec<(String, f32)> = vectors
            .iter()
            .map(|(id, v)| (id.clone(), cosine_similarity(query, v)))
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(limit);
        Ok(scored)
    }

    pub fn len(&self) -> usize {
        self.vectors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.read().is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_search_orders_by_score() {
        let index = VectorIndex::new(2);
        index.add("east", vec![1.0, 0.0]).unwrap();
        index.add("north", vec![0.0, 1.0]).unwrap();
        index.add("northeast", vec![0.7, 0.7]).unwrap();

        let hits = index.search(&[1.0, 0.1], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, "east");
        assert_eq!(hits[1].0, "northeast");
    }

    #[test]
    fn test_dimension_mismatch() {
        let index = VectorIndex::new(3);
        assert!(index.add("x", vec![1.0]).is_err());
        assert!(index.search(&[1.0], 1).is_err());
    }

    #[test]
    fn test_update_and_delete() {
        let index = VectorIndex::new(1);
        assert!(index.update("x", vec![1.0]).is_err());
        index.add("x", vec![1.0]).unwrap();
        index.update("x", vec![-1.0]).unwrap();
        index.delete("x").unwrap();
        assert!(index.delete("x").is_err());
        assert!(index.is_empty());
    }
}
