use crate::types::{Memory, MemoryType};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

/// Secondary indexes over a store's memories.
///
/// Not synchronized; the owning store keeps it under the same lock as the
/// memory table so both stay consistent.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    by_type: HashMap<MemoryType, HashSet<String>>,
    by_context: HashMap<String, HashMap<String, HashSet<String>>>,
    timestamps: HashMap<String, DateTime<Utc>>,
}

/// Index key for a context value; strings index by their raw text.
fn context_key(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, memory: &Memory) {
        self.by_type
            .entry(memory.memory_type)
            .or_default()
            .insert(memory.id.clone());
        for (key, value) in &memory.context {
            self.by_context
                .entry(key.clone())
                .or_default()
                .entry(context_key(value))
                .or_default()
                .insert(memory.id.clone());
        }
        self.timestamps.insert(memory.id.clone(), memory.timestamp);
    }

    pub fn remove(&mut self, memory: &Memory) {
        if let Some(ids) = self.by_type.get_mut(&memory.memory_type) {
            ids.remove(&memory.id);
            if ids.is_empty() {
                self.by_type.remove(&memory.memory_type);
            }
        }
        for (key, value) in &memory.context {
            let Some(values) = self.by_context.get_mut(key) else {
                continue;
            };
            let value_key = context_key(value);
            if let Some(ids) = values.get_mut(&value_key) {
                ids.remove(&memory.id);
                if ids.is_empty() {
                    values.remove(&value_key);
                }
            }
            if values.is_empty() {
                self.by_context.remove(key);
            }
        }
        self.timestamps.remove(&memory.id);
    }

    pub fn find_by_type(&self, memory_type: MemoryType) -> HashSet<String> {
        self.by_type.get(&memory_type).cloned().unwrap_or_default()
    }

    pub fn find_by_context(&self, key: &str, value: &serde_json::Value) -> HashSet<String> {
        self.by_context
            .get(key)
            .and_then(|values| values.get(&context_key(value)))
            .cloned()
            .unwrap_or_default()
    }

    /// IDs with a timestamp inside the inclusive window.
    pub fn find_by_time_range(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> HashSet<String> {
        self.timestamps
            .iter()
            .filter(|(_, ts)| start.map_or(true, |s| **ts >= s) && end.map_or(true, |e| **ts <= e))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Candidate IDs for a type and context selection, or `None` when neither is
    /// set and every memory is a candidate.
    pub fn candidates(
        &self,
        memory_type: Option<MemoryType>,
        context: &HashMap<String, serde_json::Value>,
    ) -> Option<HashSet<String>> {
        let mut result: Option<HashSet<String>> = memory_type.map(|t| self.find_by_type(t));
        for (key, value) in context {
            let ids = self.find_by_context(key, value);
            result = Some(match result {
                Some(acc) => acc.intersection(&ids).cloned().collect(),
                None => ids,
            });
        }
        result
    }

    pub fn clear(&mut self) {
        self.by_type.clear();
        self.by_context.clear();
        self.timestamps.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_add_and_find() {
        let mut index = MemoryIndex::new();
        let a = Memory::short_term(json!("a"), 0.5).with_context("tool", json!("calculator"));
        let b = Memory::long_term(json!("b"), 0.9).with_context("attempt", json!(2));
        index.add(&a);
        index.add(&b);

        assert!(index.find_by_type(MemoryType::ShortTerm).contains(&a.id));
        assert!(index.find_by_context("tool", &json!("calculator")).contains(&a.id));
        assert!(index.find_by_context("attempt", &json!(2)).contains(&b.id));
        assert!(index.find_by_context("attempt", &json!(3)).is_empty());
        assert_eq!(index.find_by_time_range(None, None).len(), 2);
    }

    #[test]
    fn test_remove_cleans_up() {
        let mut index = MemoryIndex::new();
        let a = Memory::short_term(json!("a"), 0.5).with_context("tool", json!("calculator"));
        index.add(&a);
        index.remove(&a);
        assert!(index.find_by_type(MemoryType::ShortTerm).is_empty());
        assert!(index.find_by_context("tool", &json!("calculator")).is_empty());
        assert!(index.by_context.is_empty());
        assert!(index.timestamps.is_empty());
    }

    #[test]
    fn test_candidates_intersect() {
        let mut index = MemoryIndex::new();
        let a = Memory::short_term(json!("a"), 0.5).with_context("tool", json!("x"));
        let b = Memory::long_term(json!("b"), 0.5).with_context("tool", json!("x"));
        index.add(&a);
        index.add(&b);

        assert!(index.candidates(None, &HashMap::new()).is_none());
        let ctx: HashMap<String, serde_json::Value> =
            [("tool".to_string(), json!("x"))].into_iter().collect();
        let ids = index.candidates(Some(MemoryType::LongTerm), &ctx).unwrap_or_default();
        assert_eq!(ids.len(), 1);
        assert!(ids.contains(&b.id));
    }
}
