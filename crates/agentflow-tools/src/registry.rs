use crate::tool::{ToolCategory, ToolMetadata};
use std::collections::{BTreeSet, HashMap};

/// Discovery index over registered tool metadata, keyed by category and tag.
///
/// Not synchronized on its own; [`crate::ToolManager`] owns one behind its lock
/// and keeps it in step with the tool table.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    metadata: HashMap<String, ToolMetadata>,
    categories: HashMap<ToolCategory, BTreeSet<String>>,
    tags: HashMap<String, BTreeSet<String>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a tool's metadata, replacing any previous entry with the same ID.
    pub fn insert(&mut self, metadata: ToolMetadata) {
        self.remove(&metadata.id);
        for category in &metadata.categories {
            self.categories
                .entry(*category)
                .or_default()
                .insert(metadata.id.clone());
        }
        for tag in &metadata.tags {
            self.tags
                .entry(tag.clone())
                .or_default()
                .insert(metadata.id.clone());
        }
        self.metadata.insert(metadata.id.clone(), metadata);
    }

    /// Drop a tool from every index. Returns the removed metadata.
    pub fn remove(&mut self, tool_id: &str) -> Option<ToolMetadata> {
        let metadata = self.metadata.remove(tool_id)?;
        for category in &metadata.categories {
            if let Some(ids) = self.categories.get_mut(category) {
                ids.remove(tool_id);
                if ids.is_empty() {
                    self.categories.remove(category);
                }
            }
        }
        for tag in &metadata.tags {
            if let Some(ids) = self.tags.get_mut(tag) {
                ids.remove(tool_id);
                if ids.is_empty() {
                    self.tags.remove(tag);
                }
            }
        }
        Some(metadata)
    }

    pub fn get(&self, tool_id: &str) -> Option<&ToolMetadata> {
        self.metadata.get(tool_id)
    }

    /// Tool IDs in a category, sorted.
    pub fn find_by_category(&self, category: ToolCategory) -> Vec<String> {
        self.categories
            .get(&category)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Tool IDs carrying a tag, sorted.
    pub fn find_by_tag(&self, tag: &str) -> Vec<String> {
        self.tags
            .get(tag)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn categories(&self) -> Vec<ToolCategory> {
        self.categories.keys().copied().collect()
    }

    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.tags.keys().cloned().collect();
        tags.sort();
        tags
    }

    pub fn all_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.metadata.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(id: &str, categories: Vec<ToolCategory>, tags: &[&str]) -> ToolMetadata {
        ToolMetadata {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            version: "1.0".to_string(),
            categories,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            parameters: vec![],
        }
    }

    #[test]
    fn test_index_by_category_and_tag() {
        let mut registry = ToolRegistry::new();
        registry.insert(meta("calc", vec![ToolCategory::Analysis], &["math"]));
        registry.insert(meta("web", vec![ToolCategory::Search, ToolCategory::Io], &["net"]));

        assert_eq!(registry.find_by_category(ToolCategory::Search), vec!["web"]);
        assert_eq!(registry.find_by_tag("math"), vec!["calc"]);
        assert_eq!(registry.categories().len(), 3);
        assert_eq!(registry.tags(), vec!["math", "net"]);
        assert_eq!(registry.all_ids(), vec!["calc", "web"]);
    }

    #[test]
    fn test_remove_cleans_empty_buckets() {
        let mut registry = ToolRegistry::new();
        registry.insert(meta("calc", vec![ToolCategory::Analysis], &["math"]));
        assert!(registry.remove("calc").is_some());
        assert!(registry.remove("calc").is_none());
        assert!(registry.categories().is_empty());
        assert!(registry.tags().is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_reinsert_replaces_index_entries() {
        let mut registry = ToolRegistry::new();
        registry.insert(meta("calc", vec![ToolCategory::Analysis], &["math"]));
        registry.insert(meta("calc", vec![ToolCategory::System], &[]));
        assert!(registry.find_by_category(ToolCategory::Analysis).is_empty());
        assert_eq!(registry.find_by_category(ToolCategory::System), vec!["calc"]);
        assert_eq!(registry.len(), 1);
    }
}
