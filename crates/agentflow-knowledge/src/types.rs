use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Limit applied when a query or search passes zero.
pub const DEFAULT_QUERY_LIMIT: usize = 10;

/// Metadata key carrying the cosine score on semantic search results.
pub const SIMILARITY_SCORE_KEY: &str = "similarity_score";

/// A knowledge item.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Knowledge {
    pub id: String,
    /// Free-form type discriminator, e.g. `"fact"` or `"document"`.
    pub kind: String,
    pub content: serde_json::Value,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Embedding; computed from `content` when empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vector: Vec<f32>,
}

impl Knowledge {
    pub fn new(kind: impl Into<String>, content: serde_json::Value) -> Self {
        Self {
            id: String::new(),
            kind: kind.into(),
            content,
            metadata: HashMap::new(),
            vector: Vec::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Text used for embedding: strings verbatim, anything else as compact JSON.
    pub fn text(&self) -> String {
        match &self.content {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    pub fn similarity_score(&self) -> Option<f64> {
        self.metadata.get(SIMILARITY_SCORE_KEY).and_then(|v| v.as_f64())
    }

    /// Whether every filter entry equals the item's metadata value.
    pub fn matches_filter(&self, filter: &HashMap<String, serde_json::Value>) -> bool {
        filter
            .iter()
            .all(|(k, v)| self.metadata.get(k).is_some_and(|mine| mine == v))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortField {
    /// Metadata key, or `"id"` / `"kind"`.
    pub field: String,
    #[serde(default)]
    pub ascending: bool,
}

impl SortField {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ascending: true,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ascending: false,
        }
    }
}

/// Structured query over metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeQuery {
    pub kind: Option<String>,
    #[serde(default)]
    pub filter: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub sort: Vec<SortField>,
    #[serde(default)]
    pub limit: usize,
}

impl KnowledgeQuery {
    pub fn effective_limit(&self) -> usize {
        if self.limit == 0 {
            DEFAULT_QUERY_LIMIT
        } else {
            self.limit
        }
    }

    pub fn matches(&self, item: &Knowledge) -> bool {
        self.kind.as_ref().map_or(true, |k| &item.kind == k) && item.matches_filter(&self.filter)
    }

    /// Order `items` by the sort fields, falling back to ID for stability.
    pub fn sort(&self, items: &mut [Knowledge]) {
        items.sort_by(|a, b| {
            for field in &self.sort {
                let ord = compare_values(&field_value(a, &field.field), &field_value(b, &field.field));
                let ord = if field.ascending { ord } else { ord.reverse() };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            a.id.cmp(&b.id)
        });
    }
}

fn field_value(item: &Knowledge, field: &str) -> serde_json::Value {
    match field {
        "id" => serde_json::Value::String(item.id.clone()),
        "kind" => serde_json::Value::String(item.kind.clone()),
        other => item
            .metadata
            .get(other)
            .cloned()
            .unwrap_or(serde_json::Value::Null),
    }
}

/// Nulls sort first, numbers numerically, strings lexically, other shapes by
/// their JSON text.
fn compare_values(a: &serde_json::Value, b: &serde_json::Value) -> Ordering {
    use serde_json::Value;
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (x, y) => x.to_string().cmp(&y.to_string()),
    }
}

/// Knowledge source selection for an agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub filters: HashMap<String, serde_json::Value>,
}
