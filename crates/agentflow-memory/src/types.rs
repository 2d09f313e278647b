use agentflow_core::new_id;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Recall limit applied when a query leaves `limit` unset or zero.
pub const DEFAULT_RECALL_LIMIT: usize = 10;

/// Retention class of a memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    /// Recent observations, first to be evicted.
    ShortTerm,
    /// Promoted or explicitly durable memories.
    LongTerm,
    /// Scratch state for the task in progress.
    Working,
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemoryType::ShortTerm => write!(f, "short_term"),
            MemoryType::LongTerm => write!(f, "long_term"),
            MemoryType::Working => write!(f, "working"),
        }
    }
}

/// A single memory record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub memory_type: MemoryType,
    pub content: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    /// In `[0, 1]`.
    pub importance: f64,
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
}

impl Memory {
    /// New memory with a fresh ID and the current time.
    pub fn new(memory_type: MemoryType, content: serde_json::Value, importance: f64) -> Self {
        Self {
            id: new_id(),
            memory_type,
            content,
            timestamp: Utc::now(),
            importance,
            context: HashMap::new(),
        }
    }

    pub fn short_term(content: serde_json::Value, importance: f64) -> Self {
        Self::new(MemoryType::ShortTerm, content, importance)
    }

    pub fn long_term(content: serde_json::Value, importance: f64) -> Self {
        Self::new(MemoryType::LongTerm, content, importance)
    }

    /// Attach a context tag.
    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// Whether every `(key, value)` in `context` is present on this memory.
    pub fn matches_context(&self, context: &HashMap<String, serde_json::Value>) -> bool {
        context
            .iter()
            .all(|(k, v)| self.context.get(k).is_some_and(|mine| mine == v))
    }
}

/// Inclusive time window; open ends are unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| ts >= s) && self.end.map_or(true, |e| ts <= e)
    }
}

/// Recall criteria. All set fields must match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryQuery {
    pub memory_type: Option<MemoryType>,
    #[serde(default)]
    pub time_range: TimeRange,
    /// Minimum importance; `0.0` disables the check.
    #[serde(default)]
    pub min_importance: f64,
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
    /// Zero means [`DEFAULT_RECALL_LIMIT`].
    #[serde(default)]
    pub limit: usize,
}

impl MemoryQuery {
    pub fn recent(limit: usize) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }

    pub fn effective_limit(&self) -> usize {
        if self.limit == 0 {
            DEFAULT_RECALL_LIMIT
        } else {
            self.limit
        }
    }

    pub fn matches(&self, memory: &Memory) -> bool {
        self.memory_type.map_or(true, |t| memory.memory_type == t)
            && self.time_range.contains(memory.timestamp)
            && (self.min_importance <= 0.0 || memory.importance >= self.min_importance)
            && memory.matches_context(&self.context)
    }
}

/// Selection for [`crate::MemoryStore::forget`]. An empty `ids` list selects by the
/// remaining criteria only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryFilter {
    #[serde(default)]
    pub ids: Vec<String>,
    pub memory_type: Option<MemoryType>,
    #[serde(default)]
    pub time_range: TimeRange,
    #[serde(default)]
    pub min_importance: f64,
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
}

impl MemoryFilter {
    pub fn by_ids(ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn matches(&self, memory: &Memory) -> bool {
        (self.ids.is_empty() || self.ids.contains(&memory.id))
            && self.memory_type.map_or(true, |t| memory.memory_type == t)
            && self.time_range.contains(memory.timestamp)
            && (self.min_importance <= 0.0 || memory.importance >= self.min_importance)
            && memory.matches_context(&self.context)
    }
}

/// Counts per retention class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub total_items: usize,
    pub short_term: usize,
    pub long_term: usize,
    pub working: usize,
    /// Memories dropped by consolidation since the store was created.
    pub evicted: usize,
    /// Short-term memories promoted to long-term by consolidation.
    pub promoted: usize,
}

/// Store selection for an agent. `store_type` `"default"` or empty selects the
/// in-memory store; `size` zero selects the default capacity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default)]
    pub store_type: String,
    #[serde(default)]
    pub size: usize,
}
