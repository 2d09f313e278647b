use crate::tool::{ParamType, ParameterSpec, Tool, ToolCategory, ToolMetadata};
use agentflow_core::{AgentflowError, AgentflowResult, ExecutionContext, Params};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;

const DEFAULT_CHUNK_SIZE: usize = 1000;
const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Chunking options. Sizes are measured in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub by_paragraph: bool,
    pub by_sentence: bool,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            by_paragraph: true,
            by_sentence: true,
        }
    }
}

/// Splits text into chunks no longer than `chunk_size` characters.
///
/// In paragraph mode the text is cut at blank lines (and optionally at sentence
/// ends), then pieces are packed greedily into chunks. Consecutive chunks share
/// trailing pieces up to `chunk_overlap` characters. Pieces longer than a chunk
/// fall back to fixed-size windows.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    options: SplitOptions,
    paragraph_break: Regex,
    sentence: Regex,
}

impl TextSplitter {
    pub fn new(options: SplitOptions) -> AgentflowResult<Self> {
        if options.chunk_size == 0 {
            return Err(AgentflowError::InvalidParameter(
                "chunk_size must be positive".to_string(),
            ));
        }
        if options.chunk_overlap >= options.chunk_size {
            return Err(AgentflowError::InvalidParameter(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                options.chunk_overlap, options.chunk_size
            )));
        }
        let paragraph_break = Regex::new(r"\n\s*\n")
            .map_err(|e| AgentflowError::InvalidParameter(e.to_string()))?;
        let sentence = Regex::new(r"[^.!?]+[.!?]*")
            .map_err(|e| AgentflowError::InvalidParameter(e.to_string()))?;
        Ok(Self {
            options,
            paragraph_break,
            sentence,
        })
    }

    pub fn options(&self) -> SplitOptions {
        self.options
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        let text = text.replace("\r\n", "\n").replace('\r', "\n");
        if text.trim().is_empty() {
            return Vec::new();
        }
        if !self.options.by_paragraph {
            return self.split_by_size(&text);
        }

        let separator = if self.options.by_sentence { " " } else { "\n\n" };
        let pieces: Vec<String> = self
            .pieces(&text)
            .into_iter()
            .flat_map(|p| {
                if p.chars().count() > self.options.chunk_size {
                    self.split_by_size(&p)
                } else {
                    vec![p]
                }
            })
            .collect();
        self.merge(pieces, separator)
    }

    fn pieces(&self, text: &str) -> Vec<String> {
        let mut out = Vec::new();
        for paragraph in self.paragraph_break.split(text) {
            let paragraph = paragraph.trim();
            if paragraph.is_empty() {
                continue;
            }
            if self.options.by_sentence {
                out.extend(
                    self.sentence
                        .find_iter(paragraph)
                        .map(|m| m.as_str().trim().to_string())
                        .filter(|s| !s.is_empty()),
                );
            } else {
                out.push(paragraph.to_string());
            }
        }
        out
    }

    fn merge(&self, pieces: Vec<String>, separator: &str) -> Vec<String> {
        let sep_len = separator.chars().count();
        let mut chunks = Vec::new();
        let mut current: Vec<String> = Vec::new();
        let mut current_len = 0usize;

        for piece in pieces {
            let piece_len = piece.chars().count();
            let added = if current.is_empty() { piece_len } else { piece_len + sep_len };

            if current_len + added > self.options.chunk_size && !current.is_empty() {
                chunks.push(current.join(separator));

                // Keep trailing pieces as overlap while they fit.
                let mut carried: Vec<String> = Vec::new();
                let mut carried_len = 0usize;
                for prev in current.iter().rev() {
                    let len = prev.chars().count() + if carried.is_empty() { 0 } else { sep_len };
                    if carried_len + len > self.options.chunk_overlap
                        || carried_len + len + sep_len + piece_len > self.options.chunk_size
                    {
                        break;
                    }
                    carried_len += len;
                    carried.push(prev.clone());
                }
                carried.reverse();
                current = carried;
                current_len = carried_len;
            }

            if !current.is_empty() {
                current_len += sep_len;
            }
            current_len += piece_len;
            current.push(piece);
        }

        if !current.is_empty() {
            chunks.push(current.join(separator));
        }
        chunks
    }

    fn split_by_size(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let step = self.options.chunk_size - self.options.chunk_overlap;
        let mut chunks = Vec::new();
        let mut start = 0;
        while start < chars.len() {
            let end = (start + self.options.chunk_size).min(chars.len());
            chunks.push(chars[start..end].iter().collect());
            if end == chars.len() {
                break;
            }
            start += step;
        }
        chunks
    }
}

/// Tool wrapper around [`TextSplitter`]; options come from the call parameters.
pub struct TextSplitterTool {
    metadata: ToolMetadata,
}

impl TextSplitterTool {
    pub fn new() -> Self {
        Self {
            metadata: ToolMetadata {
                id: "text_splitter".to_string(),
                name: "Text Splitter".to_string(),
                description: "Split text into overlapping chunks by paragraph and sentence"
                    .to_string(),
                version: "1.0.0".to_string(),
                categories: vec![ToolCategory::Analysis],
                tags: vec!["text".to_string(), "chunking".to_string()],
                parameters: vec![
                    ParameterSpec::required("text", ParamType::String, "Text to split"),
                    ParameterSpec::optional(
                        "chunk_size",
                        ParamType::Integer,
                        "Maximum characters per chunk",
                        json!(DEFAULT_CHUNK_SIZE),
                    ),
                    ParameterSpec::optional(
                        "chunk_overlap",
                        ParamType::Integer,
                        "Characters shared between consecutive chunks",
                        json!(DEFAULT_CHUNK_OVERLAP),
                    ),
                    ParameterSpec::optional(
                        "by_paragraph",
                        ParamType::Boolean,
                        "Cut at blank lines before packing",
                        json!(true),
                    ),
                    ParameterSpec::optional(
                        "by_sentence",
                        ParamType::Boolean,
                        "Cut paragraphs at sentence ends",
                        json!(true),
                    ),
                ],
            },
        }
    }

    fn options_from(params: &Params) -> SplitOptions {
        let defaults = SplitOptions::default();
        let size = |name: &str, fallback: usize| {
            params
                .get(name)
                .and_then(|v| v.as_u64())
                .map(|v| v as usize)
                .unwrap_or(fallback)
        };
        let flag = |name: &str, fallback: bool| {
            params.get(name).and_then(|v| v.as_bool()).unwrap_or(fallback)
        };
        SplitOptions {
            chunk_size: size("chunk_size", defaults.chunk_size),
            chunk_overlap: size("chunk_overlap", defaults.chunk_overlap),
            by_paragraph: flag("by_paragraph", defaults.by_paragraph),
            by_sentence: flag("by_sentence", defaults.by_sentence),
        }
    }
}

impl Default for TextSplitterTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for TextSplitterTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    async fn execute(&self, ctx: &ExecutionContext, params: Params) -> AgentflowResult<serde_json::Value> {
        ctx.check()?;
        let text = params
            .get("text")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AgentflowError::MissingParameter("text".to_string()))?;
        let splitter = TextSplitter::new(Self::options_from(&params))?;
        let chunks = splitter.split(text);
        Ok(json!({
            "num_chunks": chunks.len(),
            "chunks": chunks,
        }))
    }
}
