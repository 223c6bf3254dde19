//! In-process memory backend
//!
//! Keeps remembered text per caller namespace and ranks it against search
//! queries by term overlap. Nothing is persisted.

use crate::error::{MnemoError, Result};
use crate::mcp::tools::{RememberArgs, SearchArgs, ToolBackend, ToolCall, DEFAULT_SEARCH_LIMIT};
use crate::types::{Namespace, ToolResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Default ceiling on search results
pub const DEFAULT_SEARCH_LIMIT_MAX: usize = 50;

/// Unique identifier for memories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryId(pub Uuid);

impl MemoryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MemoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MemoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One remembered item
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryRecord {
    pub id: MemoryId,
    pub content: String,
    pub tags: Vec<String>,
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchHit<'a> {
    memory_id: MemoryId,
    content: &'a str,
    tags: &'a [String],
    score: f32,
}

/// Memory backend held entirely in process memory
pub struct InMemoryBackend {
    memories: RwLock<HashMap<Namespace, Vec<MemoryRecord>>>,
    search_limit_max: usize,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::with_search_limit(DEFAULT_SEARCH_LIMIT_MAX)
    }

    /// Backend whose searches return at most `search_limit_max` hits
    pub fn with_search_limit(search_limit_max: usize) -> Self {
        Self {
            memories: RwLock::new(HashMap::new()),
            search_limit_max: search_limit_max.max(1),
        }
    }

    /// Number of memories stored under `namespace`
    pub async fn count(&self, namespace: &Namespace) -> usize {
        self.memories
            .read()
            .await
            .get(namespace)
            .map_or(0, |records| records.len())
    }

    async fn remember(&self, args: RememberArgs, namespace: &Namespace) -> Result<ToolResult> {
        let content = args.content.trim();
        if content.is_empty() {
            return Err(MnemoError::Validation("content must not be empty".to_string()));
        }

        let record = MemoryRecord {
            id: MemoryId::new(),
            content: content.to_string(),
            tags: args
                .tags
                .into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
            metadata: args.metadata,
            created_at: Utc::now(),
        };
        let summary = json!({
            "memoryId": record.id,
            "tags": record.tags,
            "createdAt": record.created_at,
        });

        debug!("Storing memory {} in {}", record.id, namespace);
        self.memories
            .write()
            .await
            .entry(namespace.clone())
            .or_default()
            .push(record);

        Ok(ToolResult::text(serde_json::to_string_pretty(&summary)?))
    }

    async fn search(&self, args: SearchArgs, namespace: &Namespace) -> Result<ToolResult> {
        let terms = terms(&args.query);
        if terms.is_empty() {
            return Err(MnemoError::Validation("query must not be empty".to_string()));
        }

        let requested = args.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
        if requested == 0 {
            return Err(MnemoError::Validation("limit must be at least 1".to_string()));
        }
        let limit = requested.min(self.search_limit_max);
        if limit < requested {
            debug!("Capping search limit {} to {}", requested, limit);
        }

        let memories = self.memories.read().await;
        let records = memories.get(namespace).map(Vec::as_slice).unwrap_or(&[]);

        let mut hits: Vec<SearchHit> = records
            .iter()
            .filter_map(|record| {
                let score = score(&terms, record);
                (score > 0.0).then(|| SearchHit {
                    memory_id: record.id,
                    content: &record.content,
                    tags: &record.tags,
                    score,
                })
            })
            .collect();

        // Best score first; ties go to the most recent memory.
        hits.reverse();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);

        let body = json!({
            "query": args.query,
            "count": hits.len(),
            "results": hits,
        });
        Ok(ToolResult::text(serde_json::to_string_pretty(&body)?))
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolBackend for InMemoryBackend {
    async fn invoke(&self, call: ToolCall, namespace: &Namespace) -> Result<ToolResult> {
        match call {
            ToolCall::Remember(args) => self.remember(args, namespace).await,
            ToolCall::Search(args) => self.search(args, namespace).await,
        }
    }
}

/// Lowercased alphanumeric terms of `text`, deduplicated
fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Fraction of query terms found in the memory's content or tags
fn score(query: &HashSet<String>, record: &MemoryRecord) -> f32 {
    let mut haystack = terms(&record.content);
    for tag in &record.tags {
        haystack.extend(terms(tag));
    }
    let matched = query.iter().filter(|t| haystack.contains(*t)).count();
    matched as f32 / query.len() as f32
}
