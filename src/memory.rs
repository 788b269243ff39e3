//! Persistent memory of past orchestrator conversations.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::retrieval::query_terms;

pub const MEMORY_FILE_NAME: &str = "interaction_memory.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub content: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

/// JSON-backed store keyed by the md5 of the content, so saving the same
/// conversation twice keeps one entry.
#[derive(Debug)]
pub struct InteractionMemory {
    store: Mutex<HashMap<String, MemoryEntry>>,
    storage_path: PathBuf,
}

impl InteractionMemory {
    pub fn open(data_dir: &Path) -> Result<Self> {
        let storage_path = data_dir.join(MEMORY_FILE_NAME);
        let store = if storage_path.exists() {
            let content = std::fs::read_to_string(&storage_path).with_context(|| {
                format!("failed to read interaction memory '{}'", storage_path.display())
            })?;
            serde_json::from_str(&content).unwrap_or_else(|err| {
                tracing::warn!(path = %storage_path.display(), error = %err, "interaction memory is unreadable; starting empty");
                HashMap::new()
            })
        } else {
            HashMap::new()
        };
        Ok(Self {
            store: Mutex::new(store),
            storage_path,
        })
    }

    pub fn add(&self, content: String, metadata: BTreeMap<String, String>) -> Result<()> {
        let key = format!("{:x}", md5::compute(&content));
        let entry = MemoryEntry {
            content,
            metadata,
            created_at: Utc::now(),
        };
        let mut store = self.store.lock().unwrap_or_else(|e| e.into_inner());
        store.insert(key, entry);
        self.persist(&store)
    }

    /// Entries sharing the most query terms first; ties go to the newest.
    pub fn query(&self, text: &str, top_k: usize) -> Vec<MemoryEntry> {
        let terms = query_terms(text);
        if terms.is_empty() || top_k == 0 {
            return Vec::new();
        }
        let store = self.store.lock().unwrap_or_else(|e| e.into_inner());
        let mut matches = store
            .values()
            .filter_map(|entry| {
                let body = entry.content.to_lowercase();
                let overlap = terms.iter().filter(|t| body.contains(t.as_str())).count();
                (overlap > 0).then(|| (overlap, entry.clone()))
            })
            .collect::<Vec<_>>();
        matches.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.created_at.cmp(&a.1.created_at)));
        matches.into_iter().take(top_k).map(|(_, e)| e).collect()
    }

    pub fn len(&self) -> usize {
        self.store.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) -> Result<()> {
        let mut store = self.store.lock().unwrap_or_else(|e| e.into_inner());
        store.clear();
        self.persist(&store)
    }

    fn persist(&self, store: &HashMap<String, MemoryEntry>) -> Result<()> {
        if let Some(parent) = self.storage_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create memory directory")?;
        }
        let json = serde_json::to_string_pretty(store).context("failed to serialize memory")?;
        std::fs::write(&self.storage_path, json).with_context(|| {
            format!("failed to write interaction memory '{}'", self.storage_path.display())
        })
    }
}
