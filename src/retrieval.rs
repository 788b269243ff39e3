//! Local repository index: fixed-size overlapping chunks of source files,
//! searched by query-term hits.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ParserConfig;
use crate::repo_id::{RepositoryIdManager, absolute_path};
use crate::tools::matches_wildcard;

pub const INDEX_FILE_NAME: &str = "index.json";
const MAX_FILE_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkLocation {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedChunk {
    pub filename: String,
    pub location: ChunkLocation,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryIndex {
    pub repo_id: String,
    pub repo_path: String,
    pub indexed_at: DateTime<Utc>,
    pub chunks: Vec<IndexedChunk>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub filename: String,
    pub location: ChunkLocation,
    pub text: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStats {
    pub repo_id: String,
    pub data_dir: PathBuf,
    pub files: usize,
    pub chunks: usize,
    pub file_extensions: Vec<String>,
    pub excluded_patterns: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RepositoryIndexer {
    repo_dir: PathBuf,
    repo_id: String,
    data_dir: PathBuf,
    parser: ParserConfig,
    cache: Arc<Mutex<Option<Arc<RepositoryIndex>>>>,
}

impl RepositoryIndexer {
    /// Resolves the repository id (assigning one if new) under `data_root`.
    pub fn new(repo_dir: &Path, data_root: &Path, parser: ParserConfig) -> Result<Self> {
        let repo_dir = absolute_path(repo_dir)?;
        if !repo_dir.is_dir() {
            anyhow::bail!("repository path '{}' is not a directory", repo_dir.display());
        }
        let mut ids = RepositoryIdManager::open(data_root)?;
        let repo_id = ids.get_repo_id(&repo_dir)?;
        let data_dir = ids.data_dir(&repo_id);
        Ok(Self {
            repo_dir,
            repo_id,
            data_dir,
            parser,
            cache: Arc::new(Mutex::new(None)),
        })
    }

    pub fn repo_id(&self) -> &str {
        &self.repo_id
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    pub fn index_path(&self) -> PathBuf {
        self.data_dir.join(INDEX_FILE_NAME)
    }

    pub fn index_repository(&self) -> Result<IndexStats> {
        let files = self.collect_files();
        let mut chunks = Vec::new();
        let mut indexed_files = 0usize;

        for path in &files {
            let content = match std::fs::read_to_string(path) {
                Ok(content) => content,
                Err(err) => {
                    tracing::debug!(path = %path.display(), error = %err, "skipping unreadable file");
                    continue;
                }
            };
            let relative = path
                .strip_prefix(&self.repo_dir)
                .unwrap_or(path)
                .components()
                .map(|c| c.as_os_str().to_string_lossy().to_string())
                .collect::<Vec<_>>()
                .join("/");
            let before = chunks.len();
            chunks.extend(
                split_into_chunks(&content, self.parser.chunk_size, self.parser.chunk_overlap)
                    .into_iter()
                    .map(|(location, text)| IndexedChunk {
                        filename: relative.clone(),
                        location,
                        text,
                    }),
            );
            if chunks.len() > before {
                indexed_files += 1;
            }
        }

        let index = RepositoryIndex {
            repo_id: self.repo_id.clone(),
            repo_path: self.repo_dir.to_string_lossy().to_string(),
            indexed_at: Utc::now(),
            chunks,
        };
        std::fs::create_dir_all(&self.data_dir).with_context(|| {
            format!("failed to create index directory '{}'", self.data_dir.display())
        })?;
        let json = serde_json::to_string(&index).context("failed to serialize repository index")?;
        std::fs::write(self.index_path(), json).with_context(|| {
            format!("failed to write repository index '{}'", self.index_path().display())
        })?;

        let stats = IndexStats {
            repo_id: self.repo_id.clone(),
            data_dir: self.data_dir.clone(),
            files: indexed_files,
            chunks: index.chunks.len(),
            file_extensions: self.parser.file_extensions.clone(),
            excluded_patterns: self.parser.exclude_directories.clone(),
        };
        tracing::info!(
            repo_id = %stats.repo_id,
            files = stats.files,
            chunks = stats.chunks,
            "repository indexed"
        );
        *self.cache.lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(index));
        Ok(stats)
    }

    fn collect_files(&self) -> Vec<PathBuf> {
        let excluded = self.parser.exclude_directories.clone();
        let walker = ignore::WalkBuilder::new(&self.repo_dir)
            .hidden(false)
            .git_ignore(true)
            .require_git(false)
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
                if !is_dir {
                    return true;
                }
                let name = entry.file_name().to_string_lossy();
                !excluded.iter().any(|pattern| matches_wildcard(pattern, &name))
            })
            .build();

        let mut files = walker
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(err) => {
                    tracing::debug!(error = %err, "skipping unreadable path during indexing");
                    None
                }
            })
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter(|entry| {
                let name = entry.file_name().to_string_lossy();
                self.parser
                    .file_extensions
                    .iter()
                    .any(|pattern| matches_wildcard(pattern, &name))
            })
            .filter(|entry| {
                entry
                    .metadata()
                    .map(|m| m.len() <= MAX_FILE_BYTES)
                    .unwrap_or(false)
            })
            .map(|entry| entry.into_path())
            .collect::<Vec<_>>();
        files.sort();
        files
    }

    fn load_index(&self) -> Result<Arc<RepositoryIndex>> {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(index) = cache.as_ref() {
            return Ok(Arc::clone(index));
        }
        let path = self.index_path();
        if !path.exists() {
            anyhow::bail!(
                "repository '{}' has no index yet. Run 'robotsix-agents repo index {}'",
                self.repo_dir.display(),
                self.repo_dir.display()
            );
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read repository index '{}'", path.display()))?;
        let index: RepositoryIndex = serde_json::from_str(&raw)
            .with_context(|| format!("repository index '{}' is corrupt; re-run indexing", path.display()))?;
        let index = Arc::new(index);
        *cache = Some(Arc::clone(&index));
        Ok(index)
    }

    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let index = self.load_index()?;
        Ok(rank_chunks(&index.chunks, query, limit))
    }
}

/// Splits `text` into windows of `size` characters that overlap by `overlap`.
/// Locations are character offsets. Whitespace-only windows are dropped.
pub fn split_into_chunks(text: &str, size: usize, overlap: usize) -> Vec<(ChunkLocation, String)> {
    let size = size.max(1);
    let step = size.saturating_sub(overlap).max(1);
    let bounds = text
        .char_indices()
        .map(|(idx, _)| idx)
        .chain(std::iter::once(text.len()))
        .collect::<Vec<_>>();
    let total_chars = bounds.len() - 1;

    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < total_chars {
        let end = (start + size).min(total_chars);
        let slice = &text[bounds[start]..bounds[end]];
        if !slice.trim().is_empty() {
            chunks.push((ChunkLocation { start, end }, slice.to_string()));
        }
        if end == total_chars {
            break;
        }
        start += step;
    }
    chunks
}

pub fn query_terms(query: &str) -> Vec<String> {
    let terms = query
        .split_whitespace()
        .map(|token| token.trim_matches(|c: char| !c.is_alphanumeric() && c != '_'))
        .map(str::to_lowercase)
        .filter(|token| !token.is_empty())
        .collect::<Vec<String>>();
    let long = terms
        .iter()
        .filter(|t| t.chars().count() > 2)
        .cloned()
        .collect::<Vec<_>>();
    if long.is_empty() { terms } else { long }
}

/// Scores in [0, 1): mostly the share of distinct query terms present,
/// with a saturating bonus for repeated hits.
fn lexical_score(terms: &[String], body: &str) -> (f64, usize) {
    let mut matched = 0usize;
    let mut hits = 0usize;
    for term in terms {
        let count = body.matches(term.as_str()).count();
        if count > 0 {
            matched += 1;
            hits += count;
        }
    }
    if matched == 0 {
        return (0.0, 0);
    }
    let coverage = matched as f64 / terms.len() as f64;
    let density = hits as f64 / (hits as f64 + 4.0);
    (0.8 * coverage + 0.2 * density, hits)
}

#[cfg(feature = "semantic-search")]
fn fuzzy_score(terms: &[String], body: &str) -> f64 {
    let words = body
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| w.len() > 2)
        .collect::<Vec<_>>();
    if terms.is_empty() || words.is_empty() {
        return 0.0;
    }
    let close = terms
        .iter()
        .filter(|term| {
            words
                .iter()
                .any(|word| strsim::jaro_winkler(term, word) >= 0.9)
        })
        .count();
    close as f64 / terms.len() as f64
}

pub fn rank_chunks(chunks: &[IndexedChunk], query: &str, limit: usize) -> Vec<SearchResult> {
    let terms = query_terms(query);
    if terms.is_empty() {
        return Vec::new();
    }

    let mut scored = chunks
        .iter()
        .filter_map(|chunk| {
            let body = chunk.text.to_lowercase();
            let (lexical, _hits) = lexical_score(&terms, &body);

            #[cfg(feature = "semantic-search")]
            let score = 0.7 * lexical + 0.3 * fuzzy_score(&terms, &body);
            #[cfg(not(feature = "semantic-search"))]
            let score = lexical;

            (score > 0.0).then(|| SearchResult {
                filename: chunk.filename.clone(),
                location: chunk.location,
                text: chunk.text.clone(),
                score,
            })
        })
        .collect::<Vec<SearchResult>>();

    scored.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.filename.cmp(&b.filename))
            .then_with(|| a.location.start.cmp(&b.location.start))
    });
    scored.truncate(limit.max(1));
    scored
}
