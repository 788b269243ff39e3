use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

pub const MAPPING_FILE_NAME: &str = "repo_mapping.json";
const ID_HEX_LEN: usize = 12;

/// Stable short identifiers for repository paths, persisted as
/// `{ "<id>": "<absolute path>" }` in `repo_mapping.json`.
#[derive(Debug)]
pub struct RepositoryIdManager {
    data_dir: PathBuf,
    mapping_path: PathBuf,
    mapping: BTreeMap<String, String>,
}

impl RepositoryIdManager {
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create data directory '{}'", data_dir.display()))?;
        let mapping_path = data_dir.join(MAPPING_FILE_NAME);
        let mapping = load_mapping(&mapping_path);
        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            mapping_path,
            mapping,
        })
    }

    /// Returns the id for `path`, assigning and persisting a new one if needed.
    pub fn get_repo_id(&mut self, path: &Path) -> Result<String> {
        let absolute = absolute_path(path)?;
        let key = absolute.to_string_lossy().to_string();

        if let Some(existing) = self
            .mapping
            .iter()
            .find(|(_, mapped)| **mapped == key)
            .map(|(id, _)| id.clone())
        {
            return Ok(existing);
        }

        let base = short_hash(&key);
        let mut candidate = base.clone();
        let mut counter = 1;
        while self.mapping.contains_key(&candidate) {
            candidate = format!("{base}_{counter}");
            counter += 1;
        }

        self.mapping.insert(candidate.clone(), key.clone());
        self.save()?;
        let repo_dir = self.data_dir(&candidate);
        std::fs::create_dir_all(&repo_dir).with_context(|| {
            format!("failed to create repository data directory '{}'", repo_dir.display())
        })?;
        tracing::info!(repo_id = %candidate, path = %key, "assigned repository id");
        Ok(candidate)
    }

    pub fn data_dir(&self, repo_id: &str) -> PathBuf {
        self.data_dir.join(repo_id)
    }

    pub fn lookup(&self, repo_id: &str) -> Option<&str> {
        self.mapping.get(repo_id).map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.mapping.iter().map(|(id, path)| (id.as_str(), path.as_str()))
    }

    fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.mapping)
            .context("failed to serialize repository mapping")?;
        std::fs::write(&self.mapping_path, json).with_context(|| {
            format!(
                "failed to write repository mapping '{}'",
                self.mapping_path.display()
            )
        })
    }
}

fn load_mapping(path: &Path) -> BTreeMap<String, String> {
    if !path.exists() {
        return BTreeMap::new();
    }
    let parsed = std::fs::read_to_string(path)
        .map_err(anyhow::Error::from)
        .and_then(|raw| serde_json::from_str(&raw).map_err(anyhow::Error::from));
    match parsed {
        Ok(mapping) => mapping,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "ignoring unreadable repository mapping");
            BTreeMap::new()
        }
    }
}

fn short_hash(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    let hex = digest.iter().map(|b| format!("{b:02x}")).collect::<String>();
    hex[..ID_HEX_LEN].to_string()
}

/// Canonical path when it exists, otherwise the lexically absolute one.
pub fn absolute_path(path: &Path) -> Result<PathBuf> {
    match std::fs::canonicalize(path) {
        Ok(canonical) => Ok(canonical),
        Err(_) => std::path::absolute(path)
            .with_context(|| format!("failed to resolve absolute path for '{}'", path.display())),
    }
}
