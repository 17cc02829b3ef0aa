//! Record of work items already processed, persisted between runs

use crate::snapshot::sha256_hex;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub title: String,
    pub processed_at: DateTime<Utc>,
    /// Final item status as reported by the orchestrator
    pub status: String,
}

/// Keyed by SHA-256 of the item's id and link, so a re-published item under
/// a new link is processed again.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ProcessedHistory {
    #[serde(skip)]
    path: Option<PathBuf>,
    entries: BTreeMap<String, HistoryEntry>,
}

pub fn item_key(id: &str, link: &str) -> String {
    sha256_hex(format!("{}|{}", id, link).as_bytes())
}

impl ProcessedHistory {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Loads the history file, or starts empty when it does not exist yet.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut history = match tokio::fs::read_to_string(&path).await {
            Ok(json) => serde_json::from_str::<ProcessedHistory>(&json)
                .with_context(|| format!("Failed to parse history {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ProcessedHistory::default(),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read history {}", path.display()))
            }
        };
        history.path = Some(path);
        Ok(history)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn contains(&self, id: &str, link: &str) -> bool {
        self.entries.contains_key(&item_key(id, link))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn mark(&mut self, id: &str, link: &str, title: &str, status: &str) {
        self.entries.insert(
            item_key(id, link),
            HistoryEntry {
                id: id.to_string(),
                title: title.to_string(),
                processed_at: Utc::now(),
                status: status.to_string(),
            },
        );
    }

    /// Writes to the loaded path; no-op for in-memory histories.
    pub async fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Old file stays intact until the rename
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_string_pretty(self)?)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_history_persists_between_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("processed.json");

        let mut history = ProcessedHistory::load(&path).await.unwrap();
        assert!(history.is_empty());
        history.mark("1234-56-LE24", "https://portal.example/t/1", "Servicio de mantención", "done");
        history.save().await.unwrap();

        let reloaded = ProcessedHistory::load(&path).await.unwrap();
        assert!(reloaded.contains("1234-56-LE24", "https://portal.example/t/1"));
        assert!(!reloaded.contains("1234-56-LE24", "https://portal.example/t/2"));
        assert_eq!(reloaded.len(), 1);
    }

    #[test]
    fn test_item_key_is_sha256() {
        assert_eq!(item_key("a", "b").len(), 64);
        assert_ne!(item_key("a", "b"), item_key("a|b", ""));
    }
}
