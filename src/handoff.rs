//! Hand-off of a processed work item to the analysis collaborator
//!
//! A full hand-off carries the exported artifact; a degraded one carries only
//! the item's title and link so lower-confidence scoring can still run.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

/// One unit of batch work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub title: String,
    pub link: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Handoff {
    Full { artifact: PathBuf },
    Degraded { title: String, link: String },
}

impl Handoff {
    pub fn degraded_from(item: &WorkItem) -> Self {
        Handoff::Degraded {
            title: item.title.clone(),
            link: item.link.clone(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Handoff::Degraded { .. })
    }
}

#[async_trait]
pub trait AnalysisSink: Send + Sync {
    async fn deliver(&self, item: &WorkItem, handoff: &Handoff) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct JsonlRecord<'a> {
    timestamp: DateTime<Utc>,
    item: &'a WorkItem,
    #[serde(flatten)]
    handoff: &'a Handoff,
}

/// Appends one JSON line per hand-off.
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl AnalysisSink for JsonlSink {
    async fn deliver(&self, item: &WorkItem, handoff: &Handoff) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut line = serde_json::to_string(&JsonlRecord {
            timestamp: Utc::now(),
            item,
            handoff,
        })?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Loads a JSON array of work items.
pub async fn load_work_items(path: &std::path::Path) -> Result<Vec<WorkItem>> {
    let json = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read work items {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("Failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_jsonl_sink_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlSink::new(dir.path().join("handoff.jsonl"));
        let item = WorkItem {
            id: "1".into(),
            title: "Compra de repuestos".into(),
            link: "https://portal.example/t/1".into(),
        };

        sink.deliver(&item, &Handoff::degraded_from(&item)).await.unwrap();
        sink.deliver(
            &item,
            &Handoff::Full {
                artifact: dir.path().join("export.xlsx"),
            },
        )
        .await
        .unwrap();

        let contents = tokio::fs::read_to_string(dir.path().join("handoff.jsonl"))
            .await
            .unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["mode"], "degraded");
        assert_eq!(lines[0]["title"], "Compra de repuestos");
        assert_eq!(lines[1]["mode"], "full");
        assert_eq!(lines[1]["item"]["id"], "1");
    }
}
