//! Session-scoped diagnostic capture
//!
//! Screenshots are numbered with a per-session counter and written as
//! `{counter:04}_{label}.png`. Every capture and notable event is appended to
//! a trail that is flushed to `trail.json` when the session closes. Nothing
//! here ever fails a workflow step: capture errors are logged and swallowed.

use crate::browser::driver::PageDriver;
use crate::snapshot::{sha256_hex, PageSnapshot};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// One trail record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiagnosticEntry {
    Screenshot {
        index: u64,
        label: String,
        path: PathBuf,
        size_bytes: usize,
        sha256: String,
        timestamp: DateTime<Utc>,
    },
    Snapshot {
        name: String,
        url: String,
        fingerprint: String,
        controls: usize,
        timestamp: DateTime<Utc>,
    },
    LearnedLocator {
        target: String,
        locator: String,
        timestamp: DateTime<Utc>,
    },
    StepOutcome {
        item: String,
        step: String,
        outcome: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
        timestamp: DateTime<Utc>,
    },
}

pub struct Diagnostics {
    dir: PathBuf,
    counter: AtomicU64,
    trail: Mutex<Vec<DiagnosticEntry>>,
}

fn sanitize_label(label: &str) -> String {
    label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

impl Diagnostics {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            counter: AtomicU64::new(0),
            trail: Mutex::new(Vec::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of screenshots attempted so far
    pub fn screenshot_count(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }

    pub fn push(&self, entry: DiagnosticEntry) {
        self.trail
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(entry);
    }

    pub fn entries(&self) -> Vec<DiagnosticEntry> {
        self.trail
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Captures a screenshot; returns its path, or None when capture failed.
    pub async fn screenshot<D: PageDriver + ?Sized>(
        &self,
        driver: &D,
        label: &str,
    ) -> Option<PathBuf> {
        let index = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let path = self
            .dir
            .join(format!("{:04}_{}.png", index, sanitize_label(label)));

        match self.write_screenshot(driver, &path).await {
            Ok(bytes) => {
                log::debug!("📸 {}", path.display());
                self.push(DiagnosticEntry::Screenshot {
                    index,
                    label: label.to_string(),
                    path: path.clone(),
                    size_bytes: bytes.len(),
                    sha256: sha256_hex(&bytes),
                    timestamp: Utc::now(),
                });
                Some(path)
            }
            Err(e) => {
                log::warn!("⚠️  Screenshot '{}' failed: {:#}", label, e);
                None
            }
        }
    }

    async fn write_screenshot<D: PageDriver + ?Sized>(
        &self,
        driver: &D,
        path: &Path,
    ) -> Result<Vec<u8>> {
        let bytes = driver.screenshot().await?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;
        tokio::fs::write(path, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(bytes)
    }

    pub fn record_snapshot(&self, snapshot: &PageSnapshot) {
        self.push(DiagnosticEntry::Snapshot {
            name: snapshot.name.clone(),
            url: snapshot.url.clone(),
            fingerprint: snapshot.fingerprint.clone(),
            controls: snapshot.controls.len(),
            timestamp: Utc::now(),
        });
    }

    pub fn record_learned(&self, target: &str, locator: &str) {
        self.push(DiagnosticEntry::LearnedLocator {
            target: target.to_string(),
            locator: locator.to_string(),
            timestamp: Utc::now(),
        });
    }

    pub fn record_step(&self, item: &str, step: &str, outcome: &str, detail: Option<String>) {
        self.push(DiagnosticEntry::StepOutcome {
            item: item.to_string(),
            step: step.to_string(),
            outcome: outcome.to_string(),
            detail,
            timestamp: Utc::now(),
        });
    }

    /// Writes the trail to `trail.json` in the diagnostics directory.
    pub async fn flush(&self) -> Result<PathBuf> {
        let entries = self.entries();
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;

        let path = self.dir.join("trail.json");
        let json = serde_json::to_string_pretty(&entries)?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        log::info!("🧾 Diagnostics trail: {} entries -> {}", entries.len(), path.display());
        Ok(path)
    }
}
