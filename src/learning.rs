//! Learning artifacts: bracketed before/after captures that grow locator sets
//!
//! Guided learning pauses between the two captures until an external resume
//! signal arrives (a human clicking the control, or a test harness). Automatic
//! learning brackets a resolver call instead. Either way the diff and the
//! suggested locator are persisted as JSON for [`mine_locators`].

use crate::browser::driver::PageDriver;
use crate::control::{Action, InteractionResult};
use crate::diagnostics::Diagnostics;
use crate::diff::{diff, DiffAnalysis};
use crate::executor::InteractionExecutor;
use crate::resolver::{LocatorResolver, ResolveContext};
use crate::snapshot::{capture_snapshot, PageSnapshot, SnapshotOptions};
use crate::targets::TargetSpec;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningArtifact {
    pub timestamp: DateTime<Utc>,
    pub step_name: String,
    pub url: String,
    pub snapshot_before: PageSnapshot,
    pub snapshot_after: PageSnapshot,
    pub diff_analysis: DiffAnalysis,

    /// Present when the action between the captures was a resolver call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<InteractionResult>,
}

impl LearningArtifact {
    /// Locators this artifact contributes, best first.
    pub fn learned_locators(&self) -> Vec<String> {
        let mut locators = Vec::new();
        if let Some(control) = self
            .resolution
            .as_ref()
            .filter(|r| r.success)
            .and_then(|r| r.control.as_ref())
        {
            locators.push(control.suggested_locator());
        }
        if let Some(locator) = &self.diff_analysis.suggested_locator {
            if !locators.contains(locator) {
                locators.push(locator.clone());
            }
        }
        locators
    }
}

/// Writes and reads learning artifacts in one directory.
#[derive(Debug, Clone)]
pub struct LearningRecorder {
    dir: PathBuf,
}

impl LearningRecorder {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn record(&self, artifact: &LearningArtifact) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;

        let file_name = format!(
            "{}_{}.json",
            artifact.step_name,
            artifact.timestamp.format("%Y%m%d_%H%M%S_%3f")
        );
        let path = self.dir.join(file_name);
        let json = serde_json::to_string_pretty(artifact)?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        log::info!("🧠 Learning artifact saved: {}", path.display());
        Ok(path)
    }

    /// Loads every artifact in the directory, oldest first. Unreadable files
    /// are skipped with a warning.
    pub async fn load_all(&self) -> Result<Vec<LearningArtifact>> {
        let mut artifacts = Vec::new();
        let mut read_dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(artifacts),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", self.dir.display()))
            }
        };

        while let Some(entry) = read_dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = tokio::fs::read_to_string(&path)
                .await
                .map_err(anyhow::Error::from)
                .and_then(|s| serde_json::from_str::<LearningArtifact>(&s).map_err(Into::into));
            match parsed {
                Ok(artifact) => artifacts.push(artifact),
                Err(e) => log::warn!("⚠️  Skipping {}: {}", path.display(), e),
            }
        }

        artifacts.sort_by_key(|a| a.timestamp);
        Ok(artifacts)
    }
}

/// Groups learned locators by step name, oldest first, without duplicates.
pub fn mine_locators(artifacts: &[LearningArtifact]) -> BTreeMap<String, Vec<String>> {
    let mut mined: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for artifact in artifacts {
        let entry = mined.entry(artifact.step_name.clone()).or_default();
        for locator in artifact.learned_locators() {
            if !entry.contains(&locator) {
                entry.push(locator);
            }
        }
    }
    mined.retain(|_, locators| !locators.is_empty());
    mined
}

/// Bracketed captures around manual or resolver-driven actions.
pub struct GuidedLearning<'a> {
    pub driver: &'a dyn PageDriver,
    pub diagnostics: &'a Diagnostics,
    pub recorder: &'a LearningRecorder,
    pub options: SnapshotOptions,
}

impl<'a> GuidedLearning<'a> {
    pub fn new(
        driver: &'a dyn PageDriver,
        diagnostics: &'a Diagnostics,
        recorder: &'a LearningRecorder,
    ) -> Self {
        Self {
            driver,
            diagnostics,
            recorder,
            options: SnapshotOptions::default(),
        }
    }

    async fn before(&self, step_name: &str) -> Result<PageSnapshot> {
        let snapshot =
            capture_snapshot(self.driver, &format!("{}_before", step_name), &self.options).await?;
        self.diagnostics.record_snapshot(&snapshot);
        self.diagnostics
            .screenshot(self.driver, &format!("learn_{}_before", step_name))
            .await;
        Ok(snapshot)
    }

    async fn finish(
        &self,
        step_name: &str,
        before: PageSnapshot,
        resolution: Option<InteractionResult>,
    ) -> Result<LearningArtifact> {
        let after =
            capture_snapshot(self.driver, &format!("{}_after", step_name), &self.options).await?;
        self.diagnostics.record_snapshot(&after);
        self.diagnostics
            .screenshot(self.driver, &format!("learn_{}_after", step_name))
            .await;

        let analysis = diff(&before, &after);
        if analysis.is_unattributed_change() {
            log::info!("🧠 '{}': page changed but no new control explains it", step_name);
        }

        let artifact = LearningArtifact {
            timestamp: Utc::now(),
            step_name: step_name.to_string(),
            url: after.url.clone(),
            snapshot_before: before,
            snapshot_after: after,
            diff_analysis: analysis,
            resolution,
        };
        for locator in artifact.learned_locators() {
            self.diagnostics.record_learned(step_name, &locator);
        }
        self.recorder.record(&artifact).await?;
        Ok(artifact)
    }

    /// Captures, waits for a resume signal, captures again, then diffs and persists.
    pub async fn capture_step(
        &self,
        step_name: &str,
        resume: &mut mpsc::Receiver<()>,
    ) -> Result<LearningArtifact> {
        let before = self.before(step_name).await?;

        log::info!("⏸️  '{}': perform the action, then resume", step_name);
        resume
            .recv()
            .await
            .ok_or_else(|| anyhow!("resume signal closed while learning '{}'", step_name))?;

        self.finish(step_name, before, None).await
    }

    /// Brackets a resolver call with captures.
    pub async fn observe_resolution(
        &self,
        resolver: &LocatorResolver,
        executor: &InteractionExecutor,
        target: &TargetSpec,
        action: &Action,
    ) -> Result<LearningArtifact> {
        let before = self.before(&target.name).await?;

        let ctx = ResolveContext {
            driver: self.driver,
            diagnostics: self.diagnostics,
            executor,
        };
        let result = resolver.resolve(&ctx, target, action).await;

        self.finish(&target.name, before, Some(result)).await
    }
}

/// Runs a learning session until it ends or `cancel` fires.
///
/// The driver is shut down and the diagnostics trail flushed on every exit
/// path, including a failed first navigation inside `work`.
pub async fn guarded<T>(
    driver: &dyn PageDriver,
    diagnostics: &Diagnostics,
    work: impl Future<Output = Result<T>>,
    cancel: impl Future<Output = ()>,
) -> Result<T> {
    let outcome = tokio::select! {
        outcome = work => outcome,
        _ = cancel => {
            log::warn!("🛑 Learning interrupted");
            Err(anyhow!("learning cancelled"))
        }
    };

    if let Err(e) = driver.shutdown().await {
        log::warn!("⚠️  Driver shutdown failed: {}", e);
    }
    let flushed = diagnostics.flush().await;
    let value = outcome?;
    flushed?;
    Ok(value)
}
