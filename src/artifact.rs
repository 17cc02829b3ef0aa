//! Waiting for an exported file to land in the artifact directory
//!
//! A watch records the directory contents (path and modification time) when
//! it starts; afterwards only files that are new, or were rewritten since,
//! can qualify. A qualifying file is larger than the policy's minimum and
//! does not carry an in-progress download extension.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

/// Extensions browsers use while a download is still being written
pub const IN_PROGRESS_EXTENSIONS: [&str; 5] = ["part", "tmp", "crdownload", "download", "partial"];

/// Timing and size thresholds for one wait.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitPolicy {
    #[serde(with = "crate::control::duration_millis")]
    pub timeout: Duration,

    #[serde(with = "crate::control::duration_millis")]
    pub poll_interval: Duration,

    /// Extra wait after a file qualifies, for writers that are still flushing
    #[serde(with = "crate::control::duration_millis")]
    pub grace: Duration,

    /// Files must be strictly larger than this
    #[serde(default = "default_min_size")]
    pub min_size_bytes: u64,
}

fn default_min_size() -> u64 {
    1000
}

impl WaitPolicy {
    /// Long timeout, coarse polling: favours completeness on slow exports
    pub fn conservative() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(3),
            grace: Duration::from_secs(2),
            min_size_bytes: default_min_size(),
        }
    }

    /// Short timeout, fine polling: favours batch throughput
    pub fn aggressive() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(500),
            grace: Duration::from_millis(500),
            min_size_bytes: default_min_size(),
        }
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self::conservative()
    }
}

/// Named policy or explicit numbers, as written in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PolicyChoice {
    Named(PolicyName),
    Custom(WaitPolicy),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyName {
    Conservative,
    Aggressive,
}

impl PolicyChoice {
    pub fn policy(&self) -> WaitPolicy {
        match self {
            PolicyChoice::Named(PolicyName::Conservative) => WaitPolicy::conservative(),
            PolicyChoice::Named(PolicyName::Aggressive) => WaitPolicy::aggressive(),
            PolicyChoice::Custom(policy) => policy.clone(),
        }
    }
}

impl Default for PolicyChoice {
    fn default() -> Self {
        PolicyChoice::Named(PolicyName::Conservative)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ArtifactWaitResult {
    Found {
        path: PathBuf,
        size_bytes: u64,
        /// Time from watch start to detection
        #[serde(with = "crate::control::duration_millis")]
        elapsed: Duration,
        polls: u32,
    },
    TimedOut {
        #[serde(with = "crate::control::duration_millis")]
        elapsed: Duration,
        polls: u32,
    },
}

impl ArtifactWaitResult {
    pub fn path(&self) -> Option<&Path> {
        match self {
            ArtifactWaitResult::Found { path, .. } => Some(path),
            ArtifactWaitResult::TimedOut { .. } => None,
        }
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            ArtifactWaitResult::Found { elapsed, .. } | ArtifactWaitResult::TimedOut { elapsed, .. } => {
                *elapsed
            }
        }
    }

    pub fn polls(&self) -> u32 {
        match self {
            ArtifactWaitResult::Found { polls, .. } | ArtifactWaitResult::TimedOut { polls, .. } => {
                *polls
            }
        }
    }
}

pub fn is_in_progress(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            IN_PROGRESS_EXTENSIONS
                .iter()
                .any(|marker| e.eq_ignore_ascii_case(marker))
        })
        .unwrap_or(false)
}

#[derive(Debug)]
struct Entry {
    path: PathBuf,
    size: u64,
    modified: Option<SystemTime>,
}

async fn list_files(dir: &Path) -> Vec<Entry> {
    let mut entries = Vec::new();
    let Ok(mut read_dir) = tokio::fs::read_dir(dir).await else {
        return entries;
    };
    while let Ok(Some(entry)) = read_dir.next_entry().await {
        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        if metadata.is_file() {
            entries.push(Entry {
                path: entry.path(),
                size: metadata.len(),
                modified: metadata.modified().ok(),
            });
        }
    }
    entries
}

/// A started wait on one directory.
pub struct ArtifactWatch {
    dir: PathBuf,
    policy: WaitPolicy,
    baseline: HashMap<PathBuf, Option<SystemTime>>,
    started: Instant,
}

impl ArtifactWatch {
    /// Records the current directory contents. Start the watch before
    /// triggering the export so a fast download is not mistaken for an old file.
    pub async fn start(dir: impl Into<PathBuf>, policy: WaitPolicy) -> Self {
        let dir = dir.into();
        let baseline = list_files(&dir)
            .await
            .into_iter()
            .map(|e| (e.path, e.modified))
            .collect();
        Self {
            dir,
            policy,
            baseline,
            started: Instant::now(),
        }
    }

    pub fn policy(&self) -> &WaitPolicy {
        &self.policy
    }

    fn qualifies(&self, entry: &Entry) -> bool {
        let is_new = match self.baseline.get(&entry.path) {
            None => true,
            Some(before) => *before != entry.modified,
        };
        is_new && !is_in_progress(&entry.path) && entry.size > self.policy.min_size_bytes
    }

    /// Polls until a qualifying file appears or the policy timeout elapses.
    /// Never returns a timeout before the full timeout has passed.
    pub async fn wait(self) -> ArtifactWaitResult {
        let mut polls = 0u32;
        let mut last_progress_log = Duration::ZERO;

        loop {
            let elapsed = self.started.elapsed();
            if elapsed >= self.policy.timeout {
                log::warn!(
                    "⏱️  No artifact in {} after {:.1}s ({} polls)",
                    self.dir.display(),
                    elapsed.as_secs_f64(),
                    polls
                );
                return ArtifactWaitResult::TimedOut { elapsed, polls };
            }

            let remaining = self.policy.timeout - elapsed;
            tokio::time::sleep(self.policy.poll_interval.min(remaining)).await;
            polls += 1;

            let mut candidates: Vec<Entry> = list_files(&self.dir)
                .await
                .into_iter()
                .filter(|e| self.qualifies(e))
                .collect();
            candidates.sort_by(|a, b| b.modified.cmp(&a.modified));

            if let Some(found) = candidates.into_iter().next() {
                let elapsed = self.started.elapsed();
                log::info!(
                    "📦 Artifact {} ({} bytes) after {:.1}s",
                    found.path.display(),
                    found.size,
                    elapsed.as_secs_f64()
                );
                tokio::time::sleep(self.policy.grace).await;
                return ArtifactWaitResult::Found {
                    path: found.path,
                    size_bytes: found.size,
                    elapsed,
                    polls,
                };
            }

            let elapsed = self.started.elapsed();
            if elapsed - last_progress_log >= Duration::from_secs(15) {
                last_progress_log = elapsed;
                log::info!("⏳ Waiting for artifact... {}s", elapsed.as_secs());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_policy(timeout_ms: u64, poll_ms: u64) -> WaitPolicy {
        WaitPolicy {
            timeout: Duration::from_millis(timeout_ms),
            poll_interval: Duration::from_millis(poll_ms),
            grace: Duration::from_millis(10),
            min_size_bytes: 1000,
        }
    }

    #[test]
    fn test_in_progress_extensions() {
        assert!(is_in_progress(Path::new("/tmp/export.xlsx.crdownload")));
        assert!(is_in_progress(Path::new("/tmp/export.PART")));
        assert!(is_in_progress(Path::new("/tmp/export.tmp")));
        assert!(!is_in_progress(Path::new("/tmp/export.xlsx")));
        assert!(!is_in_progress(Path::new("/tmp/export")));
    }

    #[test]
    fn test_policy_choice_from_config() {
        let named: PolicyChoice = serde_json::from_str("\"aggressive\"").unwrap();
        assert_eq!(named.policy(), WaitPolicy::aggressive());

        let custom: PolicyChoice = serde_json::from_str(
            r#"{"timeout": 10000, "poll_interval": 500, "grace": 100}"#,
        )
        .unwrap();
        let policy = custom.policy();
        assert_eq!(policy.timeout, Duration::from_secs(10));
        assert_eq!(policy.min_size_bytes, 1000);
    }

    #[tokio::test]
    async fn test_detects_new_file_within_one_poll() {
        let dir = tempfile::tempdir().unwrap();
        let watch = ArtifactWatch::start(dir.path(), quick_policy(3000, 50)).await;

        let path = dir.path().join("licitaciones.xlsx");
        let writer = tokio::spawn({
            let path = path.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(300)).await;
                tokio::fs::write(&path, vec![0u8; 4096]).await.unwrap();
            }
        });

        let result = watch.wait().await;
        writer.await.unwrap();

        assert_eq!(result.path(), Some(path.as_path()));
        let elapsed = result.elapsed();
        assert!(elapsed >= Duration::from_millis(300), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(300 + 50 + 200), "{:?}", elapsed);
    }

    #[tokio::test]
    async fn test_times_out_no_earlier_than_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let started = Instant::now();
        let result = ArtifactWatch::start(dir.path(), quick_policy(400, 150))
            .await
            .wait()
            .await;

        let wall = started.elapsed();
        assert!(matches!(result, ArtifactWaitResult::TimedOut { .. }));
        assert!(result.elapsed() >= Duration::from_millis(400));
        assert!(wall < Duration::from_millis(400 + 150 + 200), "{:?}", wall);
        assert!(result.polls() >= 3);
    }

    #[tokio::test]
    async fn test_rejects_in_progress_until_renamed() {
        let dir = tempfile::tempdir().unwrap();
        let partial = dir.path().join("export.xlsx.crdownload");
        let watch = ArtifactWatch::start(dir.path(), quick_policy(2000, 50)).await;

        tokio::fs::write(&partial, vec![1u8; 8192]).await.unwrap();
        let final_path = dir.path().join("export.xlsx");
        let renamer = tokio::spawn({
            let partial = partial.clone();
            let final_path = final_path.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(250)).await;
                tokio::fs::rename(&partial, &final_path).await.unwrap();
            }
        });

        let result = watch.wait().await;
        renamer.await.unwrap();
        assert_eq!(result.path(), Some(final_path.as_path()));
        assert!(result.elapsed() >= Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_rejects_small_and_preexisting_files() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("old.xlsx"), vec![0u8; 4096])
            .await
            .unwrap();

        let watch = ArtifactWatch::start(dir.path(), quick_policy(300, 50)).await;
        tokio::fs::write(dir.path().join("tiny.xlsx"), vec![0u8; 1000])
            .await
            .unwrap();

        let result = watch.wait().await;
        assert!(result.path().is_none());
    }

    #[tokio::test]
    async fn test_replaced_file_counts_as_new() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.xlsx");
        std::fs::write(&path, vec![0u8; 4096]).unwrap();

        let watch = ArtifactWatch::start(dir.path(), quick_policy(2000, 50)).await;

        std::fs::write(&path, vec![1u8; 8192]).unwrap();
        std::fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(SystemTime::now() + Duration::from_secs(60))
            .unwrap();

        let result = watch.wait().await;
        assert_eq!(result.path(), Some(path.as_path()));
    }
}
