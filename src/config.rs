//! Run configuration, loaded from JSON
//!
//! Durations are written in milliseconds. Every field has a default, so an
//! empty object is a valid config (credentials then have to come from the
//! command line or environment).

use crate::artifact::{PolicyChoice, WaitPolicy};
use crate::browser::ConnectionMode;
use crate::error::ConfigError;
use crate::executor::InteractionExecutor;
use crate::resolver::ResolverSettings;
use crate::targets::{TargetBook, TargetOverride};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Portal URL the workflow starts from
    #[serde(default)]
    pub url: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"********")
            .field("url", &self.url)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub credentials: Credentials,

    /// Directory the browser downloads into and the artifact wait watches
    pub artifact_dir: PathBuf,
    pub diagnostics_dir: PathBuf,
    pub learning_dir: PathBuf,
    pub history_path: PathBuf,
    pub handoff_path: PathBuf,

    #[serde(with = "crate::control::duration_millis")]
    pub page_ready_timeout: Duration,
    pub navigate_attempts: u32,
    pub auth_attempts: u32,

    /// Pause between navigation or authentication attempts
    #[serde(with = "crate::control::duration_millis")]
    pub retry_backoff: Duration,

    /// Consecutive failed steps that force the rest of an item to be skipped
    pub skip_threshold: u32,
    /// Items skipped without navigation once the threshold trips
    pub skip_cooldown_items: u32,
    pub skip_processed: bool,

    /// Append mined learning locators to the configured sets at startup
    pub use_learned_locators: bool,

    pub artifact_policy: PolicyChoice,

    /// URL fragments that indicate a sign-in page
    pub auth_url_patterns: Vec<String>,

    pub targets: BTreeMap<String, TargetOverride>,
    pub resolver: ResolverSettings,
    pub executor: InteractionExecutor,
    pub browser: ConnectionMode,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            artifact_dir: dirs::download_dir()
                .unwrap_or_else(|| PathBuf::from("data/downloads")),
            diagnostics_dir: PathBuf::from("data/screenshots"),
            learning_dir: PathBuf::from("data/learning"),
            history_path: PathBuf::from("data/processed.json"),
            handoff_path: PathBuf::from("data/handoff.jsonl"),
            page_ready_timeout: Duration::from_secs(30),
            navigate_attempts: 3,
            auth_attempts: 3,
            retry_backoff: Duration::from_secs(2),
            skip_threshold: 3,
            skip_cooldown_items: 1,
            skip_processed: true,
            use_learned_locators: true,
            artifact_policy: PolicyChoice::default(),
            auth_url_patterns: vec![
                "login".to_string(),
                "signin".to_string(),
                "auth".to_string(),
                "sso".to_string(),
            ],
            targets: BTreeMap::new(),
            resolver: ResolverSettings::default(),
            executor: InteractionExecutor::default(),
            browser: ConnectionMode::default(),
        }
    }
}

impl RunConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn wait_policy(&self) -> WaitPolicy {
        self.artifact_policy.policy()
    }

    /// Built-in targets with configured overrides applied.
    pub fn target_book(&self) -> Result<TargetBook, ConfigError> {
        let mut book = TargetBook::builtin()?;
        book.apply_overrides(&self.targets)?;
        Ok(book)
    }

    /// Replaces credential fields that are given.
    pub fn override_credentials(
        &mut self,
        username: Option<String>,
        password: Option<String>,
        url: Option<String>,
    ) {
        if let Some(username) = username {
            self.credentials.username = username;
        }
        if let Some(password) = password {
            self.credentials.password = password;
        }
        if let Some(url) = url {
            self.credentials.url = url;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::WaitPolicy;
    use crate::targets::SCOPE_CONTROL;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = RunConfig::from_json("{}").unwrap();
        assert_eq!(config.navigate_attempts, 3);
        assert_eq!(config.skip_threshold, 3);
        assert_eq!(config.wait_policy(), WaitPolicy::conservative());
        assert!(matches!(config.browser, ConnectionMode::Sandboxed { .. }));
    }

    #[test]
    fn test_config_overrides_rubric_and_policy() {
        let config = RunConfig::from_json(
            r#"{
                "credentials": {"username": "buyer", "password": "secret", "url": "https://portal.example"},
                "artifact_policy": "aggressive",
                "page_ready_timeout": 5000,
                "browser": {"mode": "debug_port", "port": 9222},
                "targets": {
                    "scope_control": {
                        "rubric": {
                            "rules": [{"kind": "class_contains", "any": ["selector"], "weight": 5, "reason": "selector class"}],
                            "min_score": 5,
                            "top_n": 1
                        }
                    }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.wait_policy(), WaitPolicy::aggressive());
        assert_eq!(config.page_ready_timeout, Duration::from_secs(5));
        assert_eq!(config.browser, ConnectionMode::DebugPort { port: 9222 });

        let book = config.target_book().unwrap();
        let scope = book.get(SCOPE_CONTROL).unwrap();
        assert_eq!(scope.rubric.min_score, 5);
        assert_eq!(scope.rubric.rules.len(), 1);
        assert!(scope.locators.len() > 1);
    }

    #[test]
    fn test_empty_locator_override_is_config_error() {
        let config = RunConfig::from_json(r#"{"targets": {"username": {"locators": []}}}"#).unwrap();
        assert!(matches!(
            config.target_book(),
            Err(ConfigError::EmptyLocatorSet(name)) if name == "username"
        ));
    }

    #[test]
    fn test_debug_hides_password() {
        let creds = Credentials {
            username: "buyer".into(),
            password: "hunter2".into(),
            url: String::new(),
        };
        assert!(!format!("{:?}", creds).contains("hunter2"));
    }

    #[test]
    fn test_from_file_reports_path() {
        let err = RunConfig::from_file(Path::new("/nonexistent/run.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/run.json"));
    }
}
