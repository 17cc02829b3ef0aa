use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("Failed to connect to Chrome: {0}")]
    ConnectionFailed(String),

    #[error("Failed to launch Chrome: {0}")]
    LaunchFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Script execution failed: {0}")]
    ScriptFailed(String),

    #[error("No page available")]
    NoPage,

    #[error("CDP error: {0}")]
    CdpError(#[from] chromiumoxide::error::CdpError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, BrowserError>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Locator set for target '{0}' is empty")]
    EmptyLocatorSet(String),
}

/// Conditions that end a work item (or the whole run) instead of degrading it.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Navigation to {url} failed after {attempts} attempt(s): {reason}")]
    NavigationExhausted {
        url: String,
        attempts: u32,
        reason: String,
    },

    #[error("Authentication failed after {attempts} attempt(s)")]
    AuthenticationExhausted { attempts: u32 },

    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),

    #[error("Run cancelled by external interrupt")]
    Cancelled,
}
