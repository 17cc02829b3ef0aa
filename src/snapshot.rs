//! Read-only captures of the page's interactive surface

use crate::browser::driver::{ControlQuery, PageDriver};
use crate::control::{Control, ControlCategory};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named, timestamped capture of the controls of interest plus a content fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub url: String,
    pub title: String,

    /// SHA-256 of the raw page content
    pub fingerprint: String,

    pub controls: Vec<Control>,
}

impl PageSnapshot {
    pub fn same_content(&self, other: &PageSnapshot) -> bool {
        self.fingerprint == other.fingerprint
    }

    pub fn controls_of(&self, category: ControlCategory) -> impl Iterator<Item = &Control> {
        self.controls
            .iter()
            .filter(move |c| c.category == Some(category))
    }
}

/// What a capture enumerates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotOptions {
    /// Cap per element category
    #[serde(default = "default_per_category")]
    pub per_category: usize,

    /// Restrict to controls whose class tokens contain one of these (empty keeps all)
    #[serde(default)]
    pub class_keywords: Vec<String>,

    #[serde(default = "default_true")]
    pub include_inputs: bool,
}

fn default_per_category() -> usize {
    50
}

fn default_true() -> bool {
    true
}

impl Default for SnapshotOptions {
    fn default() -> Self {
        Self {
            per_category: default_per_category(),
            class_keywords: Vec::new(),
            include_inputs: true,
        }
    }
}

impl SnapshotOptions {
    /// Only menu/dropdown/control-like elements
    pub fn menu_like() -> Self {
        Self {
            class_keywords: vec!["menu".into(), "dropdown".into(), "control".into()],
            include_inputs: false,
            ..Default::default()
        }
    }

    fn query(&self) -> ControlQuery {
        let mut categories = vec![
            ControlCategory::Button,
            ControlCategory::Container,
            ControlCategory::Link,
        ];
        if self.include_inputs {
            categories.push(ControlCategory::Input);
        }
        ControlQuery::Interactive {
            categories,
            per_category: self.per_category,
            class_keywords: self.class_keywords.clone(),
        }
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Reads the page into a [`PageSnapshot`]. Never interacts with the page.
pub async fn capture_snapshot<D: PageDriver + ?Sized>(
    driver: &D,
    name: &str,
    options: &SnapshotOptions,
) -> Result<PageSnapshot> {
    log::debug!("📸 Capturing snapshot '{}'", name);

    let url = driver.current_url().await?;
    let title = driver.title().await.unwrap_or_default();
    let content = driver.page_content().await?;
    let controls = driver.find_controls(&options.query()).await?;

    log::info!(
        "📸 Snapshot '{}': {} controls, {} KB",
        name,
        controls.len(),
        content.len() / 1024
    );

    Ok(PageSnapshot {
        name: name.to_string(),
        timestamp: Utc::now(),
        url,
        title,
        fingerprint: sha256_hex(content.as_bytes()),
        controls,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex_is_stable() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_menu_like_query_filters_classes() {
        match SnapshotOptions::menu_like().query() {
            ControlQuery::Interactive {
                categories,
                class_keywords,
                ..
            } => {
                assert!(!categories.contains(&ControlCategory::Input));
                assert_eq!(class_keywords, vec!["menu", "dropdown", "control"]);
            }
            other => panic!("unexpected query {:?}", other),
        }
    }
}
