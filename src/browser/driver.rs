use crate::control::{ActivationMethod, Control, ControlCategory};
use crate::error::Result;
use crate::locator::Locator;
use async_trait::async_trait;
use std::time::Duration;

/// What to enumerate from the live page.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlQuery {
    /// Every element matched by a locator expression, in document order
    Locator(Locator),

    /// Interactive elements grouped by category, each category capped at
    /// `per_category` entries
    Interactive {
        categories: Vec<ControlCategory>,
        per_category: usize,
        /// When non-empty, keep only elements with a class token containing
        /// one of these keywords
        class_keywords: Vec<String>,
    },
}

impl ControlQuery {
    pub fn locator(locator: &Locator) -> Self {
        ControlQuery::Locator(locator.clone())
    }

    /// Buttons, clickable containers and links.
    pub fn clickable(per_category: usize) -> Self {
        ControlQuery::Interactive {
            categories: vec![
                ControlCategory::Button,
                ControlCategory::Container,
                ControlCategory::Link,
            ],
            per_category,
            class_keywords: Vec::new(),
        }
    }

    /// Clickable elements plus form inputs.
    pub fn all_interactive(per_category: usize) -> Self {
        ControlQuery::Interactive {
            categories: vec![
                ControlCategory::Button,
                ControlCategory::Container,
                ControlCategory::Link,
                ControlCategory::Input,
            ],
            per_category,
            class_keywords: Vec::new(),
        }
    }
}

/// Everything the resolution engine needs from a browser.
///
/// One driver serves one session at a time; implementations do not need to
/// support concurrent calls. Control references passed back in are the
/// `Control::reference` values returned by [`PageDriver::find_controls`] and
/// are re-resolved against the live page on every call.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Load `url` and wait until the document reports ready or `ready_timeout` elapses
    async fn navigate(&self, url: &str, ready_timeout: Duration) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    /// Raw HTML of the current document
    async fn page_content(&self) -> Result<String>;

    async fn title(&self) -> Result<String>;

    /// PNG bytes of the visible viewport
    async fn screenshot(&self) -> Result<Vec<u8>>;

    async fn find_controls(&self, query: &ControlQuery) -> Result<Vec<Control>>;

    async fn activate(&self, reference: &str, method: ActivationMethod) -> Result<()>;

    /// Focus, clear and type `text` through the input pipeline
    async fn clear_and_type(&self, reference: &str, text: &str) -> Result<()>;

    /// Assign the value directly and fire input/change events
    async fn set_value(&self, reference: &str, text: &str) -> Result<()>;

    async fn read_value(&self, reference: &str) -> Result<String>;

    /// True when any of `keywords` appears in the page's visible text
    async fn is_text_visible(&self, keywords: &[String]) -> Result<bool>;

    /// Run a script in the page and return its JSON result
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value>;

    async fn is_alive(&self) -> bool;

    /// Release the browser. Further calls fail.
    async fn shutdown(&self) -> Result<()>;
}
