//! Control descriptors and interaction records
//!
//! A [`Control`] is a point-in-time description of one interactive element.
//! It is produced by a live read of the page and is never reused across reads:
//! the `reference` it carries is only a hint for acting on the element right
//! after capture, and the driver re-resolves it on every action.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Element category used to bound and group captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlCategory {
    Button,
    Container,
    Link,
    Input,
    Other,
}

/// Screen position and size in CSS pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// A descriptor of one interactive page element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Control {
    /// Absolute positional XPath computed at capture time
    pub reference: String,

    /// Lower-case tag name
    pub tag: String,

    #[serde(default)]
    pub category: Option<ControlCategory>,

    /// Visible text, trimmed and truncated
    #[serde(default)]
    pub text: String,

    /// Selected attributes (class, id, name, type, role, aria-*, title, placeholder)
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,

    pub visible: bool,
    pub enabled: bool,

    #[serde(default)]
    pub rect: Rect,

    /// Leading slice of the element's outer HTML
    #[serde(default)]
    pub markup: String,
}

impl Control {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn class_tokens(&self) -> impl Iterator<Item = &str> {
        self.attribute("class").unwrap_or("").split_whitespace()
    }

    pub fn is_usable(&self) -> bool {
        self.visible && self.enabled
    }

    pub fn is_text_field(&self) -> bool {
        match self.tag.as_str() {
            "textarea" => true,
            "input" => !matches!(
                self.attribute("type").map(str::to_ascii_lowercase).as_deref(),
                Some("submit" | "button" | "checkbox" | "radio" | "hidden" | "image" | "reset")
            ),
            _ => false,
        }
    }

    /// Identity used when comparing snapshots. Position is left out on purpose:
    /// layouts shift between reads while the element stays the same.
    pub fn signature(&self) -> String {
        if self.markup.is_empty() {
            format!("{}|{}|{:?}", self.tag, self.text, self.attributes)
        } else {
            format!("{}|{}", self.tag, self.markup)
        }
    }

    /// Builds a locator expression that should find this control again on a
    /// later page load. Prefers stable identifiers over text.
    pub fn suggested_locator(&self) -> String {
        let tag = if self.tag.is_empty() { "*" } else { &self.tag };

        if let Some(id) = self.attribute("id").filter(|v| !v.is_empty()) {
            return format!("//{}[@id={}]", tag, xpath_literal(id));
        }
        if let Some(name) = self.attribute("name").filter(|v| !v.is_empty()) {
            return format!("//{}[@name={}]", tag, xpath_literal(name));
        }
        if let Some(label) = self.attribute("aria-label").filter(|v| !v.is_empty()) {
            return format!("//{}[@aria-label={}]", tag, xpath_literal(label));
        }
        if let Some(token) = self
            .class_tokens()
            .filter(|t| t.len() > 3)
            .max_by_key(|t| t.len())
        {
            return format!("//{}[contains(@class, {})]", tag, xpath_literal(token));
        }
        if !self.text.is_empty() {
            let text: String = self.text.chars().take(40).collect();
            return format!(
                "//{}[contains(normalize-space(.), {})]",
                tag,
                xpath_literal(text.trim())
            );
        }
        self.reference.clone()
    }
}

/// Quotes a string as an XPath 1.0 literal, falling back to `concat()` when it
/// contains both quote kinds.
pub fn xpath_literal(value: &str) -> String {
    if !value.contains('\'') {
        format!("'{}'", value)
    } else if !value.contains('"') {
        format!("\"{}\"", value)
    } else {
        let parts: Vec<String> = value
            .split('\'')
            .map(|p| format!("'{}'", p))
            .collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}

/// What the caller wants done with the resolved control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Action {
    Locate,
    Type(String),
    Activate,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Locate => "locate",
            Action::Type(_) => "type",
            Action::Activate => "activate",
        }
    }
}

/// Ways of activating a control, tried in this order by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationMethod {
    /// Real mouse click dispatched through the browser input pipeline
    Direct,
    /// mousedown + mouseup + click events dispatched from page script
    SyntheticEvents,
    /// `element.click()` invoked from page script
    Programmatic,
    /// Focus and press Enter
    KeyboardEnter,
}

impl ActivationMethod {
    pub const ORDER: [ActivationMethod; 4] = [
        ActivationMethod::Direct,
        ActivationMethod::SyntheticEvents,
        ActivationMethod::Programmatic,
        ActivationMethod::KeyboardEnter,
    ];
}

/// Resolver tier that produced an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    KnownLocator,
    HeuristicSearch,
    Exhaustive,
    InPageScript,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptOutcome {
    Success,
    Failure,
    Timeout,
}

/// One (locator-or-method, outcome, error) record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionAttempt {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,

    /// Locator expression or interaction method that was tried
    pub subject: String,

    pub outcome: AttemptOutcome,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(with = "duration_millis")]
    pub duration: Duration,
}

impl InteractionAttempt {
    pub fn success(tier: Option<Tier>, subject: impl Into<String>, duration: Duration) -> Self {
        Self {
            tier,
            subject: subject.into(),
            outcome: AttemptOutcome::Success,
            error: None,
            duration,
        }
    }

    pub fn failure(
        tier: Option<Tier>,
        subject: impl Into<String>,
        error: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            tier,
            subject: subject.into(),
            outcome: AttemptOutcome::Failure,
            error: Some(error.into()),
            duration,
        }
    }

    pub fn timeout(tier: Option<Tier>, subject: impl Into<String>, duration: Duration) -> Self {
        Self {
            tier,
            subject: subject.into(),
            outcome: AttemptOutcome::Timeout,
            error: Some(format!("timed out after {}ms", duration.as_millis())),
            duration,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == AttemptOutcome::Success
    }
}

/// Aggregate of all attempts for a single resolve+act request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionResult {
    pub target: String,
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,

    /// Locator (or synthesized locator) that won
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,

    /// Descriptor of the resolved control at success time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control: Option<Control>,

    pub attempts: Vec<InteractionAttempt>,
}

impl InteractionResult {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            success: false,
            tier: None,
            locator: None,
            control: None,
            attempts: Vec::new(),
        }
    }

    pub fn succeed(&mut self, tier: Tier, locator: impl Into<String>, control: Option<Control>) {
        self.success = true;
        self.tier = Some(tier);
        self.locator = Some(locator.into());
        self.control = control;
    }

    pub fn push(&mut self, attempt: InteractionAttempt) {
        self.attempts.push(attempt);
    }

    /// Folds another result's attempts into this one, taking its success if any.
    pub fn absorb(&mut self, other: InteractionResult) {
        self.attempts.extend(other.attempts);
        if other.success {
            self.success = true;
            self.tier = other.tier;
            self.locator = other.locator;
            self.control = other.control;
        }
    }
}

pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
