//! Locator expressions and ordered locator sets

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Syntax of a locator expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocatorKind {
    XPath,
    Css,
}

/// A string pattern used to find a control within the current page structure.
///
/// Expressions starting with `/` or `(` are XPath, everything else is CSS.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locator(String);

impl Locator {
    pub fn new(expression: impl Into<String>) -> Self {
        Self(expression.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn kind(&self) -> LocatorKind {
        if self.0.starts_with('/') || self.0.starts_with('(') {
            LocatorKind::XPath
        } else {
            LocatorKind::Css
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Locator {
    fn from(s: &str) -> Self {
        Locator::new(s)
    }
}

impl From<String> for Locator {
    fn from(s: String) -> Self {
        Locator::new(s)
    }
}

/// An ordered, non-empty sequence of locators bound to one semantic target.
/// First match wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct LocatorSet(Vec<Locator>);

impl LocatorSet {
    pub fn new<I, L>(target: &str, locators: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = L>,
        L: Into<Locator>,
    {
        let mut seen = Vec::new();
        for locator in locators.into_iter().map(Into::into) {
            if locator.as_str().is_empty() || seen.contains(&locator) {
                continue;
            }
            seen.push(locator);
        }

        if seen.is_empty() {
            return Err(ConfigError::EmptyLocatorSet(target.to_string()));
        }
        Ok(Self(seen))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Locator> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first(&self) -> &Locator {
        &self.0[0]
    }

    /// Returns a new set with `extra` appended after the existing entries,
    /// skipping duplicates. Existing order keeps priority.
    pub fn extended<I, L>(&self, extra: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<Locator>,
    {
        let mut locators = self.0.clone();
        for locator in extra.into_iter().map(Into::into) {
            if !locator.as_str().is_empty() && !locators.contains(&locator) {
                locators.push(locator);
            }
        }
        Self(locators)
    }
}

impl<'de> Deserialize<'de> for LocatorSet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Vec::<String>::deserialize(deserializer)?;
        LocatorSet::new("<config>", raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_detection() {
        assert_eq!(Locator::new("//input[@name='UserName']").kind(), LocatorKind::XPath);
        assert_eq!(Locator::new("(//button)[2]").kind(), LocatorKind::XPath);
        assert_eq!(Locator::new("button.fd-menu").kind(), LocatorKind::Css);
    }

    #[test]
    fn test_empty_set_is_rejected() {
        let err = LocatorSet::new("username", Vec::<String>::new()).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyLocatorSet(t) if t == "username"));

        assert!(LocatorSet::new("username", vec!["  "]).is_err());
    }

    #[test]
    fn test_duplicates_removed_in_order() {
        let set = LocatorSet::new("t", vec!["//a", "//b", "//a"]).unwrap();
        let items: Vec<&str> = set.iter().map(Locator::as_str).collect();
        assert_eq!(items, vec!["//a", "//b"]);
        assert_eq!(set.first().as_str(), "//a");
        assert!(!set.is_empty());
    }

    #[test]
    fn test_extended_keeps_priority() {
        let set = LocatorSet::new("t", vec!["//a", "//b"]).unwrap();
        let grown = set.extended(vec!["//c", "//a"]);
        let items: Vec<&str> = grown.iter().map(Locator::as_str).collect();
        assert_eq!(items, vec!["//a", "//b", "//c"]);
    }

    #[test]
    fn test_deserialize_rejects_empty() {
        let ok: LocatorSet = serde_json::from_str(r#"["//a"]"#).unwrap();
        assert_eq!(ok.len(), 1);
        assert!(serde_json::from_str::<LocatorSet>("[]").is_err());
    }
}
