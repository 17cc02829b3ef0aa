//! Semantic targets and their default locator sets
//!
//! Defaults are the locators and weights that worked against the portal's
//! current markup. Every one of them can be replaced or extended from
//! configuration or from mined learning artifacts.

use crate::error::ConfigError;
use crate::locator::{Locator, LocatorSet};
use crate::rubric::{Predicate, RubricRule, ScoringRubric};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const USERNAME: &str = "username";
pub const PASSWORD: &str = "password";
pub const SUBMIT: &str = "submit";
pub const SCOPE_CONTROL: &str = "scope_control";
pub const SCOPE_OPTION: &str = "scope_option";
pub const EXPORT_MENU: &str = "export_menu";
pub const EXPORT_ALL: &str = "export_all";

/// Everything the resolver knows about one semantic target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSpec {
    pub name: String,
    pub locators: LocatorSet,

    #[serde(default)]
    pub rubric: ScoringRubric,

    /// Text whose visibility after an activation counts as a side effect
    #[serde(default)]
    pub success_keywords: Vec<String>,
}

impl TargetSpec {
    pub fn new(name: &str, locators: &[&str], rubric: ScoringRubric) -> Result<Self, ConfigError> {
        Ok(Self {
            name: name.to_string(),
            locators: LocatorSet::new(name, locators.iter().copied())?,
            rubric,
            success_keywords: Vec::new(),
        })
    }

    pub fn with_success_keywords(mut self, keywords: &[&str]) -> Self {
        self.success_keywords = keywords.iter().map(|k| k.to_string()).collect();
        self
    }
}

/// Partial override of a target, as written in configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetOverride {
    /// Replaces the default locators when present
    #[serde(default)]
    pub locators: Option<Vec<String>>,

    #[serde(default)]
    pub rubric: Option<ScoringRubric>,

    #[serde(default)]
    pub success_keywords: Option<Vec<String>>,
}

/// Lookup table from target name to its spec.
#[derive(Debug, Clone)]
pub struct TargetBook {
    targets: BTreeMap<String, TargetSpec>,
}

impl TargetBook {
    pub fn empty() -> Self {
        Self {
            targets: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, spec: TargetSpec) {
        self.targets.insert(spec.name.clone(), spec);
    }

    pub fn get(&self, name: &str) -> Option<&TargetSpec> {
        self.targets.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(String::as_str)
    }

    pub fn apply_overrides(
        &mut self,
        overrides: &BTreeMap<String, TargetOverride>,
    ) -> Result<(), ConfigError> {
        for (name, o) in overrides {
            let existing = self.targets.get(name).cloned();
            let locators = match (&o.locators, &existing) {
                (Some(list), _) => LocatorSet::new(name, list.iter().map(String::as_str))?,
                (None, Some(spec)) => spec.locators.clone(),
                (None, None) => return Err(ConfigError::EmptyLocatorSet(name.clone())),
            };
            let rubric = o
                .rubric
                .clone()
                .or_else(|| existing.as_ref().map(|s| s.rubric.clone()))
                .unwrap_or_default();
            let success_keywords = o
                .success_keywords
                .clone()
                .or_else(|| existing.as_ref().map(|s| s.success_keywords.clone()))
                .unwrap_or_default();

            self.insert(TargetSpec {
                name: name.clone(),
                locators,
                rubric,
                success_keywords,
            });
        }
        Ok(())
    }

    /// Appends learned locators after the configured ones.
    pub fn merge_learned(&mut self, learned: &BTreeMap<String, Vec<String>>) {
        for (name, locators) in learned {
            match self.targets.get_mut(name) {
                Some(spec) => {
                    spec.locators = spec
                        .locators
                        .extended(locators.iter().map(|l| Locator::new(l.as_str())));
                }
                None => {
                    if let Ok(set) = LocatorSet::new(name, locators.iter().map(String::as_str)) {
                        log::info!("📚 New target '{}' from learned locators", name);
                        self.insert(TargetSpec {
                            name: name.clone(),
                            locators: set,
                            rubric: ScoringRubric::default(),
                            success_keywords: Vec::new(),
                        });
                    }
                }
            }
        }
    }
}

fn kw(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

fn rule(predicate: Predicate, weight: i32, reason: &str) -> RubricRule {
    RubricRule::new(predicate, weight, reason)
}

impl TargetBook {
    /// The portal's workflow targets with their known locators and rubrics.
    pub fn builtin() -> Result<Self, ConfigError> {
        let mut book = TargetBook::empty();

        book.insert(TargetSpec::new(
            USERNAME,
            &[
                "//input[@name='UserName']",
                "//input[contains(@class, 'w-login-form-input-user')]",
                "//input[@type='text' and contains(@placeholder, 'usuario')]",
            ],
            ScoringRubric::new(vec![
                rule(Predicate::TagIs { any: kw(&["input"]) }, 1, "input element"),
                rule(
                    Predicate::AttributeEquals { name: "type".into(), value: "text".into() },
                    2,
                    "text input",
                ),
                rule(
                    Predicate::AttributeEquals { name: "type".into(), value: "email".into() },
                    2,
                    "email input",
                ),
                rule(
                    Predicate::AttributeContains { name: "name".into(), any: kw(&["user", "login", "email"]) },
                    3,
                    "name suggests a user field",
                ),
                rule(
                    Predicate::AttributeContains { name: "placeholder".into(), any: kw(&["user", "usuario", "email"]) },
                    3,
                    "placeholder suggests a user field",
                ),
                rule(
                    Predicate::AttributeEquals { name: "type".into(), value: "password".into() },
                    -10,
                    "password field",
                ),
            ]),
        )?);

        book.insert(TargetSpec::new(
            PASSWORD,
            &[
                "//input[@name='Password']",
                "//input[contains(@class, 'w-psw')]",
                "//input[@type='password']",
            ],
            ScoringRubric::new(vec![rule(
                Predicate::AttributeEquals { name: "type".into(), value: "password".into() },
                5,
                "password input",
            )]),
        )?);

        book.insert(TargetSpec::new(
            SUBMIT,
            &[
                "//input[@type='submit']",
                "//button[@type='submit']",
                "//input[contains(@class, 'w-login-page-form-btn')]",
                "//button[contains(text(), 'Inicio de sesión')]",
                "//button[contains(text(), 'Login')]",
            ],
            ScoringRubric::new(vec![
                rule(
                    Predicate::AttributeEquals { name: "type".into(), value: "submit".into() },
                    4,
                    "submit type",
                ),
                rule(
                    Predicate::TextContains { any: kw(&["login", "log in", "sign in", "inicio de sesión", "ingresar"]) },
                    3,
                    "text mentions sign-in",
                ),
                rule(
                    Predicate::AttributeContains { name: "value".into(), any: kw(&["login", "sign in", "inicio"]) },
                    3,
                    "value mentions sign-in",
                ),
            ]),
        )?);

        book.insert(
            TargetSpec::new(
                SCOPE_CONTROL,
                &[
                    "//button[contains(@class, 'fd-user-menu__control')]",
                    "//div[contains(@class, 'fd-user-menu')]//button",
                    "//button[contains(text(), 'MÁS') or contains(text(), 'Más')]",
                    "//button[contains(text(), 'cliente') or contains(text(), 'Cliente')]",
                    "//div[contains(@class, 'fd-user-menu')]//button[contains(@class, 'fd-button--menu')]",
                    "(//button[contains(@class, 'fd-') and @aria-haspopup='true'])[last()]",
                ],
                ScoringRubric::new(vec![
                    rule(Predicate::ClassContains { any: kw(&["menu"]) }, 3, "class contains 'menu'"),
                    rule(Predicate::ClassContains { any: kw(&["dropdown"]) }, 3, "class contains 'dropdown'"),
                    rule(Predicate::ClassContains { any: kw(&["control"]) }, 2, "class contains 'control'"),
                    rule(
                        Predicate::TextContains { any: kw(&["cliente", "client", "más", "more"]) },
                        4,
                        "text relates to client scope",
                    ),
                    rule(Predicate::TextContains { any: kw(&["todos", "all"]) }, 2, "text contains 'all'"),
                    rule(
                        Predicate::AttributePresent { name: "aria-haspopup".into() },
                        2,
                        "declares a popup",
                    ),
                    rule(
                        Predicate::AttributePresent { name: "aria-expanded".into() },
                        1,
                        "has expand state",
                    ),
                    rule(
                        Predicate::MarkupContains { any: kw(&["arrow", "chevron", "▼", "⌄"]) },
                        2,
                        "has dropdown indicator",
                    ),
                ]),
            )?
            .with_success_keywords(&["Corporación Nacional del Cobre", "Codelco", "CODELCO"]),
        );

        book.insert(
            TargetSpec::new(
                SCOPE_OPTION,
                &[
                    "//*[contains(text(), 'Corporación Nacional del Cobre')]",
                    "//li[@role='option' and contains(text(), 'Corporación')]",
                    "//div[@role='option' and contains(text(), 'Corporación Nacional del Cobre')]",
                    "//*[contains(text(), 'CODELCO')]",
                    "//*[contains(text(), 'Nacional del Cobre')]",
                ],
                ScoringRubric::new(vec![
                    rule(
                        Predicate::TextContains { any: kw(&["nacional del cobre", "codelco"]) },
                        5,
                        "text names the corporation",
                    ),
                    rule(
                        Predicate::AttributeEquals { name: "role".into(), value: "option".into() },
                        2,
                        "option role",
                    ),
                    rule(Predicate::TagIs { any: kw(&["li", "option"]) }, 1, "list item"),
                ])
                .with_min_score(5),
            )?
            .with_success_keywords(&["Ambiente Productivo"]),
        );

        book.insert(
            TargetSpec::new(
                EXPORT_MENU,
                &[
                    "//button[@title='Menú de acciones']",
                    "//button[contains(@class, 'action-menu')]",
                    "//button[contains(@aria-label, 'menu')]",
                    "//*[@data-testid='menu-button']",
                    "//button[text()='⋮']",
                    "//button[text()='☰']",
                    "(//button[contains(@class, 'menu')])[last()]",
                ],
                ScoringRubric::new(vec![
                    rule(Predicate::ClassContains { any: kw(&["menu"]) }, 3, "class contains 'menu'"),
                    rule(
                        Predicate::AttributeContains { name: "title".into(), any: kw(&["acciones", "actions", "menu"]) },
                        3,
                        "title names an action menu",
                    ),
                    rule(
                        Predicate::AttributeContains { name: "aria-label".into(), any: kw(&["menu", "more"]) },
                        2,
                        "aria-label names a menu",
                    ),
                    rule(Predicate::TextContains { any: kw(&["⋮", "☰", "…"]) }, 3, "menu glyph"),
                    rule(
                        Predicate::AttributePresent { name: "aria-haspopup".into() },
                        2,
                        "declares a popup",
                    ),
                ]),
            )?
            .with_success_keywords(&["Exportar todas las filas", "Export all rows"]),
        );

        book.insert(TargetSpec::new(
            EXPORT_ALL,
            &[
                "//*[contains(text(), 'Exportar todas las filas')]",
                "//*[contains(text(), 'Export all rows')]",
                "//li[contains(text(), 'Exportar todas')]",
                "//a[contains(text(), 'Exportar todas')]",
                "//*[@role='menuitem' and contains(text(), 'Exportar')]",
                "//button[contains(@title, 'Exportar todas')]",
            ],
            ScoringRubric::new(vec![
                rule(
                    Predicate::TextContains { any: kw(&["exportar todas", "export all"]) },
                    5,
                    "text names export-all",
                ),
                rule(Predicate::TextContains { any: kw(&["export"]) }, 2, "text mentions export"),
                rule(
                    Predicate::AttributeEquals { name: "role".into(), value: "menuitem".into() },
                    2,
                    "menu item role",
                ),
            ])
            .with_min_score(4),
        )?);

        Ok(book)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_book_has_all_workflow_targets() {
        let book = TargetBook::builtin().unwrap();
        for name in [
            USERNAME,
            PASSWORD,
            SUBMIT,
            SCOPE_CONTROL,
            SCOPE_OPTION,
            EXPORT_MENU,
            EXPORT_ALL,
        ] {
            let spec = book.get(name).expect(name);
            assert!(!spec.locators.is_empty());
            assert!(!spec.rubric.rules.is_empty());
        }
    }

    #[test]
    fn test_override_replaces_locators_keeps_rubric() {
        let mut book = TargetBook::builtin().unwrap();
        let default_rules = book.get(USERNAME).unwrap().rubric.rules.len();

        let mut overrides = BTreeMap::new();
        overrides.insert(
            USERNAME.to_string(),
            TargetOverride {
                locators: Some(vec!["#login-user".to_string()]),
                ..Default::default()
            },
        );
        book.apply_overrides(&overrides).unwrap();

        let spec = book.get(USERNAME).unwrap();
        assert_eq!(spec.locators.len(), 1);
        assert_eq!(spec.locators.first().as_str(), "#login-user");
        assert_eq!(spec.rubric.rules.len(), default_rules);
    }

    #[test]
    fn test_override_with_empty_locators_is_an_error() {
        let mut book = TargetBook::builtin().unwrap();
        let mut overrides = BTreeMap::new();
        overrides.insert(
            EXPORT_ALL.to_string(),
            TargetOverride {
                locators: Some(vec![]),
                ..Default::default()
            },
        );
        assert!(book.apply_overrides(&overrides).is_err());

        let mut unknown = BTreeMap::new();
        unknown.insert("status_filter".to_string(), TargetOverride::default());
        assert!(book.apply_overrides(&unknown).is_err());
    }

    #[test]
    fn test_merge_learned_appends_and_creates() {
        let mut book = TargetBook::builtin().unwrap();
        let before = book.get(EXPORT_MENU).unwrap().locators.len();

        let mut learned = BTreeMap::new();
        learned.insert(
            EXPORT_MENU.to_string(),
            vec!["//button[@id='actions']".to_string()],
        );
        learned.insert(
            "status_filter".to_string(),
            vec!["//select[@name='status']".to_string()],
        );
        book.merge_learned(&learned);

        let menu = book.get(EXPORT_MENU).unwrap();
        assert_eq!(menu.locators.len(), before + 1);
        assert_eq!(
            menu.locators.iter().last().unwrap().as_str(),
            "//button[@id='actions']"
        );
        assert!(book.get("status_filter").is_some());
    }
}
