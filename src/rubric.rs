//! Declarative heuristic scoring
//!
//! A [`ScoringRubric`] is a list of `(predicate, weight, reason)` rules applied
//! to every enumerated control. Weights, the minimum score and how many top
//! candidates are tried all come from configuration; the defaults in
//! [`crate::targets`] were tuned against one vendor UI and are not universal.

use crate::control::Control;
use serde::{Deserialize, Serialize};

/// A test applied to a control. Keyword matches are case-insensitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    /// Any class token contains any of the keywords
    ClassContains { any: Vec<String> },
    /// Visible text contains any of the keywords
    TextContains { any: Vec<String> },
    /// Attribute is present (any value)
    AttributePresent { name: String },
    /// Attribute equals the value
    AttributeEquals { name: String, value: String },
    /// Attribute value contains any of the keywords
    AttributeContains { name: String, any: Vec<String> },
    /// Outer markup contains any of the keywords (arrow/chevron glyphs and the like)
    MarkupContains { any: Vec<String> },
    /// Tag name is one of the listed tags
    TagIs { any: Vec<String> },
}

fn contains_any(haystack: &str, needles: &[String]) -> bool {
    let haystack = haystack.to_lowercase();
    needles
        .iter()
        .any(|n| !n.is_empty() && haystack.contains(&n.to_lowercase()))
}

impl Predicate {
    pub fn matches(&self, control: &Control) -> bool {
        match self {
            Predicate::ClassContains { any } => {
                control.class_tokens().any(|token| contains_any(token, any))
            }
            Predicate::TextContains { any } => contains_any(&control.text, any),
            Predicate::AttributePresent { name } => control.attribute(name).is_some(),
            Predicate::AttributeEquals { name, value } => control
                .attribute(name)
                .map(|v| v.eq_ignore_ascii_case(value))
                .unwrap_or(false),
            Predicate::AttributeContains { name, any } => control
                .attribute(name)
                .map(|v| contains_any(v, any))
                .unwrap_or(false),
            Predicate::MarkupContains { any } => contains_any(&control.markup, any),
            Predicate::TagIs { any } => any.iter().any(|t| t.eq_ignore_ascii_case(&control.tag)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricRule {
    #[serde(flatten)]
    pub predicate: Predicate,
    pub weight: i32,
    pub reason: String,
}

impl RubricRule {
    pub fn new(predicate: Predicate, weight: i32, reason: impl Into<String>) -> Self {
        Self {
            predicate,
            weight,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringRubric {
    pub rules: Vec<RubricRule>,

    /// Candidates scoring below this are dropped
    #[serde(default = "default_min_score")]
    pub min_score: i32,

    /// How many of the best candidates are attempted
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

fn default_min_score() -> i32 {
    3
}

fn default_top_n() -> usize {
    3
}

impl Default for ScoringRubric {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            min_score: default_min_score(),
            top_n: default_top_n(),
        }
    }
}

/// A control with the score and reasons that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub control: Control,
    pub score: i32,
    pub reasons: Vec<String>,
}

impl ScoringRubric {
    pub fn new(rules: Vec<RubricRule>) -> Self {
        Self {
            rules,
            ..Default::default()
        }
    }

    pub fn with_min_score(mut self, min_score: i32) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    pub fn score(&self, control: &Control) -> Candidate {
        let mut score = 0;
        let mut reasons = Vec::new();
        for rule in &self.rules {
            if rule.predicate.matches(control) {
                score += rule.weight;
                reasons.push(rule.reason.clone());
            }
        }
        Candidate {
            control: control.clone(),
            score,
            reasons,
        }
    }

    /// Scores usable controls, keeps those at or above `min_score` and returns
    /// the best `top_n`, highest first. Ties keep document order.
    pub fn rank<'a, I>(&self, controls: I) -> Vec<Candidate>
    where
        I: IntoIterator<Item = &'a Control>,
    {
        let mut candidates: Vec<Candidate> = controls
            .into_iter()
            .filter(|c| c.is_usable())
            .map(|c| self.score(c))
            .filter(|c| c.score >= self.min_score)
            .collect();

        candidates.sort_by(|a, b| b.score.cmp(&a.score));
        candidates.truncate(self.top_n);
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::Rect;

    fn button(class: &str, text: &str, extra: &[(&str, &str)]) -> Control {
        let mut attributes: std::collections::BTreeMap<String, String> = extra
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        if !class.is_empty() {
            attributes.insert("class".to_string(), class.to_string());
        }
        Control {
            reference: format!("//button[{}]", text),
            tag: "button".to_string(),
            category: None,
            text: text.to_string(),
            attributes,
            visible: true,
            enabled: true,
            rect: Rect::default(),
            markup: format!("<button class=\"{}\">{}</button>", class, text),
        }
    }

    fn dropdown_rubric() -> ScoringRubric {
        ScoringRubric::new(vec![
            RubricRule::new(
                Predicate::ClassContains { any: vec!["menu".into()] },
                3,
                "class contains 'menu'",
            ),
            RubricRule::new(
                Predicate::TextContains { any: vec!["client".into()] },
                4,
                "text mentions client",
            ),
            RubricRule::new(
                Predicate::AttributePresent { name: "aria-haspopup".into() },
                2,
                "has popup",
            ),
        ])
    }

    #[test]
    fn test_score_accumulates_reasons() {
        let rubric = dropdown_rubric();
        let c = button("fd-user-menu__control", "All Clients", &[("aria-haspopup", "true")]);
        let candidate = rubric.score(&c);
        assert_eq!(candidate.score, 9);
        assert_eq!(candidate.reasons.len(), 3);
    }

    #[test]
    fn test_rank_filters_sorts_and_truncates() {
        let rubric = dropdown_rubric().with_top_n(2);
        let controls = vec![
            button("plain", "Help", &[]),
            button("menu", "", &[]),
            button("menu", "Client", &[]),
            button("", "", &[("aria-haspopup", "true")]),
        ];
        let ranked = rubric.rank(&controls);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].score, 7);
        assert_eq!(ranked[1].score, 3);
    }

    #[test]
    fn test_rank_skips_hidden_and_disabled() {
        let rubric = dropdown_rubric();
        let mut hidden = button("menu", "Client", &[]);
        hidden.visible = false;
        let mut disabled = button("menu", "Client", &[]);
        disabled.enabled = false;
        assert!(rubric.rank(&[hidden, disabled]).is_empty());
    }

    #[test]
    fn test_rubric_deserializes_from_config() {
        let json = r#"{
            "rules": [
                {"kind": "class_contains", "any": ["dropdown"], "weight": 3, "reason": "dropdown class"},
                {"kind": "attribute_equals", "name": "type", "value": "password", "weight": 5, "reason": "password"}
            ],
            "min_score": 4
        }"#;
        let rubric: ScoringRubric = serde_json::from_str(json).unwrap();
        assert_eq!(rubric.rules.len(), 2);
        assert_eq!(rubric.min_score, 4);
        assert_eq!(rubric.top_n, 3);
    }
}
