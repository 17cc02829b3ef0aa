//! Before/after comparison of two snapshots

use crate::control::Control;
use crate::snapshot::PageSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffAnalysis {
    pub before: String,
    pub after: String,

    /// Fingerprints differ
    pub page_changed: bool,

    /// Present after but not before, in the after snapshot's order
    pub appeared: Vec<Control>,

    /// Present before but not after, in the before snapshot's order
    pub disappeared: Vec<Control>,

    /// First appeared control, if any
    pub likely_activated: Option<Control>,

    /// Locator that should find `likely_activated` on a later load
    pub suggested_locator: Option<String>,
}

impl DiffAnalysis {
    /// The page changed but no appeared control explains it
    pub fn is_unattributed_change(&self) -> bool {
        self.page_changed && self.likely_activated.is_none()
    }
}

fn missing_from(source: &[Control], other: &[Control]) -> Vec<Control> {
    let known: HashSet<String> = other.iter().map(Control::signature).collect();
    let mut seen = HashSet::new();
    source
        .iter()
        .filter(|c| {
            let sig = c.signature();
            !known.contains(&sig) && seen.insert(sig)
        })
        .cloned()
        .collect()
}

/// Compares two snapshots of the same logical step.
pub fn diff(before: &PageSnapshot, after: &PageSnapshot) -> DiffAnalysis {
    let appeared = missing_from(&after.controls, &before.controls);
    let disappeared = missing_from(&before.controls, &after.controls);
    let likely_activated = appeared.first().cloned();
    let suggested_locator = likely_activated.as_ref().map(Control::suggested_locator);

    DiffAnalysis {
        before: before.name.clone(),
        after: after.name.clone(),
        page_changed: !before.same_content(after),
        appeared,
        disappeared,
        likely_activated,
        suggested_locator,
    }
}
