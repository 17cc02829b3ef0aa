//! The live run context
//!
//! An [`AutomationSession`] owns the driver for the length of one run along
//! with all per-run mutable state: the current step, per-step retry counters,
//! the consecutive-error counter and the diagnostics trail. [`AutomationSession::close`]
//! consumes the session, so the driver cannot be used after release.

use crate::browser::driver::PageDriver;
use crate::diagnostics::Diagnostics;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Workflow states, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Step {
    Init,
    Navigate,
    AuthCheck,
    Authenticate,
    ScopeSelect,
    ExportTrigger,
    ArtifactWait,
    Handoff,
    Done,
    Failed,
}

impl Step {
    /// Steps that do work for an item, in execution order
    pub const WORKFLOW: [Step; 7] = [
        Step::Navigate,
        Step::AuthCheck,
        Step::Authenticate,
        Step::ScopeSelect,
        Step::ExportTrigger,
        Step::ArtifactWait,
        Step::Handoff,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Step::Init => "init",
            Step::Navigate => "navigate",
            Step::AuthCheck => "auth_check",
            Step::Authenticate => "authenticate",
            Step::ScopeSelect => "scope_select",
            Step::ExportTrigger => "export_trigger",
            Step::ArtifactWait => "artifact_wait",
            Step::Handoff => "handoff",
            Step::Done => "done",
            Step::Failed => "failed",
        }
    }

    /// Workflow steps strictly after this one
    pub fn following(self) -> impl Iterator<Item = Step> {
        Step::WORKFLOW.into_iter().filter(move |s| *s > self)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Counts failed steps in a row across steps and items.
///
/// A success resets the count. Once the count reaches the threshold the
/// counter is tripped until [`ConsecutiveErrors::reset`] is called.
#[derive(Debug, Clone)]
pub struct ConsecutiveErrors {
    count: u32,
    threshold: u32,
}

impl ConsecutiveErrors {
    pub fn new(threshold: u32) -> Self {
        Self {
            count: 0,
            threshold: threshold.max(1),
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn record_success(&mut self) {
        self.count = 0;
    }

    /// Returns true when this failure trips the threshold.
    pub fn record_failure(&mut self) -> bool {
        self.count += 1;
        self.count == self.threshold
    }

    pub fn is_tripped(&self) -> bool {
        self.count >= self.threshold
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }
}

pub struct AutomationSession<D: PageDriver> {
    driver: D,
    diagnostics: Diagnostics,
    current_step: Step,
    retries: BTreeMap<Step, u32>,
    errors: ConsecutiveErrors,
}

impl<D: PageDriver> AutomationSession<D> {
    pub fn new(driver: D, diagnostics: Diagnostics, skip_threshold: u32) -> Self {
        Self {
            driver,
            diagnostics,
            current_step: Step::Init,
            retries: BTreeMap::new(),
            errors: ConsecutiveErrors::new(skip_threshold),
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn current_step(&self) -> Step {
        self.current_step
    }

    pub fn enter(&mut self, step: Step) {
        log::debug!("➡️  {} -> {}", self.current_step, step);
        self.current_step = step;
    }

    /// Counts one more attempt at `step` and returns the running total
    pub fn note_attempt(&mut self, step: Step) -> u32 {
        let count = self.retries.entry(step).or_insert(0);
        *count += 1;
        *count
    }

    pub fn attempts(&self, step: Step) -> u32 {
        self.retries.get(&step).copied().unwrap_or(0)
    }

    pub fn errors(&self) -> &ConsecutiveErrors {
        &self.errors
    }

    pub fn errors_mut(&mut self) -> &mut ConsecutiveErrors {
        &mut self.errors
    }

    /// Releases the driver and flushes diagnostics. Failures are logged, never returned.
    pub async fn close(self) -> Diagnostics {
        if let Err(e) = self.driver.shutdown().await {
            log::warn!("⚠️  Driver shutdown failed: {}", e);
        }
        if let Err(e) = self.diagnostics.flush().await {
            log::warn!("⚠️  Failed to flush diagnostics: {:#}", e);
        }
        log::info!("🔒 Session closed at step {}", self.current_step);
        self.diagnostics
    }
}
