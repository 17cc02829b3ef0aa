//! Per-item workflow and batch driver
//!
//! Each work item runs `NAVIGATE → AUTH_CHECK → (AUTHENTICATE) → SCOPE_SELECT →
//! EXPORT_TRIGGER → ARTIFACT_WAIT → HANDOFF`. Navigation and authentication
//! are retried and fatal when exhausted; scope selection, export and the
//! artifact wait only degrade the item. Every step emits a [`StepRecord`].
//!
//! Degraded and fatal steps feed the session's consecutive-error counter,
//! successes reset it and skipped steps leave it alone. When the counter trips,
//! the rest of the current item is skipped, and so are the next
//! `skip_cooldown_items` items, without navigating. The counter is then reset.

use crate::artifact::{ArtifactWaitResult, ArtifactWatch};
use crate::browser::driver::{ControlQuery, PageDriver};
use crate::config::RunConfig;
use crate::control::{Action, InteractionAttempt, InteractionResult, Tier};
use crate::error::{BrowserError, RunError};
use crate::handoff::{AnalysisSink, Handoff, WorkItem};
use crate::history::ProcessedHistory;
use crate::locator::Locator;
use crate::resolver::{LocatorResolver, ResolveContext};
use crate::session::{AutomationSession, Step};
use crate::targets::{self, TargetBook};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Degraded,
    Skipped,
    Fatal,
}

impl StepStatus {
    pub fn name(&self) -> &'static str {
        match self {
            StepStatus::Success => "success",
            StepStatus::Degraded => "degraded",
            StepStatus::Skipped => "skipped",
            StepStatus::Fatal => "fatal",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: Step,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(with = "crate::control::duration_millis")]
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Full artifact handed off
    Completed,
    /// Handed off with title and link only
    Degraded,
    /// Skipped by the consecutive-error cooldown
    Skipped,
    /// Recorded in the processed history by an earlier run
    AlreadyProcessed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemReport {
    pub item: WorkItem,
    pub status: ItemStatus,
    pub steps: Vec<StepRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handoff: Option<Handoff>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(with = "crate::control::duration_millis")]
    pub elapsed: Duration,
}

impl ItemReport {
    fn new(item: &WorkItem) -> Self {
        Self {
            item: item.clone(),
            status: ItemStatus::Failed,
            steps: Vec::new(),
            artifact: None,
            handoff: None,
            error: None,
            elapsed: Duration::ZERO,
        }
    }

    pub fn step(&self, step: Step) -> Option<&StepRecord> {
        self.steps.iter().find(|r| r.step == step)
    }

    fn push(&mut self, step: Step, status: StepStatus, detail: Option<String>, elapsed: Duration) {
        self.steps.push(StepRecord {
            step,
            status,
            detail,
            elapsed,
        });
    }

    fn skip(&mut self, steps: impl IntoIterator<Item = Step>, reason: &str) {
        for step in steps {
            self.push(step, StepStatus::Skipped, Some(reason.to_string()), Duration::ZERO);
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchTotals {
    pub completed: usize,
    pub degraded: usize,
    pub skipped: usize,
    pub already_processed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub items: Vec<ItemReport>,
    pub totals: BatchTotals,
    pub cancelled: bool,
    /// Set when the batch ended before every item was visited
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped: Option<String>,
}

impl BatchReport {
    pub fn count(&self, status: ItemStatus) -> usize {
        self.items.iter().filter(|i| i.status == status).count()
    }

    fn tally(&mut self) {
        self.totals = BatchTotals {
            completed: self.count(ItemStatus::Completed),
            degraded: self.count(ItemStatus::Degraded),
            skipped: self.count(ItemStatus::Skipped),
            already_processed: self.count(ItemStatus::AlreadyProcessed),
            failed: self.count(ItemStatus::Failed),
        };
    }
}

pub struct Orchestrator {
    config: RunConfig,
    targets: TargetBook,
    resolver: LocatorResolver,
    history: ProcessedHistory,
    sink: Box<dyn AnalysisSink>,
    cooldown_remaining: u32,
}

impl Orchestrator {
    pub fn new(
        config: RunConfig,
        targets: TargetBook,
        history: ProcessedHistory,
        sink: Box<dyn AnalysisSink>,
    ) -> Self {
        let resolver = LocatorResolver::new(&config.resolver);
        Self {
            config,
            targets,
            resolver,
            history,
            sink,
            cooldown_remaining: 0,
        }
    }

    /// Processes `items` in order and always closes the session, including
    /// when `cancel` resolves first.
    pub async fn run<D, C>(
        &mut self,
        mut session: AutomationSession<D>,
        items: &[WorkItem],
        cancel: C,
    ) -> BatchReport
    where
        D: PageDriver,
        C: Future<Output = ()>,
    {
        let mut report = BatchReport::default();
        log::info!("📋 Processing {} work item(s)", items.len());

        let outcome = tokio::select! {
            result = self.process_batch(&mut session, items, &mut report) => result,
            _ = cancel => Err(RunError::Cancelled),
        };

        if let Err(e) = outcome {
            match e {
                RunError::Cancelled => {
                    log::warn!("🛑 Run cancelled");
                    report.cancelled = true;
                }
                ref other => log::error!("❌ Batch stopped: {}", other),
            }
            report.stopped = Some(e.to_string());
        }

        if let Err(e) = self.history.save().await {
            log::warn!("⚠️  Failed to save processed history: {:#}", e);
        }
        session.close().await;

        report.tally();
        log::info!(
            "📊 Batch done: {} completed, {} degraded, {} skipped, {} failed",
            report.totals.completed,
            report.totals.degraded,
            report.totals.skipped + report.totals.already_processed,
            report.totals.failed
        );
        report
    }

    /// Processes items in order. Only a dead browser ends the batch early.
    async fn process_batch<D: PageDriver>(
        &mut self,
        session: &mut AutomationSession<D>,
        items: &[WorkItem],
        report: &mut BatchReport,
    ) -> Result<(), RunError> {
        for (index, item) in items.iter().enumerate() {
            log::info!("🔖 [{}/{}] {} - {}", index + 1, items.len(), item.id, item.title);

            if self.config.skip_processed && self.history.contains(&item.id, &item.link) {
                log::info!("⏭️  {} already processed", item.id);
                let mut skipped = ItemReport::new(item);
                skipped.status = ItemStatus::AlreadyProcessed;
                report.items.push(skipped);
                continue;
            }

            let (item_report, fatal) = self.process_item(session, item).await;

            if matches!(item_report.status, ItemStatus::Completed | ItemStatus::Degraded) {
                let status = if item_report.status == ItemStatus::Completed {
                    "completed"
                } else {
                    "degraded"
                };
                self.history.mark(&item.id, &item.link, &item.title, status);
            }
            report.items.push(item_report);

            if let Some(e) = fatal {
                if !session.driver().is_alive().await {
                    log::error!("💀 Browser stopped responding after: {}", e);
                    return Err(RunError::Browser(BrowserError::ConnectionFailed(
                        "browser stopped responding".to_string(),
                    )));
                }
            }
        }
        Ok(())
    }

    /// Runs one item. The second value carries the error that failed the item, if any.
    pub async fn process_item<D: PageDriver>(
        &mut self,
        session: &mut AutomationSession<D>,
        item: &WorkItem,
    ) -> (ItemReport, Option<RunError>) {
        let started = Instant::now();
        let mut report = ItemReport::new(item);

        if self.cooldown_remaining > 0 {
            self.cooldown_remaining -= 1;
            log::warn!(
                "⏭️  Skipping {} after {} consecutive errors",
                item.id,
                session.errors().count()
            );
            report.skip(Step::WORKFLOW, "consecutive-error cooldown");
            report.status = ItemStatus::Skipped;
            if self.cooldown_remaining == 0 {
                session.errors_mut().reset();
            }
            return (report, None);
        }

        let outcome = self.run_workflow(session, item, &mut report).await;
        report.elapsed = started.elapsed();

        match outcome {
            Ok(()) => {
                report.status = match &report.handoff {
                    Some(Handoff::Full { .. }) => ItemStatus::Completed,
                    Some(Handoff::Degraded { .. }) => ItemStatus::Degraded,
                    None => ItemStatus::Failed,
                };
                session.enter(if report.status == ItemStatus::Failed {
                    Step::Failed
                } else {
                    Step::Done
                });
                (report, None)
            }
            Err(e) => {
                log::error!("❌ {} failed at {}: {}", item.id, session.current_step(), e);
                report.status = ItemStatus::Failed;
                report.error = Some(e.to_string());
                session.enter(Step::Failed);
                (report, Some(e))
            }
        }
    }

    /// Enters `step` and takes its before screenshot; returns the step start time.
    async fn begin<D: PageDriver>(
        &self,
        session: &mut AutomationSession<D>,
        item: &WorkItem,
        step: Step,
    ) -> Instant {
        session.enter(step);
        session
            .diagnostics()
            .screenshot(session.driver(), &format!("{}_{}_before", item.id, step))
            .await;
        Instant::now()
    }

    /// Records a step outcome. Returns false when the workflow must stop here,
    /// after marking the remaining steps skipped.
    async fn finish<D: PageDriver>(
        &mut self,
        session: &mut AutomationSession<D>,
        item: &WorkItem,
        report: &mut ItemReport,
        step: Step,
        status: StepStatus,
        detail: Option<String>,
        started: Instant,
    ) -> bool {
        session
            .diagnostics()
            .screenshot(session.driver(), &format!("{}_{}_after", item.id, step))
            .await;

        match status {
            StepStatus::Success => session.errors_mut().record_success(),
            StepStatus::Degraded | StepStatus::Fatal => {
                session.errors_mut().record_failure();
            }
            StepStatus::Skipped => {}
        }

        match status {
            StepStatus::Success => log::info!("✅ {} {}", item.id, step),
            StepStatus::Skipped => log::info!("⏭️  {} {} skipped", item.id, step),
            StepStatus::Degraded => log::warn!(
                "⚠️  {} {} degraded: {}",
                item.id,
                step,
                detail.as_deref().unwrap_or("")
            ),
            StepStatus::Fatal => log::error!(
                "❌ {} {} fatal: {}",
                item.id,
                step,
                detail.as_deref().unwrap_or("")
            ),
        }
        session
            .diagnostics()
            .record_step(&item.id, step.name(), status.name(), detail.clone());
        report.push(step, status, detail, started.elapsed());

        let tripped = session.errors().is_tripped();
        if tripped {
            log::warn!(
                "🚦 {} consecutive errors, skipping the rest of {} and the next {} item(s)",
                session.errors().count(),
                item.id,
                self.config.skip_cooldown_items
            );
            self.cooldown_remaining = self.config.skip_cooldown_items;
            if self.cooldown_remaining == 0 {
                session.errors_mut().reset();
            }
        }

        if status == StepStatus::Fatal {
            report.skip(step.following(), "previous step was fatal");
            return false;
        }
        if tripped {
            report.skip(step.following(), "consecutive-error threshold reached");
            return false;
        }
        true
    }

    /// The per-item state machine from NAVIGATE to HANDOFF
    async fn run_workflow<D: PageDriver>(
        &mut self,
        session: &mut AutomationSession<D>,
        item: &WorkItem,
        report: &mut ItemReport,
    ) -> Result<(), RunError> {
        let url = if item.link.is_empty() {
            self.config.credentials.url.clone()
        } else {
            item.link.clone()
        };

        // NAVIGATE
        let started = self.begin(session, item, Step::Navigate).await;
        match self.navigate(session, &url).await {
            Ok(attempts) => {
                let detail = Some(format!("{} attempt(s)", attempts));
                if !self
                    .finish(session, item, report, Step::Navigate, StepStatus::Success, detail, started)
                    .await
                {
                    return Ok(());
                }
            }
            Err(e) => {
                self.finish(session, item, report, Step::Navigate, StepStatus::Fatal, Some(e.to_string()), started)
                    .await;
                return Err(e);
            }
        }

        // AUTH_CHECK / AUTHENTICATE
        let started = self.begin(session, item, Step::AuthCheck).await;
        let needs_auth = match self.auth_required(session).await {
            Ok(needs_auth) => needs_auth,
            Err(e) => {
                self.finish(session, item, report, Step::AuthCheck, StepStatus::Fatal, Some(e.to_string()), started)
                    .await;
                return Err(e.into());
            }
        };
        let detail = Some(if needs_auth { "sign-in required" } else { "already signed in" }.to_string());
        if !self
            .finish(session, item, report, Step::AuthCheck, StepStatus::Success, detail, started)
            .await
        {
            return Ok(());
        }

        if needs_auth {
            let started = self.begin(session, item, Step::Authenticate).await;
            match self.authenticate(session).await {
                Ok(attempts) => {
                    let detail = Some(format!("{} attempt(s)", attempts));
                    if !self
                        .finish(session, item, report, Step::Authenticate, StepStatus::Success, detail, started)
                        .await
                    {
                        return Ok(());
                    }
                }
                Err(e) => {
                    self.finish(session, item, report, Step::Authenticate, StepStatus::Fatal, Some(e.to_string()), started)
                        .await;
                    return Err(e);
                }
            }
        } else {
            report.skip([Step::Authenticate], "already signed in");
        }

        // SCOPE_SELECT
        let started = self.begin(session, item, Step::ScopeSelect).await;
        let (status, detail) = match self.activate_pair(session, targets::SCOPE_CONTROL, targets::SCOPE_OPTION).await {
            Ok(()) => (StepStatus::Success, None),
            Err(reason) => (StepStatus::Degraded, Some(format!("{}; continuing with the default scope", reason))),
        };
        if !self
            .finish(session, item, report, Step::ScopeSelect, status, detail, started)
            .await
        {
            return Ok(());
        }

        // EXPORT_TRIGGER
        let started = self.begin(session, item, Step::ExportTrigger).await;
        let watch = ArtifactWatch::start(&self.config.artifact_dir, self.config.wait_policy()).await;
        let exported = self
            .activate_pair(session, targets::EXPORT_MENU, targets::EXPORT_ALL)
            .await;
        let (status, detail) = match &exported {
            Ok(()) => (StepStatus::Success, None),
            Err(reason) => (StepStatus::Degraded, Some(reason.clone())),
        };
        if !self
            .finish(session, item, report, Step::ExportTrigger, status, detail, started)
            .await
        {
            return Ok(());
        }

        // ARTIFACT_WAIT
        if exported.is_ok() {
            let started = self.begin(session, item, Step::ArtifactWait).await;
            let (status, detail) = match watch.wait().await {
                ArtifactWaitResult::Found { path, size_bytes, polls, .. } => {
                    let detail = format!("{} ({} bytes, {} polls)", path.display(), size_bytes, polls);
                    report.artifact = Some(path);
                    (StepStatus::Success, Some(detail))
                }
                ArtifactWaitResult::TimedOut { elapsed, polls } => (
                    StepStatus::Degraded,
                    Some(format!(
                        "no artifact after {:.1}s ({} polls)",
                        elapsed.as_secs_f64(),
                        polls
                    )),
                ),
            };
            if !self
                .finish(session, item, report, Step::ArtifactWait, status, detail, started)
                .await
            {
                return Ok(());
            }
        } else {
            report.skip([Step::ArtifactWait], "export was not triggered");
        }

        // HANDOFF
        let started = self.begin(session, item, Step::Handoff).await;
        let handoff = match &report.artifact {
            Some(path) => Handoff::Full {
                artifact: path.clone(),
            },
            None => Handoff::degraded_from(item),
        };
        let (status, detail) = match self.sink.deliver(item, &handoff).await {
            Ok(()) => {
                let mode = if handoff.is_degraded() { "degraded" } else { "full" };
                report.handoff = Some(handoff);
                (StepStatus::Success, Some(format!("{} hand-off", mode)))
            }
            Err(e) => (StepStatus::Degraded, Some(format!("hand-off failed: {:#}", e))),
        };
        self.finish(session, item, report, Step::Handoff, status, detail, started)
            .await;

        Ok(())
    }

    /// Loads `url` with bounded retries. Returns the attempt that succeeded.
    async fn navigate<D: PageDriver>(
        &self,
        session: &mut AutomationSession<D>,
        url: &str,
    ) -> Result<u32, RunError> {
        let attempts = self.config.navigate_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            session.note_attempt(Step::Navigate);
            match session
                .driver()
                .navigate(url, self.config.page_ready_timeout)
                .await
            {
                Ok(()) => return Ok(attempt),
                Err(e) => {
                    log::warn!("🔁 Navigation attempt {}/{} failed: {}", attempt, attempts, e);
                    last_error = e.to_string();
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.config.retry_backoff).await;
            }
        }

        Err(RunError::NavigationExhausted {
            url: url.to_string(),
            attempts,
            reason: last_error,
        })
    }

    /// Sign-in is required when the address looks like a sign-in page or a
    /// usable password field is present.
    async fn auth_required<D: PageDriver>(
        &self,
        session: &AutomationSession<D>,
    ) -> Result<bool, BrowserError> {
        let url = session.driver().current_url().await?.to_lowercase();
        if self
            .config
            .auth_url_patterns
            .iter()
            .any(|p| !p.is_empty() && url.contains(&p.to_lowercase()))
        {
            return Ok(true);
        }

        let password_fields = session
            .driver()
            .find_controls(&ControlQuery::Locator(Locator::new("input[type='password']")))
            .await?;
        Ok(password_fields.iter().any(|c| c.is_usable()))
    }

    /// Fills the sign-in form and submits it until the sign-in page goes away.
    /// 
    /// Fails straight away, with zero attempts, when no credentials are configured.
    async fn authenticate<D: PageDriver>(
        &self,
        session: &mut AutomationSession<D>,
    ) -> Result<u32, RunError> {
        let attempts = self.config.auth_attempts.max(1);
        let credentials = &self.config.credentials;
        if credentials.username.is_empty() || credentials.password.is_empty() {
            log::error!("❌ Sign-in required but no credentials are configured");
            return Err(RunError::AuthenticationExhausted { attempts: 0 });
        }

        for attempt in 1..=attempts {
            session.note_attempt(Step::Authenticate);

            let filled = self
                .resolve(session, targets::USERNAME, Action::Type(credentials.username.clone()))
                .await
                .success
                && self
                    .resolve(session, targets::PASSWORD, Action::Type(credentials.password.clone()))
                    .await
                    .success
                && self
                    .resolve(session, targets::SUBMIT, Action::Activate)
                    .await
                    .success;

            if filled && self.wait_signed_in(session).await? {
                return Ok(attempt);
            }

            log::warn!("🔁 Sign-in attempt {}/{} did not complete", attempt, attempts);
            if attempt < attempts {
                tokio::time::sleep(self.config.retry_backoff).await;
            }
        }

        Err(RunError::AuthenticationExhausted { attempts })
    }

    /// Polls until sign-in is no longer required or the page-ready timeout passes
    async fn wait_signed_in<D: PageDriver>(
        &self,
        session: &AutomationSession<D>,
    ) -> Result<bool, BrowserError> {
        let started = Instant::now();
        loop {
            if !self.auth_required(session).await? {
                return Ok(true);
            }
            if started.elapsed() >= self.config.page_ready_timeout {
                return Ok(false);
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    /// Activates `first`, then `second` among what it revealed.
    async fn activate_pair<D: PageDriver>(
        &self,
        session: &AutomationSession<D>,
        first: &str,
        second: &str,
    ) -> Result<(), String> {
        if !self.resolve(session, first, Action::Activate).await.success {
            return Err(format!("'{}' not activated", first));
        }
        if !self.resolve(session, second, Action::Activate).await.success {
            return Err(format!("'{}' not activated", second));
        }
        Ok(())
    }

    /// Resolves a named target and records locators found by the fallback tiers
    async fn resolve<D: PageDriver>(
        &self,
        session: &AutomationSession<D>,
        target_name: &str,
        action: Action,
    ) -> InteractionResult {
        let Some(target) = self.targets.get(target_name) else {
            let mut result = InteractionResult::new(target_name);
            result.push(InteractionAttempt::failure(
                None,
                target_name,
                "unknown target",
                Duration::ZERO,
            ));
            return result;
        };

        let ctx = ResolveContext {
            driver: session.driver(),
            diagnostics: session.diagnostics(),
            executor: &self.config.executor,
        };
        let result = self.resolver.resolve(&ctx, target, &action).await;

        // Controls found without a configured locator are learning candidates
        if result.success && result.tier != Some(Tier::KnownLocator) {
            if let Some(control) = &result.control {
                session
                    .diagnostics()
                    .record_learned(target_name, &control.suggested_locator());
            }
        }
        result
    }
}
