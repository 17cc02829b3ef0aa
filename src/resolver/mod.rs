//! Tiered locator resolution
//!
//! A [`LocatorResolver`] holds an ordered list of [`ResolutionStrategy`]
//! tiers. Tiers run in order and the first success ends the request; a tier
//! that cannot serve the requested action is skipped. Exhausting every tier
//! is an ordinary outcome: the returned [`InteractionResult`] is marked failed
//! and carries every attempt that was made.

mod exhaustive;
mod heuristic;
mod known;
mod script;

pub use exhaustive::ExhaustiveSearch;
pub use heuristic::HeuristicSearch;
pub use known::KnownLocators;
pub use script::InPageScript;

use crate::browser::driver::PageDriver;
use crate::control::{Action, InteractionResult, Tier};
use crate::diagnostics::Diagnostics;
use crate::executor::InteractionExecutor;
use crate::targets::TargetSpec;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Everything a tier needs to act on the live page.
pub struct ResolveContext<'a> {
    pub driver: &'a dyn PageDriver,
    pub diagnostics: &'a Diagnostics,
    pub executor: &'a InteractionExecutor,
}

#[async_trait]
pub trait ResolutionStrategy: Send + Sync {
    fn tier(&self) -> Tier;

    fn supports(&self, _action: &Action) -> bool {
        true
    }

    async fn attempt(
        &self,
        ctx: &ResolveContext<'_>,
        target: &TargetSpec,
        action: &Action,
    ) -> InteractionResult;
}

/// Bounds for the enumerating tiers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverSettings {
    /// Elements enumerated per category by the heuristic tier
    #[serde(default = "default_scan_limit")]
    pub scan_limit: usize,

    /// Elements the exhaustive tier will try
    #[serde(default = "default_exhaustive_limit")]
    pub exhaustive_limit: usize,

    /// Content length delta that counts as a page change
    #[serde(default = "default_material_change")]
    pub material_change_bytes: usize,

    /// Wait after each search-tier activation before checking for side effects
    #[serde(default = "default_side_effect_wait", with = "crate::control::duration_millis")]
    pub side_effect_wait: Duration,

    #[serde(default = "default_true")]
    pub exhaustive_enabled: bool,

    #[serde(default = "default_true")]
    pub script_enabled: bool,
}

fn default_scan_limit() -> usize {
    100
}

fn default_exhaustive_limit() -> usize {
    30
}

fn default_material_change() -> usize {
    1000
}

fn default_side_effect_wait() -> Duration {
    Duration::from_millis(1000)
}

fn default_true() -> bool {
    true
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            scan_limit: default_scan_limit(),
            exhaustive_limit: default_exhaustive_limit(),
            material_change_bytes: default_material_change(),
            side_effect_wait: default_side_effect_wait(),
            exhaustive_enabled: true,
            script_enabled: true,
        }
    }
}

pub struct LocatorResolver {
    strategies: Vec<Box<dyn ResolutionStrategy>>,
}

impl LocatorResolver {
    /// The four standard tiers in order; disabled tiers are left out.
    pub fn new(settings: &ResolverSettings) -> Self {
        let mut strategies: Vec<Box<dyn ResolutionStrategy>> = vec![
            Box::new(KnownLocators),
            Box::new(HeuristicSearch::new(settings)),
        ];
        if settings.exhaustive_enabled {
            strategies.push(Box::new(ExhaustiveSearch::new(settings)));
        }
        if settings.script_enabled {
            strategies.push(Box::new(InPageScript::new(settings)));
        }
        Self { strategies }
    }

    pub fn with_strategies(strategies: Vec<Box<dyn ResolutionStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn tiers(&self) -> Vec<Tier> {
        self.strategies.iter().map(|s| s.tier()).collect()
    }

    pub async fn resolve(
        &self,
        ctx: &ResolveContext<'_>,
        target: &TargetSpec,
        action: &Action,
    ) -> InteractionResult {
        let mut result = InteractionResult::new(&target.name);

        for strategy in &self.strategies {
            if !strategy.supports(action) {
                log::debug!(
                    "⏭️  {:?} does not support {} for '{}'",
                    strategy.tier(),
                    action.name(),
                    target.name
                );
                continue;
            }

            log::debug!("🔎 '{}' via {:?}", target.name, strategy.tier());
            let outcome = strategy.attempt(ctx, target, action).await;
            result.absorb(outcome);

            if result.success {
                log::info!(
                    "✅ '{}' resolved by {:?} with {}",
                    target.name,
                    strategy.tier(),
                    result.locator.as_deref().unwrap_or("?")
                );
                return result;
            }
        }

        log::warn!(
            "⚠️  '{}' unresolved after {} attempt(s)",
            target.name,
            result.attempts.len()
        );
        result
    }
}

/// Page state used to detect that an activation did something.
pub(crate) struct SideEffectProbe {
    url: String,
    content_len: usize,
}

impl SideEffectProbe {
    pub(crate) async fn capture(driver: &dyn PageDriver) -> Self {
        Self {
            url: driver.current_url().await.unwrap_or_default(),
            content_len: driver.page_content().await.map(|c| c.len()).unwrap_or(0),
        }
    }

    /// Describes the first side effect observed since capture, if any.
    pub(crate) async fn observe(
        &self,
        driver: &dyn PageDriver,
        keywords: &[String],
        material_change: usize,
    ) -> Option<String> {
        let url = driver.current_url().await.unwrap_or_default();
        if url != self.url {
            return Some(format!("url changed to {}", url));
        }

        let len = driver.page_content().await.map(|c| c.len()).unwrap_or(0);
        if len.abs_diff(self.content_len) > material_change {
            return Some(format!("content length {} -> {}", self.content_len, len));
        }

        if driver.is_text_visible(keywords).await.unwrap_or(false) {
            return Some("target keyword visible".to_string());
        }
        None
    }
}
