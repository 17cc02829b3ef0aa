use super::{ResolutionStrategy, ResolveContext, ResolverSettings, SideEffectProbe};
use crate::browser::driver::ControlQuery;
use crate::control::{Action, InteractionAttempt, InteractionResult, Tier};
use crate::targets::TargetSpec;
use async_trait::async_trait;
use std::time::{Duration, Instant};

/// Tier 3: click through a bounded list of clickable elements and accept the
/// first one that visibly changes the page.
pub struct ExhaustiveSearch {
    limit: usize,
    material_change: usize,
    wait: Duration,
}

impl ExhaustiveSearch {
    pub fn new(settings: &ResolverSettings) -> Self {
        Self {
            limit: settings.exhaustive_limit,
            material_change: settings.material_change_bytes,
            wait: settings.side_effect_wait,
        }
    }
}

#[async_trait]
impl ResolutionStrategy for ExhaustiveSearch {
    fn tier(&self) -> Tier {
        Tier::Exhaustive
    }

    fn supports(&self, action: &Action) -> bool {
        matches!(action, Action::Activate)
    }

    async fn attempt(
        &self,
        ctx: &ResolveContext<'_>,
        target: &TargetSpec,
        action: &Action,
    ) -> InteractionResult {
        let tier = Some(Tier::Exhaustive);
        let mut result = InteractionResult::new(&target.name);

        let started = Instant::now();
        let controls = match ctx
            .driver
            .find_controls(&ControlQuery::clickable(self.limit))
            .await
        {
            Ok(controls) => controls,
            Err(e) => {
                result.push(InteractionAttempt::failure(
                    tier,
                    "enumerate",
                    e.to_string(),
                    started.elapsed(),
                ));
                return result;
            }
        };

        let usable: Vec<_> = controls
            .into_iter()
            .filter(|c| c.is_usable())
            .take(self.limit)
            .collect();
        log::info!(
            "🔁 Exhaustive search for '{}' over {} element(s)",
            target.name,
            usable.len()
        );

        for control in usable {
            let started = Instant::now();
            let probe = SideEffectProbe::capture(ctx.driver).await;

            let execution = ctx
                .executor
                .execute(ctx.driver, ctx.diagnostics, &target.name, &control, action, tier)
                .await;
            if !execution.success {
                result.attempts.extend(execution.attempts);
                continue;
            }

            tokio::time::sleep(self.wait).await;
            match probe
                .observe(ctx.driver, &target.success_keywords, self.material_change)
                .await
            {
                Some(signal) => {
                    log::debug!("✓ {} -> {}", control.reference, signal);
                    result.push(InteractionAttempt::success(
                        tier,
                        format!("{} ({})", control.reference, signal),
                        started.elapsed(),
                    ));
                    let reference = control.reference.clone();
                    result.succeed(Tier::Exhaustive, reference, Some(control));
                    return result;
                }
                None => result.push(InteractionAttempt::failure(
                    tier,
                    control.reference.as_str(),
                    "no side effect",
                    started.elapsed(),
                )),
            }
        }

        result
    }
}
