use super::{ResolutionStrategy, ResolveContext, ResolverSettings, SideEffectProbe};
use crate::browser::driver::ControlQuery;
use crate::control::{Action, InteractionAttempt, InteractionResult, Tier};
use crate::targets::TargetSpec;
use async_trait::async_trait;
use std::time::{Duration, Instant};

/// Tier 2: score every interactive element with the target's rubric and try
/// the best few. An activation only counts once the page visibly reacts.
pub struct HeuristicSearch {
    scan_limit: usize,
    material_change: usize,
    wait: Duration,
}

impl HeuristicSearch {
    pub fn new(settings: &ResolverSettings) -> Self {
        Self {
            scan_limit: settings.scan_limit,
            material_change: settings.material_change_bytes,
            wait: settings.side_effect_wait,
        }
    }
}

#[async_trait]
impl ResolutionStrategy for HeuristicSearch {
    fn tier(&self) -> Tier {
        Tier::HeuristicSearch
    }

    async fn attempt(
        &self,
        ctx: &ResolveContext<'_>,
        target: &TargetSpec,
        action: &Action,
    ) -> InteractionResult {
        let tier = Some(Tier::HeuristicSearch);
        let mut result = InteractionResult::new(&target.name);

        if target.rubric.rules.is_empty() {
            result.push(InteractionAttempt::failure(
                tier,
                "rubric",
                "no scoring rules for target",
                Duration::ZERO,
            ));
            return result;
        }

        let started = Instant::now();
        let controls = match ctx
            .driver
            .find_controls(&ControlQuery::all_interactive(self.scan_limit))
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

        let typing = matches!(action, Action::Type(_));
        let candidates = target
            .rubric
            .rank(controls.iter().filter(|c| !typing || c.is_text_field()));

        if candidates.is_empty() {
            result.push(InteractionAttempt::failure(
                tier,
                "rank",
                format!(
                    "no candidate among {} controls scored {} or more",
                    controls.len(),
                    target.rubric.min_score
                ),
                started.elapsed(),
            ));
            return result;
        }

        for candidate in candidates {
            log::debug!(
                "🎯 '{}' candidate {} score {} ({})",
                target.name,
                candidate.control.reference,
                candidate.score,
                candidate.reasons.join(", ")
            );
            let subject = format!(
                "{} [score {}: {}]",
                candidate.control.reference,
                candidate.score,
                candidate.reasons.join(", ")
            );
            result.push(InteractionAttempt::success(tier, subject, started.elapsed()));

            let probe = if matches!(action, Action::Activate) {
                Some(SideEffectProbe::capture(ctx.driver).await)
            } else {
                None
            };

            let execution = ctx
                .executor
                .execute(
                    ctx.driver,
                    ctx.diagnostics,
                    &target.name,
                    &candidate.control,
                    action,
                    tier,
                )
                .await;
            result.attempts.extend(execution.attempts);
            if !execution.success {
                continue;
            }

            if let Some(probe) = probe {
                let tried = Instant::now();
                tokio::time::sleep(self.wait).await;
                match probe
                    .observe(ctx.driver, &target.success_keywords, self.material_change)
                    .await
                {
                    Some(signal) => {
                        log::debug!("✓ {} -> {}", candidate.control.reference, signal);
                        result.push(InteractionAttempt::success(
                            tier,
                            format!("{} ({})", candidate.control.reference, signal),
                            tried.elapsed(),
                        ));
                    }
                    None => {
                        result.push(InteractionAttempt::failure(
                            tier,
                            candidate.control.reference.as_str(),
                            "no side effect",
                            tried.elapsed(),
                        ));
                        continue;
                    }
                }
            }

            let reference = candidate.control.reference.clone();
            result.succeed(Tier::HeuristicSearch, reference, Some(candidate.control));
            return result;
        }

        result
    }
}
