use super::{ResolutionStrategy, ResolveContext};
use crate::browser::driver::ControlQuery;
use crate::control::{Action, InteractionAttempt, InteractionResult, Tier};
use crate::targets::TargetSpec;
use async_trait::async_trait;
use std::time::Instant;

/// Tier 1: the target's configured locators, in order.
pub struct KnownLocators;

#[async_trait]
impl ResolutionStrategy for KnownLocators {
    fn tier(&self) -> Tier {
        Tier::KnownLocator
    }

    async fn attempt(
        &self,
        ctx: &ResolveContext<'_>,
        target: &TargetSpec,
        action: &Action,
    ) -> InteractionResult {
        let tier = Some(Tier::KnownLocator);
        let mut result = InteractionResult::new(&target.name);

        for locator in target.locators.iter() {
            let started = Instant::now();
            let matches = match ctx.driver.find_controls(&ControlQuery::locator(locator)).await {
                Ok(matches) => matches,
                Err(e) => {
                    result.push(InteractionAttempt::failure(
                        tier,
                        locator.as_str(),
                        e.to_string(),
                        started.elapsed(),
                    ));
                    continue;
                }
            };

            let Some(control) = matches.iter().find(|c| c.is_usable()) else {
                let error = if matches.is_empty() {
                    "no match".to_string()
                } else {
                    format!("{} match(es), none visible and enabled", matches.len())
                };
                result.push(InteractionAttempt::failure(
                    tier,
                    locator.as_str(),
                    error,
                    started.elapsed(),
                ));
                continue;
            };

            result.push(InteractionAttempt::success(
                tier,
                locator.as_str(),
                started.elapsed(),
            ));

            let execution = ctx
                .executor
                .execute(ctx.driver, ctx.diagnostics, &target.name, control, action, tier)
                .await;
            result.attempts.extend(execution.attempts);

            if execution.success {
                result.succeed(Tier::KnownLocator, locator.as_str(), Some(control.clone()));
                return result;
            }
        }

        result
    }
}
