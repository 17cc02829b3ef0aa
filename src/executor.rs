//! Interaction methods for a resolved control
//!
//! Activation walks [`ActivationMethod::ORDER`] and stops at the first method
//! that completes without error; whether the click had the intended effect is
//! the caller's concern. Typing is verified by reading the value back.

use crate::browser::driver::PageDriver;
use crate::control::{Action, ActivationMethod, Control, InteractionAttempt, Tier};
use crate::diagnostics::Diagnostics;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Attempts made by one executor call and whether any verified.
#[derive(Debug, Clone)]
pub struct Execution {
    pub success: bool,
    pub attempts: Vec<InteractionAttempt>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionExecutor {
    /// Upper bound for a single interaction method
    #[serde(default = "default_method_timeout", with = "crate::control::duration_millis")]
    pub method_timeout: Duration,

    /// Pause after a successful activation before the after-screenshot
    #[serde(default = "default_settle", with = "crate::control::duration_millis")]
    pub settle: Duration,
}

fn default_method_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_settle() -> Duration {
    Duration::from_millis(500)
}

impl Default for InteractionExecutor {
    fn default() -> Self {
        Self {
            method_timeout: default_method_timeout(),
            settle: default_settle(),
        }
    }
}

fn method_name(method: ActivationMethod) -> &'static str {
    match method {
        ActivationMethod::Direct => "activate:direct",
        ActivationMethod::SyntheticEvents => "activate:synthetic_events",
        ActivationMethod::Programmatic => "activate:programmatic",
        ActivationMethod::KeyboardEnter => "activate:keyboard_enter",
    }
}

impl InteractionExecutor {
    pub async fn execute(
        &self,
        driver: &dyn PageDriver,
        diagnostics: &Diagnostics,
        label: &str,
        control: &Control,
        action: &Action,
        tier: Option<Tier>,
    ) -> Execution {
        let label = format!("{}_{}", label, action.name());
        diagnostics
            .screenshot(driver, &format!("{}_before", label))
            .await;

        let execution = match action {
            Action::Locate => Execution {
                success: true,
                attempts: Vec::new(),
            },
            Action::Activate => self.activate(driver, control, tier).await,
            Action::Type(text) => self.type_text(driver, control, text, tier).await,
        };

        if execution.success && !self.settle.is_zero() {
            tokio::time::sleep(self.settle).await;
        }
        diagnostics
            .screenshot(driver, &format!("{}_after", label))
            .await;
        execution
    }

    async fn activate(
        &self,
        driver: &dyn PageDriver,
        control: &Control,
        tier: Option<Tier>,
    ) -> Execution {
        let mut attempts = Vec::new();

        for method in ActivationMethod::ORDER {
            let started = Instant::now();
            let subject = method_name(method);
            let outcome = tokio::time::timeout(
                self.method_timeout,
                driver.activate(&control.reference, method),
            )
            .await;

            match outcome {
                Ok(Ok(())) => {
                    log::debug!("✓ {} on {}", subject, control.reference);
                    attempts.push(InteractionAttempt::success(tier, subject, started.elapsed()));
                    return Execution {
                        success: true,
                        attempts,
                    };
                }
                Ok(Err(e)) => {
                    log::debug!("✗ {} on {}: {}", subject, control.reference, e);
                    attempts.push(InteractionAttempt::failure(
                        tier,
                        subject,
                        e.to_string(),
                        started.elapsed(),
                    ));
                }
                Err(_) => {
                    log::debug!("⏱️  {} on {} timed out", subject, control.reference);
                    attempts.push(InteractionAttempt::timeout(tier, subject, started.elapsed()));
                }
            }
        }

        Execution {
            success: false,
            attempts,
        }
    }

    async fn type_text(
        &self,
        driver: &dyn PageDriver,
        control: &Control,
        text: &str,
        tier: Option<Tier>,
    ) -> Execution {
        let mut attempts = Vec::new();

        if !control.is_text_field() {
            attempts.push(InteractionAttempt::failure(
                tier,
                "type",
                format!("<{}> is not a text field", control.tag),
                Duration::ZERO,
            ));
            return Execution {
                success: false,
                attempts,
            };
        }

        for subject in ["type:clear_and_type", "type:set_value"] {
            let started = Instant::now();
            let reference = control.reference.as_str();
            let write = async {
                if subject == "type:clear_and_type" {
                    driver.clear_and_type(reference, text).await?;
                } else {
                    driver.set_value(reference, text).await?;
                }
                driver.read_value(reference).await
            };

            match tokio::time::timeout(self.method_timeout, write).await {
                Ok(Ok(read_back)) if read_back == text => {
                    attempts.push(InteractionAttempt::success(tier, subject, started.elapsed()));
                    return Execution {
                        success: true,
                        attempts,
                    };
                }
                Ok(Ok(read_back)) => {
                    // Never log the value itself, it may be a credential
                    attempts.push(InteractionAttempt::failure(
                        tier,
                        subject,
                        format!(
                            "read-back mismatch ({} chars, expected {})",
                            read_back.chars().count(),
                            text.chars().count()
                        ),
                        started.elapsed(),
                    ));
                }
                Ok(Err(e)) => attempts.push(InteractionAttempt::failure(
                    tier,
                    subject,
                    e.to_string(),
                    started.elapsed(),
                )),
                Err(_) => attempts.push(InteractionAttempt::timeout(tier, subject, started.elapsed())),
            }
        }

        Execution {
            success: false,
            attempts,
        }
    }
}
