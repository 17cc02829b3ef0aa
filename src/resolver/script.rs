use super::{ResolutionStrategy, ResolveContext, ResolverSettings, SideEffectProbe};
use crate::control::{Action, InteractionAttempt, InteractionResult, Tier};
use crate::rubric::ScoringRubric;
use crate::targets::TargetSpec;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::{Duration, Instant};

/// Tier 4: scan, score and click from inside the page.
///
/// The rubric travels to the page as JSON and is interpreted there, so the
/// scoring matches tier 2. Each candidate receives one mousedown, mouseup and
/// click sequence; success is a target keyword becoming
/// visible. Targets without keywords get one click on the best candidate,
/// judged by the same side-effect probe as tier 3.
pub struct InPageScript {
    material_change: usize,
    wait: Duration,
    scan_limit: usize,
}

impl InPageScript {
    pub fn new(settings: &ResolverSettings) -> Self {
        Self {
            material_change: settings.material_change_bytes,
            wait: settings.side_effect_wait,
            scan_limit: settings.scan_limit * 2,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ScriptReport {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    reference: Option<String>,
    #[serde(default)]
    tried: Vec<ScriptTry>,
}

#[derive(Debug, Deserialize)]
struct ScriptTry {
    reference: String,
    score: i32,
    #[serde(default)]
    error: Option<String>,
}

const INTERPRETER: &str = r#"
    const lower = (s) => String(s || '').toLowerCase();
    const anyIn = (hay, words) => words.some((w) => w && lower(hay).includes(lower(w)));
    const matches = (el, rule) => {
        const attr = (name) => el.getAttribute(name);
        switch (rule.kind) {
            case 'class_contains': return lower(attr('class')).split(/\s+/).some((t) => anyIn(t, rule.any));
            case 'text_contains': return anyIn(el.innerText || el.value || '', rule.any);
            case 'attribute_present': return attr(rule.name) !== null;
            case 'attribute_equals': return attr(rule.name) !== null && lower(attr(rule.name)) === lower(rule.value);
            case 'attribute_contains': return attr(rule.name) !== null && anyIn(attr(rule.name), rule.any);
            case 'markup_contains': return anyIn((el.outerHTML || '').slice(0, 300), rule.any);
            case 'tag_is': return rule.any.some((t) => lower(t) === el.tagName.toLowerCase());
            default: return false;
        }
    };
    const usable = (el) => {
        const r = el.getBoundingClientRect();
        const s = window.getComputedStyle(el);
        return r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none' && !el.disabled;
    };
    const xpath = (el) => {
        const parts = [];
        for (let n = el; n && n.nodeType === 1; n = n.parentElement) {
            let i = 1;
            for (let s = n.previousElementSibling; s; s = s.previousElementSibling) if (s.tagName === n.tagName) i++;
            parts.unshift(n.tagName.toLowerCase() + '[' + i + ']');
        }
        return '/' + parts.join('/');
    };
    const keywordVisible = () => {
        const text = (document.body && document.body.innerText) || '';
        return keywords.some((k) => k && text.includes(k));
    };
    const pause = (ms) => new Promise((r) => setTimeout(r, ms));
"#;

fn build_script(rubric: &ScoringRubric, keywords: &[String], scan_limit: usize, wait: Duration) -> String {
    let rubric = serde_json::to_string(rubric).unwrap_or_else(|_| "{\"rules\":[]}".into());
    let keywords = serde_json::to_string(keywords).unwrap_or_else(|_| "[]".into());
    let wait_ms = wait.as_millis();
    format!(
        r#"(async () => {{
    const rubric = {rubric};
    const keywords = {keywords};
{INTERPRETER}
    const selector = 'button, a, [role=button], [role=menuitem], [role=option], [onclick], [aria-haspopup], li, div[tabindex]';
    const scored = [];
    for (const el of Array.from(document.querySelectorAll(selector)).slice(0, {scan_limit})) {{
        if (!usable(el)) continue;
        let score = 0;
        for (const rule of rubric.rules) if (matches(el, rule)) score += rule.weight;
        if (score >= rubric.min_score) scored.push({{ el, score }});
    }}
    scored.sort((a, b) => b.score - a.score);
    const top = scored.slice(0, keywords.length > 0 ? rubric.top_n : 1);
    const tried = [];
    for (const {{ el, score }} of top) {{
        const reference = xpath(el);
        try {{
            el.scrollIntoView({{ block: 'center' }});
            for (const type of ['mousedown', 'mouseup', 'click']) {{
                el.dispatchEvent(new MouseEvent(type, {{ bubbles: true, cancelable: true, view: window }}));
            }}
        }} catch (e) {{
            tried.push({{ reference, score, error: String(e && e.message || e) }});
            continue;
        }}
        tried.push({{ reference, score }});
        if (keywords.length === 0) return {{ success: false, reference, tried }};
        await pause({wait_ms});
        if (keywordVisible()) return {{ success: true, reference, tried }};
    }}
    return {{ success: false, reference: null, tried }};
}})()"#
    )
}

#[async_trait]
impl ResolutionStrategy for InPageScript {
    fn tier(&self) -> Tier {
        Tier::InPageScript
    }

    fn supports(&self, action: &Action) -> bool {
        matches!(action, Action::Activate)
    }

    async fn attempt(
        &self,
        ctx: &ResolveContext<'_>,
        target: &TargetSpec,
        _action: &Action,
    ) -> InteractionResult {
        let tier = Some(Tier::InPageScript);
        let mut result = InteractionResult::new(&target.name);
        let started = Instant::now();

        let probe = if target.success_keywords.is_empty() {
            Some(SideEffectProbe::capture(ctx.driver).await)
        } else {
            None
        };

        ctx.diagnostics
            .screenshot(ctx.driver, &format!("{}_script_before", target.name))
            .await;
        let script = build_script(
            &target.rubric,
            &target.success_keywords,
            self.scan_limit,
            self.wait,
        );
        let raw = ctx.driver.evaluate(&script).await;
        ctx.diagnostics
            .screenshot(ctx.driver, &format!("{}_script_after", target.name))
            .await;

        let report = match raw.map(serde_json::from_value::<ScriptReport>) {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                result.push(InteractionAttempt::failure(
                    tier,
                    "in-page script",
                    format!("unexpected script result: {}", e),
                    started.elapsed(),
                ));
                return result;
            }
            Err(e) => {
                result.push(InteractionAttempt::failure(
                    tier,
                    "in-page script",
                    e.to_string(),
                    started.elapsed(),
                ));
                return result;
            }
        };

        for t in &report.tried {
            let subject = format!("{} [score {}]", t.reference, t.score);
            match &t.error {
                Some(error) => result.push(InteractionAttempt::failure(
                    tier,
                    subject,
                    error.as_str(),
                    started.elapsed(),
                )),
                None => result.push(InteractionAttempt::success(tier, subject, started.elapsed())),
            }
        }

        let Some(reference) = report.reference else {
            result.push(InteractionAttempt::failure(
                tier,
                "in-page script",
                format!("{} candidate(s) tried, none verified", report.tried.len()),
                started.elapsed(),
            ));
            return result;
        };

        if report.success {
            result.succeed(Tier::InPageScript, reference, None);
            return result;
        }

        if let Some(probe) = probe {
            tokio::time::sleep(self.wait).await;
            if let Some(signal) = probe
                .observe(ctx.driver, &target.success_keywords, self.material_change)
                .await
            {
                log::debug!("✓ in-page click on {} -> {}", reference, signal);
                result.succeed(Tier::InPageScript, reference, None);
                return result;
            }
        }

        result.push(InteractionAttempt::failure(
            tier,
            reference,
            "no side effect",
            started.elapsed(),
        ));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rubric::{Predicate, RubricRule};

    #[test]
    fn test_script_embeds_rubric_and_keywords() {
        let rubric = ScoringRubric::new(vec![RubricRule::new(
            Predicate::ClassContains {
                any: vec!["menu".into()],
            },
            3,
            "menu class",
        )]);
        let script = build_script(
            &rubric,
            &["Codelco".to_string()],
            200,
            Duration::from_millis(750),
        );
        assert!(script.contains(r#""kind":"class_contains""#));
        assert!(script.contains(r#"const keywords = ["Codelco"];"#));
        assert!(script.contains("slice(0, 200)"));
        assert!(script.contains("await pause(750)"));

        // One click per candidate so toggles stay open
        assert_eq!(script.matches("'click'").count(), 1);
        assert!(!script.contains(".click()"));
    }

    #[test]
    fn test_report_parses_partial_results() {
        let report: ScriptReport = serde_json::from_value(serde_json::json!({
            "success": false,
            "reference": null,
            "tried": [{"reference": "/html[1]/body[1]/button[1]", "score": 5, "error": "detached"}]
        }))
        .unwrap();
        assert!(!report.success);
        assert_eq!(report.tried.len(), 1);
        assert_eq!(report.tried[0].error.as_deref(), Some("detached"));
    }
}
