//! JavaScript evaluated inside the page by [`super::chrome::ChromeDriver`]
//!
//! Every script is a self-contained expression returning JSON. Nothing here
//! writes to the DOM except the element actions, and those only touch the
//! element they were given.

use super::driver::ControlQuery;
use crate::control::ControlCategory;
use crate::locator::LocatorKind;

/// Shared helpers: absolute XPath, category and descriptor for an element.
const PRELUDE: &str = r#"
const __xpath = (el) => {
    if (el === document.documentElement) return '/html[1]';
    const parts = [];
    let node = el;
    while (node && node.nodeType === 1) {
        let index = 1;
        let sib = node.previousElementSibling;
        while (sib) {
            if (sib.tagName === node.tagName) index++;
            sib = sib.previousElementSibling;
        }
        parts.unshift(node.tagName.toLowerCase() + '[' + index + ']');
        node = node.parentElement;
    }
    return '/' + parts.join('/');
};
const __category = (el) => {
    const tag = el.tagName.toLowerCase();
    const type = (el.getAttribute('type') || '').toLowerCase();
    const role = (el.getAttribute('role') || '').toLowerCase();
    if (tag === 'button' || role === 'button' || (tag === 'input' && ['submit', 'button', 'reset'].includes(type))) return 'button';
    if (tag === 'input' || tag === 'textarea' || tag === 'select') return 'input';
    if (tag === 'a' || role === 'link') return 'link';
    if (el.onclick || el.hasAttribute('onclick') || el.hasAttribute('aria-haspopup') || ['menuitem', 'option', 'menu', 'listbox'].includes(role)) return 'container';
    return 'other';
};
const __ATTRS = ['id', 'class', 'name', 'type', 'role', 'title', 'placeholder', 'value', 'href',
    'aria-label', 'aria-haspopup', 'aria-expanded', 'aria-disabled', 'data-testid'];
const __describe = (el, category) => {
    const rect = el.getBoundingClientRect();
    const style = window.getComputedStyle(el);
    const attributes = {};
    for (const name of __ATTRS) {
        const v = el.getAttribute(name);
        if (v !== null) attributes[name] = String(v).slice(0, 200);
    }
    const text = (el.innerText || el.value || el.textContent || '').trim().replace(/\s+/g, ' ').slice(0, 120);
    return {
        reference: __xpath(el),
        tag: el.tagName.toLowerCase(),
        category: category || __category(el),
        text,
        attributes,
        visible: rect.width > 0 && rect.height > 0 && style.visibility !== 'hidden' && style.display !== 'none',
        enabled: !el.disabled && el.getAttribute('aria-disabled') !== 'true',
        rect: { x: rect.x, y: rect.y, width: rect.width, height: rect.height },
        markup: (el.outerHTML || '').slice(0, 300),
    };
};
const __resolve = (ref) => document.evaluate(ref, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue;
"#;

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

fn category_selector(category: ControlCategory) -> &'static str {
    match category {
        ControlCategory::Button => {
            "button, input[type=submit], input[type=button], [role=button]"
        }
        ControlCategory::Container => {
            "[onclick]:not(button):not(a), [aria-haspopup]:not(button):not(a), [role=menuitem], [role=option], li[tabindex], div[tabindex]"
        }
        ControlCategory::Link => "a[href], [role=link]",
        ControlCategory::Input => {
            "input:not([type=hidden]):not([type=submit]):not([type=button]), textarea, select"
        }
        ControlCategory::Other => "[tabindex]",
    }
}

fn category_name(category: ControlCategory) -> &'static str {
    match category {
        ControlCategory::Button => "button",
        ControlCategory::Container => "container",
        ControlCategory::Link => "link",
        ControlCategory::Input => "input",
        ControlCategory::Other => "other",
    }
}

pub fn find_controls(query: &ControlQuery) -> String {
    let body = match query {
        ControlQuery::Locator(locator) => {
            let expr = js_string(locator.as_str());
            match locator.kind() {
                LocatorKind::XPath => format!(
                    r#"
    const out = [];
    let snap;
    try {{
        snap = document.evaluate({expr}, document, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
    }} catch (e) {{
        return {{ error: 'invalid xpath: ' + e.message }};
    }}
    for (let i = 0; i < snap.snapshotLength; i++) {{
        const el = snap.snapshotItem(i);
        if (el && el.nodeType === 1) out.push(__describe(el, null));
    }}
    return out;"#
                ),
                LocatorKind::Css => format!(
                    r#"
    let nodes;
    try {{
        nodes = document.querySelectorAll({expr});
    }} catch (e) {{
        return {{ error: 'invalid selector: ' + e.message }};
    }}
    return Array.from(nodes).map((el) => __describe(el, null));"#
                ),
            }
        }
        ControlQuery::Interactive {
            categories,
            per_category,
            class_keywords,
        } => {
            let groups: Vec<String> = categories
                .iter()
                .map(|c| {
                    format!(
                        "[{}, {}]",
                        js_string(category_selector(*c)),
                        js_string(category_name(*c))
                    )
                })
                .collect();
            let keywords = serde_json::to_string(class_keywords).unwrap_or_else(|_| "[]".into());
            format!(
                r#"
    const groups = [{groups}];
    const keywords = {keywords}.map((k) => k.toLowerCase());
    const limit = {per_category};
    const seen = new Set();
    const out = [];
    for (const [selector, category] of groups) {{
        let taken = 0;
        for (const el of document.querySelectorAll(selector)) {{
            if (taken >= limit) break;
            if (seen.has(el)) continue;
            if (keywords.length > 0) {{
                const cls = (el.getAttribute('class') || '').toLowerCase();
                if (!keywords.some((k) => cls.includes(k))) continue;
            }}
            seen.add(el);
            out.push(__describe(el, category));
            taken++;
        }}
    }}
    return out;"#,
                groups = groups.join(", "),
            )
        }
    };
    format!("(() => {{{PRELUDE}{body}\n}})()")
}

/// Wraps `body` so it runs with `el` bound to the referenced element.
/// Returns `{ok: true, value}` or `{ok: false, error}`.
pub fn with_element(reference: &str, body: &str) -> String {
    format!(
        r#"(() => {{{PRELUDE}
    const el = __resolve({reference});
    if (!el) return {{ ok: false, error: 'element not found' }};
    try {{
{body}
    }} catch (e) {{
        return {{ ok: false, error: String(e && e.message || e) }};
    }}
}})()"#,
        reference = js_string(reference),
    )
}

pub const SCROLL_AND_CENTER: &str = r#"
        el.scrollIntoView({ block: 'center', inline: 'center' });
        const r = el.getBoundingClientRect();
        return { ok: true, value: { x: r.x + r.width / 2, y: r.y + r.height / 2 } };"#;

pub const SYNTHETIC_EVENTS: &str = r#"
        el.scrollIntoView({ block: 'center' });
        for (const type of ['mousedown', 'mouseup', 'click']) {
            el.dispatchEvent(new MouseEvent(type, { bubbles: true, cancelable: true, view: window }));
        }
        return { ok: true };"#;

pub const PROGRAMMATIC_CLICK: &str = r#"
        el.click();
        return { ok: true };"#;

pub const FOCUS: &str = r#"
        el.scrollIntoView({ block: 'center' });
        el.focus();
        return { ok: true };"#;

pub const FOCUS_AND_CLEAR: &str = r#"
        el.scrollIntoView({ block: 'center' });
        el.focus();
        if ('value' in el) {
            el.value = '';
            el.dispatchEvent(new Event('input', { bubbles: true }));
        }
        return { ok: true };"#;

pub const READ_VALUE: &str = r#"
        return { ok: true, value: ('value' in el) ? String(el.value) : (el.textContent || '') };"#;

pub fn set_value(text: &str) -> String {
    format!(
        r#"
        const proto = el instanceof HTMLTextAreaElement ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype;
        const setter = Object.getOwnPropertyDescriptor(proto, 'value');
        if (setter && setter.set) setter.set.call(el, {text}); else el.value = {text};
        el.dispatchEvent(new Event('input', {{ bubbles: true }}));
        el.dispatchEvent(new Event('change', {{ bubbles: true }}));
        return {{ ok: true }};"#,
        text = js_string(text),
    )
}

pub fn text_visible(keywords: &[String]) -> String {
    let keywords = serde_json::to_string(keywords).unwrap_or_else(|_| "[]".into());
    format!(
        r#"(() => {{
    const text = (document.body && document.body.innerText) || '';
    return {keywords}.some((k) => k && text.includes(k));
}})()"#
    )
}

pub const READY_STATE: &str = "document.readyState";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::Locator;

    #[test]
    fn test_locator_query_embeds_escaped_expression() {
        let script = find_controls(&ControlQuery::Locator(Locator::new(
            "//button[contains(text(), \"Más\")]",
        )));
        assert!(script.contains("ORDERED_NODE_SNAPSHOT_TYPE"));
        assert!(script.contains(r#""//button[contains(text(), \"Más\")]""#));

        let css = find_controls(&ControlQuery::Locator(Locator::new("button.fd-menu")));
        assert!(css.contains("querySelectorAll(\"button.fd-menu\")"));
    }

    #[test]
    fn test_interactive_query_lists_categories_and_limit() {
        let script = find_controls(&ControlQuery::clickable(25));
        assert!(script.contains("\"button\""));
        assert!(script.contains("\"container\""));
        assert!(script.contains("\"link\""));
        assert!(!script.contains("\"input\"]"));
        assert!(script.contains("const limit = 25;"));
    }

    #[test]
    fn test_with_element_resolves_reference() {
        let script = with_element("/html[1]/body[1]/input[2]", READ_VALUE);
        assert!(script.contains("__resolve(\"/html[1]/body[1]/input[2]\")"));
        assert!(script.contains("element not found"));
    }
}
