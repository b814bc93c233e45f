//! Cross-context dispatch. The privileged side of the agent never touches
//! the DOM directly: everything goes through [`PageChannel`] as an
//! asynchronous request/response message.
//!
//! The production implementation drives a CDP tab. Page-side behavior is
//! expressed as fixed JavaScript templates whose parameters are escaped
//! string literals — model-authored text is never spliced in as code.
//! Per-message timeouts belong to the CDP layer, not to this channel.

use std::sync::Arc;

use async_trait::async_trait;
use headless_chrome::Tab;

use crate::error::{AgentError, Result};
use crate::types::{PageDocument, SelectorKind};

/// Id of the stylesheet the executor appends injected CSS to.
pub const INJECTED_STYLE_ID: &str = "tabpilot-injected-styles";

#[async_trait]
pub trait PageChannel: Send + Sync {
    /// Current url, title and serialized HTML of the active page.
    async fn page_info(&self) -> Result<PageDocument>;

    /// Current location only, for relative navigation.
    async fn current_url(&self) -> Result<String>;

    /// Resolve one selector, flash it and dispatch a real click. Returns
    /// the resolved tag name, or `None` when nothing matched.
    async fn click_matching(
        &self,
        selector_type: SelectorKind,
        selector: &str,
    ) -> Result<Option<String>>;

    /// Scan interactive elements for one whose text contains `needle` and
    /// click it.
    async fn click_by_text(&self, needle: &str) -> Result<Option<String>>;

    /// Set a single inline style property on the first match. `false` when
    /// no element matched.
    async fn set_inline_style(&self, selector: &str, property: &str, value: &str) -> Result<bool>;

    /// Append CSS to the injected stylesheet, creating it on first use.
    async fn append_css(&self, css: &str) -> Result<()>;

    async fn navigate(&self, url: &str) -> Result<()>;
}

const CLICK_MATCHING_JS: &str = r#"
(() => {
  let el;
  try { el = __LOOKUP__; } catch (e) { return null; }
  if (!el) return null;
  el.scrollIntoView({ behavior: 'smooth', block: 'center' });
  const original = el.style.cssText;
  el.style.cssText += 'border: 3px solid red !important; background: yellow !important;';
  setTimeout(() => { el.style.cssText = original; }, 1000);
  el.click();
  return el.tagName;
})()
"#;

const CLICK_BY_TEXT_JS: &str = r#"
(() => {
  const needle = __NEEDLE__;
  const candidates = document.querySelectorAll('button, a, input[type="button"], input[type="submit"]');
  for (const el of candidates) {
    if ((el.textContent || '').includes(needle) || (el.innerText || '').includes(needle)) {
      el.scrollIntoView({ behavior: 'smooth', block: 'center' });
      const original = el.style.cssText;
      el.style.cssText += 'border: 3px solid red !important; background: yellow !important;';
      setTimeout(() => { el.style.cssText = original; }, 1000);
      el.click();
      return el.tagName;
    }
  }
  return null;
})()
"#;

const SET_STYLE_JS: &str = r#"
(() => {
  let el;
  try { el = document.querySelector(__SELECTOR__); } catch (e) { return false; }
  if (!el) return false;
  el.style[__PROPERTY__] = __VALUE__;
  return true;
})()
"#;

const APPEND_CSS_JS: &str = r#"
(() => {
  let style = document.getElementById('__STYLE_ID__');
  if (!style) {
    style = document.createElement('style');
    style.id = '__STYLE_ID__';
    document.head.appendChild(style);
  }
  style.textContent += __CSS__ + '\n';
  return true;
})()
"#;

/// Production channel over a live CDP tab. CDP calls are blocking, so each
/// request runs on the blocking thread pool.
pub struct CdpChannel {
    tab: Arc<Tab>,
}

impl CdpChannel {
    pub fn new(tab: Arc<Tab>) -> Self {
        Self { tab }
    }

    async fn blocking<T, F>(&self, job: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<Tab>) -> Result<T> + Send + 'static,
    {
        let tab = self.tab.clone();
        tokio::task::spawn_blocking(move || job(tab))
            .await
            .map_err(|e| AgentError::Browser(format!("tab task panicked: {e}")))?
    }

    async fn eval(&self, expression: String) -> Result<Option<serde_json::Value>> {
        self.blocking(move |tab| {
            let result = tab
                .evaluate(&expression, false)
                .map_err(|e| AgentError::ContentScript(e.to_string()))?;
            Ok(result.value)
        })
        .await
    }
}

#[async_trait]
impl PageChannel for CdpChannel {
    async fn page_info(&self) -> Result<PageDocument> {
        self.blocking(|tab| {
            let url = tab.get_url();
            let title = tab
                .get_title()
                .map_err(|e| AgentError::ContentScript(e.to_string()))?;
            let html = tab
                .get_content()
                .map_err(|e| AgentError::ContentScript(e.to_string()))?;
            Ok(PageDocument { url, title, html })
        })
        .await
    }

    async fn current_url(&self) -> Result<String> {
        self.blocking(|tab| Ok(tab.get_url())).await
    }

    async fn click_matching(
        &self,
        selector_type: SelectorKind,
        selector: &str,
    ) -> Result<Option<String>> {
        let expression =
            CLICK_MATCHING_JS.replace("__LOOKUP__", &lookup_expr(selector_type, selector));
        Ok(self
            .eval(expression)
            .await?
            .and_then(|value| value.as_str().map(String::from)))
    }

    async fn click_by_text(&self, needle: &str) -> Result<Option<String>> {
        let expression = CLICK_BY_TEXT_JS.replace("__NEEDLE__", &js_quote(needle));
        Ok(self
            .eval(expression)
            .await?
            .and_then(|value| value.as_str().map(String::from)))
    }

    async fn set_inline_style(&self, selector: &str, property: &str, value: &str) -> Result<bool> {
        let expression = SET_STYLE_JS
            .replace("__SELECTOR__", &js_quote(selector))
            .replace("__PROPERTY__", &js_quote(property))
            .replace("__VALUE__", &js_quote(value));
        Ok(self
            .eval(expression)
            .await?
            .and_then(|value| value.as_bool())
            .unwrap_or(false))
    }

    async fn append_css(&self, css: &str) -> Result<()> {
        let expression = APPEND_CSS_JS
            .replace("__STYLE_ID__", INJECTED_STYLE_ID)
            .replace("__CSS__", &js_quote(css));
        self.eval(expression).await?;
        Ok(())
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        let url = url.to_string();
        self.blocking(move |tab| {
            tab.navigate_to(&url)
                .map_err(|e| AgentError::Browser(e.to_string()))?;
            // A settled body is enough; SPAs keep loading after this.
            let _ = tab.wait_for_element("body");
            Ok(())
        })
        .await
    }
}

/// The DOM lookup the planner asked for, reproduced with the matching API.
fn lookup_expr(selector_type: SelectorKind, selector: &str) -> String {
    let quoted = js_quote(selector);
    match selector_type {
        SelectorKind::Id => format!("document.getElementById({quoted})"),
        SelectorKind::Class => format!("(document.getElementsByClassName({quoted})[0] || null)"),
        SelectorKind::Tag => format!("(document.getElementsByTagName({quoted})[0] || null)"),
        SelectorKind::Query => format!("document.querySelector({quoted})"),
    }
}

/// Quote `s` as a single-quoted JavaScript string literal.
fn js_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn js_quote_escapes_quotes_and_backslashes() {
        assert_eq!(js_quote("plain"), "'plain'");
        assert_eq!(js_quote("it's"), r"'it\'s'");
        assert_eq!(js_quote(r"a\b"), r"'a\\b'");
        assert_eq!(js_quote("line\nbreak"), r"'line\nbreak'");
    }

    #[test]
    fn lookup_expr_uses_the_matching_dom_api() {
        assert_eq!(
            lookup_expr(SelectorKind::Id, "submit"),
            "document.getElementById('submit')"
        );
        assert!(lookup_expr(SelectorKind::Class, "btn").contains("getElementsByClassName('btn')"));
        assert!(lookup_expr(SelectorKind::Tag, "a").contains("getElementsByTagName('a')"));
        assert_eq!(
            lookup_expr(SelectorKind::Query, ".x > li"),
            "document.querySelector('.x > li')"
        );
    }

    #[test]
    fn templates_substitute_every_placeholder() {
        let expression = CLICK_MATCHING_JS.replace("__LOOKUP__", &lookup_expr(SelectorKind::Query, "#a"));
        assert!(!expression.contains("__LOOKUP__"));
        let expression = APPEND_CSS_JS
            .replace("__STYLE_ID__", INJECTED_STYLE_ID)
            .replace("__CSS__", &js_quote("body { margin: 0 }"));
        assert!(!expression.contains("__STYLE_ID__"));
        assert!(!expression.contains("__CSS__"));
        assert!(expression.contains(INJECTED_STYLE_ID));
    }
}
