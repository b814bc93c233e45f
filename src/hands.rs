//! Action execution. An intent goes in, a plain result string comes out.
//!
//! Every branch converts its own failures into `"Error: …"` strings, so
//! nothing here can abort the conversation loop. Unrecognized code is
//! refused, never evaluated: the only things that run against the page are
//! the four classified primitives and a fixed set of read-only recipes.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use crate::channel::PageChannel;
use crate::types::{ActionIntent, SelectorKind};

static EXTRACT_SELECTOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"querySelector\(['"`]([^'"`]+)['"`]\)"#).expect("valid regex")
});
static STYLE_ASSIGN_QUERY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"querySelector\(['"`]([^'"`]+)['"`]\)\.style\.([A-Za-z][A-Za-z0-9]*)\s*=\s*['"`]([^'"`]*)['"`]"#,
    )
    .expect("valid regex")
});
static STYLE_ASSIGN_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"getElementById\(['"`]([^'"`]+)['"`]\)\.style\.([A-Za-z][A-Za-z0-9]*)\s*=\s*['"`]([^'"`]*)['"`]"#,
    )
    .expect("valid regex")
});
static FIRST_QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"['"`]([^'"`]+)['"`]"#).expect("valid regex"));

static HOVERCARD_USERS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"a[data-hovercard-type="user"]"#).expect("static selector")
});
static AVATAR_SHAPES: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"img[data-testid="avatar"], .avatar, a[data-hovercard-type="user"]"#)
        .expect("static selector")
});
static CONTRIBUTOR_LINKS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"a[href*="contributors"], a[href*="graphs/contributors"]"#)
        .expect("static selector")
});

/// Execute a classified intent against the page.
pub async fn execute(intent: &ActionIntent, page: &dyn PageChannel) -> String {
    match intent {
        ActionIntent::Click {
            selector,
            selector_type,
        } => execute_click(selector.as_deref(), *selector_type, page).await,
        ActionIntent::ModifyCss { css_code } => execute_css(css_code, page).await,
        ActionIntent::Navigate { url } => execute_navigation(url.as_deref(), page).await,
        ActionIntent::Extract { code } => execute_extract(code, page).await,
    }
}

/// Click resolution: exact lookup, then attribute-based alternates in a
/// fixed order, then a text scan across interactive elements.
async fn execute_click(
    selector: Option<&str>,
    selector_type: SelectorKind,
    page: &dyn PageChannel,
) -> String {
    let Some(selector) = selector else {
        return "Element not found: no selector could be extracted".to_string();
    };

    match page.click_matching(selector_type, selector).await {
        Ok(Some(tag)) => return format!("Successfully clicked element: {selector} ({tag})"),
        Ok(None) => {}
        Err(e) => return format!("Error: {e}"),
    }

    for alternate in alternate_selectors(selector) {
        match page.click_matching(SelectorKind::Query, &alternate).await {
            Ok(Some(tag)) => return format!("Successfully clicked element: {selector} ({tag})"),
            Ok(None) => continue,
            Err(e) => return format!("Error: {e}"),
        }
    }

    match page.click_by_text(selector).await {
        Ok(Some(tag)) => format!("Successfully clicked element: {selector} ({tag})"),
        Ok(None) => format!("Element not found: {selector}"),
        Err(e) => format!("Error: {e}"),
    }
}

fn alternate_selectors(selector: &str) -> Vec<String> {
    vec![
        format!(r#"[data-testid="{selector}"]"#),
        format!(r#"[aria-label="{selector}"]"#),
        format!(r#"[title="{selector}"]"#),
        format!(r#"button[value="{selector}"]"#),
        format!(r#"input[value="{selector}"]"#),
        format!(r#"a[href*="{selector}"]"#),
    ]
}

/// Three additive sub-modes selected by content shape. All of them append;
/// injected CSS is never replaced.
async fn execute_css(css_code: &str, page: &dyn PageChannel) -> String {
    if css_code.contains(".style.") {
        return apply_inline_styles(css_code, page).await;
    }

    if css_code.contains("insertRule") || css_code.contains("addRule") {
        let Some(rule) = FIRST_QUOTED
            .captures(css_code)
            .map(|captures| captures[1].to_string())
        else {
            return "Error: no CSS rule found to insert".to_string();
        };
        return match page.append_css(&rule).await {
            Ok(()) => format!("Added CSS rule: {rule}"),
            Err(e) => format!("Error: {e}"),
        };
    }

    match page.append_css(css_code).await {
        Ok(()) => format!("Added CSS: {css_code}"),
        Err(e) => format!("Error: {e}"),
    }
}

/// Only pattern-recognized `<lookup>.style.<property> = '<value>'`
/// assignments run; anything fancier is refused rather than evaluated.
async fn apply_inline_styles(css_code: &str, page: &dyn PageChannel) -> String {
    let mut assignments: Vec<(String, String, String)> = Vec::new();
    for captures in STYLE_ASSIGN_QUERY.captures_iter(css_code) {
        assignments.push((
            captures[1].to_string(),
            captures[2].to_string(),
            captures[3].to_string(),
        ));
    }
    for captures in STYLE_ASSIGN_ID.captures_iter(css_code) {
        assignments.push((
            format!("#{}", &captures[1]),
            captures[2].to_string(),
            captures[3].to_string(),
        ));
    }

    if assignments.is_empty() {
        return "Cannot apply style mutation: only simple property assignments are supported"
            .to_string();
    }

    let mut applied = 0usize;
    for (selector, property, value) in &assignments {
        match page.set_inline_style(selector, property, value).await {
            Ok(true) => applied += 1,
            Ok(false) => {}
            Err(e) => return format!("Error: {e}"),
        }
    }
    if applied == 0 {
        return format!("Element not found: {}", assignments[0].0);
    }
    "Applied direct CSS modification".to_string()
}

async fn execute_navigation(target: Option<&str>, page: &dyn PageChannel) -> String {
    let Some(target) = target else {
        return "Invalid or no URL specified for navigation".to_string();
    };

    if target.starts_with("http://") || target.starts_with("https://") {
        return match page.navigate(target).await {
            Ok(()) => format!("Navigating to: {target}"),
            Err(e) => format!("Error: {e}"),
        };
    }

    // Relative target: resolve against the current location.
    let base = match page.current_url().await {
        Ok(url) => url,
        Err(e) => return format!("Error: {e}"),
    };
    let resolved = match Url::parse(&base).and_then(|base| base.join(target)) {
        Ok(url) => url.to_string(),
        Err(e) => return format!("Error: cannot resolve URL {target}: {e}"),
    };
    match page.navigate(&resolved).await {
        Ok(()) => format!("Navigating to: {resolved}"),
        Err(e) => format!("Error: {e}"),
    }
}

async fn execute_extract(code: &str, page: &dyn PageChannel) -> String {
    let document = match page.page_info().await {
        Ok(document) => document,
        Err(e) => return format!("Error: {e}"),
    };
    run_extraction_recipes(code, &document.html)
}

/// The fixed, keyword-triggered recipe library, in priority order.
/// Intentionally a closed set: there is no registration mechanism, and the
/// fallback refuses anything unrecognized.
fn run_extraction_recipes(code: &str, html: &str) -> String {
    let document = Html::parse_document(html);

    // Generic selector + text dump.
    if code.contains("querySelector")
        && code.contains("textContent")
        && let Some(captures) = EXTRACT_SELECTOR.captures(code)
    {
        let raw = &captures[1];
        return match Selector::parse(raw) {
            Ok(selector) => {
                let texts: Vec<String> = document
                    .select(&selector)
                    .map(|element| element.text().collect::<String>().trim().to_string())
                    .filter(|text| !text.is_empty())
                    .collect();
                format!("Found {} elements: {}", texts.len(), to_json(&texts))
            }
            Err(e) => format!("Error: invalid selector {raw}: {e}"),
        };
    }

    // User hovercard links, de-duplicated.
    if code.contains(r#"data-hovercard-type="user""#) {
        let mut users = Vec::new();
        for link in document.select(&HOVERCARD_USERS) {
            let text = link.text().collect::<String>();
            let text = text.trim();
            let name = if text.is_empty() {
                link.value()
                    .attr("href")
                    .map(|href| href.trim_start_matches('/').to_string())
                    .unwrap_or_default()
            } else {
                text.to_string()
            };
            if !name.is_empty() {
                users.push(name);
            }
        }
        return format!("Found contributors: {}", to_json(&dedup(users)));
    }

    // Avatar / contributor harvesting across several selector shapes.
    if code.contains("contributors") || code.contains("avatars") {
        let mut contributors = Vec::new();
        for element in document.select(&AVATAR_SHAPES) {
            let name = element
                .value()
                .attr("alt")
                .filter(|alt| !alt.is_empty())
                .map(str::to_string)
                .or_else(|| {
                    let text = element.text().collect::<String>();
                    let text = text.trim();
                    (!text.is_empty()).then(|| text.to_string())
                })
                .or_else(|| {
                    element
                        .value()
                        .attr("href")
                        .and_then(|href| href.rsplit('/').next())
                        .map(str::to_string)
                });
            if let Some(name) = name
                && !name.is_empty()
                && name != "Avatar"
            {
                contributors.push(name);
            }
        }
        return format!("Found contributors: {}", to_json(&dedup(contributors)));
    }

    // Contributor-link discovery via href substring.
    if code.contains("href") && (code.contains("contributors") || code.contains("graphs")) {
        return match document.select(&CONTRIBUTOR_LINKS).next() {
            Some(link) => format!(
                "Found contributors link: {}",
                link.value().attr("href").unwrap_or_default()
            ),
            None => "No contributors link found".to_string(),
        };
    }

    let preview: String = code.chars().take(100).collect();
    format!(
        "Cannot execute code generically: only recognized read patterns are supported. \
         Code attempted: {preview}..."
    )
}

fn dedup(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

fn to_json(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_default()
}
