//! Heuristic classification of planner-authored code strings.
//!
//! The input nominally looks like a DOM-scripting snippet, but it is never
//! executed. An ordered rule table maps it onto one of the four action
//! intents; the first matching rule wins, so the order encodes priority.
//! Classification cannot fail: the last rule accepts anything as opaque
//! extraction input.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::{ActionIntent, SelectorKind};

static QUERY_SELECTOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"querySelector\(['"`]([^'"`]+)['"`]\)"#).expect("valid regex")
});
static GET_BY_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"getElementById\(['"`]([^'"`]+)['"`]\)"#).expect("valid regex")
});
static GET_BY_CLASS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"getElementsByClassName\(['"`]([^'"`]+)['"`]\)"#).expect("valid regex")
});
static GET_BY_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"getElementsByTagName\(['"`]([^'"`]+)['"`]\)"#).expect("valid regex")
});
static LOCATION_ASSIGN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:window\.location\.href|location\.href)\s*=\s*['"`]([^'"`]+)['"`]"#)
        .expect("valid regex")
});
static HREF_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"href\s*:\s*['"`]([^'"`]+)['"`]"#).expect("valid regex"));
static QUOTED_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"['"`](https?://[^'"`]+)['"`]"#).expect("valid regex"));

struct Rule {
    name: &'static str,
    applies: fn(&str) -> bool,
    build: fn(&str) -> ActionIntent,
}

/// First match wins. Iteration and bulk-query markers are checked before
/// click markers because extraction snippets often mention "click" in
/// passing; the final rule is the guaranteed fallback.
static RULES: &[Rule] = &[
    Rule {
        name: "extract-query",
        applies: is_bulk_query,
        build: build_extract,
    },
    Rule {
        name: "click",
        applies: is_click,
        build: build_click,
    },
    Rule {
        name: "modify-css",
        applies: is_style_mutation,
        build: build_modify_css,
    },
    Rule {
        name: "navigate",
        applies: is_navigation,
        build: build_navigate,
    },
    Rule {
        name: "extract-fallback",
        applies: |_| true,
        build: build_extract,
    },
];

/// Map a free-form code string to a typed action intent.
pub fn classify(code: &str) -> ActionIntent {
    let rule = RULES
        .iter()
        .find(|rule| (rule.applies)(code))
        .expect("fallback rule always applies");
    tracing::debug!(rule = rule.name, "classified planner code");
    (rule.build)(code)
}

fn is_bulk_query(code: &str) -> bool {
    code.contains("querySelectorAll")
        || code.contains("forEach")
        || code.contains("textContent")
        || code.contains("getAttribute")
        || code.contains("data-hovercard-type")
        || code.contains("contributors")
        || (code.contains("Array.from") && !code.contains(".click()"))
}

fn is_click(code: &str) -> bool {
    code.contains(".click()") || code.to_lowercase().contains("click")
}

fn is_style_mutation(code: &str) -> bool {
    code.contains(".style.") || code.contains("insertRule") || code.contains("addRule")
}

fn is_navigation(code: &str) -> bool {
    code.contains("window.location") || code.contains("location.href") || code.contains(".href")
}

fn build_click(code: &str) -> ActionIntent {
    let selector = QUERY_SELECTOR
        .captures(code)
        .or_else(|| GET_BY_ID.captures(code))
        .or_else(|| GET_BY_CLASS.captures(code))
        .or_else(|| GET_BY_TAG.captures(code))
        .map(|captures| captures[1].to_string());
    let selector_type = if code.contains("getElementById") {
        SelectorKind::Id
    } else if code.contains("getElementsByClassName") {
        SelectorKind::Class
    } else if code.contains("getElementsByTagName") {
        SelectorKind::Tag
    } else {
        SelectorKind::Query
    };
    ActionIntent::Click {
        selector,
        selector_type,
    }
}

fn build_modify_css(code: &str) -> ActionIntent {
    ActionIntent::ModifyCss {
        css_code: code.to_string(),
    }
}

fn build_navigate(code: &str) -> ActionIntent {
    let url = LOCATION_ASSIGN
        .captures(code)
        .or_else(|| HREF_KEY.captures(code))
        .or_else(|| QUOTED_URL.captures(code))
        .map(|captures| captures[1].to_string());
    ActionIntent::Navigate { url }
}

fn build_extract(code: &str) -> ActionIntent {
    ActionIntent::Extract {
        code: code.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_selector_click_classifies_as_click() {
        let intent = classify("document.querySelector('.x').click()");
        assert_eq!(
            intent,
            ActionIntent::Click {
                selector: Some(".x".to_string()),
                selector_type: SelectorKind::Query,
            }
        );
    }

    #[test]
    fn get_element_by_id_click_records_id_lookup() {
        let intent = classify("document.getElementById('submit-btn').click()");
        assert_eq!(
            intent,
            ActionIntent::Click {
                selector: Some("submit-btn".to_string()),
                selector_type: SelectorKind::Id,
            }
        );
    }

    #[test]
    fn click_without_recognizable_lookup_keeps_no_selector() {
        let intent = classify("please click the thing");
        assert_eq!(
            intent,
            ActionIntent::Click {
                selector: None,
                selector_type: SelectorKind::Query,
            }
        );
    }

    #[test]
    fn bulk_query_beats_click_marker() {
        // Mentions click, but iterates — the extraction rule must win.
        let intent = classify(
            "document.querySelectorAll('a').forEach(a => console.log(a.textContent)) // then click",
        );
        assert!(matches!(intent, ActionIntent::Extract { .. }));
    }

    #[test]
    fn array_from_without_click_is_extraction() {
        let intent = classify("Array.from(document.images)");
        assert!(matches!(intent, ActionIntent::Extract { .. }));
    }

    #[test]
    fn array_from_with_direct_click_is_a_click() {
        let intent = classify("Array.from(x); document.querySelector('#b').click()");
        assert!(matches!(intent, ActionIntent::Click { .. }));
    }

    #[test]
    fn style_mutation_classifies_as_modify_css() {
        let intent = classify("document.querySelector('body').style.background = 'black'");
        assert!(matches!(intent, ActionIntent::ModifyCss { .. }));
    }

    #[test]
    fn location_assignment_extracts_the_url() {
        let intent = classify("window.location.href = \"https://a.com/x\"");
        assert_eq!(
            intent,
            ActionIntent::Navigate {
                url: Some("https://a.com/x".to_string()),
            }
        );
    }

    #[test]
    fn href_key_and_bare_url_are_fallback_extractors() {
        let intent = classify("window.location = { href: '/docs' }");
        assert_eq!(
            intent,
            ActionIntent::Navigate {
                url: Some("/docs".to_string()),
            }
        );
        let intent = classify("window.location.assign('https://b.org/page')");
        assert_eq!(
            intent,
            ActionIntent::Navigate {
                url: Some("https://b.org/page".to_string()),
            }
        );
    }

    #[test]
    fn anything_else_falls_back_to_extraction() {
        let intent = classify("alert('hello')");
        assert_eq!(
            intent,
            ActionIntent::Extract {
                code: "alert('hello')".to_string(),
            }
        );
    }
}
