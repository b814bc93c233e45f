//! Page perception: turns the serialized DOM of the active tab into a
//! bounded [`PageSnapshot`] the model can afford to read.
//!
//! Everything here is pure over an HTML string. The caps from
//! [`crate::types`] are applied while harvesting, so no caller can blow the
//! context budget by forgetting to truncate.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Node, Selector};

use crate::types::{
    ClickableElement, FormElement, Heading, LinkElement, MAX_CLICKABLE_ELEMENTS, MAX_FORM_ELEMENTS,
    MAX_HEADINGS, MAX_HTML_PREVIEW_CHARS, MAX_LINKS, MAX_VISIBLE_TEXT_CHARS, PageSnapshot,
};

/// Ancestor-walk budget for selector generation. Past this many levels the
/// path is cut with a bare tag name so pathological trees still terminate.
const MAX_SELECTOR_DEPTH: usize = 10;

static CLICKABLE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"button, input[type="button"], input[type="submit"], a[href]"#)
        .expect("static selector")
});
static FORM_CONTROLS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("input, textarea, select").expect("static selector"));
static ANCHORS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("static selector"));
static HEADINGS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1, h2, h3, h4, h5, h6").expect("static selector"));
static BODY: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body").expect("static selector"));

/// Build a snapshot of the page. Never fails: a degenerate document yields
/// empty lists and an `error` note instead.
pub fn perceive(url: &str, title: &str, html: &str) -> PageSnapshot {
    let document = Html::parse_document(html);

    let mut snapshot = PageSnapshot {
        url: url.to_string(),
        title: title.to_string(),
        raw_html_preview: truncate_chars(html, MAX_HTML_PREVIEW_CHARS),
        ..PageSnapshot::default()
    };

    for element in document.select(&CLICKABLE).take(MAX_CLICKABLE_ELEMENTS) {
        snapshot.clickable_elements.push(ClickableElement {
            kind: element.value().name().to_ascii_lowercase(),
            text: labelled_text(&element),
            selector: selector_for(&element),
            href: attr_string(&element, "href"),
            id: attr_string(&element, "id"),
            classes: attr_string(&element, "class"),
        });
    }

    for element in document.select(&ANCHORS).take(MAX_LINKS) {
        snapshot.links.push(LinkElement {
            text: element_text(&element),
            href: element.value().attr("href").unwrap_or_default().to_string(),
            selector: selector_for(&element),
        });
    }

    for element in document.select(&FORM_CONTROLS).take(MAX_FORM_ELEMENTS) {
        let tag = element.value().name().to_ascii_lowercase();
        snapshot.form_elements.push(FormElement {
            kind: element
                .value()
                .attr("type")
                .map(str::to_string)
                .unwrap_or(tag),
            name: attr_string(&element, "name"),
            id: attr_string(&element, "id"),
            placeholder: attr_string(&element, "placeholder"),
            selector: selector_for(&element),
            value: attr_string(&element, "value"),
        });
    }

    for element in document.select(&HEADINGS).take(MAX_HEADINGS) {
        snapshot.headings.push(Heading {
            level: element.value().name().to_ascii_lowercase(),
            text: element_text(&element),
            selector: selector_for(&element),
        });
    }

    match document.select(&BODY).next() {
        Some(body) => snapshot.visible_text = visible_text(&body),
        None => snapshot.error = Some("document has no body".to_string()),
    }

    snapshot
}

/// Best-effort unique CSS path for one element.
///
/// Id selectors short-circuit the whole walk regardless of depth. An
/// element that is its parent's only child of that tag contributes a bare
/// tag segment; with same-tag siblings it contributes `tag:nth-of-type(k)`
/// with `k` 1-based.
pub fn selector_for(element: &ElementRef) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut node = *element;
    let mut depth = 0usize;

    loop {
        if let Some(id) = node.value().attr("id").filter(|id| !id.is_empty()) {
            parts.push(format!("#{id}"));
            break;
        }

        let tag = node.value().name().to_ascii_lowercase();
        if depth > MAX_SELECTOR_DEPTH {
            parts.push(tag);
            break;
        }
        if tag == "body" || tag == "html" {
            parts.push(tag);
            break;
        }
        let Some(parent) = node.parent().and_then(ElementRef::wrap) else {
            parts.push(tag);
            break;
        };

        let same_tag: Vec<ElementRef> = parent
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|child| child.value().name() == node.value().name())
            .collect();
        if same_tag.len() == 1 {
            parts.push(tag);
        } else {
            let position = same_tag
                .iter()
                .position(|child| std::ptr::eq(child.value(), node.value()))
                .unwrap_or(0)
                + 1;
            parts.push(format!("{tag}:nth-of-type({position})"));
        }

        node = parent;
        depth += 1;
    }

    parts.reverse();
    parts.join(" > ")
}

fn element_text(element: &ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Text for a clickable element, falling back through the attributes that
/// usually label icon-only controls.
fn labelled_text(element: &ElementRef) -> String {
    let text = element_text(element);
    if !text.is_empty() {
        return text;
    }
    for attr in ["value", "title", "aria-label"] {
        if let Some(label) = element.value().attr(attr)
            && !label.is_empty()
        {
            return label.to_string();
        }
    }
    String::new()
}

fn attr_string(element: &ElementRef, name: &str) -> Option<String> {
    element
        .value()
        .attr(name)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Capped sample of visible text, walking text nodes while skipping
/// script/style subtrees and inline-hidden elements.
fn visible_text(body: &ElementRef) -> String {
    let mut text = String::new();
    collect_visible_text(body, &mut text);
    truncate_chars(text.trim(), MAX_VISIBLE_TEXT_CHARS)
}

fn collect_visible_text(element: &ElementRef, out: &mut String) -> bool {
    for child in element.children() {
        if out.len() > MAX_VISIBLE_TEXT_CHARS {
            return false;
        }
        match child.value() {
            Node::Text(chunk) => {
                let piece = chunk.trim();
                if !piece.is_empty() {
                    out.push_str(piece);
                    out.push(' ');
                }
            }
            Node::Element(raw) => {
                if matches!(raw.name(), "script" | "style") {
                    continue;
                }
                if let Some(style) = raw.attr("style") {
                    let style: String = style.chars().filter(|c| !c.is_whitespace()).collect();
                    if style.contains("display:none") || style.contains("visibility:hidden") {
                        continue;
                    }
                }
                if let Some(child_ref) = ElementRef::wrap(child)
                    && !collect_visible_text(&child_ref, out)
                {
                    return false;
                }
            }
            _ => {}
        }
    }
    true
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_match<'a>(document: &'a Html, css: &str) -> ElementRef<'a> {
        let selector = Selector::parse(css).unwrap();
        document.select(&selector).next().unwrap()
    }

    #[test]
    fn id_selector_short_circuits_at_any_depth() {
        let html = r#"<div><div><div><div><span id="foo">deep</span></div></div></div></div>"#;
        let document = Html::parse_document(html);
        assert_eq!(selector_for(&first_match(&document, "#foo")), "#foo");
    }

    #[test]
    fn sibling_items_differ_only_in_nth_of_type_index() {
        let html = "<ul><li>one</li><li>two</li></ul>";
        let document = Html::parse_document(html);
        let selector = Selector::parse("li").unwrap();
        let selectors: Vec<String> = document
            .select(&selector)
            .map(|li| selector_for(&li))
            .collect();
        assert_eq!(selectors[0], "body > ul > li:nth-of-type(1)");
        assert_eq!(selectors[1], "body > ul > li:nth-of-type(2)");
    }

    #[test]
    fn only_child_gets_a_bare_tag_segment() {
        let html = "<div><p>alone</p></div>";
        let document = Html::parse_document(html);
        assert_eq!(selector_for(&first_match(&document, "p")), "body > div > p");
    }

    #[test]
    fn deeply_nested_element_terminates_with_a_bare_tag() {
        let mut html = String::from("<body>");
        for _ in 0..20 {
            html.push_str("<div><span>x</span>");
        }
        html.push_str("<em>leaf</em>");
        for _ in 0..20 {
            html.push_str("</div>");
        }
        html.push_str("</body>");
        let document = Html::parse_document(&html);
        let selector = selector_for(&first_match(&document, "em"));
        // The walk was cut: the path does not reach all the way to body.
        assert!(!selector.starts_with("body"));
        assert!(selector.ends_with("em"));
        assert!(selector.split(" > ").count() <= MAX_SELECTOR_DEPTH + 2);
    }

    #[test]
    fn snapshot_lists_never_exceed_their_caps() {
        let mut html = String::from("<body>");
        for i in 0..40 {
            html.push_str(&format!("<button>b{i}</button>"));
            html.push_str(&format!("<a href=\"/l{i}\">link {i}</a>"));
            html.push_str(&format!("<input name=\"f{i}\">"));
            html.push_str(&format!("<h2>heading {i}</h2>"));
        }
        html.push_str("</body>");
        let snapshot = perceive("https://example.com", "big", &html);
        assert_eq!(snapshot.clickable_elements.len(), MAX_CLICKABLE_ELEMENTS);
        assert_eq!(snapshot.links.len(), MAX_LINKS);
        assert_eq!(snapshot.form_elements.len(), MAX_FORM_ELEMENTS);
        assert_eq!(snapshot.headings.len(), MAX_HEADINGS);
    }

    #[test]
    fn visible_text_is_capped_and_skips_hidden_subtrees() {
        let mut html = String::from("<body><script>var secret = 1;</script>");
        html.push_str("<style>.x { color: red }</style>");
        html.push_str("<div style=\"display: none\">invisible</div>");
        for _ in 0..600 {
            html.push_str("<p>word here</p>");
        }
        html.push_str("</body>");
        let snapshot = perceive("https://example.com", "t", &html);
        assert!(snapshot.visible_text.chars().count() <= MAX_VISIBLE_TEXT_CHARS);
        assert!(!snapshot.visible_text.contains("secret"));
        assert!(!snapshot.visible_text.contains("color: red"));
        assert!(!snapshot.visible_text.contains("invisible"));
        assert!(snapshot.visible_text.contains("word here"));
    }

    #[test]
    fn clickable_text_falls_back_to_labelling_attributes() {
        let html = r#"<body><input type="submit" value="Send it"><button aria-label="Close"></button></body>"#;
        let snapshot = perceive("https://example.com", "t", html);
        let texts: Vec<&str> = snapshot
            .clickable_elements
            .iter()
            .map(|e| e.text.as_str())
            .collect();
        assert!(texts.contains(&"Send it"));
        assert!(texts.contains(&"Close"));
    }

    #[test]
    fn form_elements_record_type_and_placeholder() {
        let html = r#"<body><input type="email" placeholder="you@example.com" name="mail"><textarea></textarea></body>"#;
        let snapshot = perceive("https://example.com", "t", html);
        assert_eq!(snapshot.form_elements[0].kind, "email");
        assert_eq!(
            snapshot.form_elements[0].placeholder.as_deref(),
            Some("you@example.com")
        );
        assert_eq!(snapshot.form_elements[1].kind, "textarea");
    }

    #[test]
    fn raw_html_preview_is_truncated() {
        let html = format!("<body>{}</body>", "x".repeat(5000));
        let snapshot = perceive("https://example.com", "t", &html);
        assert_eq!(
            snapshot.raw_html_preview.chars().count(),
            MAX_HTML_PREVIEW_CHARS
        );
    }
}
