//! HTML sanitization for feed text.
//!
//! Every text-bearing field of a decoded feed passes through [`sanitize`]
//! exactly once, at decode time, so the normalized model can be rendered
//! without re-sanitizing downstream.
//!
//! The policy is an allowlist in the spirit of a user-generated-content
//! policy: inline and block formatting, links, images and tables survive;
//! scripts, styles, embedded documents and form controls are dropped with
//! their content; any other element is unwrapped (its text is kept). Event
//! handler attributes and non-HTTP URLs are removed.

use lol_html::html_content::Element;
use lol_html::{doc_comments, element, HtmlRewriter, Settings};

use crate::util::strip_control_chars;

/// Upper bound on rewrite passes. Each pass that changes anything removes
/// markup, so real input settles in one or two passes.
const MAX_PASSES: usize = 32;

/// Elements removed together with everything inside them.
const DROPPED_TAGS: &[&str] = &[
    "applet", "base", "button", "canvas", "embed", "form", "frame", "frameset", "head", "iframe",
    "input", "link", "math", "meta", "noscript", "object", "option", "param", "script", "select",
    "style", "svg", "template", "textarea", "title",
];

/// Elements kept as-is (minus disallowed attributes).
const ALLOWED_TAGS: &[&str] = &[
    "a", "abbr", "acronym", "address", "article", "aside", "b", "bdi", "bdo", "big",
    "blockquote", "br", "caption", "center", "cite", "code", "col", "colgroup", "dd", "del",
    "details", "dfn", "div", "dl", "dt", "em", "figcaption", "figure", "h1", "h2", "h3", "h4",
    "h5", "h6", "hr", "i", "img", "ins", "kbd", "li", "mark", "ol", "p", "picture", "pre", "q",
    "rp", "rt", "ruby", "s", "samp", "section", "small", "span", "strike", "strong", "sub",
    "summary", "sup", "table", "tbody", "td", "tfoot", "th", "thead", "time", "tr", "tt", "u",
    "ul", "var", "wbr",
];

const ALLOWED_ATTRIBUTES: &[&str] = &[
    "alt", "cite", "colspan", "datetime", "dir", "height", "href", "lang", "reversed",
    "rowspan", "src", "start", "title", "width",
];

const URL_ATTRIBUTES: &[&str] = &["cite", "href", "src"];

/// Sanitizes a fragment of feed text.
///
/// Strips control characters, drops unsafe markup, keeps safe inline HTML and
/// trims surrounding whitespace. Entity references in text are left alone.
///
/// The function is idempotent: `sanitize(&sanitize(x)) == sanitize(x)`.
///
/// # Examples
///
/// ```
/// use feedsift::sanitize::sanitize;
///
/// assert_eq!(sanitize("  <b>Hello</b><script>alert(1)</script> "), "<b>Hello</b>");
/// assert_eq!(sanitize("Ben &amp; Jerry"), "Ben &amp; Jerry");
/// ```
pub fn sanitize(text: &str) -> String {
    let mut current = strip_control_chars(text).trim().to_owned();

    for _ in 0..MAX_PASSES {
        if !current.contains('<') {
            return current;
        }
        let next = match rewrite_once(&current) {
            Ok(out) => out.trim().to_owned(),
            Err(e) => {
                tracing::debug!(error = %e, "HTML rewriter rejected feed text, escaping markup");
                return current.replace('<', "&lt;").replace('>', "&gt;");
            }
        };
        if next == current {
            return current;
        }
        current = next;
    }

    tracing::warn!(
        passes = MAX_PASSES,
        "Sanitizer did not settle, escaping remaining markup"
    );
    current.replace('<', "&lt;").replace('>', "&gt;")
}

fn rewrite_once(html: &str) -> Result<String, lol_html::errors::RewritingError> {
    let mut output = Vec::with_capacity(html.len());
    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: vec![element!("*", |el| {
                scrub_element(el);
                Ok(())
            })],
            document_content_handlers: vec![doc_comments!(|c| {
                c.remove();
                Ok(())
            })],
            ..Default::default()
        },
        |c: &[u8]| output.extend_from_slice(c),
    );

    rewriter.write(html.as_bytes())?;
    rewriter.end()?;

    Ok(String::from_utf8_lossy(&output).into_owned())
}

fn scrub_element(el: &mut Element<'_, '_>) {
    let tag = el.tag_name().to_ascii_lowercase();

    if DROPPED_TAGS.contains(&tag.as_str()) {
        el.remove();
        return;
    }
    if !ALLOWED_TAGS.contains(&tag.as_str()) {
        el.remove_and_keep_content();
        return;
    }

    let rejected: Vec<String> = el
        .attributes()
        .iter()
        .filter(|attr| !is_allowed_attribute(&attr.name(), &attr.value()))
        .map(|attr| attr.name())
        .collect();
    for name in rejected {
        el.remove_attribute(&name);
    }
}

fn is_allowed_attribute(name: &str, value: &str) -> bool {
    let name = name.to_ascii_lowercase();
    if !ALLOWED_ATTRIBUTES.contains(&name.as_str()) {
        return false;
    }
    if URL_ATTRIBUTES.contains(&name.as_str()) {
        return is_safe_url(value);
    }
    true
}

/// Accepts relative URLs and absolute http, https and mailto URLs.
fn is_safe_url(value: &str) -> bool {
    let compact: String = value
        .chars()
        .filter(|c| !c.is_ascii_whitespace() && !c.is_ascii_control())
        .collect();

    // Encoded characters could smuggle a scheme past the check below.
    if compact.contains("&#") || compact.to_ascii_lowercase().contains("&colon") {
        return false;
    }

    match compact.find([':', '/', '?', '#']) {
        Some(idx) if compact[idx..].starts_with(':') => {
            let scheme = compact[..idx].to_ascii_lowercase();
            matches!(scheme.as_str(), "http" | "https" | "mailto")
        }
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_plain_text_untouched() {
        assert_eq!(sanitize("Release notes for 2.0"), "Release notes for 2.0");
    }

    #[test]
    fn test_trims_whitespace() {
        assert_eq!(sanitize("\n\t  Padded title  \n"), "Padded title");
    }

    #[test]
    fn test_safe_inline_html_kept() {
        let input = r#"<p>Read <a href="https://example.com/post">the <em>post</em></a></p>"#;
        assert_eq!(sanitize(input), input);
    }

    #[test]
    fn test_script_removed_with_content() {
        assert_eq!(
            sanitize("<p>hi</p><script>alert('x')</script>"),
            "<p>hi</p>"
        );
    }

    #[test]
    fn test_style_and_iframe_removed() {
        let out = sanitize(r#"<style>p{}</style>text<iframe src="https://evil.example"></iframe>"#);
        assert_eq!(out, "text");
    }

    #[test]
    fn test_event_handler_attributes_removed() {
        let out = sanitize(r#"<img src="https://example.com/a.png" onerror="alert(1)">"#);
        assert!(!out.contains("onerror"));
        assert!(out.contains(r#"src="https://example.com/a.png""#));
    }

    #[test]
    fn test_javascript_href_removed() {
        let out = sanitize(r#"<a href="javascript:alert(1)">click</a>"#);
        assert!(!out.to_ascii_lowercase().contains("javascript"));
        assert!(out.contains("click"));
    }

    #[test]
    fn test_entity_encoded_scheme_removed() {
        let out = sanitize(r#"<a href="javascript&#58;alert(1)">click</a>"#);
        assert!(!out.contains("javascript"));
    }

    #[test]
    fn test_unknown_elements_unwrapped() {
        assert_eq!(sanitize("<custom-widget>kept text</custom-widget>"), "kept text");
    }

    #[test]
    fn test_comments_removed() {
        assert_eq!(sanitize("before<!-- hidden -->after"), "beforeafter");
    }

    #[test]
    fn test_less_than_in_text_survives() {
        assert_eq!(sanitize("a < b and c > d"), "a < b and c > d");
    }

    #[test]
    fn test_nested_script_obfuscation_does_not_survive() {
        let out = sanitize("<<script></script>script>alert(1)</script>");
        assert!(!out.contains("<script"));
    }

    #[test]
    fn test_control_chars_stripped() {
        assert_eq!(sanitize("Evil\x1b[31m title\x07"), "Evil title");
    }

    #[test]
    fn test_relative_and_mailto_urls_allowed() {
        assert!(is_safe_url("/posts/1"));
        assert!(is_safe_url("../img/a.png"));
        assert!(is_safe_url("mailto:someone@example.com"));
        assert!(is_safe_url("https://example.com/?q=a:b"));
        assert!(!is_safe_url("data:text/html;base64,AAAA"));
        assert!(!is_safe_url(" java\tscript:alert(1)"));
    }

    proptest! {
        #[test]
        fn prop_sanitize_is_idempotent(
            s in "(<(script|b|a|img|p|style|x-y)( on[a-z]{1,4}=x| href=\"javascript:x\"| src=\"/a\")?>|</(script|b|p|a)>|<!--|-->|[a-z <>&;#]){0,24}"
        ) {
            let once = sanitize(&s);
            let twice = sanitize(&once);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_sanitized_output_has_no_script_tags(
            s in "(<script>|</script>|<b>|[a-z <>]){0,24}"
        ) {
            prop_assert!(!sanitize(&s).to_ascii_lowercase().contains("<script>"));
        }
    }
}
