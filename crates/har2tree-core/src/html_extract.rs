//! Extraction of every URL-bearing location from an HTML body: tag
//! attributes, CSS `url(...)`, inline-JS location writes, meta-refresh, and
//! (optionally) a full-text URL regex fallback.

use std::collections::{HashMap, HashSet};

use regex::Regex;
use scraper::{Html, Selector};
use std::sync::OnceLock;

use crate::url_rebuild::rebuild_url;

/// Resolved sub-resource URLs, grouped by the category that produced them.
pub type ExternalResources = HashMap<&'static str, Vec<String>>;

struct TagRule {
    tag: &'static str,
    attrs: &'static [&'static str],
    category: &'static str,
}

const TAG_RULES: &[TagRule] = &[
    TagRule { tag: "img", attrs: &["src", "srcset", "longdesc"], category: "img" },
    TagRule { tag: "script", attrs: &["src"], category: "script" },
    TagRule { tag: "video", attrs: &["src", "poster"], category: "video" },
    TagRule { tag: "audio", attrs: &["src"], category: "audio" },
    TagRule { tag: "iframe", attrs: &["src"], category: "iframe" },
    TagRule { tag: "embed", attrs: &["src"], category: "embed" },
    TagRule { tag: "source", attrs: &["src", "srcset"], category: "source" },
    TagRule { tag: "link", attrs: &["href"], category: "link" },
    TagRule { tag: "object", attrs: &["data"], category: "object" },
];

fn css_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"url\((.*?)\)").unwrap())
}

fn inline_js_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?:window|self|top)\.location[^"]*"(.*?)""#).unwrap()
    })
}

fn full_text_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:https?:)?//(?:[A-Za-z0-9]|[$\-_@.&+]|[!*(),]|%[0-9a-fA-F]{2})+").unwrap()
    })
}

/// Strip quote wrapping left over from naive regex extraction and drop
/// `data:` URLs, per the original cleanup rules.
fn cleanup_candidate(raw: &str) -> Option<String> {
    let mut s = raw.trim();
    if s.starts_with("data:") {
        return None;
    }
    loop {
        if (s.starts_with("\\\"") && s.ends_with("\\\"")) || (s.starts_with("\\'") && s.ends_with("\\'")) {
            s = &s[2..s.len() - 2];
        } else {
            break;
        }
    }
    let s = s.trim_matches(|c| c == '"' || c == '\'');
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// Extract every sub-resource URL referenced by `body`, resolved against
/// `base` and filtered against `known`. `full_text_search` gates the
/// advisory full-text regex pass (§4.2).
pub fn find_external_resources(
    body: &str,
    base: &str,
    known: &HashSet<String>,
    full_text_search: bool,
) -> ExternalResources {
    let mut out: ExternalResources = HashMap::new();
    let document = Html::parse_document(body);

    for rule in TAG_RULES {
        let selector = match Selector::parse(rule.tag) {
            Ok(s) => s,
            Err(_) => continue,
        };
        for element in document.select(&selector) {
            for attr in rule.attrs {
                if let Some(value) = element.value().attr(attr) {
                    push_resolved(&mut out, rule.category, value, base, known);
                }
            }
        }
    }

    if let Ok(meta_selector) = Selector::parse("meta") {
        for element in document.select(&meta_selector) {
            let is_refresh = element
                .value()
                .attr("http-equiv")
                .map(|v| v.eq_ignore_ascii_case("refresh"))
                .unwrap_or(false);
            if !is_refresh {
                continue;
            }
            if let Some(content) = element.value().attr("content") {
                if let Some(idx) = content.find('=') {
                    push_resolved(&mut out, "meta_refresh", &content[idx + 1..], base, known);
                }
            }
        }
    }

    for cap in css_url_re().captures_iter(body) {
        if let Some(m) = cap.get(1) {
            push_resolved(&mut out, "css", m.as_str(), base, known);
        }
    }

    for cap in inline_js_re().captures_iter(body) {
        if let Some(m) = cap.get(1) {
            push_resolved(&mut out, "javascript", m.as_str(), base, known);
        }
    }

    if full_text_search {
        for m in full_text_re().find_iter(body) {
            push_resolved(&mut out, "full_regex", m.as_str(), base, known);
        }
    }

    out
}

fn push_resolved(
    out: &mut ExternalResources,
    category: &'static str,
    raw: &str,
    base: &str,
    known: &HashSet<String>,
) {
    let Some(cleaned) = cleanup_candidate(raw) else {
        return;
    };
    let resolved = rebuild_url(base, &cleaned, known);
    if resolved.starts_with("http") {
        out.entry(category).or_default().push(resolved);
    }
}
