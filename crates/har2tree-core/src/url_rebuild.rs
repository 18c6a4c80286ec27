//! Resolution of a possibly-partial URL against a base URL and the set of
//! URLs actually observed in a capture, reproducing the fix-ups a real
//! browser applies before issuing a request.

use std::collections::HashSet;

use percent_encoding::percent_decode_str;
use url::Url;

/// Resolve `partial` against `base`, preferring a result that is a member of
/// `known` when the naive resolution misses. Never fails: on malformed
/// input it returns its best attempt, leaving the caller to decide whether
/// membership in `known` makes the result meaningful.
pub fn rebuild_url(base: &str, partial: &str, known: &HashSet<String>) -> String {
    let partial = percent_decode_str(partial.trim())
        .decode_utf8_lossy()
        .into_owned();

    if partial.is_empty() {
        return String::new();
    }

    let first = first_attempt(base, &partial);

    if known.is_empty() || known.contains(&first) {
        return first;
    }

    // Each fix-up below builds on the previous one's output, so a URL that
    // needs more than one fix-up to reach a known match (e.g. both a
    // default-port strip and a dot-segment collapse) still resolves.
    let mut candidate = first.clone();

    if let Some(no_port) = strip_default_port(&candidate) {
        candidate = no_port;
        if known.contains(&candidate) {
            return candidate;
        }
    }

    if let Some(collapsed) = collapse_dot_segments(&candidate) {
        candidate = collapsed;
        if known.contains(&candidate) {
            return candidate;
        }
    }

    if let Ok(base_url) = Url::parse(base) {
        if let Some(frag) = base_url.fragment() {
            let with_frag = format!("{}#{}", candidate, frag);
            if known.contains(&with_frag) {
                return with_frag;
            }
        }
    }

    first
}

fn first_attempt(base: &str, partial: &str) -> String {
    if partial.starts_with("http://") || partial.starts_with("https://") {
        return partial.to_string();
    }

    let base_url = match Url::parse(base) {
        Ok(u) => u,
        Err(_) => return partial.to_string(),
    };

    if let Some(rest) = partial.strip_prefix("//") {
        return format!("{}://{}", base_url.scheme(), rest);
    }

    let mut chars = partial.chars();
    match chars.next() {
        Some(';') => return splice_from(base, ';', partial),
        Some('?') => return splice_from(base, '?', partial),
        Some('#') => return splice_from(base, '#', partial),
        _ => {}
    }

    if partial.starts_with('/') {
        let netloc = base_url
            .host_str()
            .map(|h| match base_url.port() {
                Some(p) => format!("{}:{}", h, p),
                None => h.to_string(),
            })
            .unwrap_or_default();
        return format!("{}://{}{}", base_url.scheme(), netloc, partial);
    }

    // Relative path: join against base's path.
    let base_str = base.split(['?', '#']).next().unwrap_or(base);
    if base_str.ends_with('/') {
        format!("{}{}", base_str, partial)
    } else if let Some(idx) = base_str.rfind('/') {
        let (scheme_and_host_end, _) = base_str.split_at(idx + 1);
        format!("{}{}", scheme_and_host_end, partial)
    } else {
        format!("{}/{}", base_str, partial)
    }
}

/// Replace everything in `base` from the first occurrence of `marker`
/// onward with `partial` (which itself begins with `marker`).
fn splice_from(base: &str, marker: char, partial: &str) -> String {
    match base.find(marker) {
        Some(idx) => format!("{}{}", &base[..idx], partial),
        None => format!("{}{}", base, partial),
    }
}

fn strip_default_port(url: &str) -> Option<String> {
    if let Some(rest) = url.strip_prefix("https://") {
        if let Some(idx) = rest.find(":443") {
            let (host, tail) = rest.split_at(idx);
            let after = &tail[4..];
            if after.is_empty() || after.starts_with('/') || after.starts_with('?') {
                return Some(format!("https://{}{}", host, after));
            }
        }
    } else if let Some(rest) = url.strip_prefix("http://") {
        if let Some(idx) = rest.find(":80") {
            let (host, tail) = rest.split_at(idx);
            let after = &tail[3..];
            if after.is_empty() || after.starts_with('/') || after.starts_with('?') {
                return Some(format!("http://{}{}", host, after));
            }
        }
    }
    None
}

/// Lexically collapse `.`/`..` segments in the path component of `url`,
/// re-appending a trailing slash if the original path had one.
fn collapse_dot_segments(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let path = parsed.path();
    if !path.contains("/./") && !path.contains("/../") && !path.ends_with("/..") && !path.ends_with("/.") {
        return None;
    }

    let had_trailing_slash = path.ends_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    let mut new_path = format!("/{}", segments.join("/"));
    if had_trailing_slash && !new_path.ends_with('/') {
        new_path.push('/');
    }
    if new_path.is_empty() {
        new_path.push('/');
    }

    let mut rebuilt = parsed.clone();
    rebuilt.set_path(&new_path);
    Some(rebuilt.to_string())
}

/// Strip the fragment (`#...`) from a URL, returning the URL unchanged if it
/// has none. HAR entry URLs are fragment-free by spec; kept for defense
/// against malformed captures.
pub fn strip_fragment(url: &str) -> String {
    match url.find('#') {
        Some(idx) => url[..idx].to_string(),
        None => url.to_string(),
    }
}
