use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::DateTime;
use serde_json::Value;

use crate::url_rebuild::rebuild_url;

const NO_TITLE_PLACEHOLDER: &str = "!! No title found !!";

/// A loaded HAR document plus whatever colocated side-car artifacts exist
/// next to it, with entries exposed in capture order.
pub struct HarFile {
    pub entries: Vec<Value>,
    pub pages: Vec<Value>,
    pub final_redirect: Option<String>,
    pub cookies: Option<Value>,
    pub html_body: Option<String>,
}

impl HarFile {
    /// Load a HAR file, sorting its entries ascending by `startedDateTime`,
    /// and pick up any `<stem>.last_redirect.txt`, `<stem>.cookies.json`,
    /// `<stem>.html` side-cars colocated with it.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read(path)
            .with_context(|| format!("reading HAR file {}", path.display()))?;
        let doc: Value = serde_json::from_slice(&raw)
            .with_context(|| format!("parsing HAR JSON {}", path.display()))?;

        let log = doc.get("log").cloned().unwrap_or(Value::Null);
        let mut entries: Vec<Value> = log
            .get("entries")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let pages: Vec<Value> = log
            .get("pages")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        entries.sort_by(|a, b| start_time_key(a).cmp(&start_time_key(b)));

        let final_redirect = load_sidecar_text(path, "last_redirect.txt")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let final_redirect = match final_redirect {
            Some(url) => Some(resolve_final_redirect(&url, &entries)),
            None => None,
        };

        let cookies = load_sidecar_text(path, "cookies.json")
            .and_then(|s| serde_json::from_str(&s).ok());

        let html_body = load_sidecar_text(path, "html");

        Ok(Self {
            entries,
            pages,
            final_redirect,
            cookies,
            html_body,
        })
    }

    pub fn root_url(&self) -> String {
        self.entries
            .first()
            .and_then(|e| e["request"]["url"].as_str())
            .unwrap_or_default()
            .to_string()
    }

    /// The referer header of the very first request, if any — used by C7 to
    /// stitch this capture under a parent capture's node.
    pub fn root_referrer(&self) -> Option<String> {
        let headers = self.entries.first()?["request"]["headers"].as_array()?;
        header_value(headers, "referer")
    }

    /// Title of the first page, or a fallback placeholder when blank.
    pub fn initial_title(&self) -> String {
        self.pages
            .first()
            .and_then(|p| p["title"].as_str())
            .filter(|t| !t.is_empty())
            .unwrap_or(NO_TITLE_PLACEHOLDER)
            .to_string()
    }

    /// Map from a page's start time to that page's record, with the first
    /// entry's start time also mapped to page 0 (the original's behavior for
    /// captures whose page table starts later than the first request).
    pub fn pages_start_times(&self) -> HashMap<String, Value> {
        let mut map = HashMap::new();
        for page in &self.pages {
            if let Some(t) = page["startedDateTime"].as_str() {
                map.insert(t.to_string(), page.clone());
            }
        }
        if let (Some(first_entry), Some(first_page)) = (self.entries.first(), self.pages.first()) {
            if let Some(t) = first_entry["startedDateTime"].as_str() {
                map.entry(t.to_string()).or_insert_with(|| first_page.clone());
            }
        }
        map
    }

    /// Enumerate the redirect chain from the first entry to the final
    /// redirect side-car, or signal that it must be re-derived from the
    /// resolved tree (`need_tree_redirects`).
    pub fn initial_redirects(&self) -> (Vec<String>, bool) {
        let Some(final_redirect) = &self.final_redirect else {
            return (Vec::new(), false);
        };
        if self.entries.is_empty() {
            return (vec![final_redirect.clone()], true);
        }

        let mut chain = Vec::new();
        let mut prev = &self.entries[0];
        chain.push(prev["request"]["url"].as_str().unwrap_or_default().to_string());

        for entry in &self.entries[1..] {
            if chain.last().map(|s| s.as_str()) == Some(final_redirect.as_str()) {
                break;
            }
            let candidate = entry["request"]["url"].as_str().unwrap_or_default();
            let redirect_url = prev["response"]["redirectURL"].as_str().unwrap_or_default();
            let prev_url = prev["request"]["url"].as_str().unwrap_or_default();
            let known: std::collections::HashSet<String> = std::iter::once(candidate.to_string()).collect();
            let rebuilt_redirect = if redirect_url.is_empty() {
                String::new()
            } else {
                rebuild_url(prev_url, redirect_url, &known)
            };
            let referer = entry["request"]["headers"]
                .as_array()
                .and_then(|h| header_value(h, "referer"));

            let matches_redirect = !rebuilt_redirect.is_empty() && rebuilt_redirect == candidate;
            let matches_referer = referer.as_deref() == Some(prev_url);

            if matches_redirect || matches_referer {
                chain.push(candidate.to_string());
                prev = entry;
                if candidate == final_redirect {
                    break;
                }
            } else {
                break;
            }
        }

        if chain.last().map(|s| s.as_str()) == Some(final_redirect.as_str()) && chain.len() > 1 {
            (chain, false)
        } else {
            (vec![final_redirect.clone()], true)
        }
    }
}

fn resolve_final_redirect(raw: &str, entries: &[Value]) -> String {
    let urls: Vec<&str> = entries
        .iter()
        .filter_map(|e| e["request"]["url"].as_str())
        .collect();
    if urls.contains(&raw) {
        return raw.to_string();
    }
    let mut candidate = raw.to_string();
    if let Some(idx) = candidate.find('#') {
        candidate.truncate(idx);
        if urls.contains(&candidate.as_str()) {
            return candidate;
        }
    }
    if let Some(idx) = candidate.find('?') {
        candidate.truncate(idx);
        if urls.contains(&candidate.as_str()) {
            return candidate;
        }
    }
    tracing::warn!("last_redirect.txt value {} not found among entries", raw);
    raw.to_string()
}

fn header_value(headers: &[Value], name: &str) -> Option<String> {
    headers.iter().find_map(|h| {
        let header_name = h["name"].as_str()?;
        if header_name.eq_ignore_ascii_case(name) {
            h["value"].as_str().map(|s| s.to_string())
        } else {
            None
        }
    })
}

fn start_time_key(entry: &Value) -> i64 {
    entry["startedDateTime"]
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.timestamp_nanos_opt().unwrap_or(0))
        .unwrap_or(0)
}

fn load_sidecar_text(har_path: &Path, suffix: &str) -> Option<String> {
    let stem = har_path.file_stem()?.to_str()?;
    let parent = har_path.parent().unwrap_or_else(|| Path::new("."));
    let sidecar: PathBuf = parent.join(format!("{}.{}", stem, suffix));
    std::fs::read_to_string(sidecar).ok()
}
