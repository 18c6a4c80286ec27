//! Reconstructs a browsing-session causality graph (URL tree + hostname
//! tree) from one or more HAR captures.

pub mod config;
pub mod error;
pub mod har;
pub mod host_tree;
pub mod html_extract;
pub mod logging;
pub mod node;
pub mod resolve;
pub mod serialize;
pub mod stitch;
pub mod url_rebuild;

use std::path::Path;

use anyhow::{Context, Result};

use crate::error::Har2TreeError;
use crate::har::HarFile;
use crate::host_tree::{make_hostname_tree, HostNode};
use crate::node::URLNode;
use crate::stitch::{join_trees, Capture};

/// A fully resolved, possibly multi-capture browsing session: one stitched
/// URL tree and the hostname tree folded from it.
pub struct CrawledTree {
    pub url_tree: URLNode,
    pub hostname_tree: HostNode,
    /// Cookies found in some capture's full jar side-car that were never
    /// received via a response nor held by that capture's initial request —
    /// i.e. set by script rather than `Set-Cookie` (§4.5).
    pub locally_created: Vec<String>,
    /// The subset of `locally_created` that was also never sent back out.
    pub locally_created_not_sent: Vec<String>,
    /// Cookie keys a capture's browser already held before its first
    /// request left.
    pub initial_cookies: Vec<String>,
}

impl CrawledTree {
    /// Load, resolve, and stitch every HAR at `paths` into one tree. Fails
    /// with [`Har2TreeError`] if every HAR has zero entries (§7 Fatal
    /// construction failure).
    pub fn load<P: AsRef<Path>>(paths: &[P], full_text_search: bool) -> Result<Self> {
        let mut captures = Vec::new();
        let mut locally_created = Vec::new();
        let mut locally_created_not_sent = Vec::new();
        let mut initial_cookies = Vec::new();

        for path in paths {
            let path = path.as_ref();
            let hf = HarFile::load(path)
                .with_context(|| format!("loading HAR {}", path.display()))?;
            if hf.entries.is_empty() {
                tracing::warn!(path = %path.display(), "HAR has no entries, skipping");
                continue;
            }

            let root_referrer = hf.root_referrer();
            let root_url = hf.root_url();
            let (chain, need_tree_redirects) = hf.initial_redirects();
            let root_after_redirect = if need_tree_redirects {
                None
            } else {
                chain.last().cloned()
            };

            let resolution = resolve::resolve_capture(&hf, full_text_search)
                .with_context(|| format!("resolving HAR {}", path.display()))?;
            locally_created.extend(resolution.locally_created);
            locally_created_not_sent.extend(resolution.locally_created_not_sent);
            initial_cookies.extend(resolution.initial_cookies);

            captures.push(Capture {
                url_tree: resolution.url_tree,
                root_referrer,
                root_url,
                root_after_redirect,
            });
        }

        if captures.is_empty() {
            return Err(Har2TreeError::new("no HAR supplied any entries").into());
        }

        let joined = join_trees(captures);
        let hostname_tree = make_hostname_tree(&joined);

        Ok(Self {
            url_tree: joined,
            hostname_tree,
            locally_created,
            locally_created_not_sent,
            initial_cookies,
        })
    }

    /// Ordered list of URLs from the root capture's initial URL to its
    /// final rendered URL, following resolved redirect edges. Empty when
    /// there was no redirect chain.
    pub fn redirects(&self) -> Vec<String> {
        let mut chain = vec![self.url_tree.name.clone()];
        let mut current: &URLNode = &self.url_tree;

        loop {
            if !current.redirect || current.redirect_to_nothing {
                break;
            }
            let Some(target) = &current.redirect_url else {
                break;
            };
            let Some(next) = current.children.iter().find(|c| &c.name == target) else {
                break;
            };
            chain.push(next.name.clone());
            current = next;
        }

        if chain.len() > 1 {
            chain
        } else {
            Vec::new()
        }
    }

    pub fn root_url(&self) -> &str {
        &self.url_tree.name
    }

    /// Render the hostname tree to JSON (the contract's primary output),
    /// with the capture-level cookie-jar bookkeeping folded into the
    /// top-level object.
    pub fn to_json(&self) -> serde_json::Value {
        let mut value = serialize::host_node_to_json(&self.hostname_tree);
        if let Some(obj) = value.as_object_mut() {
            obj.insert("locally_created".into(), serde_json::json!(self.locally_created));
            obj.insert(
                "locally_created_not_sent".into(),
                serde_json::json!(self.locally_created_not_sent),
            );
            obj.insert("initial_cookies".into(), serde_json::json!(self.initial_cookies));
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_har(dir: &TempDir, name: &str, value: &serde_json::Value) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(serde_json::to_string(value).unwrap().as_bytes()).unwrap();
        path
    }

    #[test]
    fn empty_hars_produce_fatal_error() {
        let dir = TempDir::new().unwrap();
        let har = json!({"log": {"version": "1.2", "entries": []}});
        let path = write_har(&dir, "empty.har", &har);
        let result = CrawledTree::load(&[path], true);
        assert!(result.is_err());
    }

    #[test]
    fn single_capture_round_trips_to_json() {
        let dir = TempDir::new().unwrap();
        let har = json!({
            "log": {
                "version": "1.2",
                "pages": [{"id": "page_1", "startedDateTime": "2021-01-01T00:00:00.000Z", "title": "Home"}],
                "entries": [{
                    "pageref": "page_1",
                    "startedDateTime": "2021-01-01T00:00:00.000Z",
                    "time": 5,
                    "request": {"url": "http://a.b/", "headers": [], "cookies": []},
                    "response": {"status": 200, "headers": [], "cookies": [], "content": {"mimeType": "text/html", "text": "<html></html>"}}
                }]
            }
        });
        let path = write_har(&dir, "capture.har", &har);
        let tree = CrawledTree::load(&[path], true).unwrap();
        assert_eq!(tree.root_url(), "http://a.b/");
        let value = tree.to_json();
        assert_eq!(value["name"], json!("a.b"));
    }

    #[test]
    fn locally_created_cookie_surfaces_in_json() {
        let dir = TempDir::new().unwrap();
        let har = json!({
            "log": {
                "version": "1.2",
                "pages": [{"id": "page_1", "startedDateTime": "2021-01-01T00:00:00.000Z", "title": "Home"}],
                "entries": [{
                    "pageref": "page_1",
                    "startedDateTime": "2021-01-01T00:00:00.000Z",
                    "time": 5,
                    "request": {"url": "http://a.b/", "headers": [], "cookies": []},
                    "response": {"status": 200, "headers": [], "cookies": [], "content": {}}
                }]
            }
        });
        let path = write_har(&dir, "capture.har", &har);
        write_har(&dir, "capture.cookies.json", &json!([{"name": "tracker", "value": "xyz"}]));
        let tree = CrawledTree::load(&[path], true).unwrap();
        let value = tree.to_json();
        assert_eq!(value["locally_created"], json!(["tracker=xyz"]));
        assert_eq!(value["locally_created_not_sent"], json!(["tracker=xyz"]));
        assert_eq!(value["initial_cookies"], json!([]));
    }
}
