//! Single-capture resolver (C5): the multi-pass attachment procedure that
//! assembles one capture's URL tree out of its built nodes.
//!
//! Rather than mutating a shared tree in place, attachment is modeled as a
//! `uuid -> Vec<uuid>` graph built by consuming a pool of owned nodes; the
//! owned tree is only materialized — moving nodes out of the pool — once
//! every attachment decision has been made. No node is ever behind a shared
//! reference while it is mutated.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::error::UnsupportedInitiatorError;
use crate::har::HarFile;
use crate::node::cookie::{jar_keys, CookieSetter};
use crate::node::mime::MimeFlags;
use crate::node::URLNode;

/// Everything C5 produces for one capture: the attached tree plus the
/// cookie-jar bookkeeping that falls out of cross-attribution (§4.5).
pub struct CaptureResolution {
    pub url_tree: URLNode,
    /// Cookies present in the full jar side-car that were neither received
    /// by any node nor part of the capturing browser's initial request.
    pub locally_created: Vec<String>,
    /// The subset of `locally_created` that was also never sent back out in
    /// any node's `cookies_sent`.
    pub locally_created_not_sent: Vec<String>,
    /// Cookie keys the capturing browser already held before its first
    /// request — excluded from `locally_created`.
    pub initial_cookies: Vec<String>,
}

/// Resolve one capture's entries into a fully attached URL tree, rooted at
/// the first entry.
pub fn resolve_capture(har: &HarFile, full_text_search: bool) -> Result<CaptureResolution, UnsupportedInitiatorError> {
    let known: HashSet<String> = har
        .entries
        .iter()
        .filter_map(|e| e["request"]["url"].as_str())
        .map(|s| s.to_string())
        .collect();

    let mut nodes_vec = Vec::with_capacity(har.entries.len());
    for entry in &har.entries {
        nodes_vec.push(URLNode::build(entry, &known, full_text_search)?);
    }

    let root_uuid = nodes_vec[0].uuid;

    let mut by_url: HashMap<String, Vec<Uuid>> = HashMap::new();
    let mut pages_root: HashMap<String, Uuid> = HashMap::new();
    let mut page_order: Vec<String> = Vec::new();
    let mut seen_pagerefs: HashSet<String> = HashSet::new();

    for n in &nodes_vec {
        by_url.entry(n.name.clone()).or_default().push(n.uuid);
        pages_root.entry(n.pageref.clone()).or_insert(n.uuid);
        if seen_pagerefs.insert(n.pageref.clone()) {
            page_order.push(n.pageref.clone());
        }
    }

    let mut all_redirects: Vec<String> = Vec::new();
    let mut all_referer: HashMap<String, Vec<Uuid>> = HashMap::new();
    let mut all_initiator: HashMap<String, Vec<Uuid>> = HashMap::new();
    let mut pending: HashSet<Uuid> = HashSet::new();
    let mut order: Vec<Uuid> = Vec::new();

    for n in &nodes_vec {
        if n.uuid == root_uuid {
            continue;
        }
        pending.insert(n.uuid);
        order.push(n.uuid);
        if n.redirect && !n.redirect_to_nothing {
            if let Some(target) = &n.redirect_url {
                all_redirects.push(target.clone());
            }
        }
        if let Some(r) = &n.referer {
            all_referer.entry(r.clone()).or_default().push(n.uuid);
        }
        if let Some(i) = &n.initiator_url {
            all_initiator.entry(i.clone()).or_default().push(n.uuid);
        }
    }

    let nodes: HashMap<Uuid, URLNode> = nodes_vec.into_iter().map(|n| (n.uuid, n)).collect();

    let mut resolver = Resolver {
        nodes,
        children_of: HashMap::new(),
        pending,
        order,
        by_url,
        all_redirects,
        all_referer,
        all_initiator,
        pages_root,
        page_order,
        root_uuid,
    };

    resolver.attach_subtree(root_uuid);
    resolver.run_post_pass();
    resolver.cross_attribute_cookies();
    resolver.propagate_external_resource_context();

    let (locally_created, locally_created_not_sent, initial_cookies) =
        resolver.jar_bookkeeping(jar_keys(har.cookies.as_ref()), root_uuid);

    Ok(CaptureResolution {
        url_tree: resolver.materialize(root_uuid),
        locally_created,
        locally_created_not_sent,
        initial_cookies,
    })
}

struct Resolver {
    nodes: HashMap<Uuid, URLNode>,
    children_of: HashMap<Uuid, Vec<Uuid>>,
    pending: HashSet<Uuid>,
    order: Vec<Uuid>,
    by_url: HashMap<String, Vec<Uuid>>,
    all_redirects: Vec<String>,
    all_referer: HashMap<String, Vec<Uuid>>,
    all_initiator: HashMap<String, Vec<Uuid>>,
    pages_root: HashMap<String, Uuid>,
    page_order: Vec<String>,
    root_uuid: Uuid,
}

impl Resolver {
    fn take_candidates_for_url(&mut self, url: &str) -> Vec<Uuid> {
        let Some(candidates) = self.by_url.get(url).cloned() else {
            return Vec::new();
        };
        candidates.into_iter().filter(|u| self.pending.remove(u)).collect()
    }

    /// Run the five-pass attachment precedence (§4.5) for one node,
    /// recursing into whatever it picks up.
    fn attach_subtree(&mut self, uuid: Uuid) {
        let (name, alt, redirect, redirect_to_nothing, redirect_url, ext_urls) = {
            let n = &self.nodes[&uuid];
            (
                n.name.clone(),
                n.alternative_url_for_referer.clone(),
                n.redirect,
                n.redirect_to_nothing,
                n.redirect_url.clone(),
                n.external_ressources
                    .values()
                    .flatten()
                    .cloned()
                    .collect::<Vec<_>>(),
            )
        };

        let mut kids: Vec<Uuid> = Vec::new();

        // 1. Redirect edge.
        if redirect && !redirect_to_nothing {
            if let Some(target) = redirect_url {
                if let Some(pos) = self.all_redirects.iter().position(|u| *u == target) {
                    self.all_redirects.remove(pos);
                    kids.extend(self.take_candidates_for_url(&target));
                }
            }
        }

        // 2. Initiator edge.
        if let Some(initiated) = self.all_initiator.remove(&name) {
            for c in initiated {
                if self.pending.remove(&c) {
                    kids.push(c);
                }
            }
        }

        // 3. Exact referer edge.
        if let Some(referrers) = self.all_referer.remove(&name) {
            for c in referrers {
                if self.pending.remove(&c) {
                    kids.push(c);
                }
            }
        }

        // 4. Fragment-stripped referer edge.
        if alt != name {
            if let Some(referrers) = self.all_referer.remove(&alt) {
                for c in referrers {
                    if self.pending.remove(&c) {
                        kids.push(c);
                    }
                }
            }
        }

        // 5. HTML sub-resource edge.
        for url in ext_urls {
            kids.extend(self.take_candidates_for_url(&url));
        }

        self.children_of.entry(uuid).or_default().extend(kids.iter().copied());
        for k in kids {
            self.attach_subtree(k);
        }
    }

    /// Drain whatever the primary traversal never reached, attaching each
    /// leftover under its page's root (or the prior page's root, when the
    /// leftover is itself an unreached page root).
    fn run_post_pass(&mut self) {
        let remaining: Vec<Uuid> = self
            .order
            .iter()
            .copied()
            .filter(|u| self.pending.contains(u))
            .collect();

        for uuid in remaining {
            if !self.pending.remove(&uuid) {
                continue;
            }
            self.attach_subtree(uuid);

            let pageref = self.nodes[&uuid].pageref.clone();
            let page_root = self.pages_root.get(&pageref).copied();

            let target = match page_root {
                Some(root_id) if root_id == uuid => self.prior_page_root(&pageref),
                Some(root_id) => Some(root_id),
                None => None,
            }
            .unwrap_or(self.root_uuid);

            self.children_of.entry(target).or_default().push(uuid);
        }
    }

    fn prior_page_root(&self, pageref: &str) -> Option<Uuid> {
        let idx = self.page_order.iter().position(|p| p == pageref)?;
        for i in (0..idx).rev() {
            if let Some(&root) = self.pages_root.get(&self.page_order[i]) {
                return Some(root);
            }
        }
        None
    }

    /// Attribute every `cookies_sent` key back to whichever node(s) set it,
    /// matching by the domain-suffix rule (§4.5).
    fn cross_attribute_cookies(&mut self) {
        let mut received_index: HashMap<String, Vec<(String, Uuid, String, bool)>> = HashMap::new();
        for n in self.nodes.values() {
            for rc in &n.cookies_received {
                received_index.entry(rc.name_value.clone()).or_default().push((
                    rc.domain.clone(),
                    n.uuid,
                    n.hostname.clone(),
                    rc.third_party,
                ));
            }
        }

        let uuids: Vec<Uuid> = self.nodes.keys().copied().collect();
        for uuid in uuids {
            let (hostname, keys) = {
                let n = &self.nodes[&uuid];
                (n.hostname.clone(), n.cookies_sent.keys().cloned().collect::<Vec<_>>())
            };
            for key in keys {
                let Some(candidates) = received_index.get(&key) else {
                    continue;
                };
                let mut setters = Vec::new();
                for (domain, setter_uuid, setter_hostname, third_party) in candidates {
                    if hostname.ends_with(domain.as_str()) {
                        setters.push(CookieSetter {
                            hostname: setter_hostname.clone(),
                            uuid: *setter_uuid,
                            name: key.clone(),
                            third_party: *third_party,
                        });
                    }
                }
                if !setters.is_empty() {
                    let n = self.nodes.get_mut(&uuid).unwrap();
                    n.cookies_sent.get_mut(&key).unwrap().extend(setters);
                }
            }
        }
    }

    /// Tag every node reached through another node's `external_ressources`
    /// with the corresponding additive MIME-context flag (§4.5).
    fn propagate_external_resource_context(&mut self) {
        const CATEGORY_FIELDS: &[(&str, fn(&mut MimeFlags))] = &[
            ("img", (|m: &mut MimeFlags| m.image = true) as fn(&mut MimeFlags)),
            ("script", |m| m.js = true),
            ("video", |m| m.video = true),
            ("audio", |m| m.audio = true),
            ("iframe", |m| m.iframe = true),
            ("embed", |m| m.octet_stream = true),
            ("source", |m| m.octet_stream = true),
            ("object", |m| m.octet_stream = true),
            ("link", |m| m.css = true),
        ];

        let mut targets: Vec<(Uuid, fn(&mut MimeFlags))> = Vec::new();
        for n in self.nodes.values() {
            for (category, setter) in CATEGORY_FIELDS {
                let Some(urls) = n.external_ressources.get(*category) else {
                    continue;
                };
                for url in urls {
                    if let Some(uuids) = self.by_url.get(url) {
                        for &uuid in uuids {
                            targets.push((uuid, *setter));
                        }
                    }
                }
            }
        }
        for (uuid, setter) in targets {
            if let Some(node) = self.nodes.get_mut(&uuid) {
                setter(&mut node.mime);
            }
        }
    }

    /// Compare the full cookie jar against what was actually observed:
    /// cookies neither received by any node nor held by the initial request
    /// were created locally (by script, not a `Set-Cookie` response); of
    /// those, the ones never sent back out anywhere are tracked separately.
    fn jar_bookkeeping(
        &self,
        jar: Vec<String>,
        root_uuid: Uuid,
    ) -> (Vec<String>, Vec<String>, Vec<String>) {
        let mut received_keys: HashSet<String> = HashSet::new();
        let mut sent_keys: HashSet<String> = HashSet::new();
        for n in self.nodes.values() {
            for rc in &n.cookies_received {
                received_keys.insert(rc.name_value.clone());
            }
            for key in n.cookies_sent.keys() {
                sent_keys.insert(key.clone());
            }
        }

        let initial_cookies: Vec<String> = self.nodes[&root_uuid].cookies_sent.keys().cloned().collect();
        let initial_set: HashSet<&String> = initial_cookies.iter().collect();

        let mut locally_created = Vec::new();
        let mut locally_created_not_sent = Vec::new();
        let mut seen = HashSet::new();
        for key in jar {
            if !seen.insert(key.clone()) {
                continue;
            }
            if received_keys.contains(&key) || initial_set.contains(&key) {
                continue;
            }
            if !sent_keys.contains(&key) {
                locally_created_not_sent.push(key.clone());
            }
            locally_created.push(key);
        }

        (locally_created, locally_created_not_sent, initial_cookies)
    }

    fn materialize(&mut self, uuid: Uuid) -> URLNode {
        let mut node = self.nodes.remove(&uuid).expect("node present in pool");
        let kids = self.children_of.remove(&uuid).unwrap_or_default();
        node.children = kids.into_iter().map(|k| self.materialize(k)).collect();
        node
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::har::HarFile;
    use serde_json::json;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_har(dir: &TempDir, name: &str, value: &serde_json::Value) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(serde_json::to_string(value).unwrap().as_bytes()).unwrap();
        path
    }

    fn entry(pageref: &str, t: &str, url: &str, request: serde_json::Value, response: serde_json::Value) -> serde_json::Value {
        let mut e = json!({
            "pageref": pageref,
            "startedDateTime": t,
            "time": 1,
            "request": request,
            "response": response,
        });
        e["request"]["url"] = json!(url);
        e
    }

    fn base_request(headers: serde_json::Value) -> serde_json::Value {
        json!({"headers": headers, "cookies": []})
    }

    fn base_response() -> serde_json::Value {
        json!({"status": 200, "headers": [], "cookies": [], "content": {}})
    }

    #[test]
    fn redirect_chain_attaches_target_as_child() {
        let har = json!({
            "log": {
                "version": "1.2",
                "pages": [{"id": "page_1", "startedDateTime": "2021-01-01T00:00:00.000Z", "title": "t"}],
                "entries": [
                    entry("page_1", "2021-01-01T00:00:00.000Z", "http://a/",
                        base_request(json!([])),
                        json!({"status": 302, "redirectURL": "/b", "headers": [], "cookies": [], "content": {}})),
                    entry("page_1", "2021-01-01T00:00:01.000Z", "http://a/b",
                        base_request(json!([])),
                        json!({"status": 200, "headers": [], "cookies": [], "content": {"mimeType": "text/html", "text": "<html></html>"}})),
                ]
            }
        });
        let dir = TempDir::new().unwrap();
        let path = write_har(&dir, "c.har", &har);
        let hf = HarFile::load(&path).unwrap();
        let root = resolve_capture(&hf, true).unwrap().url_tree;
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.children[0].name, "http://a/b");
    }

    #[test]
    fn missing_redirect_target_leaves_node_childless() {
        let har = json!({
            "log": {
                "version": "1.2",
                "pages": [{"id": "page_1", "startedDateTime": "2021-01-01T00:00:00.000Z", "title": "t"}],
                "entries": [
                    entry("page_1", "2021-01-01T00:00:00.000Z", "http://a/",
                        base_request(json!([])),
                        json!({"status": 302, "redirectURL": "http://c/", "headers": [], "cookies": [], "content": {}})),
                ]
            }
        });
        let dir = TempDir::new().unwrap();
        let path = write_har(&dir, "c.har", &har);
        let hf = HarFile::load(&path).unwrap();
        let root = resolve_capture(&hf, true).unwrap().url_tree;
        assert!(root.redirect_to_nothing);
        assert!(root.children.is_empty());
    }

    #[test]
    fn html_sub_resource_attaches_via_external_ressources() {
        let har = json!({
            "log": {
                "version": "1.2",
                "pages": [{"id": "page_1", "startedDateTime": "2021-01-01T00:00:00.000Z", "title": "t"}],
                "entries": [
                    entry("page_1", "2021-01-01T00:00:00.000Z", "http://a/",
                        base_request(json!([])),
                        json!({"status": 200, "headers": [], "cookies": [], "content": {"mimeType": "text/html", "text": "<script src=\"http://cdn/lib.js\"></script>"}})),
                    entry("page_1", "2021-01-01T00:00:01.000Z", "http://cdn/lib.js",
                        base_request(json!([])),
                        json!({"status": 200, "headers": [], "cookies": [], "content": {"mimeType": "application/javascript", "text": "console.log(1)"}})),
                ]
            }
        });
        let dir = TempDir::new().unwrap();
        let path = write_har(&dir, "c.har", &har);
        let hf = HarFile::load(&path).unwrap();
        let root = resolve_capture(&hf, true).unwrap().url_tree;
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.children[0].name, "http://cdn/lib.js");
        assert!(root.children[0].mime.js);
    }

    #[test]
    fn initiator_edge_takes_precedence_over_referer() {
        let har = json!({
            "log": {
                "version": "1.2",
                "pages": [{"id": "page_1", "startedDateTime": "2021-01-01T00:00:00.000Z", "title": "t"}],
                "entries": [
                    entry("page_1", "2021-01-01T00:00:00.000Z", "http://a/",
                        base_request(json!([])),
                        json!({"status": 200, "headers": [], "cookies": [], "content": {"mimeType": "text/html", "text": "<html></html>"}})),
                    {
                        "pageref": "page_1",
                        "startedDateTime": "2021-01-01T00:00:01.000Z",
                        "time": 1,
                        "request": {
                            "url": "http://x/y",
                            "headers": [{"name": "Referer", "value": "http://other/"}],
                            "cookies": []
                        },
                        "response": {"status": 200, "headers": [], "cookies": [], "content": {}},
                        "_initiator": {"type": "script", "stack": {"callFrames": [{"url": "http://a/"}]}}
                    }
                ]
            }
        });
        let dir = TempDir::new().unwrap();
        let path = write_har(&dir, "c.har", &har);
        let hf = HarFile::load(&path).unwrap();
        let root = resolve_capture(&hf, true).unwrap().url_tree;
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.children[0].name, "http://x/y");
    }

    #[test]
    fn leftover_node_attached_under_page_root_in_post_pass() {
        let har = json!({
            "log": {
                "version": "1.2",
                "pages": [{"id": "page_1", "startedDateTime": "2021-01-01T00:00:00.000Z", "title": "t"}],
                "entries": [
                    entry("page_1", "2021-01-01T00:00:00.000Z", "http://a/",
                        base_request(json!([])),
                        json!({"status": 200, "headers": [], "cookies": [], "content": {}})),
                    entry("page_1", "2021-01-01T00:00:01.000Z", "http://unrelated/thing",
                        base_request(json!([])),
                        json!({"status": 200, "headers": [], "cookies": [], "content": {}})),
                ]
            }
        });
        let dir = TempDir::new().unwrap();
        let path = write_har(&dir, "c.har", &har);
        let hf = HarFile::load(&path).unwrap();
        let root = resolve_capture(&hf, true).unwrap().url_tree;
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.children[0].name, "http://unrelated/thing");
    }

    #[test]
    fn jar_cookie_never_received_or_sent_is_locally_created() {
        let har = json!({
            "log": {
                "version": "1.2",
                "pages": [{"id": "page_1", "startedDateTime": "2021-01-01T00:00:00.000Z", "title": "t"}],
                "entries": [
                    entry("page_1", "2021-01-01T00:00:00.000Z", "http://a/",
                        base_request(json!([])),
                        base_response()),
                ]
            }
        });
        let dir = TempDir::new().unwrap();
        let har_path = write_har(&dir, "c.har", &har);
        write_har(&dir, "c.cookies.json", &json!([{"name": "tracker", "value": "xyz"}]));
        let hf = HarFile::load(&har_path).unwrap();
        let resolution = resolve_capture(&hf, true).unwrap();
        assert_eq!(resolution.locally_created, vec!["tracker=xyz".to_string()]);
        assert_eq!(resolution.locally_created_not_sent, vec!["tracker=xyz".to_string()]);
        assert!(resolution.initial_cookies.is_empty());
    }

    #[test]
    fn initial_request_cookie_excluded_from_locally_created() {
        let har = json!({
            "log": {
                "version": "1.2",
                "pages": [{"id": "page_1", "startedDateTime": "2021-01-01T00:00:00.000Z", "title": "t"}],
                "entries": [
                    entry("page_1", "2021-01-01T00:00:00.000Z", "http://a/",
                        base_request(json!([])),
                        base_response()),
                ]
            }
        });
        let mut har = har;
        har["log"]["entries"][0]["request"]["cookies"] = json!([{"name": "session", "value": "abc"}]);
        let dir = TempDir::new().unwrap();
        let har_path = write_har(&dir, "c.har", &har);
        write_har(&dir, "c.cookies.json", &json!([{"name": "session", "value": "abc"}]));
        let hf = HarFile::load(&har_path).unwrap();
        let resolution = resolve_capture(&hf, true).unwrap();
        assert!(resolution.locally_created.is_empty());
        assert_eq!(resolution.initial_cookies, vec!["session=abc".to_string()]);
    }
}
