//! Hostname aggregator (C6): folds a URL tree into a hostname tree,
//! grouping siblings by hostname and accumulating per-host counters.

use std::collections::HashMap;

use uuid::Uuid;

use crate::node::URLNode;

/// One hostname's aggregate across every URL node folded into it.
#[derive(Debug, Clone)]
pub struct HostNode {
    pub uuid: Uuid,
    pub name: Option<String>,
    pub urls: Vec<URLNode>,

    pub request_cookie: usize,
    pub response_cookie: usize,
    pub js: usize,
    pub redirect: usize,
    pub redirect_to_nothing: usize,
    pub iframe: usize,
    pub image: usize,
    pub css: usize,
    pub json: usize,
    pub html: usize,
    pub font: usize,
    pub octet_stream: usize,
    pub text: usize,
    pub video: usize,
    pub unknown_mimetype: usize,

    pub http_content: bool,
    pub https_content: bool,

    pub children: Vec<HostNode>,
}

impl HostNode {
    fn new() -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: None,
            urls: Vec::new(),
            request_cookie: 0,
            response_cookie: 0,
            js: 0,
            redirect: 0,
            redirect_to_nothing: 0,
            iframe: 0,
            image: 0,
            css: 0,
            json: 0,
            html: 0,
            font: 0,
            octet_stream: 0,
            text: 0,
            video: 0,
            unknown_mimetype: 0,
            http_content: false,
            https_content: false,
            children: Vec::new(),
        }
    }

    /// Whether this host served content over both `http://` and `https://`.
    pub fn mixed_content(&self) -> bool {
        self.http_content && self.https_content
    }

    fn add_url(&mut self, node: &URLNode) {
        if self.name.is_none() {
            self.name = Some(node.hostname.clone());
        }

        if !node.request_cookie.is_empty() {
            self.request_cookie += 1;
        }
        if !node.response_cookie.is_empty() {
            self.response_cookie += 1;
        }
        if node.mime.js {
            self.js += 1;
        }
        if node.redirect {
            self.redirect += 1;
        }
        if node.redirect_to_nothing {
            self.redirect_to_nothing += 1;
        }
        if node.mime.iframe {
            self.iframe += 1;
        }
        if node.mime.image {
            self.image += 1;
        }
        if node.mime.css {
            self.css += 1;
        }
        if node.mime.json {
            self.json += 1;
        }
        if node.mime.html {
            self.html += 1;
        }
        if node.mime.font {
            self.font += 1;
        }
        if node.mime.octet_stream {
            self.octet_stream += 1;
        }
        if node.mime.text {
            self.text += 1;
        }
        if node.mime.video || node.mime.livestream {
            self.video += 1;
        }
        if node.mime.unknown_mimetype || node.mime.unset_mimetype {
            self.unknown_mimetype += 1;
        }

        if node.name.starts_with("http://") {
            self.http_content = true;
        } else if node.name.starts_with("https://") {
            self.https_content = true;
        }

        let mut leaf = node.clone();
        leaf.children = Vec::new();
        self.urls.push(leaf);
    }
}

/// Fold a resolved URL tree into a hostname tree, preserving the URL tree's
/// own child-list order at every recursion level (§9).
pub fn make_hostname_tree(root: &URLNode) -> HostNode {
    let mut host_root = HostNode::new();
    host_root.add_url(root);
    let child_refs: Vec<&URLNode> = root.children.iter().collect();
    host_root.children = build_children(&child_refs);
    host_root
}

fn build_children(urls: &[&URLNode]) -> Vec<HostNode> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<&URLNode>> = HashMap::new();

    for u in urls {
        if !groups.contains_key(&u.hostname) {
            order.push(u.hostname.clone());
        }
        groups.entry(u.hostname.clone()).or_default().push(u);
    }

    let mut result = Vec::new();
    for hostname in order {
        let members = groups.remove(&hostname).unwrap_or_default();
        let mut host_node = HostNode::new();
        for m in &members {
            host_node.add_url(m);
        }
        let grandchildren: Vec<&URLNode> = members.iter().flat_map(|m| m.children.iter()).collect();
        host_node.children = build_children(&grandchildren);
        result.push(host_node);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::mime::MimeFlags;
    use serde_json::json;

    fn leaf(name: &str, hostname: &str, mime: MimeFlags) -> URLNode {
        URLNode {
            uuid: Uuid::new_v4(),
            name: name.to_string(),
            hostname: hostname.to_string(),
            alternative_url_for_referer: name.to_string(),
            start_time: None,
            time: 0.0,
            time_content_received: None,
            pageref: "page_1".to_string(),
            request: json!({}),
            response: json!({}),
            referer: None,
            user_agent: None,
            request_cookie: Vec::new(),
            response_cookie: Vec::new(),
            cookies_received: Vec::new(),
            cookies_sent: Default::default(),
            set_third_party_cookies: false,
            body: None,
            body_hash: None,
            mimetype: String::new(),
            filename: String::new(),
            empty_response: true,
            external_ressources: Default::default(),
            ip_address: None,
            initiator_url: None,
            redirect: false,
            redirect_url: None,
            redirect_to_nothing: false,
            mime,
            unknown_tld: false,
            children: Vec::new(),
        }
    }

    #[test]
    fn groups_siblings_by_hostname() {
        let mut root = leaf("http://a/", "a", MimeFlags::classify("text/html"));
        root.children.push(leaf("http://cdn/1.js", "cdn", MimeFlags::classify("application/javascript")));
        root.children.push(leaf("http://cdn/2.js", "cdn", MimeFlags::classify("application/javascript")));
        root.children.push(leaf("http://other/x", "other", MimeFlags::classify("text/plain")));

        let host_tree = make_hostname_tree(&root);
        assert_eq!(host_tree.name.as_deref(), Some("a"));
        assert_eq!(host_tree.children.len(), 2);
        assert_eq!(host_tree.children[0].name.as_deref(), Some("cdn"));
        assert_eq!(host_tree.children[0].urls.len(), 2);
        assert_eq!(host_tree.children[0].js, 2);
        assert_eq!(host_tree.children[1].name.as_deref(), Some("other"));
        assert_eq!(host_tree.children[1].text, 1);
    }

    #[test]
    fn mixed_content_detected() {
        let mut host = HostNode::new();
        host.add_url(&leaf("http://a/x", "a", MimeFlags::default()));
        host.add_url(&leaf("https://a/y", "a", MimeFlags::default()));
        assert!(host.mixed_content());
    }

    #[test]
    fn video_counter_includes_livestream() {
        let mut host = HostNode::new();
        host.add_url(&leaf("http://a/x", "a", MimeFlags::classify("application/vnd.apple.mpegurl")));
        assert_eq!(host.video, 1);
    }
}
