//! Serializer (C8): renders a resolved URL or hostname tree to JSON,
//! honoring the per-entity field-skip sets from §4.8.

use serde_json::{json, Map, Value};

use crate::host_tree::HostNode;
use crate::node::URLNode;

/// Render a URL tree node (and its descendants) to JSON. Skips `body`,
/// `url_split`, `start_time`, `time`, `time_content_received`, and
/// `ip_address` per the URLNode skip-set.
pub fn url_node_to_json(node: &URLNode) -> Value {
    let mut obj = Map::new();
    obj.insert("uuid".into(), json!(node.uuid.to_string()));
    obj.insert("name".into(), json!(node.name));
    obj.insert("hostname".into(), json!(node.hostname));
    obj.insert(
        "alternative_url_for_referer".into(),
        json!(node.alternative_url_for_referer),
    );
    obj.insert("pageref".into(), json!(node.pageref));
    obj.insert("referer".into(), json!(node.referer));
    obj.insert("user_agent".into(), json!(node.user_agent));
    obj.insert("request".into(), node.request.clone());
    obj.insert("response".into(), node.response.clone());
    obj.insert("request_cookie".into(), json!(node.request_cookie));
    obj.insert("response_cookie".into(), json!(node.response_cookie));

    let cookies_received: Vec<Value> = node
        .cookies_received
        .iter()
        .map(|c| {
            json!({
                "domain": c.domain,
                "name_value": c.name_value,
                "third_party": c.third_party,
            })
        })
        .collect();
    obj.insert("cookies_received".into(), json!(cookies_received));

    let cookies_sent: Map<String, Value> = node
        .cookies_sent
        .iter()
        .map(|(key, setters)| {
            let arr: Vec<Value> = setters
                .iter()
                .map(|s| {
                    json!({
                        "hostname": s.hostname,
                        "uuid": s.uuid.to_string(),
                        "name": s.name,
                        "third_party": s.third_party,
                    })
                })
                .collect();
            (key.clone(), json!(arr))
        })
        .collect();
    obj.insert("cookies_sent".into(), Value::Object(cookies_sent));
    obj.insert(
        "set_third_party_cookies".into(),
        json!(node.set_third_party_cookies),
    );

    obj.insert("body_hash".into(), json!(node.body_hash));
    obj.insert("mimetype".into(), json!(node.mimetype));
    obj.insert("filename".into(), json!(node.filename));
    obj.insert("empty_response".into(), json!(node.empty_response));
    obj.insert("external_ressources".into(), json!(node.external_ressources));

    obj.insert("initiator_url".into(), json!(node.initiator_url));
    obj.insert("redirect".into(), json!(node.redirect));
    obj.insert("redirect_url".into(), json!(node.redirect_url));
    obj.insert("redirect_to_nothing".into(), json!(node.redirect_to_nothing));

    obj.insert("js".into(), json!(node.mime.js));
    obj.insert("image".into(), json!(node.mime.image));
    obj.insert("css".into(), json!(node.mime.css));
    obj.insert("json".into(), json!(node.mime.json));
    obj.insert("html".into(), json!(node.mime.html));
    obj.insert("font".into(), json!(node.mime.font));
    obj.insert("octet_stream".into(), json!(node.mime.octet_stream));
    obj.insert("text".into(), json!(node.mime.text));
    obj.insert("video".into(), json!(node.mime.video));
    obj.insert("livestream".into(), json!(node.mime.livestream));
    obj.insert("unset_mimetype".into(), json!(node.mime.unset_mimetype));
    obj.insert("unknown_mimetype".into(), json!(node.mime.unknown_mimetype));
    obj.insert("audio".into(), json!(node.mime.audio));
    obj.insert("iframe".into(), json!(node.mime.iframe));
    obj.insert("unknown_tld".into(), json!(node.unknown_tld));

    let children: Vec<Value> = node.children.iter().map(url_node_to_json).collect();
    obj.insert("children".into(), json!(children));

    Value::Object(obj)
}

/// Render a hostname tree node (and its descendants) to JSON. Skips `urls`
/// (replaced by `urls_count`) per the HostNode skip-set, and finalizes
/// `mixed_content` at emit time.
pub fn host_node_to_json(host: &HostNode) -> Value {
    let mut obj = Map::new();
    obj.insert("uuid".into(), json!(host.uuid.to_string()));
    obj.insert("name".into(), json!(host.name));
    obj.insert("urls_count".into(), json!(host.urls.len()));

    obj.insert("request_cookie".into(), json!(host.request_cookie));
    obj.insert("response_cookie".into(), json!(host.response_cookie));
    obj.insert("js".into(), json!(host.js));
    obj.insert("redirect".into(), json!(host.redirect));
    obj.insert("redirect_to_nothing".into(), json!(host.redirect_to_nothing));
    obj.insert("iframe".into(), json!(host.iframe));
    obj.insert("image".into(), json!(host.image));
    obj.insert("css".into(), json!(host.css));
    obj.insert("json".into(), json!(host.json));
    obj.insert("html".into(), json!(host.html));
    obj.insert("font".into(), json!(host.font));
    obj.insert("octet_stream".into(), json!(host.octet_stream));
    obj.insert("text".into(), json!(host.text));
    obj.insert("video".into(), json!(host.video));
    obj.insert("unknown_mimetype".into(), json!(host.unknown_mimetype));

    obj.insert("http_content".into(), json!(host.http_content));
    obj.insert("https_content".into(), json!(host.https_content));
    obj.insert("mixed_content".into(), json!(host.mixed_content()));

    let children: Vec<Value> = host.children.iter().map(host_node_to_json).collect();
    obj.insert("children".into(), json!(children));

    Value::Object(obj)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host_tree::make_hostname_tree;
    use crate::node::mime::MimeFlags;
    use serde_json::json as j;
    use uuid::Uuid;

    fn leaf(name: &str, hostname: &str) -> URLNode {
        URLNode {
            uuid: Uuid::new_v4(),
            name: name.to_string(),
            hostname: hostname.to_string(),
            alternative_url_for_referer: name.to_string(),
            start_time: None,
            time: 0.0,
            time_content_received: None,
            pageref: "page_1".to_string(),
            request: j!({}),
            response: j!({}),
            referer: None,
            user_agent: None,
            request_cookie: Vec::new(),
            response_cookie: Vec::new(),
            cookies_received: Vec::new(),
            cookies_sent: Default::default(),
            set_third_party_cookies: false,
            body: Some(b"hello".to_vec()),
            body_hash: Some("deadbeef".to_string()),
            mimetype: "text/html".to_string(),
            filename: "index.html".to_string(),
            empty_response: false,
            external_ressources: Default::default(),
            ip_address: Some("1.2.3.4".to_string()),
            initiator_url: None,
            redirect: false,
            redirect_url: None,
            redirect_to_nothing: false,
            mime: MimeFlags::classify("text/html"),
            unknown_tld: false,
            children: Vec::new(),
        }
    }

    #[test]
    fn url_node_json_skips_body_and_timing_fields() {
        let node = leaf("http://a/", "a");
        let value = url_node_to_json(&node);
        let obj = value.as_object().unwrap();
        assert!(!obj.contains_key("body"));
        assert!(!obj.contains_key("url_split"));
        assert!(!obj.contains_key("start_time"));
        assert!(!obj.contains_key("time"));
        assert!(!obj.contains_key("time_content_received"));
        assert!(!obj.contains_key("ip_address"));
        assert_eq!(obj["name"], j!("http://a/"));
        assert_eq!(obj["html"], j!(true));
    }

    #[test]
    fn host_node_json_replaces_urls_with_count() {
        let mut root = leaf("http://a/", "a");
        root.children.push(leaf("http://a/b", "a"));
        let host_tree = make_hostname_tree(&root);
        let value = host_node_to_json(&host_tree);
        let obj = value.as_object().unwrap();
        assert!(!obj.contains_key("urls"));
        assert_eq!(obj["urls_count"], j!(2));
    }
}
