//! Cookie bookkeeping: per-entry extraction of received/sent cookies, and
//! the record shape used by the resolver's cross-attribution pass (§4.5).

use std::collections::HashMap;

use serde_json::Value;
use uuid::Uuid;

/// A cookie set by some response, attributed to the node that set it.
#[derive(Debug, Clone)]
pub struct ReceivedCookie {
    pub domain: String,
    pub name_value: String,
    pub third_party: bool,
}

/// Record attached to a `cookies_sent` entry once the resolver has matched
/// it back to the node(s) that originally set it.
#[derive(Debug, Clone)]
pub struct CookieSetter {
    pub hostname: String,
    pub uuid: Uuid,
    pub name: String,
    pub third_party: bool,
}

/// Build the `cookies_received` list and the third-party aggregate flag for
/// one entry's `response.cookies`.
pub fn parse_cookies_received(
    response_cookies: &[Value],
    hostname: &str,
) -> (Vec<ReceivedCookie>, bool) {
    let mut received = Vec::new();
    let mut any_third_party = false;

    for cookie in response_cookies {
        let name = cookie["name"].as_str().unwrap_or_default();
        let value = cookie["value"].as_str().unwrap_or_default();
        let raw_domain = cookie["domain"].as_str().unwrap_or(hostname);
        let domain = raw_domain.strip_prefix('.').unwrap_or(raw_domain).to_string();

        let third_party = !hostname.ends_with(domain.as_str());
        if third_party {
            any_third_party = true;
        }

        received.push(ReceivedCookie {
            domain,
            name_value: format!("{}={}", name, value),
            third_party,
        });
    }

    (received, any_third_party)
}

/// Seed the `cookies_sent` map with one empty attribution list per cookie
/// key in `request.cookies`; the resolver fills these in during
/// cross-attribution.
pub fn init_cookies_sent(request_cookies: &[Value]) -> HashMap<String, Vec<CookieSetter>> {
    let mut sent = HashMap::new();
    for cookie in request_cookies {
        let name = cookie["name"].as_str().unwrap_or_default();
        let value = cookie["value"].as_str().unwrap_or_default();
        sent.entry(format!("{}={}", name, value)).or_insert_with(Vec::new);
    }
    sent
}

/// Extract the `name=value` keys of every cookie in the colocated full
/// cookie jar side-car (`<stem>.cookies.json`), in jar order.
pub fn jar_keys(jar: Option<&Value>) -> Vec<String> {
    let Some(array) = jar.and_then(Value::as_array) else {
        return Vec::new();
    };
    array
        .iter()
        .filter_map(|cookie| {
            let name = cookie["name"].as_str()?;
            let value = cookie["value"].as_str().unwrap_or_default();
            Some(format!("{}={}", name, value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn same_domain_cookie_not_third_party() {
        let cookies = vec![json!({"name": "session", "value": "abc", "domain": "a.b"})];
        let (received, any) = parse_cookies_received(&cookies, "a.b");
        assert!(!received[0].third_party);
        assert!(!any);
    }

    #[test]
    fn foreign_domain_cookie_is_third_party() {
        let cookies = vec![json!({"name": "tracker", "value": "xyz", "domain": "ads.example"})];
        let (received, any) = parse_cookies_received(&cookies, "a.b");
        assert!(received[0].third_party);
        assert!(any);
    }

    #[test]
    fn leading_dot_domain_stripped() {
        let cookies = vec![json!({"name": "s", "value": "v", "domain": ".a.b"})];
        let (received, _) = parse_cookies_received(&cookies, "sub.a.b");
        assert_eq!(received[0].domain, "a.b");
        assert!(!received[0].third_party);
    }

    #[test]
    fn init_cookies_sent_seeds_empty_lists() {
        let cookies = vec![json!({"name": "a", "value": "1"})];
        let sent = init_cookies_sent(&cookies);
        assert_eq!(sent.get("a=1").unwrap().len(), 0);
    }

    #[test]
    fn jar_keys_extracts_name_value_pairs_in_order() {
        let jar = json!([{"name": "a", "value": "1"}, {"name": "b", "value": "2"}]);
        assert_eq!(jar_keys(Some(&jar)), vec!["a=1".to_string(), "b=2".to_string()]);
    }

    #[test]
    fn jar_keys_empty_when_no_sidecar() {
        assert!(jar_keys(None).is_empty());
    }
}
