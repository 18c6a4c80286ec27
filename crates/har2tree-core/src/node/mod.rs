//! Per-entry node construction (C4): the bulk of the work that turns one
//! raw HAR entry into a fully-classified `URLNode`.

pub mod cookie;
pub mod initiator;
pub mod mime;

use std::collections::HashSet;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Duration, FixedOffset};
use percent_encoding::percent_decode_str;
use serde_json::Value;
use sha2::{Digest, Sha512};
use uuid::Uuid;

use self::cookie::{init_cookies_sent, parse_cookies_received, CookieSetter, ReceivedCookie};
use self::mime::MimeFlags;
use crate::error::UnsupportedInitiatorError;
use crate::html_extract::{find_external_resources, ExternalResources};
use crate::url_rebuild::{rebuild_url, strip_fragment};

/// A single resolved HAR entry, the unit the resolver (C5) assembles into
/// a tree.
#[derive(Debug, Clone)]
pub struct URLNode {
    pub uuid: Uuid,
    pub name: String,
    pub hostname: String,
    pub alternative_url_for_referer: String,
    pub start_time: Option<DateTime<FixedOffset>>,
    pub time: f64,
    pub time_content_received: Option<DateTime<FixedOffset>>,
    pub pageref: String,

    pub request: Value,
    pub response: Value,
    pub referer: Option<String>,
    pub user_agent: Option<String>,

    pub request_cookie: Vec<Value>,
    pub response_cookie: Vec<Value>,
    pub cookies_received: Vec<ReceivedCookie>,
    pub cookies_sent: std::collections::HashMap<String, Vec<CookieSetter>>,
    pub set_third_party_cookies: bool,

    pub body: Option<Vec<u8>>,
    pub body_hash: Option<String>,
    pub mimetype: String,
    pub filename: String,
    pub empty_response: bool,

    pub external_ressources: ExternalResources,
    pub ip_address: Option<String>,
    pub initiator_url: Option<String>,

    pub redirect: bool,
    pub redirect_url: Option<String>,
    pub redirect_to_nothing: bool,

    pub mime: MimeFlags,
    pub unknown_tld: bool,

    pub children: Vec<URLNode>,
}

impl URLNode {
    /// Build a node from one HAR entry. `known` is the set of all request
    /// URLs in the capture (used by the URL normalizer and redirect
    /// resolution); `full_text_search` gates C2's advisory regex pass.
    pub fn build(
        entry: &Value,
        known: &HashSet<String>,
        full_text_search: bool,
    ) -> Result<Self, UnsupportedInitiatorError> {
        let raw_name = entry["request"]["url"].as_str().unwrap_or_default();
        let name = percent_decode_str(raw_name).decode_utf8_lossy().into_owned();
        let hostname = url::Url::parse(&name)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
            .unwrap_or_default();
        let alternative_url_for_referer = strip_fragment(&name);

        let start_time = entry["startedDateTime"]
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok());
        let time = entry["time"].as_f64().unwrap_or(0.0);
        let time_content_received = start_time.map(|t| t + Duration::milliseconds(time as i64));

        let pageref = entry["pageref"].as_str().unwrap_or_default().to_string();

        let unknown_tld = classify_unknown_tld(&hostname);
        if unknown_tld {
            tracing::debug!(hostname = %hostname, "unrecognized TLD");
        }

        let request = entry["request"].clone();
        let response = entry["response"].clone();

        let headers = entry["request"]["headers"].as_array().cloned().unwrap_or_default();
        let referer = header_value(&headers, "referer")
            .map(|v| percent_decode_str(&v).decode_utf8_lossy().into_owned());
        let user_agent = header_value(&headers, "user-agent");

        let request_cookie = entry["request"]["cookies"].as_array().cloned().unwrap_or_default();
        let response_cookie = entry["response"]["cookies"].as_array().cloned().unwrap_or_default();
        let (cookies_received, set_third_party_cookies) =
            parse_cookies_received(&response_cookie, &hostname);
        let cookies_sent = init_cookies_sent(&request_cookie);

        let mimetype = entry["response"]["content"]["mimeType"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        let text = entry["response"]["content"]["text"].as_str();
        let empty_response = text.map(|t| t.is_empty()).unwrap_or(true);

        let mut body: Option<Vec<u8>> = None;
        let mut body_hash: Option<String> = None;
        let mut external_ressources = ExternalResources::new();

        if let Some(text) = text.filter(|t| !t.is_empty()) {
            let encoding = entry["response"]["content"]["encoding"].as_str().unwrap_or("");
            let bytes = if encoding == "base64" {
                BASE64.decode(text).unwrap_or_default()
            } else {
                text.as_bytes().to_vec()
            };

            let mut hasher = Sha512::new();
            hasher.update(&bytes);
            body_hash = Some(hex::encode(hasher.finalize()));

            if mimetype.to_ascii_lowercase().starts_with("text/html") {
                if let Ok(html) = String::from_utf8(bytes.clone()) {
                    external_ressources =
                        find_external_resources(&html, &name, known, full_text_search);
                }
            }

            body = Some(bytes);
        }

        let filename = derive_filename(&name);

        let mime = MimeFlags::classify(&mimetype);

        let initiator_url = initiator::parse_initiator(entry.get("_initiator"), &name)?;

        let (redirect, redirect_url, redirect_to_nothing) =
            resolve_redirect(&entry["response"], &name, known);

        Ok(Self {
            uuid: Uuid::new_v4(),
            name,
            hostname,
            alternative_url_for_referer,
            start_time,
            time,
            time_content_received,
            pageref,
            request,
            response,
            referer,
            user_agent,
            request_cookie,
            response_cookie,
            cookies_received,
            cookies_sent,
            set_third_party_cookies,
            body,
            body_hash,
            mimetype,
            filename,
            empty_response,
            external_ressources,
            ip_address: entry["serverIPAddress"].as_str().map(|s| s.to_string()),
            initiator_url,
            redirect,
            redirect_url,
            redirect_to_nothing,
            mime,
            unknown_tld,
            children: Vec::new(),
        })
    }
}

fn resolve_redirect(
    response: &Value,
    name: &str,
    known: &HashSet<String>,
) -> (bool, Option<String>, bool) {
    let raw_redirect = response["redirectURL"].as_str().unwrap_or_default();
    if raw_redirect.is_empty() {
        return (false, None, false);
    }

    let rebuilt = rebuild_url(name, raw_redirect, known);
    if known.contains(&rebuilt) {
        (true, Some(rebuilt), false)
    } else {
        (true, Some(raw_redirect.to_string()), true)
    }
}

/// A hostname's suffix is "unknown" unless it matches an explicit rule in
/// the public suffix list. `psl::suffix` always returns *some* suffix (the
/// list's implicit `*` rule matches any single trailing label), so the
/// presence of a suffix alone never signals a genuinely recognized TLD —
/// `Suffix::is_known` does.
fn classify_unknown_tld(hostname: &str) -> bool {
    if hostname.is_empty() {
        return false;
    }
    if hostname.parse::<std::net::IpAddr>().is_ok() || hostname.contains(':') {
        return false;
    }
    !psl::suffix(hostname.as_bytes()).is_some_and(|suffix| suffix.is_known())
}

fn derive_filename(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segs| segs.next_back().map(|s| s.to_string()))
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "file.bin".to_string())
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
