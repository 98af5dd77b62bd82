//! # Link Normalization
//!
//! Rewrites file-host share links into URLs that serve raw bytes.
//!
//! The rules are applied in order and are cumulative:
//!
//! 1. Every `dl=0` query pair becomes `raw=1`. Once rule 1 has run no
//!    share marker is left, so the `dl=1` fallback never has work to do.
//! 2. A URL without a query string gets `?raw=1` appended.
//! 3. On the provider's web host, the host is swapped for the user-content
//!    host and every `dl` / `raw` pair is removed.
//!
//! URLs already on the user-content host only have their markers stripped.
//! Query strings are edited segment by segment so the encoding of unrelated
//! parameters is left alone, which keeps `normalize` idempotent.
//!
//! These rules are guesses about a third-party URL grammar. When link
//! verification is enabled the upload path double-checks results with
//! [`crate::probe::LinkProbe`].
//!
//! ```rust
//! use core_media::links::normalize;
//!
//! assert_eq!(
//!     normalize("https://www.dropbox.com/s/abc/x.mov?dl=0"),
//!     "https://dl.dropboxusercontent.com/s/abc/x.mov"
//! );
//! ```

use crate::classify::classify;
use bridge_traits::MediaKind;
use serde::Serialize;
use serde_json::Value;
use url::Url;

/// Hosts that serve the provider's browser preview pages.
pub const WEB_HOSTS: &[&str] = &["www.dropbox.com", "dropbox.com"];

/// Host that serves file bytes directly.
pub const CONTENT_HOST: &str = "dl.dropboxusercontent.com";

const SHARE_MARKER: &str = "dl=0";
const RAW_MARKER: &str = "raw=1";

/// Normalize a share link into a direct link. Deterministic and idempotent.
pub fn normalize(raw: &str) -> String {
    let trimmed = raw.trim();
    match Url::parse(trimmed) {
        Ok(url) if url.has_host() => normalize_url(url).into(),
        _ => normalize_text(trimmed),
    }
}

/// Whether `url` is already in normalized form.
pub fn is_direct(url: &str) -> bool {
    normalize(url) == url
}

/// Whether the link points at the file host at all (web or content host).
pub fn is_provider_link(url: &str) -> bool {
    match Url::parse(url.trim()) {
        Ok(parsed) => parsed
            .host_str()
            .map(|host| is_provider_host(&host.to_ascii_lowercase()))
            .unwrap_or(false),
        Err(_) => {
            let lower = url.to_ascii_lowercase();
            lower.contains("dropbox.com") || lower.contains(CONTENT_HOST)
        }
    }
}

fn is_provider_host(host: &str) -> bool {
    host == CONTENT_HOST || host == "dropbox.com" || host.ends_with(".dropbox.com")
}

fn normalize_url(mut url: Url) -> Url {
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();

    if host == CONTENT_HOST {
        strip_markers(&mut url);
        return url;
    }

    match url.query() {
        Some(query) => {
            let mut segments: Vec<String> = query.split('&').map(str::to_owned).collect();
            if rewrite_share_marker(&mut segments) {
                url.set_query(Some(&segments.join("&")));
            }
        }
        None => url.set_query(Some(RAW_MARKER)),
    }

    if WEB_HOSTS.contains(&host.as_str()) && url.set_host(Some(CONTENT_HOST)).is_ok() {
        strip_markers(&mut url);
    }

    url
}

/// Rule 1. Returns whether any segment changed.
fn rewrite_share_marker(segments: &mut [String]) -> bool {
    let mut changed = false;
    for segment in segments.iter_mut().filter(|s| s.as_str() == SHARE_MARKER) {
        *segment = RAW_MARKER.to_string();
        changed = true;
    }
    changed
}

fn is_marker(segment: &str) -> bool {
    matches!(segment.split('=').next(), Some("dl") | Some("raw"))
}

fn strip_markers(url: &mut Url) {
    let Some(query) = url.query() else {
        return;
    };
    if !query.split('&').any(is_marker) {
        return;
    }
    let kept: Vec<&str> = query.split('&').filter(|s| !is_marker(s)).collect();
    let rebuilt = kept.join("&");
    if rebuilt.is_empty() {
        url.set_query(None);
    } else {
        url.set_query(Some(&rebuilt));
    }
}

/// Rules 1 and 2 on strings that are not absolute URLs (relative upload paths).
fn normalize_text(input: &str) -> String {
    match input.split_once('?') {
        Some((base, query)) => {
            let mut segments: Vec<String> = query.split('&').map(str::to_owned).collect();
            if rewrite_share_marker(&mut segments) {
                format!("{}?{}", base, segments.join("&"))
            } else {
                input.to_string()
            }
        }
        None => format!("{input}?{RAW_MARKER}"),
    }
}

/// Everything known about a raw link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkAnalysis {
    pub original_url: String,
    pub direct_url: String,
    pub kind: MediaKind,
    pub is_provider_link: bool,
    pub hostname: Option<String>,
}

pub fn analyze(url: &str) -> LinkAnalysis {
    let direct_url = normalize(url);
    let hostname = Url::parse(&direct_url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_owned));

    LinkAnalysis {
        original_url: url.to_string(),
        kind: classify(&direct_url),
        is_provider_link: is_provider_link(url),
        hostname,
        direct_url,
    }
}

/// A rewrite made by [`normalize_links_in_value`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkFix {
    /// JSON pointer to the rewritten string
    pub pointer: String,
    pub before: String,
    pub after: String,
}

/// Normalize every provider link found anywhere in a JSON document.
///
/// Strings that are not provider links are left untouched, so catalog text
/// and third-party image URLs survive unchanged.
pub fn normalize_links_in_value(value: &mut Value) -> Vec<LinkFix> {
    let mut fixes = Vec::new();
    walk(value, String::new(), &mut fixes);
    fixes
}

fn walk(value: &mut Value, pointer: String, fixes: &mut Vec<LinkFix>) {
    match value {
        Value::String(text) => {
            if !is_provider_link(text) {
                return;
            }
            let after = normalize(text);
            if after != *text {
                let before = std::mem::replace(text, after.clone());
                fixes.push(LinkFix {
                    pointer,
                    before,
                    after,
                });
            }
        }
        Value::Array(items) => {
            for (index, item) in items.iter_mut().enumerate() {
                walk(item, format!("{pointer}/{index}"), fixes);
            }
        }
        Value::Object(map) => {
            for (key, item) in map.iter_mut() {
                walk(item, format!("{pointer}/{}", escape_pointer(key)), fixes);
            }
        }
        _ => {}
    }
}

fn escape_pointer(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}
