//! URL and markup rewriting for sandboxed replay.
//!
//! Snapshots are replayed from a single safe origin, so custom schemes are
//! folded into a synthesized `https://pw-<scheme>--<host>` hostname and script
//! schemes are neutralized.

use regex::{Captures, Regex};
use reqwest::Url;
use std::sync::OnceLock;

/// Schemes that can be replayed as-is (with the exception of blob and file).
pub const SAFE_SCHEMES: &[&str] = &[
    "about:", "blob:", "data:", "file:", "ftp:", "http:", "https:", "mailto:", "sftp:", "ws:",
    "wss:",
];

/// Prefix older recorders put in front of blob URLs
pub const LEGACY_BLOB_PREFIX: &str = "http://playwright.bloburl/#";

/// Rewrite an attribute URL so it resolves inside the replay origin.
///
/// Unparsable input is returned unchanged.
pub fn rewrite_url_for_custom_protocol(href: &str) -> String {
    let href = href.strip_prefix(LEGACY_BLOB_PREFIX).unwrap_or(href);

    let url = match Url::parse(href) {
        Ok(url) => url,
        Err(_) => return href.to_string(),
    };
    let scheme = url.scheme();
    if scheme == "javascript" || scheme == "vbscript" {
        return "javascript:void(0)".to_string();
    }

    let protocol = format!("{}:", scheme);
    let is_blob = scheme == "blob";
    let is_file = scheme == "file";
    if !is_blob && !is_file && SAFE_SCHEMES.contains(&protocol.as_str()) {
        return href.to_string();
    }

    let prefix = format!("pw-{}", scheme);
    let host = match url.host_str().filter(|h| !h.is_empty()) {
        Some(host) => format!("{}--{}", prefix, host),
        None => prefix,
    };
    let mut rewritten = format!("https://{}", host);
    if let Some(port) = url.port() {
        rewritten.push(':');
        rewritten.push_str(&port.to_string());
    }
    let path = url.path();
    if !path.starts_with('/') {
        rewritten.push('/');
    }
    rewritten.push_str(path);
    if let Some(query) = url.query() {
        rewritten.push('?');
        rewritten.push_str(query);
    }
    if let Some(fragment) = url.fragment() {
        rewritten.push('#');
        rewritten.push_str(fragment);
    }
    match Url::parse(&rewritten) {
        Ok(url) => url.to_string(),
        Err(_) => rewritten,
    }
}

fn url_in_css_regex() -> &'static Regex {
    static URL_IN_CSS: OnceLock<Regex> = OnceLock::new();
    URL_IN_CSS.get_or_init(|| Regex::new(r#"(?i)url\(['"]?([\w-]+:)//"#).expect("valid css url regex"))
}

fn single_quoted_url_regex() -> &'static Regex {
    static SINGLE: OnceLock<Regex> = OnceLock::new();
    SINGLE.get_or_init(|| Regex::new(r"(?i)url\(\s*'([^']*)'\s*\)").expect("valid css url regex"))
}

fn double_quoted_url_regex() -> &'static Regex {
    static DOUBLE: OnceLock<Regex> = OnceLock::new();
    DOUBLE.get_or_init(|| Regex::new(r#"(?i)url\(\s*"([^"]*)"\s*\)"#).expect("valid css url regex"))
}

/// Rewrite `url(scheme://...)` references inside stylesheet text.
pub fn rewrite_urls_in_stylesheet(text: &str) -> String {
    url_in_css_regex()
        .replace_all(text, |caps: &Captures| {
            let matched = &caps[0];
            let protocol = &caps[1];
            let is_blob = protocol == "blob:";
            let is_file = protocol == "file:";
            if !is_blob && !is_file && SAFE_SCHEMES.contains(&protocol) {
                return matched.to_string();
            }
            let scheme = &protocol[..protocol.len() - 1];
            matched.replacen(
                &format!("{}//", protocol),
                &format!("https://pw-{}--", scheme),
                1,
            )
        })
        .into_owned()
}

/// Percent-encode `url('...')` values that contain a closing tag, so they
/// cannot terminate the surrounding `<style>` element.
pub fn escape_urls_in_stylesheet(text: &str) -> String {
    let replacer = |caps: &Captures| {
        let matched = &caps[0];
        let url = &caps[1];
        if url.contains("</") {
            matched.replacen(url, &encode_uri(url), 1)
        } else {
            matched.to_string()
        }
    };
    let once = single_quoted_url_regex().replace_all(text, replacer);
    double_quoted_url_regex()
        .replace_all(&once, replacer)
        .into_owned()
}

/// Percent-encode everything outside the URI reserved/unreserved set.
pub fn encode_uri(input: &str) -> String {
    const KEEP: &[u8] = b";,/?:@&=+$-_.!~*'()#";
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        if byte.is_ascii_alphanumeric() || KEEP.contains(&byte) {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

/// Escape text content. Only `&` and `<` can change how text parses.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            c => out.push(c),
        }
    }
    out
}

/// Escape a double-quoted attribute value.
pub fn escape_html_attribute(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// `<base>/snapshot.html?r=<url>` (the pop-out viewer) unwraps to `<url>`.
pub fn unwrap_popout_url(url: &str) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return url.to_string();
    };
    if !parsed.path().ends_with("/snapshot.html") {
        return url.to_string();
    }
    parsed
        .query_pairs()
        .find(|(key, _)| key == "r")
        .map(|(_, value)| value.into_owned())
        .unwrap_or_else(|| url.to_string())
}
