//! Destination checks for agent response URLs.
//!
//! A response destination is only used when all of the following hold:
//!
//! 1. scheme is `ws` or `wss`
//! 2. host matches the allow-list (exact, `*.domain`, IPv4 CIDR, or `*`)
//! 3. port is a default port (80/443) or a high port (1024-65535)
//! 4. path does not start with a blocked prefix
//!
//! Host matching is done by hand on purpose: CIDR entries are compared as
//! 32-bit integers and malformed entries match nothing.

use serde::Serialize;
use url::Url;

use crate::config::HitlConfig;

/// Path prefixes that are never valid destinations, whatever the host.
pub const BLOCKED_PATH_PREFIXES: &[&str] = &["/admin", "/internal", "/private", "/."];

const DEFAULT_PORTS: [u16; 2] = [80, 443];
const MIN_HIGH_PORT: u16 = 1024;

/// Diagnostic breakdown of a destination URL.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WsUrlInfo {
    pub valid: bool,
    pub protocol: Option<String>,
    pub hostname: Option<String>,
    pub port: Option<u16>,
    pub path: Option<String>,
    pub is_secure: bool,
    pub is_whitelisted: bool,
}

/// SSRF guard for WebSocket destinations.
#[derive(Debug, Clone)]
pub struct WsValidator {
    allowed_hosts: Vec<String>,
}

impl WsValidator {
    pub fn new(allowed_hosts: Vec<String>) -> Self {
        let allowed_hosts: Vec<String> = allowed_hosts
            .into_iter()
            .map(|h| h.trim().to_ascii_lowercase())
            .filter(|h| !h.is_empty())
            .collect();
        if allowed_hosts.iter().any(|h| h == "*") {
            tracing::warn!("allow-list contains '*': every WebSocket host is allowed");
        }
        Self { allowed_hosts }
    }

    pub fn from_config(config: &HitlConfig) -> Self {
        Self::new(config.allowed_hosts.clone())
    }

    pub fn allowed_hosts(&self) -> &[String] {
        &self.allowed_hosts
    }

    /// Run every check. Unparseable or empty input is rejected.
    pub fn validate(&self, url: &str) -> bool {
        let Some(parsed) = parse(url) else {
            tracing::debug!(url, "websocket url rejected: unparseable");
            return false;
        };

        if !is_ws_scheme(parsed.scheme()) {
            tracing::warn!(url, scheme = parsed.scheme(), "websocket url rejected: scheme");
            return false;
        }
        if !self.is_host_allowed(&parsed) {
            tracing::warn!(url, "websocket url rejected: host not in allow-list");
            return false;
        }
        if !is_port_allowed(parsed.port()) {
            tracing::warn!(url, port = ?parsed.port(), "websocket url rejected: port");
            return false;
        }
        if is_path_blocked(parsed.path()) {
            tracing::warn!(url, path = parsed.path(), "websocket url rejected: path");
            return false;
        }
        true
    }

    pub fn info(&self, url: &str) -> WsUrlInfo {
        let Some(parsed) = parse(url) else {
            return WsUrlInfo::default();
        };

        WsUrlInfo {
            valid: self.validate(url),
            protocol: Some(parsed.scheme().to_string()),
            hostname: parsed.host_str().map(String::from),
            port: parsed.port_or_known_default(),
            path: Some(parsed.path().to_string()),
            is_secure: parsed.scheme() == "wss",
            is_whitelisted: self.is_host_allowed(&parsed),
        }
    }

    fn is_host_allowed(&self, parsed: &Url) -> bool {
        let Some(host) = parsed.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        // IPv6 hosts come back bracketed; allow either spelling in the list.
        let bare = host.trim_start_matches('[').trim_end_matches(']');

        self.allowed_hosts
            .iter()
            .any(|entry| host_matches(&host, entry) || host_matches(bare, entry))
    }
}

/// Coerce `http(s)://` to `ws(s)://`, keeping everything else. No safety
/// checks are done here.
pub fn normalize_websocket_url(url: &str) -> Option<String> {
    let mut parsed = parse(url)?;
    let target = match parsed.scheme() {
        "http" => "ws",
        "https" => "wss",
        _ => return Some(parsed.to_string()),
    };
    parsed.set_scheme(target).ok()?;
    Some(parsed.to_string())
}

fn parse(url: &str) -> Option<Url> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return None;
    }
    Url::parse(trimmed).ok()
}

fn is_ws_scheme(scheme: &str) -> bool {
    scheme == "ws" || scheme == "wss"
}

/// `None` means the scheme's default port was used.
fn is_port_allowed(port: Option<u16>) -> bool {
    match port {
        None => true,
        Some(p) if DEFAULT_PORTS.contains(&p) => true,
        Some(p) => p >= MIN_HIGH_PORT,
    }
}

fn is_path_blocked(path: &str) -> bool {
    let lowered = path.to_ascii_lowercase();
    BLOCKED_PATH_PREFIXES
        .iter()
        .any(|prefix| lowered.starts_with(prefix))
}

fn host_matches(host: &str, entry: &str) -> bool {
    if entry == "*" {
        return true;
    }
    if let Some(domain) = entry.strip_prefix("*.") {
        return host == domain || host.ends_with(&entry[1..]);
    }
    if entry.contains('/') {
        return cidr_contains(entry, host);
    }
    host == entry
}

/// IPv4 CIDR containment. A malformed network or prefix matches nothing.
fn cidr_contains(cidr: &str, host: &str) -> bool {
    let Some((network, prefix)) = cidr.split_once('/') else {
        return false;
    };
    if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let Ok(prefix) = prefix.parse::<u32>() else {
        return false;
    };
    if prefix > 32 {
        return false;
    }
    let (Some(network), Some(addr)) = (ipv4_to_u32(network), ipv4_to_u32(host)) else {
        return false;
    };

    let mask = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
    (network & mask) == (addr & mask)
}

fn ipv4_to_u32(s: &str) -> Option<u32> {
    let mut value: u32 = 0;
    let mut octets = 0;
    for part in s.split('.') {
        if part.is_empty() || part.len() > 3 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let octet: u32 = part.parse().ok()?;
        if octet > 255 {
            return None;
        }
        value = (value << 8) | octet;
        octets += 1;
    }
    (octets == 4).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback() -> WsValidator {
        WsValidator::from_config(&HitlConfig::default())
    }

    #[test]
    fn test_accepts_loopback_destinations() {
        let v = loopback();
        assert!(v.validate("ws://localhost:4000/hitl"));
        assert!(v.validate("wss://127.0.0.1/ws"));
        assert!(v.validate("ws://[::1]:8080/"));
        assert!(v.validate("ws://localhost"));
    }

    #[test]
    fn test_rejects_unlisted_host() {
        assert!(!loopback().validate("ws://evil.com/steal"));
    }

    #[test]
    fn test_rejects_non_websocket_schemes() {
        let v = loopback();
        for url in [
            "http://localhost:4000/",
            "https://localhost/",
            "//localhost:4000/",
            "file:///etc/passwd",
            "javascript:alert(1)",
            "data:text/plain,hi",
            "",
            "   ",
            "not a url",
        ] {
            assert!(!v.validate(url), "should reject {url:?}");
        }
    }

    #[test]
    fn test_port_policy() {
        let v = loopback();
        assert!(v.validate("ws://localhost:80/"));
        assert!(v.validate("ws://localhost:443/"));
        assert!(v.validate("ws://localhost:1024/"));
        assert!(v.validate("ws://localhost:65535/"));
        assert!(!v.validate("ws://localhost:22/"));
        assert!(!v.validate("ws://localhost:1023/"));
        assert!(!v.validate("ws://localhost:0/"));
        assert!(!v.validate("ws://localhost:65536/"));
    }

    #[test]
    fn test_blocked_paths() {
        let v = loopback();
        assert!(!v.validate("ws://localhost:4000/admin"));
        assert!(!v.validate("ws://localhost:4000/internal/metrics"));
        assert!(!v.validate("ws://localhost:4000/private"));
        assert!(!v.validate("ws://localhost:4000/.env"));
        assert!(v.validate("ws://localhost:4000/hitl/admin"));
    }

    #[test]
    fn test_wildcard_subdomains() {
        let v = WsValidator::new(vec!["*.example.com".into()]);
        assert!(v.validate("wss://agents.example.com/ws"));
        assert!(v.validate("wss://a.b.example.com/ws"));
        assert!(v.validate("wss://example.com/ws"));
        assert!(!v.validate("wss://badexample.com/ws"));
        assert!(!v.validate("wss://example.com.evil.net/ws"));
    }

    #[test]
    fn test_cidr_entries() {
        let v = WsValidator::new(vec!["10.0.0.0/8".into(), "192.168.1.0/24".into()]);
        assert!(v.validate("ws://10.20.30.40:9000/"));
        assert!(v.validate("ws://192.168.1.200:9000/"));
        assert!(!v.validate("ws://192.168.2.1:9000/"));
        assert!(!v.validate("ws://11.0.0.1:9000/"));
    }

    #[test]
    fn test_cidr_boundaries() {
        assert!(cidr_contains("0.0.0.0/0", "8.8.8.8"));
        assert!(cidr_contains("10.1.2.3/32", "10.1.2.3"));
        assert!(!cidr_contains("10.1.2.3/32", "10.1.2.4"));
        assert!(!cidr_contains("10.0.0.0/33", "10.0.0.1"));
        assert!(!cidr_contains("10.0.0/8", "10.0.0.1"));
        assert!(!cidr_contains("10.0.0.256/8", "10.0.0.1"));
        assert!(!cidr_contains("10.0.0.0/x", "10.0.0.1"));
        assert!(!cidr_contains("10.0.0.0/", "10.0.0.1"));
        assert!(!cidr_contains("10.0.0.0/8", "localhost"));
    }

    #[test]
    fn test_star_allows_everything_but_other_checks_still_apply() {
        let v = WsValidator::new(vec!["*".into()]);
        assert!(v.validate("wss://anything.net/ws"));
        assert!(!v.validate("wss://anything.net:25/ws"));
        assert!(!v.validate("wss://anything.net/admin"));
        assert!(!v.validate("https://anything.net/ws"));
    }

    #[test]
    fn test_normalize_coerces_http() {
        assert_eq!(
            normalize_websocket_url("http://user:pw@localhost:4000/a/b?x=1#frag").as_deref(),
            Some("ws://user:pw@localhost:4000/a/b?x=1#frag")
        );
        assert_eq!(
            normalize_websocket_url("https://example.com/ws").as_deref(),
            Some("wss://example.com/ws")
        );
        assert_eq!(
            normalize_websocket_url("ws://localhost:4000/ws").as_deref(),
            Some("ws://localhost:4000/ws")
        );
        assert_eq!(normalize_websocket_url("::nope::"), None);
    }

    #[test]
    fn test_info_reports_full_validity() {
        let v = loopback();
        let info = v.info("wss://localhost:22/ws");
        assert!(info.is_whitelisted);
        assert!(info.is_secure);
        assert!(!info.valid);
        assert_eq!(info.port, Some(22));
        assert_eq!(info.hostname.as_deref(), Some("localhost"));

        let info = v.info("ws://localhost/ws");
        assert!(info.valid);
        assert_eq!(info.port, Some(80));
        assert_eq!(info.protocol.as_deref(), Some("ws"));
    }

    #[test]
    fn test_info_on_garbage() {
        assert_eq!(loopback().info("%%%"), WsUrlInfo::default());
    }
}
