use serde::Serialize;

pub const DEFAULT_TIMEOUT_SECS: i64 = 300;
pub const DEFAULT_RETRY_ATTEMPTS: i64 = 3;
pub const DEFAULT_RETRY_DELAY_MS: i64 = 1000;
pub const DEFAULT_PORT: u16 = 4000;

/// Loopback variants accepted when no allow-list is configured.
pub const DEFAULT_ALLOWED_HOSTS: &[&str] = &["localhost", "127.0.0.1", "[::1]", "::1"];

/// Tunables for the HITL core.
#[derive(Debug, Clone, Serialize)]
pub struct HitlConfig {
    /// Seconds to wait for a human. Negative values are kept as-is and
    /// disable the timer.
    pub default_timeout: i64,
    /// Exact hosts, `*.domain` wildcards, IPv4 CIDR blocks, or `*`.
    pub allowed_hosts: Vec<String>,
    pub ws_retry_attempts: i64,
    /// Base delay in milliseconds; attempt `n` waits `n * delay`.
    pub ws_retry_delay_ms: i64,
    pub debug: bool,
}

impl Default for HitlConfig {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_TIMEOUT_SECS,
            allowed_hosts: DEFAULT_ALLOWED_HOSTS.iter().map(|s| s.to_string()).collect(),
            ws_retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            ws_retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            debug: false,
        }
    }
}

impl HitlConfig {
    /// Build from an environment-style lookup. Unset or unparseable numbers
    /// fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let allowed_hosts: Vec<String> = lookup("HITL_WS_WHITELIST")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        Self {
            default_timeout: parse_int(lookup("HITL_DEFAULT_TIMEOUT"), DEFAULT_TIMEOUT_SECS),
            allowed_hosts: if allowed_hosts.is_empty() {
                DEFAULT_ALLOWED_HOSTS.iter().map(|s| s.to_string()).collect()
            } else {
                allowed_hosts
            },
            ws_retry_attempts: parse_int(lookup("HITL_WS_RETRY_ATTEMPTS"), DEFAULT_RETRY_ATTEMPTS),
            ws_retry_delay_ms: parse_int(lookup("HITL_WS_RETRY_DELAY"), DEFAULT_RETRY_DELAY_MS),
            debug: lookup("HITL_DEBUG").as_deref() == Some("true"),
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

/// Process-level settings for the binary.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Persistence endpoint that receives terminal statuses.
    pub status_webhook_url: Option<String>,
    pub status_webhook_secret: Option<String>,
    pub hitl: HitlConfig,
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let hitl = HitlConfig::from_env();

    Ok(Config {
        port: std::env::var("HITL_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_PORT),
        status_webhook_url: std::env::var("HITL_STATUS_WEBHOOK_URL")
            .ok()
            .filter(|s| !s.trim().is_empty()),
        status_webhook_secret: std::env::var("HITL_STATUS_WEBHOOK_SECRET")
            .ok()
            .filter(|s| !s.is_empty()),
        hitl,
    })
}

/// Integer parse that never fails: empty, whitespace, or non-numeric input
/// yields `default`. Negative numbers pass through untouched.
fn parse_int(raw: Option<String>, default: i64) -> i64 {
    match raw {
        Some(v) if !v.trim().is_empty() => v.parse().unwrap_or(default),
        _ => default,
    }
}
