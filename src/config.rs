use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const DEFAULT_CLIENT_SENDER_BUCKETS: usize = 8192;
const DEFAULT_MAX_CONNECTIONS_PER_ENDPOINT: usize = 1;
const DEFAULT_CONNECT_RETRY_DELAY_MS: u64 = 1_000;
const DEFAULT_MINIMUM_INTERCONNECT_DELAY_MS: u64 = 100;
const DEFAULT_CONNECT_RETRY_COUNT: usize = 2;
const DEFAULT_SEND_RETRY_DELAY_MS: u64 = 2_000;
const DEFAULT_ATTEMPT_GUARD_TIMEOUT_MS: u64 = 100;

/// Parses a JSON- or YAML-formatted configuration document, auto-detecting
/// documents starting with `{` are JSON, everything else is YAML.
pub fn from_str(txt: &str) -> Result<MessageCenterConfig, ConfigError> {
    let trimmed = txt.trim_start();
    let parsed: RawConfig = if trimmed.starts_with('{') {
        serde_json::from_str(trimmed)?
    } else {
        serde_yaml::from_str(trimmed)?
    };
    Ok(parsed.resolve())
}

/// The tunable constants that govern gateway selection, dialing, cooldown
/// and retry, as loaded from configuration.
///
/// Every field is `Option` on the wire so a document only needs to override
/// what it cares about, with `DEFAULT_*` constants filling in the rest at
/// `resolve()` time.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct RawConfig {
    pub client_sender_buckets: Option<usize>,
    pub max_connections_per_endpoint: Option<usize>,
    pub connect_retry_delay_ms: Option<u64>,
    pub minimum_interconnect_delay_ms: Option<u64>,
    pub connect_retry_count: Option<usize>,
    pub send_retry_delay_ms: Option<u64>,
    pub attempt_guard_timeout_ms: Option<u64>,
}

impl RawConfig {
    fn resolve(self) -> MessageCenterConfig {
        MessageCenterConfig {
            client_sender_buckets: self
                .client_sender_buckets
                .unwrap_or(DEFAULT_CLIENT_SENDER_BUCKETS),
            max_connections_per_endpoint: self
                .max_connections_per_endpoint
                .unwrap_or(DEFAULT_MAX_CONNECTIONS_PER_ENDPOINT),
            connect_retry_delay: Duration::from_millis(
                self.connect_retry_delay_ms
                    .unwrap_or(DEFAULT_CONNECT_RETRY_DELAY_MS),
            ),
            minimum_interconnect_delay: Duration::from_millis(
                self.minimum_interconnect_delay_ms
                    .unwrap_or(DEFAULT_MINIMUM_INTERCONNECT_DELAY_MS),
            ),
            connect_retry_count: self
                .connect_retry_count
                .unwrap_or(DEFAULT_CONNECT_RETRY_COUNT),
            send_retry_delay: Duration::from_millis(
                self.send_retry_delay_ms.unwrap_or(DEFAULT_SEND_RETRY_DELAY_MS),
            ),
            attempt_guard_timeout: Duration::from_millis(
                self.attempt_guard_timeout_ms
                    .unwrap_or(DEFAULT_ATTEMPT_GUARD_TIMEOUT_MS),
            ),
        }
    }
}

/// Resolved configuration, defaults applied, ready for use by
/// `ClientMessageCenter`/`ConnectionManager`.
#[derive(Clone, Copy, Debug)]
pub struct MessageCenterConfig {
    pub client_sender_buckets: usize,
    pub max_connections_per_endpoint: usize,
    pub connect_retry_delay: Duration,
    pub minimum_interconnect_delay: Duration,
    pub connect_retry_count: usize,
    pub send_retry_delay: Duration,
    pub attempt_guard_timeout: Duration,
}

impl Default for MessageCenterConfig {
    fn default() -> Self {
        RawConfig::default().resolve()
    }
}

#[test]
fn parse_simple_yaml() {
    let yaml = "
clientSenderBuckets: 4
connectRetryDelayMs: 500
";
    let cfg = from_str(yaml).unwrap();
    assert_eq!(cfg.client_sender_buckets, 4);
    assert_eq!(cfg.connect_retry_delay, Duration::from_millis(500));
    // Unspecified fields still get their documented defaults.
    assert_eq!(
        cfg.max_connections_per_endpoint,
        DEFAULT_MAX_CONNECTIONS_PER_ENDPOINT
    );
}

#[test]
fn parse_simple_json() {
    let json = r#"{"clientSenderBuckets": 16, "connectRetryCount": 5}"#;
    let cfg = from_str(json).unwrap();
    assert_eq!(cfg.client_sender_buckets, 16);
    assert_eq!(cfg.connect_retry_count, 5);
}

#[test]
fn defaults_match_documented_values() {
    let cfg = MessageCenterConfig::default();
    assert_eq!(cfg.client_sender_buckets, 8192);
    assert_eq!(cfg.max_connections_per_endpoint, 1);
    assert_eq!(cfg.connect_retry_delay, Duration::from_secs(1));
    assert_eq!(cfg.minimum_interconnect_delay, Duration::from_millis(100));
    assert_eq!(cfg.connect_retry_count, 2);
    assert_eq!(cfg.send_retry_delay, Duration::from_secs(2));
    assert_eq!(cfg.attempt_guard_timeout, Duration::from_millis(100));
}

#[test]
fn rejects_unknown_fields() {
    let yaml = "bogusField: 1";
    assert!(from_str(yaml).is_err());
}
