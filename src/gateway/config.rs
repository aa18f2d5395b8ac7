use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_QUARANTINE_SECS: u64 = 30;

/// Configuration for the default `GatewayManager`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct GatewayManagerConfig {
    #[serde(with = "duration_secs")]
    pub quarantine: Duration,
}

impl Default for GatewayManagerConfig {
    fn default() -> Self {
        GatewayManagerConfig {
            quarantine: Duration::from_secs(DEFAULT_QUARANTINE_SECS),
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}
