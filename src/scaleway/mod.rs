//! Scaleway Instances adapter: security groups through the HTTP API and
//! server addresses through the SDK.

mod addresses;
mod security_group;
mod types;

use std::sync::LazyLock;
use std::time::Duration;

use scaleway_rs::ScalewayApi;

use crate::config::{ConfigError, ScalewayConfig};
use types::Zone;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const SCALEWAY_INSTANCE_API_BASE: &str = "https://api.scaleway.com/instance/v1";

static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

/// Network backend backed by Scaleway security groups in one zone.
#[derive(Clone)]
pub struct ScalewayNetwork {
    api: ScalewayApi,
    config: ScalewayConfig,
    zone: Zone,
    base_url: String,
}

impl ScalewayNetwork {
    /// Constructs the adapter for the configured zone.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the configuration fails validation.
    pub fn new(config: ScalewayConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            api: ScalewayApi::new(&config.secret_key),
            zone: Zone::from(config.default_zone.trim()),
            config,
            base_url: SCALEWAY_INSTANCE_API_BASE.to_owned(),
        })
    }

    /// Points the security group calls at another API root.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Zone the adapter operates in.
    #[must_use]
    pub const fn zone(&self) -> &str {
        self.zone.as_str()
    }

    fn zone_url(&self, suffix: &str) -> String {
        format!(
            "{}/zones/{}/{suffix}",
            self.base_url.trim_end_matches('/'),
            self.zone
        )
    }
}
