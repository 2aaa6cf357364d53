//! Metadata provider configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::MetadataError;
use super::fetcher::RemoteSource;

/// Upper bound accepted for any configured delay.
pub const MAX_REFRESH_DELAY_LIMIT: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Refresh scheduling policy. May be swapped at runtime via
/// [`ReloadingMetadataProvider::configure`](super::ReloadingMetadataProvider::configure).
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshPolicy {
    /// Floor for any refresh delay, including the one derived from document hints.
    pub min_refresh_delay: Duration,
    /// Ceiling for the validity window of a fetched document.
    pub max_refresh_delay: Duration,
    /// Fraction of the remaining validity window after which a refresh is attempted.
    pub refresh_delay_factor: f64,
    /// Stop serving a document once it has expired without a successful refresh.
    pub require_valid_metadata: bool,
    /// Delay before retrying after a failed refresh. Defaults to `min_refresh_delay`.
    pub failure_backoff: Option<Duration>,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            min_refresh_delay: Duration::from_secs(default_min_refresh_delay()),
            max_refresh_delay: Duration::from_secs(default_max_refresh_delay()),
            refresh_delay_factor: default_refresh_delay_factor(),
            require_valid_metadata: false,
            failure_backoff: None,
        }
    }
}

impl RefreshPolicy {
    /// Validate the policy.
    pub fn validate(&self) -> Result<(), String> {
        if self.min_refresh_delay.is_zero() {
            return Err("min_refresh_delay must be greater than zero".to_string());
        }

        if self.min_refresh_delay > self.max_refresh_delay {
            return Err("min_refresh_delay may not exceed max_refresh_delay".to_string());
        }

        if !(self.refresh_delay_factor > 0.0 && self.refresh_delay_factor < 1.0) {
            return Err("refresh_delay_factor must be between 0 and 1 (exclusive)".to_string());
        }

        if self.max_refresh_delay > MAX_REFRESH_DELAY_LIMIT {
            return Err("max_refresh_delay may not exceed one year".to_string());
        }

        if let Some(backoff) = self.failure_backoff {
            if backoff.is_zero() || backoff > MAX_REFRESH_DELAY_LIMIT {
                return Err("failure_backoff must be between zero and one year".to_string());
            }
        }

        Ok(())
    }

    /// Delay applied after a failed refresh attempt.
    pub fn backoff(&self) -> Duration {
        self.failure_backoff.unwrap_or(self.min_refresh_delay)
    }
}

/// Metadata provider configuration as loaded from file, flags and environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetadataProviderConfig {
    /// URL of the remote metadata document.
    /// Example: "https://md.example.org/federation-metadata.xml"
    #[serde(default)]
    pub metadata_url: String,

    /// HTTP basic auth username (optional).
    #[serde(default)]
    pub basic_auth_username: Option<String>,

    /// HTTP basic auth password (optional, requires a username).
    #[serde(default)]
    pub basic_auth_password: Option<String>,

    /// Time to wait for the metadata server to respond.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Refresh delay floor in seconds.
    #[serde(default = "default_min_refresh_delay")]
    pub min_refresh_delay_secs: u64,

    /// Refresh delay ceiling in seconds.
    #[serde(default = "default_max_refresh_delay")]
    pub max_refresh_delay_secs: u64,

    /// Fraction of the validity window after which to refresh.
    #[serde(default = "default_refresh_delay_factor")]
    pub refresh_delay_factor: f64,

    /// Retry delay after a failed refresh (defaults to the refresh delay floor).
    #[serde(default)]
    pub failure_backoff_secs: Option<u64>,

    /// Discard expired metadata instead of serving it stale.
    #[serde(default)]
    pub require_valid_metadata: bool,

    /// Fail startup if the first fetch does not succeed.
    #[serde(default = "default_true")]
    pub fail_fast_initialization: bool,

    /// Reject documents whose root declares neither cacheDuration nor validUntil.
    #[serde(default)]
    pub require_validity_hints: bool,

    /// Status log interval in seconds.
    #[serde(default = "default_status_interval")]
    pub status_interval_secs: u64,
}

fn default_request_timeout() -> u64 {
    5
}

fn default_min_refresh_delay() -> u64 {
    5 * 60 // 5 minutes
}

fn default_max_refresh_delay() -> u64 {
    4 * 60 * 60 // 4 hours
}

fn default_refresh_delay_factor() -> f64 {
    0.75
}

fn default_true() -> bool {
    true
}

fn default_status_interval() -> u64 {
    300 // 5 minutes
}

impl Default for MetadataProviderConfig {
    fn default() -> Self {
        Self {
            metadata_url: String::new(),
            basic_auth_username: None,
            basic_auth_password: None,
            request_timeout_secs: default_request_timeout(),
            min_refresh_delay_secs: default_min_refresh_delay(),
            max_refresh_delay_secs: default_max_refresh_delay(),
            refresh_delay_factor: default_refresh_delay_factor(),
            failure_backoff_secs: None,
            require_valid_metadata: false,
            fail_fast_initialization: true,
            require_validity_hints: false,
            status_interval_secs: default_status_interval(),
        }
    }
}

impl MetadataProviderConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.metadata_url.is_empty() {
            return Err("metadata_url is required".to_string());
        }

        if !self.metadata_url.starts_with("https://") && !self.metadata_url.starts_with("http://")
        {
            return Err("metadata_url must be a valid HTTP(S) URL".to_string());
        }

        if self.request_timeout_secs == 0 {
            return Err("request_timeout_secs must be greater than zero".to_string());
        }

        if self.basic_auth_password.is_some() && self.basic_auth_username.is_none() {
            return Err("basic_auth_password requires basic_auth_username".to_string());
        }

        if self.status_interval_secs == 0 {
            return Err("status_interval_secs must be greater than zero".to_string());
        }

        self.refresh_policy().validate()
    }

    /// Refresh policy described by this configuration.
    pub fn refresh_policy(&self) -> RefreshPolicy {
        RefreshPolicy {
            min_refresh_delay: Duration::from_secs(self.min_refresh_delay_secs),
            max_refresh_delay: Duration::from_secs(self.max_refresh_delay_secs),
            refresh_delay_factor: self.refresh_delay_factor,
            require_valid_metadata: self.require_valid_metadata,
            failure_backoff: self.failure_backoff_secs.map(Duration::from_secs),
        }
    }

    /// Build the remote source described by this configuration.
    pub fn remote_source(&self) -> Result<RemoteSource, MetadataError> {
        self.validate().map_err(MetadataError::Configuration)?;

        let mut source = RemoteSource::new(&self.metadata_url)?
            .with_timeout(Duration::from_secs(self.request_timeout_secs));

        if let Some(ref username) = self.basic_auth_username {
            source = source.with_basic_auth(
                username.clone(),
                self.basic_auth_password.clone().unwrap_or_default(),
            );
        }

        Ok(source)
    }
}

/// JSON configuration file layered over the defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct MetadataProviderConfigJson {
    pub metadata_url: Option<String>,
    pub basic_auth_username: Option<String>,
    pub basic_auth_password: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub min_refresh_delay_secs: Option<u64>,
    pub max_refresh_delay_secs: Option<u64>,
    pub refresh_delay_factor: Option<f64>,
    pub failure_backoff_secs: Option<u64>,
    pub require_valid_metadata: Option<bool>,
    pub fail_fast_initialization: Option<bool>,
    pub require_validity_hints: Option<bool>,
    pub status_interval_secs: Option<u64>,
}

impl MetadataProviderConfigJson {
    /// Apply JSON config to existing config.
    pub fn apply_to(&self, config: &mut MetadataProviderConfig) {
        if let Some(ref url) = self.metadata_url {
            config.metadata_url = url.clone();
        }
        if let Some(ref username) = self.basic_auth_username {
            config.basic_auth_username = Some(username.clone());
        }
        if let Some(ref password) = self.basic_auth_password {
            config.basic_auth_password = Some(password.clone());
        }
        if let Some(timeout) = self.request_timeout_secs {
            config.request_timeout_secs = timeout;
        }
        if let Some(min) = self.min_refresh_delay_secs {
            config.min_refresh_delay_secs = min;
        }
        if let Some(max) = self.max_refresh_delay_secs {
            config.max_refresh_delay_secs = max;
        }
        if let Some(factor) = self.refresh_delay_factor {
            config.refresh_delay_factor = factor;
        }
        if let Some(backoff) = self.failure_backoff_secs {
            config.failure_backoff_secs = Some(backoff);
        }
        if let Some(require) = self.require_valid_metadata {
            config.require_valid_metadata = require;
        }
        if let Some(fail_fast) = self.fail_fast_initialization {
            config.fail_fast_initialization = fail_fast;
        }
        if let Some(require) = self.require_validity_hints {
            config.require_validity_hints = require;
        }
        if let Some(interval) = self.status_interval_secs {
            config.status_interval_secs = interval;
        }
    }
}
