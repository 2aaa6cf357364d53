//! Zentinel Metadata Agent
//!
//! Keeps a remote SAML federation metadata document cached and refreshed,
//! reporting its freshness in the logs until interrupted.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use zentinel_agent_metadata::metadata::{
    MetadataProviderConfig, MetadataProviderConfigJson, ReloadingMetadataProvider,
    SamlMetadataParser,
};
use zentinel_agent_metadata::spawn_status_reporter;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "zentinel-metadata-agent")]
#[command(about = "Reloading SAML metadata cache for the Zentinel proxy")]
struct Args {
    /// JSON configuration file
    #[arg(long, env = "METADATA_CONFIG")]
    config: Option<PathBuf>,

    /// Metadata document URL
    #[arg(long, env = "METADATA_URL")]
    url: Option<String>,

    /// HTTP basic auth username
    #[arg(long, env = "METADATA_USERNAME")]
    username: Option<String>,

    /// HTTP basic auth password
    #[arg(long, env = "METADATA_PASSWORD")]
    password: Option<String>,

    /// Request timeout in seconds
    #[arg(long, env = "METADATA_REQUEST_TIMEOUT")]
    request_timeout_secs: Option<u64>,

    /// Minimum refresh delay in seconds
    #[arg(long, env = "METADATA_MIN_REFRESH_DELAY")]
    min_refresh_delay_secs: Option<u64>,

    /// Maximum refresh delay in seconds
    #[arg(long, env = "METADATA_MAX_REFRESH_DELAY")]
    max_refresh_delay_secs: Option<u64>,

    /// Discard expired metadata instead of serving it stale
    #[arg(long, env = "METADATA_REQUIRE_VALID")]
    require_valid_metadata: bool,

    /// Enable verbose logging
    #[arg(short, long, env = "METADATA_VERBOSE")]
    verbose: bool,
}

impl Args {
    /// Layer the config file and command line flags over the defaults.
    fn load_config(&self) -> Result<MetadataProviderConfig> {
        let mut config = MetadataProviderConfig::default();

        if let Some(ref path) = self.config {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            let json: MetadataProviderConfigJson = serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?;
            json.apply_to(&mut config);
        }

        if let Some(ref url) = self.url {
            config.metadata_url = url.clone();
        }
        if let Some(ref username) = self.username {
            config.basic_auth_username = Some(username.clone());
        }
        if let Some(ref password) = self.password {
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
        if self.require_valid_metadata {
            config.require_valid_metadata = true;
        }

        config.validate().map_err(|e| anyhow!(e))?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "{}={},zentinel_agent_metadata={}",
            env!("CARGO_CRATE_NAME"),
            log_level,
            log_level
        ))
        .json()
        .init();

    info!("Starting Zentinel Metadata Agent");

    let config = args.load_config()?;

    info!(
        url = %config.metadata_url,
        basic_auth = config.basic_auth_username.is_some(),
        min_refresh_delay_secs = config.min_refresh_delay_secs,
        max_refresh_delay_secs = config.max_refresh_delay_secs,
        require_valid_metadata = config.require_valid_metadata,
        "Configuration loaded"
    );

    let provider = ReloadingMetadataProvider::from_config(&config, SamlMetadataParser)
        .context("Failed to create metadata provider")?;

    provider
        .start()
        .await
        .context("Failed to load initial metadata")?;

    if let Ok(cached) = provider.get() {
        let document = cached.document();
        info!(
            entity_id = ?document.entity_id(),
            name = ?document.name(),
            entities = document.entities().count(),
            expires_at = %cached.expires_at(),
            "Initial metadata loaded"
        );
    }

    let reporter = spawn_status_reporter(
        provider.clone(),
        Duration::from_secs(config.status_interval_secs),
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
    }

    info!("Shutting down");
    reporter.abort();
    provider.stop().await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args(config: Option<PathBuf>) -> Args {
        Args {
            config,
            url: None,
            username: None,
            password: None,
            request_timeout_secs: None,
            min_refresh_delay_secs: None,
            max_refresh_delay_secs: None,
            require_valid_metadata: false,
            verbose: false,
        }
    }

    #[test]
    fn test_flags_override_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"metadata-url": "https://md.example.org/a.xml", "min-refresh-delay-secs": 60}}"#
        )
        .unwrap();

        let mut args = args(Some(file.path().to_path_buf()));
        args.url = Some("https://md.example.org/b.xml".to_string());
        args.require_valid_metadata = true;

        let config = args.load_config().unwrap();
        assert_eq!(config.metadata_url, "https://md.example.org/b.xml");
        assert_eq!(config.min_refresh_delay_secs, 60);
        assert!(config.require_valid_metadata);
    }

    #[test]
    fn test_missing_url_is_rejected() {
        assert!(args(None).load_config().is_err());
    }

    #[test]
    fn test_unreadable_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(args(Some(missing)).load_config().is_err());
    }
}
