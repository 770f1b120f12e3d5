use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use config::{builder::DefaultState, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use url::Url;

use crate::error::{JetstreamError, Result};
use crate::options::Options;

pub const DEFAULT_URL: &str = "wss://jetstream2.us-east.bsky.network/subscribe";
pub const DEFAULT_CONFIG_FILE: &str = "config";

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PolicyConfig {
    /// Report post updates as well as creates.
    pub include_updates: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReporterConfig {
    pub rate_enabled: bool,
    pub rate_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShutdownConfig {
    pub close_timeout_ms: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    pub native_roots: bool,
    pub ca_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub endpoint: EndpointConfig,
    pub policy: PolicyConfig,
    pub reporter: ReporterConfig,
    pub shutdown: ShutdownConfig,
    pub logging: LoggingConfig,
    pub tls: TlsConfig,
}

impl Config {
    /// Defaults, then the config file, then `JETSTREAM_*` variables, then command-line flags.
    pub fn load(options: &Options) -> Result<Self> {
        let file = options
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let builder = Self::defaults()?
            .add_source(File::from(file).required(options.config.is_some()))
            .add_source(
                Environment::with_prefix("JETSTREAM")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = Self::apply_options(builder, options)?
            .build()?
            .try_deserialize::<Config>()?;

        config.validate()?;
        Ok(config)
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        ConfigBuilder::<DefaultState>::default()
            .set_default("endpoint.url", DEFAULT_URL)?
            .set_default("policy.include_updates", true)?
            .set_default("reporter.rate_enabled", true)?
            .set_default("reporter.rate_interval_ms", 1000_i64)?
            .set_default("shutdown.close_timeout_ms", 1000_i64)?
            .set_default("logging.level", "info")?
            .set_default("tls.native_roots", false)
    }

    fn apply_options(
        builder: ConfigBuilder<DefaultState>,
        options: &Options,
    ) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        let mut builder = builder
            .set_override_option("endpoint.url", options.url.clone())?
            .set_override_option("logging.level", options.log_level.clone())?;
        if options.creates_only {
            builder = builder.set_override("policy.include_updates", false)?;
        }
        if options.no_rate {
            builder = builder.set_override("reporter.rate_enabled", false)?;
        }
        Ok(builder)
    }

    pub fn validate(&self) -> Result<()> {
        self.endpoint_url()?;
        if self.reporter.rate_interval_ms == 0 {
            return Err(ConfigError::Message("reporter.rate_interval_ms must be non-zero".into()).into());
        }
        if self.shutdown.close_timeout_ms == 0 {
            return Err(ConfigError::Message("shutdown.close_timeout_ms must be non-zero".into()).into());
        }
        Ok(())
    }

    pub fn endpoint_url(&self) -> Result<Url> {
        let invalid = |reason: String| JetstreamError::InvalidEndpoint {
            url: self.endpoint.url.clone(),
            reason,
        };
        let url = Url::parse(&self.endpoint.url).map_err(|e| invalid(e.to_string()))?;
        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(invalid(format!("unsupported scheme `{other}`"))),
        }
    }

    pub fn rate_interval(&self) -> Duration {
        Duration::from_millis(self.reporter.rate_interval_ms)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown.close_timeout_ms)
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "endpoint={} include_updates={} rate={}",
            self.endpoint.url, self.policy.include_updates, self.reporter.rate_enabled
        )
    }
}
