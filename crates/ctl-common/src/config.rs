//! ---
//! ctl_section: "01-core-functionality"
//! ctl_subsection: "module"
//! ctl_type: "source"
//! ctl_scope: "code"
//! ctl_description: "Shared primitives and utilities for the harness runtime."
//! ctl_version: "v0.0.0-prealpha"
//! ctl_owner: "tbd"
//! ---
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

fn default_registry_listen() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 5102)
}

fn default_registration_version() -> String {
    "v1.3".to_owned()
}

fn default_node_listen() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 5201)
}

fn default_connection_version() -> String {
    "v1.1".to_owned()
}

fn default_advertised_host() -> String {
    "127.0.0.1".to_owned()
}

fn default_transport() -> String {
    "urn:x-nmos:transport:rtp.mcast".to_owned()
}

fn default_callback_listen() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 5000)
}

fn default_question_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_intro_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_outro_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_random_seed() -> u64 {
    0x5EED
}

fn default_facade_url() -> String {
    "http://127.0.0.1:5001/x-nmos/client-testing/".to_owned()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(1)
}

fn default_max_redirects() -> usize {
    10
}

fn default_facade_listen() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 5001)
}

/// Primary configuration object for a harness run.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub harness: HarnessConfig,
    #[serde(default)]
    pub facade: FacadeConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: Option<PathBuf>,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "CTL_CONFIG";

    /// Load configuration from disk, respecting the `CTL_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    ///
    /// Unlike an explicit `CTL_CONFIG` path, missing candidates are not an error:
    /// the harness falls back to built-in defaults so it can run without a file.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        debug!("no configuration file found; using defaults");
        let config = AppConfig::default();
        config.validate()?;
        Ok(LoadedAppConfig {
            config,
            source: None,
        })
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        contents
            .parse::<AppConfig>()
            .with_context(|| format!("failed to load config file {}", path.display()))
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        let listeners = [
            ("registry", self.registry.listen),
            ("node", self.node.listen),
            ("harness callback", self.harness.callback_listen),
        ];
        for (i, (name, addr)) in listeners.iter().enumerate() {
            for (other, other_addr) in listeners.iter().skip(i + 1) {
                if addr.port() != 0 && addr.port() == other_addr.port() {
                    return Err(anyhow!(
                        "{} and {} listeners share port {}",
                        name,
                        other,
                        addr.port()
                    ));
                }
            }
        }
        self.harness.validate()?;
        self.facade.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_logging: bool,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_logging: false,
            file_prefix: None,
        }
    }
}

/// Mock registry listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_registry_listen")]
    pub listen: SocketAddr,
    #[serde(default = "default_registration_version")]
    pub api_version: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            listen: default_registry_listen(),
            api_version: default_registration_version(),
        }
    }
}

/// Mock node (connection-management emulator) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_node_listen")]
    pub listen: SocketAddr,
    #[serde(default = "default_connection_version")]
    pub api_version: String,
    /// Host name or address written into manifests and constraints.
    #[serde(default = "default_advertised_host")]
    pub advertised_host: String,
    #[serde(default = "default_transport")]
    pub transport: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen: default_node_listen(),
            api_version: default_connection_version(),
            advertised_host: default_advertised_host(),
            transport: default_transport(),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    #[serde(default = "default_callback_listen")]
    pub callback_listen: SocketAddr,
    /// Host (and port) the facade should use to reach the answer callback.
    #[serde(default)]
    pub callback_host: Option<String>,
    #[serde(default = "default_question_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub question_timeout: Duration,
    #[serde(default = "default_intro_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub intro_timeout: Duration,
    #[serde(default = "default_outro_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub outro_timeout: Duration,
    #[serde(default)]
    pub disabled: Vec<String>,
    #[serde(default = "default_random_seed")]
    pub random_seed: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            callback_listen: default_callback_listen(),
            callback_host: None,
            question_timeout: default_question_timeout(),
            intro_timeout: default_intro_timeout(),
            outro_timeout: default_outro_timeout(),
            disabled: Vec::new(),
            random_seed: default_random_seed(),
        }
    }
}

impl HarnessConfig {
    pub fn validate(&self) -> Result<()> {
        if self.question_timeout.is_zero() {
            return Err(anyhow!("harness question_timeout must be non-zero"));
        }
        if self.intro_timeout.is_zero() || self.outro_timeout.is_zero() {
            return Err(anyhow!("harness intro/outro timeouts must be non-zero"));
        }
        Ok(())
    }
}

/// Outbound facade connection settings and the stub facade listener.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacadeConfig {
    #[serde(default = "default_facade_url")]
    pub url: String,
    #[serde(default = "default_request_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub request_timeout: Duration,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    #[serde(default = "default_facade_listen")]
    pub stub_listen: SocketAddr,
}

impl Default for FacadeConfig {
    fn default() -> Self {
        Self {
            url: default_facade_url(),
            request_timeout: default_request_timeout(),
            max_redirects: default_max_redirects(),
            stub_listen: default_facade_listen(),
        }
    }
}

impl FacadeConfig {
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.url)
            .with_context(|| format!("facade url '{}' is not a valid URL", self.url))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!(
                "facade url '{}' must use http or https",
                self.url
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(anyhow!("facade request_timeout must be non-zero"));
        }
        Ok(())
    }

    /// Path component of the facade URL; the stub facade serves on it.
    pub fn path(&self) -> String {
        url::Url::parse(&self.url)
            .map(|url| url.path().to_owned())
            .unwrap_or_else(|_| "/".to_owned())
    }
}
