//! Configuration management for the peerchat daemon
//!
//! Settings are layered: built-in defaults, then an optional file, then
//! `PEERCHAT__SECTION__KEY` environment variables, then command line flags.

use config::{Config, Environment, File};
use peerchat_p2p::{NodeConfig, RelayConfig, RelayUrl, SecretKey};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{DaemonError, Result};

const ENV_PREFIX: &str = "PEERCHAT";

/// Main daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub http: HttpSettings,
    pub p2p: P2PSettings,
    /// Seconds between status log lines; 0 disables them
    pub status_interval_secs: u64,
}

/// HTTP gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub host: String,
    pub port: u16,
}

/// Relay server selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayMode {
    #[default]
    Default,
    Disabled,
    Custom,
}

/// P2P networking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct P2PSettings {
    /// IPv4 address to bind the endpoint to
    pub host: Ipv4Addr,
    /// Port to bind P2P endpoint to (0 for random)
    pub port: u16,
    /// Hex encoded identity key; created on first start
    pub secret_key_path: Option<PathBuf>,
    pub relay_mode: RelayMode,
    /// Relay server used when `relay_mode` is `custom`
    pub relay_url: Option<String>,
    /// Enable n0 DNS and local network discovery
    pub discovery: bool,
    pub dial_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            http: HttpSettings::default(),
            p2p: P2PSettings::default(),
            status_interval_secs: 60,
        }
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl Default for P2PSettings {
    fn default() -> Self {
        Self {
            host: Ipv4Addr::UNSPECIFIED,
            port: 0,
            secret_key_path: None,
            relay_mode: RelayMode::Default,
            relay_url: None,
            discovery: true,
            dial_timeout_secs: 15,
        }
    }
}

/// Values given on the command line; `None` leaves the layered value alone
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub http_host: Option<String>,
    pub http_port: Option<u16>,
    pub p2p_port: Option<u16>,
    pub relay_url: Option<String>,
    pub no_relay: bool,
    pub secret_key_path: Option<PathBuf>,
}

impl Settings {
    /// Load configuration from defaults, an optional file, the environment
    /// and command line overrides
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or a value has the wrong
    /// type.
    pub fn load(path: Option<&Path>, overrides: &CliOverrides) -> Result<Self> {
        Self::load_with_env(
            path,
            overrides,
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
    }

    /// Load configuration from a file plus the environment
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::load(Some(path.as_ref()), &CliOverrides::default())
    }

    fn load_with_env(
        path: Option<&Path>,
        overrides: &CliOverrides,
        env: Environment,
    ) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        let relay_mode = if overrides.no_relay {
            Some("disabled")
        } else if overrides.relay_url.is_some() {
            Some("custom")
        } else {
            None
        };

        let settings = builder
            .add_source(env)
            .set_override_option("http.host", overrides.http_host.clone())?
            .set_override_option("http.port", overrides.http_port.map(i64::from))?
            .set_override_option("p2p.port", overrides.p2p_port.map(i64::from))?
            .set_override_option("p2p.relay_url", overrides.relay_url.clone())?
            .set_override_option("p2p.relay_mode", relay_mode)?
            .set_override_option(
                "p2p.secret_key_path",
                overrides
                    .secret_key_path
                    .as_ref()
                    .map(|path| path.to_string_lossy().into_owned()),
            )?
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Socket address for the HTTP listener
    ///
    /// # Errors
    ///
    /// Returns an error if `http.host` is not an IP address.
    pub fn http_bind_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self.http.host.parse().map_err(|e| {
            DaemonError::ConfigString(format!("invalid http.host `{}`: {e}", self.http.host))
        })?;
        Ok(SocketAddr::new(ip, self.http.port))
    }

    /// Build the node configuration for these settings
    ///
    /// # Errors
    ///
    /// Returns an error if the custom relay is missing or malformed.
    pub fn node_config(&self, secret_key: Option<SecretKey>) -> Result<NodeConfig> {
        let relay = match self.p2p.relay_mode {
            RelayMode::Default => RelayConfig::Default,
            RelayMode::Disabled => RelayConfig::Disabled,
            RelayMode::Custom => {
                let url = self.p2p.relay_url.as_deref().ok_or_else(|| {
                    DaemonError::ConfigString(
                        "p2p.relay_url is required when p2p.relay_mode is custom".to_string(),
                    )
                })?;
                let url: RelayUrl = url.parse().map_err(|e| {
                    DaemonError::ConfigString(format!("invalid p2p.relay_url `{url}`: {e}"))
                })?;
                RelayConfig::Custom(url)
            }
        };

        Ok(NodeConfig {
            secret_key,
            bind_addr: SocketAddrV4::new(self.p2p.host, self.p2p.port),
            relay,
            discovery: self.p2p.discovery,
            dial_timeout: Duration::from_secs(self.p2p.dial_timeout_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn empty_env() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true)
            .source(Some(HashMap::new()))
    }

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let settings =
            Settings::load_with_env(None, &CliOverrides::default(), empty_env()).unwrap();
        assert_eq!(settings.http.port, 3000);
        assert_eq!(settings.p2p.port, 0);
        assert_eq!(settings.p2p.relay_mode, RelayMode::Default);
        assert!(settings.p2p.discovery);
        assert_eq!(settings.status_interval_secs, 60);
        assert_eq!(
            settings.http_bind_addr().unwrap(),
            "0.0.0.0:3000".parse().unwrap()
        );
    }

    #[test]
    fn test_file_values_apply() {
        let file = write_config(
            r#"
            status_interval_secs = 30

            [http]
            host = "127.0.0.1"
            port = 8080

            [p2p]
            relay_mode = "disabled"
            discovery = false
            dial_timeout_secs = 5
            "#,
        );

        let settings =
            Settings::load_with_env(Some(file.path()), &CliOverrides::default(), empty_env())
                .unwrap();
        assert_eq!(settings.http.host, "127.0.0.1");
        assert_eq!(settings.http.port, 8080);
        assert_eq!(settings.status_interval_secs, 30);

        let node = settings.node_config(None).unwrap();
        assert_eq!(node.relay, RelayConfig::Disabled);
        assert!(!node.discovery);
        assert_eq!(node.dial_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_environment_overrides_file() {
        let file = write_config("[http]\nport = 8080\n");
        let env = Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true)
            .source(Some(HashMap::from([(
                "PEERCHAT__HTTP__PORT".to_string(),
                "9090".to_string(),
            )])));

        let settings =
            Settings::load_with_env(Some(file.path()), &CliOverrides::default(), env).unwrap();
        assert_eq!(settings.http.port, 9090);
    }

    #[test]
    fn test_cli_overrides_win() {
        let file = write_config("[http]\nport = 8080\n[p2p]\nport = 4000\n");
        let overrides = CliOverrides {
            http_port: Some(7000),
            p2p_port: Some(7001),
            no_relay: true,
            secret_key_path: Some(PathBuf::from("/tmp/peerchat.key")),
            ..CliOverrides::default()
        };

        let settings =
            Settings::load_with_env(Some(file.path()), &overrides, empty_env()).unwrap();
        assert_eq!(settings.http.port, 7000);
        assert_eq!(settings.p2p.port, 7001);
        assert_eq!(settings.p2p.relay_mode, RelayMode::Disabled);
        assert_eq!(
            settings.p2p.secret_key_path,
            Some(PathBuf::from("/tmp/peerchat.key"))
        );
    }

    #[test]
    fn test_relay_url_flag_selects_custom_relay() {
        let overrides = CliOverrides {
            relay_url: Some("https://relay.example.org".to_string()),
            ..CliOverrides::default()
        };
        let settings = Settings::load_with_env(None, &overrides, empty_env()).unwrap();
        assert_eq!(settings.p2p.relay_mode, RelayMode::Custom);

        let node = settings.node_config(None).unwrap();
        assert!(matches!(node.relay, RelayConfig::Custom(_)));
    }

    #[test]
    fn test_custom_relay_requires_url() {
        let settings = Settings {
            p2p: P2PSettings {
                relay_mode: RelayMode::Custom,
                ..P2PSettings::default()
            },
            ..Settings::default()
        };
        assert!(matches!(
            settings.node_config(None),
            Err(DaemonError::ConfigString(_))
        ));
    }

    #[test]
    fn test_invalid_http_host() {
        let settings = Settings {
            http: HttpSettings {
                host: "not-an-ip".to_string(),
                port: 1,
            },
            ..Settings::default()
        };
        assert!(settings.http_bind_addr().is_err());
    }
}
