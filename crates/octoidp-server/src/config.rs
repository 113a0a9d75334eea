use octoidp_auth::config::IdpConfig;
use octoidp_auth::connector::ConnectorConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Identity provider settings (issuer, keys, sessions, refresh tokens)
    #[serde(default)]
    pub auth: IdpConfig,
    /// Upstream connectors, tagged by `type`
    #[serde(default)]
    pub connectors: Vec<ConnectorConfig>,
    /// Statically registered OAuth clients
    #[serde(default)]
    pub clients: Vec<ClientConfig>,
    /// Local users created at startup
    #[serde(default)]
    pub users: Vec<UserConfig>,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }

        self.auth
            .validate()
            .map_err(|e| format!("auth config error: {e}"))?;

        let mut connector_ids = HashSet::new();
        for connector in &self.connectors {
            if connector.id().is_empty() {
                return Err("connector id must not be empty".into());
            }
            if !connector_ids.insert(connector.id()) {
                return Err(format!("duplicate connector id '{}'", connector.id()));
            }
        }

        let mut client_ids = HashSet::new();
        for client in &self.clients {
            if client.id.is_empty() {
                return Err("client id must not be empty".into());
            }
            if !client_ids.insert(client.id.as_str()) {
                return Err(format!("duplicate client id '{}'", client.id));
            }
            if !client.public && client.secret.as_deref().unwrap_or("").is_empty() {
                return Err(format!(
                    "client '{}' must be public or have a secret",
                    client.id
                ));
            }
            client.parsed_redirect_uris()?;
        }

        for user in &self.users {
            if user.email.is_empty() || user.password.is_empty() {
                return Err(format!(
                    "user '{}' needs an email and a password",
                    user.name
                ));
            }
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    5556
}
fn default_body_limit() -> usize {
    64 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// A statically registered OAuth 2.0 client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub id: String,
    /// Plain text secret; hashed before it is stored.
    /// Prefer OCTOIDP__CLIENTS__<n>__SECRET over the config file.
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub name: Option<String>,
    /// Clients allowed to request this client as an extra ID token audience.
    #[serde(default)]
    pub trusted_peers: Vec<String>,
}

impl ClientConfig {
    pub fn parsed_redirect_uris(&self) -> Result<Vec<Url>, String> {
        self.redirect_uris
            .iter()
            .map(|raw| {
                Url::parse(raw).map_err(|e| {
                    format!("client '{}' has an invalid redirect URI '{raw}': {e}", self.id)
                })
            })
            .collect()
    }
}

/// A local user created at startup if missing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    /// Fixed user ID; a UUID is generated when omitted.
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub email: String,
    /// Plain text password (will be hashed).
    pub password: String,
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::{Path, PathBuf};

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        match path {
            Some(p) => {
                let pathbuf = PathBuf::from(p);
                if pathbuf.exists() {
                    builder = builder.add_source(File::from(pathbuf));
                }
            }
            None => {
                let default_path = PathBuf::from("octoidp.toml");
                if default_path.exists() {
                    builder = builder.add_source(File::from(default_path));
                }
            }
        }
        // Environment variable overrides, e.g., OCTOIDP__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("OCTOIDP")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }

    pub fn load_config_with_default_path<P: AsRef<Path>>(
        path: Option<P>,
    ) -> Result<AppConfig, String> {
        let p = path
            .as_ref()
            .map(|p| p.as_ref().to_string_lossy().to_string());
        load_config(p.as_deref())
    }
}
