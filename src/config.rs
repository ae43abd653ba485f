use color_eyre::{eyre::eyre, Result};
use gqlkit::{ClientConfig, HttpTransport};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub endpoint: EndpointConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EndpointConfig {
  /// GraphQL endpoint URL (can be overridden with --endpoint)
  pub url: Option<String>,
  /// Extra headers sent with every request
  #[serde(default)]
  pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
  /// How long an unwatched query result is kept, in milliseconds
  pub expiration_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
  /// Log filter directive, e.g. "info" or "gqlkit=debug"
  #[serde(default = "default_log_level")]
  pub level: String,
  /// Write logs to this file instead of stderr
  pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
      file: None,
    }
  }
}

fn default_log_level() -> String {
  "warn".to_string()
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./gqlkit.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/gqlkit/config.yaml
  ///
  /// Without any config file the defaults are used; the endpoint can then
  /// be given on the command line.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("gqlkit.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("gqlkit").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
    serde_yaml::from_str(contents)
  }

  /// Get the bearer token from environment variables.
  ///
  /// Checks GQLKIT_TOKEN first, then GRAPHQL_TOKEN as fallback.
  pub fn get_token() -> Option<String> {
    std::env::var("GQLKIT_TOKEN")
      .or_else(|_| std::env::var("GRAPHQL_TOKEN"))
      .ok()
  }

  pub fn client_config(&self) -> ClientConfig {
    let mut config = ClientConfig::default();
    if let Some(ms) = self.cache.expiration_timeout_ms {
      config.cache_expiration_timeout = Duration::from_millis(ms);
    }
    config
  }

  /// Build the HTTP transport, preferring `endpoint_override` over the file.
  pub fn http_transport(&self, endpoint_override: Option<&str>) -> Result<HttpTransport> {
    let url = endpoint_override
      .or(self.endpoint.url.as_deref())
      .ok_or_else(|| eyre!("No endpoint configured. Set endpoint.url or pass --endpoint."))?;

    let mut transport = HttpTransport::new(url)?;
    for (name, value) in &self.endpoint.headers {
      transport = transport.with_header(name, value)?;
    }
    if let Some(token) = Self::get_token() {
      transport = transport.with_bearer_token(&token)?;
    }

    Ok(transport)
  }
}
