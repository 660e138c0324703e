//! Client configuration
//!
//! Defaults, then `config.yml`, then environment variables. Command line
//! flags are applied on top by the binary.

use crate::api::{join_path, ApiClient};
use crate::player::{clamp_volume, ControllerConfig, PlayerWorkerConfig};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

const APP_DIR: &str = "songstream";
const CONFIG_FILE: &str = "config.yml";

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("could not read {path}: {source}")]
  Read {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("could not parse {path}: {source}")]
  Parse {
    path: PathBuf,
    source: serde_yaml::Error,
  },
  #[error("invalid url {0:?}: {1}")]
  Url(String, url::ParseError),
  #[error("stream endpoint must use ws or wss, got {0}")]
  Scheme(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
  /// Base url of the streaming service
  pub stream_api_url: String,
  pub stream_path: String,
  /// Base url of the REST api
  pub api_url: String,
  pub auth_token: Option<String>,
  pub default_volume: f32,
  /// Seconds to wait for the first media chunk; 0 disables the timeout
  pub connect_timeout_secs: u64,
  pub position_poll_ms: u64,
  pub download_dir: PathBuf,
}

impl Default for ClientConfig {
  fn default() -> Self {
    Self {
      stream_api_url: "ws://localhost:8080".to_string(),
      stream_path: "/audio-stream".to_string(),
      api_url: "http://localhost:8080".to_string(),
      auth_token: None,
      default_volume: 1.0,
      connect_timeout_secs: 10,
      position_poll_ms: 250,
      download_dir: dirs::download_dir().unwrap_or_else(|| PathBuf::from(".")),
    }
  }
}

impl ClientConfig {
  /// `$CONFIG_DIR/songstream/config.yml`
  pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
  }

  /// Load from `path`, or from the default location when it exists, then
  /// apply environment overrides
  pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
    let mut config = match path {
      Some(path) => Self::from_file(path)?,
      None => match Self::default_path().filter(|p| p.exists()) {
        Some(path) => Self::from_file(&path)?,
        None => {
          debug!("no config file found, using defaults");
          Self::default()
        }
      },
    };
    config.apply_env(|key| std::env::var(key).ok());
    Ok(config)
  }

  pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let config = Self::from_yaml(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })?;
    info!("loaded config from {}", path.display());
    Ok(config)
  }

  pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
    if content.trim().is_empty() {
      return Ok(Self::default());
    }
    serde_yaml::from_str(content)
  }

  pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(url) = lookup("STREAM_API_URL") {
      self.stream_api_url = url;
    }
    if let Some(url) = lookup("API_URL") {
      self.api_url = url;
    }
    if let Some(token) = lookup("SONGSTREAM_TOKEN").filter(|t| !t.is_empty()) {
      self.auth_token = Some(token);
    }
  }

  /// `stream_api_url` joined with `stream_path`
  pub fn stream_endpoint(&self) -> Result<Url, ConfigError> {
    let base = parse_url(&self.stream_api_url)?;
    let endpoint = join_path(&base, &self.stream_path)
      .map_err(|e| ConfigError::Url(self.stream_path.clone(), e))?;
    match endpoint.scheme() {
      "ws" | "wss" => Ok(endpoint),
      other => Err(ConfigError::Scheme(other.to_string())),
    }
  }

  pub fn api_client(&self) -> Result<ApiClient, ConfigError> {
    let base = parse_url(&self.api_url)?;
    Ok(ApiClient::new(base, self.auth_token.clone()))
  }

  pub fn connect_timeout(&self) -> Option<Duration> {
    (self.connect_timeout_secs > 0).then(|| Duration::from_secs(self.connect_timeout_secs))
  }

  pub fn worker_config(&self) -> Result<PlayerWorkerConfig, ConfigError> {
    Ok(PlayerWorkerConfig {
      stream_endpoint: self.stream_endpoint()?,
      controller: ControllerConfig {
        initial_volume: clamp_volume(self.default_volume),
        connect_timeout: self.connect_timeout(),
      },
      position_poll: Duration::from_millis(self.position_poll_ms.max(1)),
      api: Some(self.api_client()?),
      download_dir: self.download_dir.clone(),
    })
  }
}

fn parse_url(raw: &str) -> Result<Url, ConfigError> {
  Url::parse(raw).map_err(|e| ConfigError::Url(raw.to_string(), e))
}
