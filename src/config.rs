//! Provider options and environment bootstrap

use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// A remote backend address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
  #[serde(default = "default_host")]
  pub host: String,

  #[serde(default = "default_port")]
  pub port: u16,
}

fn default_host() -> String {
  "localhost".to_string()
}

fn default_port() -> u16 {
  6379
}

impl Default for Endpoint {
  fn default() -> Self {
    Self {
      host: default_host(),
      port: default_port(),
    }
  }
}

impl Endpoint {
  pub fn new(host: &str, port: u16) -> Self {
    Self {
      host: host.to_string(),
      port,
    }
  }

  /// Connection URL for the backend, database 0
  pub fn connection_url(&self) -> String {
    format!("redis://{}:{}/0", self.host, self.port)
  }
}

/// Options for constructing a provider. With neither `single` nor `cluster`
/// the instance runs in local-only mode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderOptions {
  /// Instance name; prefixes every non-global key
  pub name: String,

  /// Single-node backend
  #[serde(default)]
  pub single: Option<Endpoint>,

  /// Cluster backend endpoints
  #[serde(default)]
  pub cluster: Option<Vec<Endpoint>>,
}

impl ProviderOptions {
  pub fn local_only(name: &str) -> Self {
    Self {
      name: name.to_string(),
      single: None,
      cluster: None,
    }
  }

  pub fn single(name: &str, endpoint: Endpoint) -> Self {
    Self {
      name: name.to_string(),
      single: Some(endpoint),
      cluster: None,
    }
  }

  pub fn cluster(name: &str, endpoints: Vec<Endpoint>) -> Self {
    Self {
      name: name.to_string(),
      single: None,
      cluster: Some(endpoints),
    }
  }

  /// Build options from the environment:
  ///
  /// - `SERVICE_SLUG` (required) becomes the instance name
  /// - `CACHE_NUM_CONN` connection count; 0 or unset means local-only
  /// - `CACHE_HOST` / `CACHE_PORT` comma-separated lists, padded with
  ///   `localhost` / `6379` when shorter than the connection count
  pub fn from_env() -> Result<Self, CacheError> {
    let name = std::env::var("SERVICE_SLUG")
      .ok()
      .filter(|s| !s.trim().is_empty())
      .ok_or_else(|| CacheError::InvalidArgument("SERVICE_SLUG must be set".to_string()))?;

    let num_conn = match std::env::var("CACHE_NUM_CONN") {
      Ok(raw) => raw
        .trim()
        .parse::<usize>()
        .map_err(|_| CacheError::InvalidArgument(format!("invalid CACHE_NUM_CONN: {}", raw)))?,
      Err(_) => 0,
    };

    if num_conn == 0 {
      return Ok(Self::local_only(&name));
    }

    let hosts = split_env_list(std::env::var("CACHE_HOST").ok());
    let ports = parse_port_list(std::env::var("CACHE_PORT").ok())?;

    let endpoints: Vec<Endpoint> = (0..num_conn)
      .map(|i| {
        let host = hosts.get(i).cloned().unwrap_or_else(default_host);
        let port = ports.get(i).copied().unwrap_or_else(default_port);
        Endpoint { host, port }
      })
      .collect();

    if endpoints.len() > 1 {
      Ok(Self::cluster(&name, endpoints))
    } else {
      let endpoint = endpoints.into_iter().next().unwrap_or_default();
      Ok(Self::single(&name, endpoint))
    }
  }
}

fn split_env_list(raw: Option<String>) -> Vec<String> {
  raw
    .map(|s| {
      s.split(',')
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect()
    })
    .unwrap_or_default()
}

fn parse_port_list(raw: Option<String>) -> Result<Vec<u16>, CacheError> {
  split_env_list(raw)
    .into_iter()
    .map(|part| {
      part
        .parse::<u16>()
        .map_err(|_| CacheError::InvalidArgument(format!("invalid CACHE_PORT entry: {}", part)))
    })
    .collect()
}
