//! Cache engine: tier selection, TTL handling, pattern delete, lifecycle

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::ProviderOptions;
use crate::error::CacheError;
use crate::keys::{compile_pattern, KeyNamer};
use crate::local::LocalStore;
use crate::lock::KeyLockQueue;
use crate::remote::RemoteClient;
use crate::sync::SyncBridge;
use crate::value::{decode_array, decode_object, encode_array, encode_object, Scalar, StoredValue};

/// SCAN batch size used by pattern delete
const SCAN_BATCH: usize = 10;

/// Which tier(s) an operation targets. LOCAL is bit 0b01, REMOTE is 0b10,
/// BOTH is their union.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheLevel {
  Local = 0b01,
  Remote = 0b10,
  Both = 0b11,
}

impl CacheLevel {
  pub fn includes_local(self) -> bool {
    (self as u8) & 0b01 != 0
  }

  pub fn includes_remote(self) -> bool {
    (self as u8) & 0b10 != 0
  }
}

/// Options for set operations
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
  /// TTL in seconds; 0 means never
  pub duration: u64,
  /// Target tier(s); defaults to REMOTE when a remote client exists,
  /// LOCAL otherwise
  pub level: Option<CacheLevel>,
  /// Skip the instance prefix
  pub is_global: bool,
}

/// Options for get operations
#[derive(Debug, Clone)]
pub struct GetOptions {
  /// Bypass the local tier
  pub force_remote: bool,
  /// Attempt typed parsing of remotely fetched scalars
  pub parse_type: bool,
  /// Skip the instance prefix
  pub is_global: bool,
}

impl Default for GetOptions {
  fn default() -> Self {
    Self {
      force_remote: false,
      parse_type: true,
      is_global: false,
    }
  }
}

/// Options for delete operations
#[derive(Debug, Clone, Default)]
pub struct DeleteOptions {
  /// Treat the key as a glob pattern spanning both tiers
  pub is_pattern: bool,
  /// Skip the instance prefix (ignored in pattern mode)
  pub is_global: bool,
}

/// Provider statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
  pub local_entries: usize,
  pub local_hits: u64,
  pub remote_hits: u64,
  pub misses: u64,
  pub mode: String,
}

/// Two-tier cache provider. Reads and writes primitives, arrays, and flat
/// objects against a process-local store, a remote backend, or both, with
/// remote-to-local sync for keys written at BOTH level.
pub struct CacheProvider {
  name: String,
  mode: &'static str,
  namer: KeyNamer,
  local: LocalStore,
  remote: RwLock<Option<RemoteClient>>,
  sync: tokio::sync::Mutex<Option<SyncBridge>>,
  locks: Arc<KeyLockQueue>,
  disposed: AtomicBool,
  local_hits: AtomicU64,
  remote_hits: AtomicU64,
  misses: AtomicU64,
}

impl CacheProvider {
  /// Connect a provider. With neither `single` nor `cluster` configured the
  /// instance runs local-only and every operation restricts to the local
  /// tier.
  pub async fn new(options: ProviderOptions) -> Result<Self, CacheError> {
    if options.name.trim().is_empty() {
      return Err(CacheError::InvalidArgument(
        "cache instance name must not be empty".to_string(),
      ));
    }

    let (remote, mode) = if let Some(endpoints) = &options.cluster {
      let client = RemoteClient::connect_cluster(endpoints).await?;
      (Some(client), "cluster")
    } else if let Some(endpoint) = &options.single {
      (Some(RemoteClient::connect_single(endpoint).await?), "single")
    } else {
      (None, "local-only")
    };

    if let Some(client) = &remote {
      client.ping().await?;
      tracing::info!("Cache provider {} connected ({} mode)", options.name, mode);
    } else {
      tracing::info!("Cache provider {} running local-only", options.name);
    }

    Ok(Self {
      namer: KeyNamer::new(&options.name),
      name: options.name,
      mode,
      local: LocalStore::new(),
      remote: RwLock::new(remote),
      sync: tokio::sync::Mutex::new(None),
      locks: Arc::new(KeyLockQueue::new()),
      disposed: AtomicBool::new(false),
      local_hits: AtomicU64::new(0),
      remote_hits: AtomicU64::new(0),
      misses: AtomicU64::new(0),
    })
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn stats(&self) -> CacheStats {
    CacheStats {
      local_entries: self.local.len(),
      local_hits: self.local_hits.load(Ordering::Relaxed),
      remote_hits: self.remote_hits.load(Ordering::Relaxed),
      misses: self.misses.load(Ordering::Relaxed),
      mode: self.mode.to_string(),
    }
  }

  /// Store a primitive value
  pub async fn set_primitive(
    &self,
    key: &str,
    value: impl Into<Scalar>,
    options: &SetOptions,
  ) -> Result<(), CacheError> {
    self.ensure_live()?;
    let storage_key = self.storage_key(key, options.is_global)?;
    let remote = self.remote();
    let level = self.effective_level(options.level, remote.is_some());
    let scalar = value.into();

    if level.includes_local() {
      self
        .local
        .put(&storage_key, StoredValue::Scalar(scalar.clone()), options.duration);
    }
    if level.includes_remote() {
      if let Some(client) = &remote {
        client
          .write_scalar(&storage_key, &scalar.to_wire(), options.duration)
          .await?;
      }
    }
    if level == CacheLevel::Both {
      if let Some(client) = &remote {
        self.register_sync(client, &storage_key).await?;
      }
    }
    Ok(())
  }

  /// Store an array; the payload travels as JSON text through the
  /// primitive path and is restored to a sequence on read
  pub async fn set_array(
    &self,
    key: &str,
    values: &[serde_json::Value],
    options: &SetOptions,
  ) -> Result<(), CacheError> {
    self
      .set_primitive(key, Scalar::String(encode_array(values)), options)
      .await
  }

  /// Store a flat object as a remote hash / local mapping
  pub async fn set_object(
    &self,
    key: &str,
    object: &HashMap<String, Scalar>,
    options: &SetOptions,
  ) -> Result<(), CacheError> {
    self.ensure_live()?;
    if object.is_empty() {
      // An empty hash is indistinguishable from absence on read
      return Err(CacheError::InvalidArgument(
        "object value must not be empty".to_string(),
      ));
    }
    let storage_key = self.storage_key(key, options.is_global)?;
    let remote = self.remote();
    let level = self.effective_level(options.level, remote.is_some());

    if level.includes_local() {
      self
        .local
        .put(&storage_key, StoredValue::Object(object.clone()), options.duration);
    }
    if level.includes_remote() {
      if let Some(client) = &remote {
        client
          .write_hash(&storage_key, &encode_object(object), options.duration)
          .await?;
      }
    }
    if level == CacheLevel::Both {
      if let Some(client) = &remote {
        self.register_sync(client, &storage_key).await?;
      }
    }
    Ok(())
  }

  /// Fetch a primitive value
  pub async fn get_primitive(
    &self,
    key: &str,
    options: &GetOptions,
  ) -> Result<Option<Scalar>, CacheError> {
    self.ensure_live()?;
    let storage_key = self.storage_key(key, options.is_global)?;
    let remote = self.remote();

    if options.force_remote {
      if let Some(client) = &remote {
        return self
          .fetch_remote_scalar(client, &storage_key, options.parse_type)
          .await;
      }
    }
    if let Some(stored) = self.local.get(&storage_key) {
      return Ok(match stored {
        StoredValue::Scalar(scalar) => {
          self.local_hits.fetch_add(1, Ordering::Relaxed);
          Some(scalar)
        }
        StoredValue::Object(_) => {
          self.misses.fetch_add(1, Ordering::Relaxed);
          None
        }
      });
    }
    if let Some(client) = &remote {
      return self
        .fetch_remote_scalar(client, &storage_key, options.parse_type)
        .await;
    }
    self.misses.fetch_add(1, Ordering::Relaxed);
    Ok(None)
  }

  /// Fetch an array
  pub async fn get_array(
    &self,
    key: &str,
    options: &GetOptions,
  ) -> Result<Option<Vec<serde_json::Value>>, CacheError> {
    self.ensure_live()?;
    let storage_key = self.storage_key(key, options.is_global)?;
    let remote = self.remote();

    if options.force_remote {
      if let Some(client) = &remote {
        return self.fetch_remote_array(client, &storage_key).await;
      }
    }
    if let Some(stored) = self.local.get(&storage_key) {
      let decoded = match stored {
        StoredValue::Scalar(Scalar::String(text)) => decode_array(&text),
        _ => None,
      };
      if decoded.is_some() {
        self.local_hits.fetch_add(1, Ordering::Relaxed);
      } else {
        self.misses.fetch_add(1, Ordering::Relaxed);
      }
      return Ok(decoded);
    }
    if let Some(client) = &remote {
      return self.fetch_remote_array(client, &storage_key).await;
    }
    self.misses.fetch_add(1, Ordering::Relaxed);
    Ok(None)
  }

  /// Fetch an object
  pub async fn get_object(
    &self,
    key: &str,
    options: &GetOptions,
  ) -> Result<Option<HashMap<String, Scalar>>, CacheError> {
    self.ensure_live()?;
    let storage_key = self.storage_key(key, options.is_global)?;
    let remote = self.remote();

    if options.force_remote {
      if let Some(client) = &remote {
        return self
          .fetch_remote_object(client, &storage_key, options.parse_type)
          .await;
      }
    }
    if let Some(stored) = self.local.get(&storage_key) {
      return Ok(match stored {
        StoredValue::Object(object) => {
          self.local_hits.fetch_add(1, Ordering::Relaxed);
          Some(object)
        }
        StoredValue::Scalar(_) => {
          self.misses.fetch_add(1, Ordering::Relaxed);
          None
        }
      });
    }
    if let Some(client) = &remote {
      return self
        .fetch_remote_object(client, &storage_key, options.parse_type)
        .await;
    }
    self.misses.fetch_add(1, Ordering::Relaxed);
    Ok(None)
  }

  /// Delete a key, or every key matching a glob pattern. Non-pattern
  /// deletes clear the local entry, the sync registration, and the remote
  /// key. Pattern deletes sweep the local tier, then SCAN the remote
  /// keyspace; the caller owns prefix handling in pattern mode.
  pub async fn delete(&self, key: &str, options: &DeleteOptions) -> Result<(), CacheError> {
    self.ensure_live()?;
    if options.is_pattern {
      return self.delete_by_pattern(key).await;
    }

    let storage_key = self.storage_key(key, options.is_global)?;
    self.local.remove(&storage_key);
    if let Some(bridge) = self.sync.lock().await.as_ref() {
      bridge.sync_off(&storage_key).await?;
    }
    if let Some(client) = self.remote() {
      client.del(std::slice::from_ref(&storage_key)).await?;
    }
    Ok(())
  }

  async fn delete_by_pattern(&self, pattern: &str) -> Result<(), CacheError> {
    if pattern.is_empty() {
      return Err(CacheError::InvalidArgument(
        "pattern must not be empty".to_string(),
      ));
    }

    let removed = self.local.remove_by_pattern(&compile_pattern(pattern)?);
    if removed > 0 {
      tracing::debug!("Removed {} local keys matching {}", removed, pattern);
    }

    if let Some(client) = self.remote() {
      // SCAN may return duplicates across batches
      let mut matched: HashSet<String> = HashSet::new();
      let mut cursor = 0u64;
      loop {
        let (next, keys) = client.scan(cursor, pattern, SCAN_BATCH).await?;
        matched.extend(keys);
        if next == 0 {
          break;
        }
        cursor = next;
      }
      let keys: Vec<String> = matched.into_iter().collect();
      client.del(&keys).await?;
    }
    Ok(())
  }

  /// Whether a storage key is registered for remote change sync
  pub async fn is_synced(&self, key: &str, is_global: bool) -> bool {
    let storage_key = match self.storage_key(key, is_global) {
      Ok(k) => k,
      Err(_) => return false,
    };
    match self.sync.lock().await.as_ref() {
      Some(bridge) => bridge.is_registered(&storage_key),
      None => false,
    }
  }

  /// Close remote connections, cancel expiration timers, and clear all
  /// internal state. The instance is unusable afterwards.
  pub async fn dispose(&self) {
    if self.disposed.swap(true, Ordering::SeqCst) {
      return;
    }
    if let Some(bridge) = self.sync.lock().await.take() {
      bridge.shutdown();
    }
    *self.remote.write() = None;
    self.local.clear();
    self.locks.clear();
    tracing::info!("Cache provider {} disposed", self.name);
  }

  fn ensure_live(&self) -> Result<(), CacheError> {
    if self.disposed.load(Ordering::SeqCst) {
      return Err(CacheError::Disposed);
    }
    Ok(())
  }

  fn storage_key(&self, key: &str, is_global: bool) -> Result<String, CacheError> {
    if key.is_empty() {
      return Err(CacheError::InvalidArgument("key must not be empty".to_string()));
    }
    if is_global {
      Ok(KeyNamer::global(key))
    } else {
      Ok(self.namer.real(key))
    }
  }

  fn effective_level(&self, requested: Option<CacheLevel>, has_remote: bool) -> CacheLevel {
    requested.unwrap_or(if has_remote {
      CacheLevel::Remote
    } else {
      CacheLevel::Local
    })
  }

  fn remote(&self) -> Option<RemoteClient> {
    self.remote.read().clone()
  }

  async fn register_sync(&self, client: &RemoteClient, storage_key: &str) -> Result<(), CacheError> {
    let mut slot = self.sync.lock().await;
    if slot.is_none() {
      *slot = Some(
        SyncBridge::start(
          client.clone(),
          self.local.clone(),
          Arc::clone(&self.locks),
        )
        .await?,
      );
    }
    if let Some(bridge) = slot.as_ref() {
      bridge.sync_on(storage_key).await?;
    }
    Ok(())
  }

  async fn fetch_remote_scalar(
    &self,
    client: &RemoteClient,
    storage_key: &str,
    parse_type: bool,
  ) -> Result<Option<Scalar>, CacheError> {
    match client.get(storage_key).await? {
      Some(raw) => {
        self.remote_hits.fetch_add(1, Ordering::Relaxed);
        Ok(Some(Scalar::from_wire(&raw, parse_type)))
      }
      None => {
        self.misses.fetch_add(1, Ordering::Relaxed);
        Ok(None)
      }
    }
  }

  async fn fetch_remote_array(
    &self,
    client: &RemoteClient,
    storage_key: &str,
  ) -> Result<Option<Vec<serde_json::Value>>, CacheError> {
    // The raw text is parsed as a sequence, never as a typed scalar
    match client.get(storage_key).await? {
      Some(raw) => {
        let decoded = decode_array(&raw);
        if decoded.is_some() {
          self.remote_hits.fetch_add(1, Ordering::Relaxed);
        } else {
          self.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(decoded)
      }
      None => {
        self.misses.fetch_add(1, Ordering::Relaxed);
        Ok(None)
      }
    }
  }

  async fn fetch_remote_object(
    &self,
    client: &RemoteClient,
    storage_key: &str,
    parse_type: bool,
  ) -> Result<Option<HashMap<String, Scalar>>, CacheError> {
    let fields = client.hgetall(storage_key).await?;
    if fields.is_empty() {
      self.misses.fetch_add(1, Ordering::Relaxed);
      return Ok(None);
    }
    self.remote_hits.fetch_add(1, Ordering::Relaxed);
    Ok(Some(decode_object(fields, parse_type)))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_level_bits() {
    assert!(CacheLevel::Local.includes_local());
    assert!(!CacheLevel::Local.includes_remote());
    assert!(CacheLevel::Remote.includes_remote());
    assert!(!CacheLevel::Remote.includes_local());
    assert!(CacheLevel::Both.includes_local());
    assert!(CacheLevel::Both.includes_remote());
  }

  #[test]
  fn test_get_options_default_parses() {
    let options = GetOptions::default();
    assert!(options.parse_type);
    assert!(!options.force_remote);
    assert!(!options.is_global);
  }
}
