//! Remote-to-local propagation driven by keyspace events

use futures_util::StreamExt;
use parking_lot::Mutex;
use redis::aio::{PubSubSink, PubSubStream};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::error::CacheError;
use crate::local::LocalStore;
use crate::lock::KeyLockQueue;
use crate::remote::RemoteClient;
use crate::value::{decode_object, Scalar, StoredValue};

/// Channel prefix for keyspace notifications on database 0
pub const KEYSPACE_CHANNEL_PREFIX: &str = "__keyspace@0__:";

/// Keeps the local tier current for registered keys by applying remote
/// keyspace events. Started lazily on the first BOTH-level write.
pub struct SyncBridge {
  sink: tokio::sync::Mutex<PubSubSink>,
  registered: Mutex<HashSet<String>>,
  reader: JoinHandle<()>,
}

impl SyncBridge {
  pub async fn start(
    remote: RemoteClient,
    local: LocalStore,
    locks: Arc<KeyLockQueue>,
  ) -> Result<Self, CacheError> {
    let (sink, stream) = remote.open_subscription().await?;

    if let Err(e) = remote.enable_keyspace_events().await {
      // Managed backends often reject CONFIG SET; the subscription still
      // works when notifications are enabled server-side
      tracing::warn!("Could not enable keyspace events: {}", e);
    }

    let reader = tokio::spawn(async move {
      run_reader(stream, remote, local, locks).await;
    });

    tracing::debug!("Sync bridge started");
    Ok(Self {
      sink: tokio::sync::Mutex::new(sink),
      registered: Mutex::new(HashSet::new()),
      reader,
    })
  }

  /// Register a key for remote change notifications; at most one
  /// subscription per key
  pub async fn sync_on(&self, key: &str) -> Result<(), CacheError> {
    if !self.registered.lock().insert(key.to_string()) {
      return Ok(());
    }
    let channel = format!("{}{}", KEYSPACE_CHANNEL_PREFIX, key);
    if let Err(e) = self.sink.lock().await.subscribe(&channel).await {
      self.registered.lock().remove(key);
      return Err(e.into());
    }
    Ok(())
  }

  /// Deregister a key; no-op when the key was never registered
  pub async fn sync_off(&self, key: &str) -> Result<(), CacheError> {
    if !self.registered.lock().remove(key) {
      return Ok(());
    }
    let channel = format!("{}{}", KEYSPACE_CHANNEL_PREFIX, key);
    self.sink.lock().await.unsubscribe(&channel).await?;
    Ok(())
  }

  pub fn is_registered(&self, key: &str) -> bool {
    self.registered.lock().contains(key)
  }

  /// Stop the reader task and drop all registrations
  pub fn shutdown(&self) {
    self.reader.abort();
    self.registered.lock().clear();
  }
}

async fn run_reader(
  mut stream: PubSubStream,
  remote: RemoteClient,
  local: LocalStore,
  locks: Arc<KeyLockQueue>,
) {
  while let Some(msg) = stream.next().await {
    let channel = msg.get_channel_name().to_string();
    let affected = match channel.strip_prefix(KEYSPACE_CHANNEL_PREFIX) {
      Some(key) => key.to_string(),
      None => continue,
    };
    let action: String = match msg.get_payload() {
      Ok(action) => action,
      Err(e) => {
        tracing::warn!("Unreadable keyspace event payload on {}: {}", channel, e);
        continue;
      }
    };

    apply_event(&remote, &local, &locks, &affected, &action).await;
  }
  tracing::debug!("Keyspace event stream closed");
}

/// Apply one keyspace event to the local tier, serialized per key through
/// the lock queue
async fn apply_event(
  remote: &RemoteClient,
  local: &LocalStore,
  locks: &KeyLockQueue,
  key: &str,
  action: &str,
) {
  locks.acquire(key).await;

  match action {
    "set" => match remote.get(key).await {
      Ok(Some(raw)) => {
        local.put(key, StoredValue::Scalar(Scalar::from_wire(&raw, true)), 0);
        tracing::debug!("Synced remote set for {}", key);
      }
      Ok(None) => {}
      Err(e) => tracing::warn!("Failed to refresh {} after remote set: {}", key, e),
    },
    "hset" => match remote.hgetall(key).await {
      Ok(fields) if !fields.is_empty() => {
        local.put(key, StoredValue::Object(decode_object(fields, true)), 0);
        tracing::debug!("Synced remote hset for {}", key);
      }
      Ok(_) => {}
      Err(e) => tracing::warn!("Failed to refresh {} after remote hset: {}", key, e),
    },
    "del" => {
      local.remove(key);
      tracing::debug!("Synced remote del for {}", key);
    }
    _ => {}
  }

  locks.release(key);
}
