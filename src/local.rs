//! Local tier store with per-key expiration timers

use parking_lot::{Mutex, RwLock};
use regex::Regex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::value::StoredValue;

struct LocalShared {
  values: RwLock<HashMap<String, StoredValue>>,
  timers: Mutex<HashMap<String, (u64, JoinHandle<()>)>>,
  next_token: AtomicU64,
}

/// In-memory mapping from storage key to decoded value. Keys written with a
/// positive duration carry exactly one pending expiration task.
#[derive(Clone)]
pub struct LocalStore {
  shared: Arc<LocalShared>,
}

impl Default for LocalStore {
  fn default() -> Self {
    Self::new()
  }
}

impl LocalStore {
  pub fn new() -> Self {
    Self {
      shared: Arc::new(LocalShared {
        values: RwLock::new(HashMap::new()),
        timers: Mutex::new(HashMap::new()),
        next_token: AtomicU64::new(0),
      }),
    }
  }

  /// Write a value, scheduling removal after `duration_secs` when positive.
  /// Any previous timer for the key is cancelled first.
  pub fn put(&self, key: &str, value: StoredValue, duration_secs: u64) {
    let mut timers = self.shared.timers.lock();
    if let Some((_, handle)) = timers.remove(key) {
      handle.abort();
    }
    self
      .shared
      .values
      .write()
      .insert(key.to_string(), value);

    if duration_secs > 0 {
      let token = self.shared.next_token.fetch_add(1, Ordering::Relaxed);
      let shared = Arc::clone(&self.shared);
      let owned_key = key.to_string();
      let handle = tokio::spawn(async move {
        expire_after(shared, owned_key, duration_secs, token).await;
      });
      timers.insert(key.to_string(), (token, handle));
    }
  }

  pub fn get(&self, key: &str) -> Option<StoredValue> {
    self.shared.values.read().get(key).cloned()
  }

  /// Remove a value and cancel its timer
  pub fn remove(&self, key: &str) -> bool {
    let mut timers = self.shared.timers.lock();
    if let Some((_, handle)) = timers.remove(key) {
      handle.abort();
    }
    self.shared.values.write().remove(key).is_some()
  }

  /// Remove every key matching the compiled pattern
  pub fn remove_by_pattern(&self, pattern: &Regex) -> usize {
    let mut timers = self.shared.timers.lock();
    let mut values = self.shared.values.write();

    let matched: Vec<String> = values
      .keys()
      .filter(|k| pattern.is_match(k))
      .cloned()
      .collect();

    for key in &matched {
      if let Some((_, handle)) = timers.remove(key) {
        handle.abort();
      }
      values.remove(key);
    }
    matched.len()
  }

  /// Drop all values and cancel all timers (dispose path)
  pub fn clear(&self) {
    let mut timers = self.shared.timers.lock();
    for (_, (_, handle)) in timers.drain() {
      handle.abort();
    }
    self.shared.values.write().clear();
  }

  pub fn len(&self) -> usize {
    self.shared.values.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.shared.values.read().is_empty()
  }

  pub fn contains(&self, key: &str) -> bool {
    self.shared.values.read().contains_key(key)
  }
}

async fn expire_after(shared: Arc<LocalShared>, key: String, duration_secs: u64, token: u64) {
  tokio::time::sleep(Duration::from_secs(duration_secs)).await;

  // A stale timer must not remove a value written after it was scheduled
  let mut timers = shared.timers.lock();
  match timers.get(&key) {
    Some((current, _)) if *current == token => {
      timers.remove(&key);
      shared.values.write().remove(&key);
    }
    _ => {}
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::keys::compile_pattern;
  use crate::value::Scalar;

  fn scalar(s: &str) -> StoredValue {
    StoredValue::Scalar(Scalar::String(s.to_string()))
  }

  #[tokio::test]
  async fn test_put_get_remove() {
    let store = LocalStore::new();
    store.put("k1", scalar("v1"), 0);
    assert_eq!(store.get("k1"), Some(scalar("v1")));

    assert!(store.remove("k1"));
    assert!(!store.remove("k1"));
    assert_eq!(store.get("k1"), None);
  }

  #[tokio::test]
  async fn test_timer_expires_value() {
    let store = LocalStore::new();
    store.put("k1", scalar("v1"), 1);
    assert!(store.contains("k1"));

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert!(!store.contains("k1"));
  }

  #[tokio::test]
  async fn test_rewrite_cancels_previous_timer() {
    let store = LocalStore::new();
    store.put("k1", scalar("old"), 1);
    store.put("k1", scalar("new"), 0);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(store.get("k1"), Some(scalar("new")));
  }

  #[tokio::test]
  async fn test_remove_by_pattern() {
    let store = LocalStore::new();
    store.put("user:1", scalar("a"), 0);
    store.put("user:2", scalar("b"), 0);
    store.put("order:1", scalar("c"), 0);

    let removed = store.remove_by_pattern(&compile_pattern("user:*").unwrap());
    assert_eq!(removed, 2);
    assert_eq!(store.len(), 1);
    assert!(store.contains("order:1"));
  }

  #[tokio::test]
  async fn test_clear() {
    let store = LocalStore::new();
    store.put("k1", scalar("a"), 5);
    store.put("k2", scalar("b"), 0);
    store.clear();
    assert!(store.is_empty());
  }
}
