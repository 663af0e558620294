//! Per-key lock queues for serializing invalidation work

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use tokio::sync::oneshot;

struct LockChain {
  waiters: VecDeque<oneshot::Sender<()>>,
}

/// A per-key FIFO of completion signals. Concurrent acquirers of the same
/// key are served in arrival order; each release wakes exactly one waiter.
/// A key's entry exists only while the lock is held.
#[derive(Default)]
pub struct KeyLockQueue {
  chains: Mutex<HashMap<String, LockChain>>,
}

impl KeyLockQueue {
  pub fn new() -> Self {
    Self::default()
  }

  /// Take the lock for `key`, waiting behind earlier holders
  pub async fn acquire(&self, key: &str) {
    let waiter = {
      let mut chains = self.chains.lock();
      match chains.get_mut(key) {
        None => {
          chains.insert(
            key.to_string(),
            LockChain {
              waiters: VecDeque::new(),
            },
          );
          None
        }
        Some(chain) => {
          let (tx, rx) = oneshot::channel();
          chain.waiters.push_back(tx);
          Some(rx)
        }
      }
    };

    if let Some(rx) = waiter {
      // The sender is dropped only when the whole queue is cleared on
      // dispose; proceed either way
      let _ = rx.await;
    }
  }

  /// Release the lock for `key`, waking the oldest waiter. The key's entry
  /// is removed once no waiters remain.
  pub fn release(&self, key: &str) {
    let mut chains = self.chains.lock();
    if let Some(chain) = chains.get_mut(key) {
      match chain.waiters.pop_front() {
        Some(tx) => {
          let _ = tx.send(());
        }
        None => {
          chains.remove(key);
        }
      }
    }
  }

  /// Drop every chain, waking all waiters (dispose path)
  pub fn clear(&self) {
    self.chains.lock().clear();
  }

  pub fn pending(&self, key: &str) -> Option<usize> {
    self.chains.lock().get(key).map(|c| c.waiters.len())
  }
}
