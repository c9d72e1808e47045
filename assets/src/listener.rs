use std::fmt;
use std::sync::Arc;

/// Describes the reason an entry was removed from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
  /// The entry stayed unreferenced for its whole grace period.
  Unreferenced,
  /// The entry was unreferenced when an immediate sweep ran.
  Purged,
}

impl fmt::Display for EvictionReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      EvictionReason::Unreferenced => write!(f, "evicted after its grace period"),
      EvictionReason::Purged => write!(f, "purged by an immediate sweep"),
    }
  }
}

/// A listener that can be registered with the cache to receive notifications
/// when entries are evicted.
///
/// `on_evict` runs on the task that performed the sweep, after the cache's
/// locks were released.
pub trait EvictionListener<V>: Send + Sync {
  fn on_evict(&self, path: &str, value: Arc<V>, reason: EvictionReason);
}

impl<V, F> EvictionListener<V> for F
where
  F: Fn(&str, Arc<V>, EvictionReason) + Send + Sync,
{
  fn on_evict(&self, path: &str, value: Arc<V>, reason: EvictionReason) {
    self(path, value, reason)
  }
}
