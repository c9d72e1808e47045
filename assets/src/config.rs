use crate::queue::LoadStrategy;

use std::path::PathBuf;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The number of sweeps an unreferenced asset survives before eviction.
pub const DEFAULT_EVICT_AFTER_FRAMES: u32 = 100;

/// The number of evicted loose assets that triggers a reclaim pass.
pub const DEFAULT_RECLAIM_THRESHOLD: usize = 10;

/// Tunables of an [`AssetCache`](crate::AssetCache).
///
/// With the `serde` feature the config can be read from any serde format;
/// missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct CacheConfig {
  /// Grace period, in sweeps, for newly created entries.
  pub evict_after_frames: u32,
  pub reclaim_threshold: usize,
  /// How the loading driver executes queued requests.
  pub strategy: LoadStrategy,
  /// Bundle `id` is opened at `bundle_root.join(id)`.
  pub bundle_root: PathBuf,
  /// Start the loading and sweeping drivers when the cache is built.
  pub autostart: bool,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      evict_after_frames: DEFAULT_EVICT_AFTER_FRAMES,
      reclaim_threshold: DEFAULT_RECLAIM_THRESHOLD,
      strategy: LoadStrategy::default(),
      bundle_root: PathBuf::from("bundles"),
      autostart: true,
    }
  }
}
