use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crossbeam_utils::CachePadded;

/// A thread-safe, internal metrics collector for the cache.
/// All fields are atomic to allow for lock-free updates.
#[derive(Debug)]
pub struct Metrics {
  // --- Lookups ---
  pub(crate) hits: CachePadded<AtomicU64>,
  pub(crate) misses: CachePadded<AtomicU64>,
  pub(crate) load_failures: CachePadded<AtomicU64>,

  // --- Entries ---
  pub(crate) admitted: CachePadded<AtomicU64>,
  pub(crate) evicted: CachePadded<AtomicU64>,
  pub(crate) purged: CachePadded<AtomicU64>,
  pub(crate) reclaims: CachePadded<AtomicU64>,
  pub(crate) sweeps: CachePadded<AtomicU64>,

  // --- Bundles ---
  pub(crate) bundles_opened: CachePadded<AtomicU64>,
  pub(crate) bundles_unloaded: CachePadded<AtomicU64>,
  pub(crate) bundle_open_failures: CachePadded<AtomicU64>,

  // --- Requests ---
  pub(crate) requests_completed: CachePadded<AtomicU64>,
  pub(crate) requests_cancelled: CachePadded<AtomicU64>,

  created_at: Instant,
}

impl Default for Metrics {
  fn default() -> Self {
    Self {
      hits: CachePadded::new(AtomicU64::new(0)),
      misses: CachePadded::new(AtomicU64::new(0)),
      load_failures: CachePadded::new(AtomicU64::new(0)),
      admitted: CachePadded::new(AtomicU64::new(0)),
      evicted: CachePadded::new(AtomicU64::new(0)),
      purged: CachePadded::new(AtomicU64::new(0)),
      reclaims: CachePadded::new(AtomicU64::new(0)),
      sweeps: CachePadded::new(AtomicU64::new(0)),
      bundles_opened: CachePadded::new(AtomicU64::new(0)),
      bundles_unloaded: CachePadded::new(AtomicU64::new(0)),
      bundle_open_failures: CachePadded::new(AtomicU64::new(0)),
      requests_completed: CachePadded::new(AtomicU64::new(0)),
      requests_cancelled: CachePadded::new(AtomicU64::new(0)),
      created_at: Instant::now(),
    }
  }
}

impl Metrics {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  /// Creates a point-in-time snapshot of the current metrics.
  pub(crate) fn snapshot(&self) -> MetricsSnapshot {
    let hits = self.hits.load(Ordering::Relaxed);
    let misses = self.misses.load(Ordering::Relaxed);
    let total_lookups = hits + misses;

    MetricsSnapshot {
      hits,
      misses,
      hit_ratio: if total_lookups == 0 {
        0.0
      } else {
        hits as f64 / total_lookups as f64
      },
      load_failures: self.load_failures.load(Ordering::Relaxed),
      admitted: self.admitted.load(Ordering::Relaxed),
      evicted: self.evicted.load(Ordering::Relaxed),
      purged: self.purged.load(Ordering::Relaxed),
      reclaims: self.reclaims.load(Ordering::Relaxed),
      sweeps: self.sweeps.load(Ordering::Relaxed),
      bundles_opened: self.bundles_opened.load(Ordering::Relaxed),
      bundles_unloaded: self.bundles_unloaded.load(Ordering::Relaxed),
      bundle_open_failures: self.bundle_open_failures.load(Ordering::Relaxed),
      requests_completed: self.requests_completed.load(Ordering::Relaxed),
      requests_cancelled: self.requests_cancelled.load(Ordering::Relaxed),
      uptime_secs: self.created_at.elapsed().as_secs(),
    }
  }
}

/// A point-in-time, public-facing snapshot of the cache's metrics.
#[derive(Clone)]
pub struct MetricsSnapshot {
  /// Lookups answered from an existing entry.
  pub hits: u64,
  /// Lookups that had to resolve the path.
  pub misses: u64,
  /// The cache hit ratio (hits / (hits + misses)).
  pub hit_ratio: f64,
  /// Resolutions that produced no value.
  pub load_failures: u64,
  /// Entries created.
  pub admitted: u64,
  /// Entries removed by a regular sweep.
  pub evicted: u64,
  /// Entries removed by an immediate sweep.
  pub purged: u64,
  /// Calls made to the byte source's `reclaim_unused`.
  pub reclaims: u64,
  pub sweeps: u64,
  pub bundles_opened: u64,
  pub bundles_unloaded: u64,
  pub bundle_open_failures: u64,
  /// Requests whose completion hook ran without cancellation.
  pub requests_completed: u64,
  /// Requests whose completion hook ran after cancellation.
  pub requests_cancelled: u64,
  /// The number of seconds the cache has been running.
  pub uptime_secs: u64,
}

impl fmt::Debug for MetricsSnapshot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MetricsSnapshot")
      .field("hits", &self.hits)
      .field("misses", &self.misses)
      .field("hit_ratio", &format!("{:.2}%", self.hit_ratio * 100.0))
      .field("load_failures", &self.load_failures)
      .field("admitted", &self.admitted)
      .field("evicted", &self.evicted)
      .field("purged", &self.purged)
      .field("reclaims", &self.reclaims)
      .field("sweeps", &self.sweeps)
      .field("bundles_opened", &self.bundles_opened)
      .field("bundles_unloaded", &self.bundles_unloaded)
      .field("bundle_open_failures", &self.bundle_open_failures)
      .field("requests_completed", &self.requests_completed)
      .field("requests_cancelled", &self.requests_cancelled)
      .field("uptime_secs", &self.uptime_secs)
      .finish()
  }
}
