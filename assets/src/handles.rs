use crate::builder::CacheBuilder;
use crate::bundle::BundleLoader;
use crate::entry::AssetId;
use crate::error::LoadError;
use crate::frame::FrameClock;
use crate::metrics::MetricsSnapshot;
use crate::owner::AssetOwner;
use crate::queue::LoadStrategy;
use crate::request::Request;
use crate::runtime::FrameScheduler;
use crate::shared::CacheShared;
use crate::source::ByteSource;

use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;

/// A reference-counted asset cache.
///
/// Every path is loaded at most once and shared by everyone asking for it.
/// Each entry counts the consumers that still need it; entries nobody
/// references are evicted by the sweep driver after a grace period measured in
/// frames.
///
/// `AssetCache` is a cheap handle: clones share one cache. Background work
/// (request loading, sweeping, async loads) runs on the cache's
/// [`TaskSpawner`](crate::TaskSpawner) and only progresses as its
/// [`FrameClock`] advances.
pub struct AssetCache<V> {
  pub(crate) shared: Arc<CacheShared<V>>,
}

impl<V> Clone for AssetCache<V> {
  fn clone(&self) -> Self {
    Self {
      shared: self.shared.clone(),
    }
  }
}

impl<V> fmt::Debug for AssetCache<V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("AssetCache").field("shared", &self.shared).finish()
  }
}

impl<V: Send + Sync + 'static> AssetCache<V> {
  /// Starts building a cache over `source`.
  pub fn builder<S>(source: S) -> CacheBuilder<V>
  where
    S: ByteSource<V>,
  {
    CacheBuilder::new(source)
  }

  // --- Loading ---

  /// Loads `path`, blocking.
  ///
  /// A path that is already cached is returned as is. Otherwise the value is
  /// resolved, and a newly created entry starts with one reference.
  pub fn load(&self, path: &str) -> Result<Arc<V>, LoadError> {
    self.shared.load(path)
  }

  /// Loads `path` on the cache's spawner and hands the result to `on_done`.
  ///
  /// If `path` is already cached, `on_done` runs before this call returns.
  pub fn load_async<F>(&self, path: &str, on_done: F)
  where
    F: FnOnce(Result<Arc<V>, LoadError>) + Send + 'static,
  {
    self.shared.load_async(path, on_done)
  }

  /// The future form of [`AssetCache::load_async`].
  pub fn fetch(&self, path: &str) -> BoxFuture<'static, Result<Arc<V>, LoadError>> {
    self.shared.fetch(path)
  }

  /// Runs every task of `request` blocking, then its completion hook.
  pub fn load_request(&self, request: &Request<V>) {
    self.shared.load_request(request)
  }

  /// Queues `request` for the loading driver. The returned handle can cancel
  /// it and read its results.
  pub fn submit(&self, request: Request<V>) -> Arc<Request<V>> {
    self.shared.submit(request)
  }

  /// The number of requests waiting for the loading driver.
  pub fn queued(&self) -> usize {
    self.shared.queue.len()
  }

  pub fn strategy(&self) -> LoadStrategy {
    self.shared.strategy()
  }

  /// Changes the strategy used for requests dequeued from now on.
  pub fn set_strategy(&self, strategy: LoadStrategy) {
    *self.shared.strategy.lock() = strategy;
  }

  // --- Queries ---

  /// The cached value for `path`, without touching its reference count.
  pub fn get(&self, path: &str) -> Option<Arc<V>> {
    self.shared.store.lock().get(path)
  }

  pub fn contains(&self, path: &str) -> bool {
    self.get(path).is_some()
  }

  /// True if `value` is a value this cache handed out and still holds.
  pub fn is_managed(&self, value: &Arc<V>) -> bool {
    self.shared.store.lock().entry(AssetId::of(value)).is_some()
  }

  /// The reference count of `value`; 0 for unmanaged values.
  pub fn reference_count(&self, value: &Arc<V>) -> usize {
    self
      .shared
      .store
      .lock()
      .entry(AssetId::of(value))
      .map_or(0, |e| e.reference_count())
  }

  pub fn has_reference(&self, value: &Arc<V>) -> bool {
    self.reference_count(value) > 0
  }

  pub fn len(&self) -> usize {
    self.shared.store.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  // --- Reference counting ---

  /// Adds a consumer reference to `value`. Unmanaged values are logged and
  /// ignored; returns whether the count changed.
  pub fn reference(&self, value: &Arc<V>) -> bool {
    self.shared.reference(value)
  }

  /// Removes a consumer reference from `value`. The count never drops below
  /// zero; returns whether it changed.
  pub fn unreference(&self, value: &Arc<V>) -> bool {
    self.shared.unreference(value)
  }

  /// A scope guard that releases every reference attached to it when dropped.
  pub fn owner(&self) -> AssetOwner<V> {
    AssetOwner::new(self.clone())
  }

  /// Attaches `value` to `owner`. See [`AssetOwner::attach`].
  pub fn attach_ownership(&self, owner: &mut AssetOwner<V>, value: &Arc<V>) -> bool {
    owner.attach(value)
  }

  // --- Eviction policy ---

  /// Never evicts `path`, now or after it is reloaded.
  pub fn dont_auto_evict(&self, path: &str) {
    self.shared.store.lock().set_auto_evict(path, false);
  }

  pub fn enable_auto_evict(&self, path: &str) {
    self.shared.store.lock().set_auto_evict(path, true);
  }

  /// Value form of [`AssetCache::dont_auto_evict`]. Returns false for
  /// unmanaged values.
  pub fn dont_auto_evict_value(&self, value: &Arc<V>) -> bool {
    self.shared.store.lock().set_auto_evict_by_id(AssetId::of(value), false)
  }

  pub fn enable_auto_evict_value(&self, value: &Arc<V>) -> bool {
    self.shared.store.lock().set_auto_evict_by_id(AssetId::of(value), true)
  }

  pub fn is_always_kept(&self, path: &str) -> bool {
    self.shared.store.lock().is_always_kept(path)
  }

  /// Overrides the grace period of a cached entry. Returns false if `path`
  /// is not cached.
  pub fn set_evict_after_frames(&self, path: &str, frames: u32) -> bool {
    self.shared.store.lock().set_evict_after_frames(path, frames)
  }

  /// Runs one sweep now, as the sweep driver does each frame. Returns the
  /// number of evicted entries.
  pub fn sweep(&self) -> usize {
    self.shared.sweep(false)
  }

  /// Reclaims unused source memory, then evicts every unreferenced,
  /// evictable entry regardless of its grace period.
  pub fn purge_unused(&self) -> usize {
    self.shared.purge_unused()
  }

  // --- Drivers ---

  /// Starts both drivers, replacing any that are running.
  pub fn start(&self) {
    self.start_loading();
    self.start_sweeping();
  }

  pub fn stop(&self) {
    self.stop_loading();
    self.stop_sweeping();
  }

  pub fn start_loading(&self) {
    self.shared.start_loading();
  }

  pub fn stop_loading(&self) {
    self.shared.stop_loading();
  }

  pub fn start_sweeping(&self) {
    self.shared.start_sweeping();
  }

  pub fn stop_sweeping(&self) {
    self.shared.stop_sweeping();
  }

  pub fn is_loading_started(&self) -> bool {
    self.shared.is_loading_running()
  }

  pub fn is_sweeping_started(&self) -> bool {
    self.shared.is_sweeping_running()
  }

  // --- Collaborators and diagnostics ---

  /// The bundle loader, when the cache was built with bundle support.
  pub fn bundles(&self) -> Option<&BundleLoader<V>> {
    self.shared.bundles.as_ref()
  }

  pub fn clock(&self) -> &Arc<FrameClock> {
    &self.shared.clock
  }

  /// The frame scheduler driving this cache, unless it runs on a custom
  /// spawner.
  pub fn frame_scheduler(&self) -> Option<&Arc<FrameScheduler>> {
    self.shared.scheduler.as_ref()
  }

  /// Returns a snapshot of the cache's performance metrics.
  pub fn metrics(&self) -> MetricsSnapshot {
    self.shared.metrics.snapshot()
  }

  /// A human-readable listing of every entry, open bundle and queued request.
  pub fn dump(&self) -> String {
    self.shared.dump()
  }
}
