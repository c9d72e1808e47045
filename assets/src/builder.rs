use crate::bundle::{ArchiveStore, BundleLoader, DependencyManifest, NoBundles, PathResolver};
use crate::config::CacheConfig;
use crate::error::BuildError;
use crate::handles::AssetCache;
use crate::listener::EvictionListener;
use crate::metrics::Metrics;
use crate::queue::{LoadStrategy, LoadingQueue};
use crate::runtime::{FrameScheduler, TaskSpawner};
use crate::shared::CacheShared;
use crate::source::{ByteSource, SourceLoader};
use crate::store::AssetStore;

use core::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

/// A builder for creating [`AssetCache`] instances.
pub struct CacheBuilder<V> {
  config: CacheConfig,
  source: Arc<dyn ByteSource<V>>,
  bundles: Option<(Arc<dyn ArchiveStore<V>>, Arc<dyn DependencyManifest>)>,
  resolver: Option<Arc<dyn PathResolver>>,
  spawner: Option<Arc<dyn TaskSpawner>>,
  scheduler: Option<Arc<FrameScheduler>>,
  listener: Option<Arc<dyn EvictionListener<V>>>,
}

// Manual Debug implementation for CacheBuilder.
impl<V> fmt::Debug for CacheBuilder<V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheBuilder")
      .field("config", &self.config)
      .field("has_bundles", &self.bundles.is_some())
      .field("has_resolver", &self.resolver.is_some())
      .field("has_spawner", &self.spawner.is_some())
      .field("has_listener", &self.listener.is_some())
      .finish_non_exhaustive()
  }
}

impl<V: Send + Sync + 'static> CacheBuilder<V> {
  /// Creates a builder with default settings over `source`.
  pub fn new<S>(source: S) -> Self
  where
    S: ByteSource<V>,
  {
    Self {
      config: CacheConfig::default(),
      source: Arc::new(source),
      bundles: None,
      resolver: None,
      spawner: None,
      scheduler: None,
      listener: None,
    }
  }

  /// Replaces every tunable at once.
  pub fn config(mut self, config: CacheConfig) -> Self {
    self.config = config;
    self
  }

  /// Sets the grace period, in sweeps, of newly created entries.
  pub fn evict_after_frames(mut self, frames: u32) -> Self {
    self.config.evict_after_frames = frames;
    self
  }

  /// Sets how many loose assets must be evicted before the byte source is
  /// asked to reclaim unused memory.
  pub fn reclaim_threshold(mut self, threshold: usize) -> Self {
    self.config.reclaim_threshold = threshold;
    self
  }

  pub fn strategy(mut self, strategy: LoadStrategy) -> Self {
    self.config.strategy = strategy;
    self
  }

  pub fn bundle_root(mut self, root: impl Into<PathBuf>) -> Self {
    self.config.bundle_root = root.into();
    self
  }

  /// Whether `build` starts the loading and sweeping drivers. Defaults to
  /// true.
  pub fn autostart(mut self, autostart: bool) -> Self {
    self.config.autostart = autostart;
    self
  }

  /// Enables bundle support.
  ///
  /// Paths only reach the bundle loader through a [`PathResolver`]; see
  /// [`CacheBuilder::resolver`].
  pub fn bundles<S, M>(mut self, store: S, manifest: M) -> Self
  where
    S: ArchiveStore<V>,
    M: DependencyManifest,
  {
    let store: Arc<dyn ArchiveStore<V>> = Arc::new(store);
    let manifest: Arc<dyn DependencyManifest> = Arc::new(manifest);
    self.bundles = Some((store, manifest));
    self
  }

  /// Sets the resolver that maps load paths into bundles. Without one, every
  /// path is served by the byte source.
  pub fn resolver<R>(mut self, resolver: R) -> Self
  where
    R: PathResolver,
  {
    self.resolver = Some(Arc::new(resolver));
    self
  }

  /// Runs background work on a custom spawner.
  ///
  /// By default the cache creates its own [`FrameScheduler`], reachable
  /// through [`AssetCache::frame_scheduler`].
  pub fn spawner(mut self, spawner: Arc<dyn TaskSpawner>) -> Self {
    self.spawner = Some(spawner);
    self.scheduler = None;
    self
  }

  /// Runs background work on a frame scheduler the host already owns.
  pub fn frame_scheduler(mut self, scheduler: Arc<FrameScheduler>) -> Self {
    self.scheduler = Some(scheduler);
    self.spawner = None;
    self
  }

  /// Sets the eviction listener for the cache.
  pub fn eviction_listener<Listener>(mut self, listener: Listener) -> Self
  where
    Listener: EvictionListener<V> + 'static,
  {
    self.listener = Some(Arc::new(listener));
    self
  }

  /// Builds the cache, starting its drivers unless autostart is off.
  pub fn build(self) -> Result<AssetCache<V>, BuildError> {
    self.validate()?;
    let autostart = self.config.autostart;
    let cache = AssetCache {
      shared: self.build_shared_core(),
    };
    if autostart {
      cache.start();
    }
    Ok(cache)
  }

  /// Central logic to construct the shared core of the cache.
  fn build_shared_core(self) -> Arc<CacheShared<V>> {
    let (spawner, scheduler) = match (self.spawner, self.scheduler) {
      (Some(spawner), _) => (spawner, None),
      (None, scheduler) => {
        let scheduler = scheduler.unwrap_or_else(|| Arc::new(FrameScheduler::new()));
        let spawner: Arc<dyn TaskSpawner> = scheduler.clone();
        (spawner, Some(scheduler))
      }
    };

    let metrics = Arc::new(Metrics::new());
    let bundles = self.bundles.map(|(store, manifest)| {
      BundleLoader::with_metrics(store, manifest, self.config.bundle_root.clone(), metrics.clone())
    });
    let resolver: Arc<dyn PathResolver> = match self.resolver {
      Some(resolver) => resolver,
      None => Arc::new(NoBundles),
    };

    Arc::new(CacheShared {
      store: Mutex::new(AssetStore::new()),
      source: SourceLoader::new(self.source),
      bundles,
      resolver,
      queue: LoadingQueue::new(),
      clock: spawner.clock(),
      spawner,
      scheduler,
      listener: self.listener,
      metrics,
      strategy: Mutex::new(self.config.strategy),
      evict_after_frames: self.config.evict_after_frames,
      reclaim_threshold: self.config.reclaim_threshold,
      dispatcher: Mutex::new(None),
      janitor: Mutex::new(None),
    })
  }

  /// Validates the builder configuration.
  pub(crate) fn validate(&self) -> Result<(), BuildError> {
    if self.config.reclaim_threshold == 0 {
      return Err(BuildError::ZeroReclaimThreshold);
    }
    if self.resolver.is_some() && self.bundles.is_none() {
      return Err(BuildError::ResolverWithoutBundles);
    }
    Ok(())
  }
}
