use crate::bundle::{BundleLoader, BundlePath, PathResolver};
use crate::entry::AssetId;
use crate::error::LoadError;
use crate::frame::FrameClock;
use crate::listener::{EvictionListener, EvictionReason};
use crate::metrics::Metrics;
use crate::queue::{LoadStrategy, LoadingQueue};
use crate::request::Request;
use crate::runtime::{FrameScheduler, TaskSpawner};
use crate::source::SourceLoader;
use crate::store::{Admission, AssetStore, Decrement};
use crate::task::{dispatcher, janitor, Driver};

use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use futures_util::future::{self, BoxFuture};
use futures_util::FutureExt;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

/// The internal, thread-safe core of the cache.
pub(crate) struct CacheShared<V> {
  pub(crate) store: Mutex<AssetStore<V>>,
  pub(crate) source: SourceLoader<V>,
  pub(crate) bundles: Option<BundleLoader<V>>,
  pub(crate) resolver: Arc<dyn PathResolver>,
  pub(crate) queue: LoadingQueue<V>,
  pub(crate) spawner: Arc<dyn TaskSpawner>,
  pub(crate) scheduler: Option<Arc<FrameScheduler>>,
  pub(crate) clock: Arc<FrameClock>,
  pub(crate) listener: Option<Arc<dyn EvictionListener<V>>>,
  pub(crate) metrics: Arc<Metrics>,
  pub(crate) strategy: Mutex<LoadStrategy>,
  pub(crate) evict_after_frames: u32,
  pub(crate) reclaim_threshold: usize,
  pub(crate) dispatcher: Mutex<Option<Driver>>,
  pub(crate) janitor: Mutex<Option<Driver>>,
}

impl<V> fmt::Debug for CacheShared<V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheShared")
      .field("assets", &self.store.lock().len())
      .field("queued", &self.queue.len())
      .field("strategy", &*self.strategy.lock())
      .field("evict_after_frames", &self.evict_after_frames)
      .field("reclaim_threshold", &self.reclaim_threshold)
      .field("metrics", &self.metrics.snapshot())
      .finish_non_exhaustive()
  }
}

impl<V> Drop for CacheShared<V> {
  fn drop(&mut self) {
    if let Some(driver) = self.dispatcher.get_mut().take() {
      driver.stop();
    }
    if let Some(driver) = self.janitor.get_mut().take() {
      driver.stop();
    }
  }
}

impl<V: Send + Sync + 'static> CacheShared<V> {
  // --- Lookup and resolution ---

  pub(crate) fn lookup(&self, path: &str) -> Option<Arc<V>> {
    let hit = self.store.lock().get(path);
    let counter = if hit.is_some() {
      &self.metrics.hits
    } else {
      &self.metrics.misses
    };
    counter.fetch_add(1, Ordering::Relaxed);
    hit
  }

  fn resolve(&self, path: &str, origin: Option<&BundlePath>) -> Result<Arc<V>, LoadError> {
    match origin {
      None => self.source.load(path).ok_or_else(|| LoadError::NotFound { path: path.to_owned() }),
      Some(origin) => match &self.bundles {
        Some(bundles) => Ok(bundles.load_asset(&origin.bundle, &origin.asset)?),
        None => Err(bundles_unavailable(path, origin)),
      },
    }
  }

  fn resolve_async(&self, path: &str, origin: Option<&BundlePath>) -> BoxFuture<'static, Result<Arc<V>, LoadError>> {
    match origin {
      None => {
        let load = self.source.load_async(path);
        let path = path.to_owned();
        async move { load.await.ok_or(LoadError::NotFound { path }) }.boxed()
      }
      Some(origin) => match &self.bundles {
        Some(bundles) => bundles
          .load_asset_async(&origin.bundle, &origin.asset)
          .map(|result| result.map_err(LoadError::from))
          .boxed(),
        None => future::ready(Err(bundles_unavailable(path, origin))).boxed(),
      },
    }
  }

  fn admit(&self, path: &str, value: Arc<V>, origin: Option<BundlePath>, admission: Admission) -> Arc<V> {
    let mut store = self.store.lock();
    let before = store.len();
    let value = store.admit(path, value, origin, self.evict_after_frames, admission);
    if store.len() > before {
      self.metrics.admitted.fetch_add(1, Ordering::Relaxed);
    }
    value
  }

  fn fail(&self, path: &str, error: LoadError) -> LoadError {
    self.metrics.load_failures.fetch_add(1, Ordering::Relaxed);
    warn!(path, error = %error, "failed to load asset");
    error
  }

  // --- Single loads ---

  pub(crate) fn load(&self, path: &str) -> Result<Arc<V>, LoadError> {
    if let Some(value) = self.lookup(path) {
      return Ok(value);
    }
    let origin = self.resolver.resolve(path);
    match self.resolve(path, origin.as_ref()) {
      Ok(value) => Ok(self.admit(path, value, origin, Admission::HoldIfNew)),
      Err(error) => Err(self.fail(path, error)),
    }
  }

  pub(crate) fn fetch(self: &Arc<Self>, path: &str) -> BoxFuture<'static, Result<Arc<V>, LoadError>> {
    match self.lookup(path) {
      Some(value) => future::ready(Ok(value)).boxed(),
      None => self.fetch_miss(path),
    }
  }

  fn fetch_miss(self: &Arc<Self>, path: &str) -> BoxFuture<'static, Result<Arc<V>, LoadError>> {
    let origin = self.resolver.resolve(path);
    let resolving = self.resolve_async(path, origin.as_ref());
    let shared = self.clone();
    let path = path.to_owned();
    async move {
      match resolving.await {
        Ok(value) => Ok(shared.admit(&path, value, origin, Admission::HoldIfNew)),
        Err(error) => Err(shared.fail(&path, error)),
      }
    }
    .boxed()
  }

  pub(crate) fn load_async<F>(self: &Arc<Self>, path: &str, on_done: F)
  where
    F: FnOnce(Result<Arc<V>, LoadError>) + Send + 'static,
  {
    if let Some(value) = self.lookup(path) {
      on_done(Ok(value));
      return;
    }
    let fetch = self.fetch_miss(path);
    self.spawner.spawn(Box::pin(async move {
      on_done(fetch.await);
    }));
  }

  // --- Tasks ---

  pub(crate) fn run_task(&self, request: &Request<V>, index: usize, path: &str) {
    let origin = self.resolver.resolve(path);
    let result = match self.lookup(path) {
      Some(value) => Ok(value),
      None => self.resolve(path, origin.as_ref()),
    };
    self.complete_task(request, index, path, origin, result);
  }

  pub(crate) async fn run_task_async(self: Arc<Self>, request: Arc<Request<V>>, index: usize, path: String) {
    let origin = self.resolver.resolve(&path);
    let result = match self.lookup(&path) {
      Some(value) => Ok(value),
      None => self.resolve_async(&path, origin.as_ref()).await,
    };
    self.complete_task(&request, index, &path, origin, result);
  }

  pub(crate) fn spawn_task(self: &Arc<Self>, request: Arc<Request<V>>, index: usize, path: String) {
    self
      .spawner
      .spawn(Box::pin(self.clone().run_task_async(request, index, path)));
  }

  /// A successful task takes one reference, unless its request already
  /// finished and nothing would release it.
  fn complete_task(
    &self,
    request: &Request<V>,
    index: usize,
    path: &str,
    origin: Option<BundlePath>,
    result: Result<Arc<V>, LoadError>,
  ) {
    match result {
      Ok(value) => request.record(index, |finished| {
        let admission = if finished {
          Admission::Track
        } else {
          Admission::Hold
        };
        Some(self.admit(path, value, origin, admission))
      }),
      Err(error) => {
        self.fail(path, error);
        request.record(index, |_| None);
      }
    }
  }

  /// Releases the reference each task took, then runs the callback unless
  /// the request was cancelled. Runs at most once per request.
  pub(crate) fn finish_request(&self, request: &Request<V>) {
    let Some(held) = request.finish() else {
      return;
    };

    let underflows = {
      let mut store = self.store.lock();
      held
        .iter()
        .filter(|&value| store.decrement(AssetId::of(value)) == Some(Decrement::Underflow))
        .count()
    };
    if underflows > 0 {
      warn!(underflows, "request released more references than its tasks held");
    }

    if request.is_cancelled() {
      self.metrics.requests_cancelled.fetch_add(1, Ordering::Relaxed);
      debug!(tasks = request.task_count(), "request cancelled; callback suppressed");
      return;
    }
    self.metrics.requests_completed.fetch_add(1, Ordering::Relaxed);
    if let Some(callback) = request.take_callback() {
      callback(request);
    }
  }

  pub(crate) fn load_request(&self, request: &Request<V>) {
    for (index, path) in request.pending_tasks() {
      self.run_task(request, index, &path);
    }
    self.finish_request(request);
  }

  pub(crate) fn submit(&self, request: Request<V>) -> Arc<Request<V>> {
    let request = Arc::new(request);
    self.queue.push(request.clone());
    request
  }

  pub(crate) fn strategy(&self) -> LoadStrategy {
    *self.strategy.lock()
  }

  // --- Counting ---

  pub(crate) fn reference(&self, value: &Arc<V>) -> bool {
    let managed = self.store.lock().increment(AssetId::of(value));
    match managed {
      None => {
        warn!("reference called on an unmanaged asset");
        false
      }
      Some(bundle) => {
        if let (Some(bundle), Some(bundles)) = (bundle, &self.bundles) {
          bundles.reference_bundle(&bundle);
        }
        true
      }
    }
  }

  pub(crate) fn unreference(&self, value: &Arc<V>) -> bool {
    let decrement = self.store.lock().decrement(AssetId::of(value));
    match decrement {
      None => {
        warn!("unreference called on an unmanaged asset");
        false
      }
      Some(Decrement::Underflow) => {
        warn!("asset reference count underflow");
        false
      }
      Some(Decrement::Released(bundle)) => {
        if let (Some(bundle), Some(bundles)) = (bundle, &self.bundles) {
          bundles.unreference_bundle(&bundle);
        }
        true
      }
    }
  }

  // --- Sweeping ---

  /// Ages unreferenced entries and evicts the expired ones. An immediate
  /// sweep evicts every unreferenced, evictable entry.
  pub(crate) fn sweep(&self, immediate: bool) -> usize {
    let outcome = self.store.lock().sweep(immediate, self.reclaim_threshold);
    self.metrics.sweeps.fetch_add(1, Ordering::Relaxed);

    let (reason, counter) = if immediate {
      (EvictionReason::Purged, &self.metrics.purged)
    } else {
      (EvictionReason::Unreferenced, &self.metrics.evicted)
    };
    let evicted = outcome.evicted.len();
    counter.fetch_add(evicted as u64, Ordering::Relaxed);

    for (path, value) in outcome.evicted {
      debug!(path = %path, %reason, "evicted asset");
      if let Some(listener) = &self.listener {
        listener.on_evict(&path, value, reason);
      }
    }

    if let Some(bundles) = &self.bundles {
      for id in &outcome.bundles {
        if !bundles.has_reference(id) && !bundles.is_loading(id) {
          bundles.unload_bundle(id, true);
        }
      }
    }

    if outcome.reclaim {
      self.reclaim();
    }
    evicted
  }

  fn reclaim(&self) {
    self.metrics.reclaims.fetch_add(1, Ordering::Relaxed);
    info!("reclaiming unused source memory");
    self.source.reclaim_unused();
  }

  pub(crate) fn purge_unused(&self) -> usize {
    self.reclaim();
    self.sweep(true)
  }

  // --- Drivers ---

  pub(crate) fn start_loading(self: &Arc<Self>) {
    let driver = Driver::spawn(
      &*self.spawner,
      dispatcher::run(Arc::downgrade(self), self.clock.clone()),
    );
    if let Some(previous) = self.dispatcher.lock().replace(driver) {
      previous.stop();
    }
    debug!("loading driver started");
  }

  pub(crate) fn stop_loading(&self) {
    let driver = self.dispatcher.lock().take();
    if let Some(driver) = driver {
      driver.stop();
      debug!("loading driver stopped");
    }
  }

  pub(crate) fn start_sweeping(self: &Arc<Self>) {
    let driver = Driver::spawn(
      &*self.spawner,
      janitor::run(Arc::downgrade(self), self.clock.clone()),
    );
    if let Some(previous) = self.janitor.lock().replace(driver) {
      previous.stop();
    }
    debug!("sweep driver started");
  }

  pub(crate) fn stop_sweeping(&self) {
    let driver = self.janitor.lock().take();
    if let Some(driver) = driver {
      driver.stop();
      debug!("sweep driver stopped");
    }
  }

  pub(crate) fn is_loading_running(&self) -> bool {
    self.dispatcher.lock().is_some()
  }

  pub(crate) fn is_sweeping_running(&self) -> bool {
    self.janitor.lock().is_some()
  }

  pub(crate) fn dump(&self) -> String {
    let mut out = self.store.lock().dump();
    if let Some(bundles) = &self.bundles {
      out.push_str(&bundles.dump());
    }
    out.push_str(&format!("queued requests: {}\n", self.queue.len()));
    out
  }
}

fn bundles_unavailable(path: &str, origin: &BundlePath) -> LoadError {
  LoadError::BundlesUnavailable {
    path: path.to_owned(),
    bundle: origin.bundle.clone(),
  }
}
