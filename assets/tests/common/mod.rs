#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use fibre_assets::{
  Archive, ArchiveError, ArchiveStore, AssetCache, BundlePath, ByteSource, CacheBuilder, FrameClock, FrameScheduler,
  StaticManifest, TaskSpawner,
};
use futures_util::future::BoxFuture;
use parking_lot::Mutex;

// --- Byte source ---

/// Counters shared between a `MemorySource` and the test that built it.
#[derive(Default)]
pub struct LoadStats {
  loads: AtomicUsize,
  async_loads: AtomicUsize,
  reclaims: AtomicUsize,
  in_flight: AtomicUsize,
  max_in_flight: AtomicUsize,
}

impl LoadStats {
  pub fn loads(&self) -> usize {
    self.loads.load(Ordering::SeqCst)
  }

  pub fn async_loads(&self) -> usize {
    self.async_loads.load(Ordering::SeqCst)
  }

  pub fn reclaims(&self) -> usize {
    self.reclaims.load(Ordering::SeqCst)
  }

  /// The most async loads that were running at the same time.
  pub fn max_in_flight(&self) -> usize {
    self.max_in_flight.load(Ordering::SeqCst)
  }

  fn enter(&self) {
    let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    self.max_in_flight.fetch_max(now, Ordering::SeqCst);
  }

  fn leave(&self) {
    self.in_flight.fetch_sub(1, Ordering::SeqCst);
  }
}

/// An in-memory byte source. Every path maps to one stable `Arc`, whose
/// content is `"content of <path>"`.
pub struct MemorySource {
  assets: HashMap<String, Arc<String>>,
  delay: Option<(Arc<FrameClock>, u64)>,
  pub stats: Arc<LoadStats>,
}

impl MemorySource {
  pub fn new(paths: &[&str]) -> Self {
    Self {
      assets: paths
        .iter()
        .map(|path| (path.to_string(), Arc::new(format!("content of {}", path))))
        .collect(),
      delay: None,
      stats: Arc::new(LoadStats::default()),
    }
  }

  /// Async loads complete `frames` frames after they are first polled.
  pub fn delayed(paths: &[&str], clock: Arc<FrameClock>, frames: u64) -> Self {
    let mut source = Self::new(paths);
    source.delay = Some((clock, frames));
    source
  }
}

impl ByteSource<String> for MemorySource {
  fn load(&self, path: &str) -> Option<Arc<String>> {
    self.stats.loads.fetch_add(1, Ordering::SeqCst);
    self.assets.get(path).cloned()
  }

  fn load_async(&self, path: &str) -> BoxFuture<'static, Option<Arc<String>>> {
    self.stats.async_loads.fetch_add(1, Ordering::SeqCst);
    let value = self.assets.get(path).cloned();
    let stats = self.stats.clone();
    let delay = self.delay.clone();
    Box::pin(async move {
      stats.enter();
      if let Some((clock, frames)) = delay {
        clock.after(frames).await;
      }
      stats.leave();
      value
    })
  }

  fn reclaim_unused(&self) {
    self.stats.reclaims.fetch_add(1, Ordering::SeqCst);
  }
}

// --- Archives ---

#[derive(Default)]
pub struct ArchiveStats {
  opens: Mutex<HashMap<String, usize>>,
  unloads: Mutex<HashMap<String, usize>>,
  asset_loads: AtomicUsize,
  async_asset_loads: AtomicUsize,
}

impl ArchiveStats {
  /// How many times the store was asked to open `id`, sync or async.
  pub fn opens(&self, id: &str) -> usize {
    self.opens.lock().get(id).copied().unwrap_or(0)
  }

  pub fn unloads(&self, id: &str) -> usize {
    self.unloads.lock().get(id).copied().unwrap_or(0)
  }

  pub fn asset_loads(&self) -> usize {
    self.asset_loads.load(Ordering::SeqCst)
  }

  pub fn async_asset_loads(&self) -> usize {
    self.async_asset_loads.load(Ordering::SeqCst)
  }
}

/// An in-memory archive store. Bundles are addressed by the file name of the
/// path they are opened at; unknown bundles fail to open.
pub struct MemoryArchives {
  bundles: HashMap<String, HashMap<String, Arc<String>>>,
  delay: Option<(Arc<FrameClock>, u64)>,
  pub stats: Arc<ArchiveStats>,
}

impl MemoryArchives {
  pub fn new() -> Self {
    Self {
      bundles: HashMap::new(),
      delay: None,
      stats: Arc::new(ArchiveStats::default()),
    }
  }

  /// Adds a bundle whose assets have the content `"<id>/<asset>"`.
  pub fn with_bundle(mut self, id: &str, assets: &[&str]) -> Self {
    let assets = assets
      .iter()
      .map(|asset| (asset.to_string(), Arc::new(format!("{}/{}", id, asset))))
      .collect();
    self.bundles.insert(id.to_owned(), assets);
    self
  }

  /// Async opens and async asset loads complete `frames` frames after they
  /// are first polled.
  pub fn delayed(mut self, clock: Arc<FrameClock>, frames: u64) -> Self {
    self.delay = Some((clock, frames));
    self
  }

  fn archive(&self, id: &str) -> Result<Arc<dyn Archive<String>>, ArchiveError> {
    *self.stats.opens.lock().entry(id.to_owned()).or_default() += 1;
    match self.bundles.get(id) {
      Some(assets) => Ok(Arc::new(MemoryArchive {
        id: id.to_owned(),
        assets: assets.clone(),
        delay: self.delay.clone(),
        stats: self.stats.clone(),
      })),
      None => Err(ArchiveError::NotFound(id.to_owned())),
    }
  }
}

fn bundle_id(path: &Path) -> String {
  path
    .file_name()
    .and_then(|name| name.to_str())
    .unwrap_or_default()
    .to_owned()
}

impl ArchiveStore<String> for MemoryArchives {
  fn open(&self, path: &Path) -> Result<Arc<dyn Archive<String>>, ArchiveError> {
    self.archive(&bundle_id(path))
  }

  fn open_async(&self, path: PathBuf) -> BoxFuture<'static, Result<Arc<dyn Archive<String>>, ArchiveError>> {
    let result = self.archive(&bundle_id(&path));
    let delay = self.delay.clone();
    Box::pin(async move {
      if let Some((clock, frames)) = delay {
        clock.after(frames).await;
      }
      result
    })
  }
}

struct MemoryArchive {
  id: String,
  assets: HashMap<String, Arc<String>>,
  delay: Option<(Arc<FrameClock>, u64)>,
  stats: Arc<ArchiveStats>,
}

impl Archive<String> for MemoryArchive {
  fn load_asset(&self, name: &str) -> Option<Arc<String>> {
    self.stats.asset_loads.fetch_add(1, Ordering::SeqCst);
    self.assets.get(name).cloned()
  }

  fn load_asset_async(&self, name: &str) -> BoxFuture<'static, Option<Arc<String>>> {
    self.stats.async_asset_loads.fetch_add(1, Ordering::SeqCst);
    let value = self.assets.get(name).cloned();
    let delay = self.delay.clone();
    Box::pin(async move {
      if let Some((clock, frames)) = delay {
        clock.after(frames).await;
      }
      value
    })
  }

  fn unload(&self) {
    *self.stats.unloads.lock().entry(self.id.clone()).or_default() += 1;
  }
}

/// Resolves `"bundle:asset"` paths into bundles; everything else is loose.
pub fn colon_paths(path: &str) -> Option<BundlePath> {
  path
    .split_once(':')
    .map(|(bundle, asset)| BundlePath::new(bundle, asset))
}

// --- Harnesses ---

/// A cache over a `MemorySource`, driven by a frame scheduler owned by the
/// test.
pub struct Harness {
  pub scheduler: Arc<FrameScheduler>,
  pub cache: AssetCache<String>,
  pub source: Arc<LoadStats>,
}

impl Harness {
  pub fn clock(&self) -> Arc<FrameClock> {
    self.scheduler.clock()
  }
}

pub fn harness(paths: &[&str]) -> Harness {
  harness_with(paths, 0, |builder| builder)
}

/// Builds a harness whose async source loads take `delay_frames` frames.
pub fn harness_with<F>(paths: &[&str], delay_frames: u64, configure: F) -> Harness
where
  F: FnOnce(CacheBuilder<String>) -> CacheBuilder<String>,
{
  let scheduler = Arc::new(FrameScheduler::new());
  let source = if delay_frames == 0 {
    MemorySource::new(paths)
  } else {
    MemorySource::delayed(paths, scheduler.clock(), delay_frames)
  };
  let stats = source.stats.clone();
  let builder = CacheBuilder::new(source).frame_scheduler(scheduler.clone());
  let cache = configure(builder).build().unwrap();
  Harness {
    scheduler,
    cache,
    source: stats,
  }
}

/// A cache with bundle support. Paths of the form `"bundle:asset"` are served
/// from `archives`.
pub struct BundleHarness {
  pub scheduler: Arc<FrameScheduler>,
  pub cache: AssetCache<String>,
  pub archives: Arc<ArchiveStats>,
}

pub fn bundle_harness<F>(archives: MemoryArchives, manifest: StaticManifest, configure: F) -> BundleHarness
where
  F: FnOnce(CacheBuilder<String>) -> CacheBuilder<String>,
{
  let scheduler = Arc::new(FrameScheduler::new());
  let stats = archives.stats.clone();
  let builder = CacheBuilder::new(MemorySource::new(&[]))
    .frame_scheduler(scheduler.clone())
    .bundles(archives, manifest)
    .resolver(colon_paths);
  let cache = configure(builder).build().unwrap();
  BundleHarness {
    scheduler,
    cache,
    archives: stats,
  }
}

/// Spawns `future` on `scheduler` and returns a slot that holds its output
/// once it completes.
pub fn spawn_collect<T, F>(scheduler: &FrameScheduler, future: F) -> Arc<Mutex<Option<T>>>
where
  T: Send + 'static,
  F: Future<Output = T> + Send + 'static,
{
  let slot = Arc::new(Mutex::new(None));
  let slot_clone = slot.clone();
  scheduler.spawn(Box::pin(async move {
    let output = future.await;
    *slot_clone.lock() = Some(output);
  }));
  slot
}
