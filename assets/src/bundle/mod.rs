//! The bundle dependency loader.
//!
//! Bundles are archives that may depend on other bundles. The loader keeps two
//! independent counts per open bundle: `direct` references from consumers of
//! its assets, and `dependents`, one per dependency listing through which
//! another bundle's open acquired it. A bundle is only unloaded once both are
//! zero.
//!
//! Each root open remembers the dependencies it actually acquired, and a
//! cascading unload gives back exactly those.

mod archive;
mod manifest;
mod resolver;

pub use archive::{Archive, ArchiveStore};
pub use manifest::{DependencyManifest, StaticManifest};
pub use resolver::{BundlePath, NoBundles, PathResolver};

use crate::error::{ArchiveError, BundleError};
use crate::metrics::Metrics;
use crate::pending::{Claim, Pending};

use std::collections::HashMap;
use std::fmt::{self, Write as _};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::Mutex;
use tracing::{debug, warn};

/// The two counts that keep a bundle open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BundleCounts {
  /// Consumer references to assets of this bundle.
  pub direct: usize,
  /// Opens of other bundles that acquired this one as a dependency.
  pub dependents: usize,
}

struct BundleEntry<V> {
  archive: Arc<dyn Archive<V>>,
  counts: BundleCounts,
  /// Dependencies this bundle's open holds a dependent count on.
  dependencies: Vec<String>,
}

impl<V: Send + Sync + 'static> BundleEntry<V> {
  fn new(archive: Arc<dyn Archive<V>>, as_dependency: bool, dependencies: Vec<String>) -> Self {
    Self {
      archive,
      counts: BundleCounts {
        direct: 0,
        dependents: as_dependency as usize,
      },
      dependencies,
    }
  }
}

struct BundleState<V> {
  bundles: HashMap<String, BundleEntry<V>>,
  opening: HashMap<String, Arc<Pending<ArchiveError>>>,
  loading: HashMap<BundlePath, Arc<Pending>>,
}

fn opening<V>(state: &mut BundleState<V>) -> &mut HashMap<String, Arc<Pending<ArchiveError>>> {
  &mut state.opening
}

fn loading<V>(state: &mut BundleState<V>) -> &mut HashMap<BundlePath, Arc<Pending>> {
  &mut state.loading
}

type OpenClaim<V> = Claim<BundleState<V>, String, ArchiveError>;

enum Begin<V> {
  Ready,
  Wait(Arc<Pending<ArchiveError>>),
  Claimed(OpenClaim<V>),
}

/// Opens bundles with their dependencies and loads assets out of them.
///
/// Cloning yields another handle to the same loader.
pub struct BundleLoader<V> {
  state: Arc<Mutex<BundleState<V>>>,
  store: Arc<dyn ArchiveStore<V>>,
  manifest: Arc<dyn DependencyManifest>,
  root: PathBuf,
  metrics: Arc<Metrics>,
}

impl<V> Clone for BundleLoader<V> {
  fn clone(&self) -> Self {
    Self {
      state: self.state.clone(),
      store: self.store.clone(),
      manifest: self.manifest.clone(),
      root: self.root.clone(),
      metrics: self.metrics.clone(),
    }
  }
}

impl<V> fmt::Debug for BundleLoader<V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = self.state.lock();
    f.debug_struct("BundleLoader")
      .field("root", &self.root)
      .field("open", &state.bundles.len())
      .field("opening", &state.opening.len())
      .field("loading", &state.loading.len())
      .finish()
  }
}

impl<V: Send + Sync + 'static> BundleLoader<V> {
  /// Creates a loader that opens bundle `id` at `root.join(id)`.
  pub fn new<S, M>(store: S, manifest: M, root: impl Into<PathBuf>) -> Self
  where
    S: ArchiveStore<V>,
    M: DependencyManifest,
  {
    Self::with_metrics(Arc::new(store), Arc::new(manifest), root.into(), Arc::new(Metrics::new()))
  }

  pub(crate) fn with_metrics(
    store: Arc<dyn ArchiveStore<V>>,
    manifest: Arc<dyn DependencyManifest>,
    root: PathBuf,
    metrics: Arc<Metrics>,
  ) -> Self {
    Self {
      state: Arc::new(Mutex::new(BundleState {
        bundles: HashMap::new(),
        opening: HashMap::new(),
        loading: HashMap::new(),
      })),
      store,
      manifest,
      root,
      metrics,
    }
  }

  /// The full path the archive store is asked to open for `id`.
  pub fn path_of(&self, id: &str) -> PathBuf {
    self.root.join(id)
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  fn archive_of(&self, id: &str) -> Option<Arc<dyn Archive<V>>> {
    self.state.lock().bundles.get(id).map(|e| e.archive.clone())
  }

  // --- Opening (sync) ---

  /// Opens `id` and its dependencies, blocking.
  ///
  /// An open already in flight asynchronously is superseded: this call opens
  /// and registers the archive itself, and the async open is orphaned.
  pub fn open_bundle(&self, id: &str) -> Result<(), BundleError> {
    let Some(archive) = self.open_one_sync(id, false)? else {
      return Ok(());
    };
    let mut acquired = Vec::new();
    for dep in self.manifest.dependencies_of(id) {
      if dep == id {
        continue;
      }
      match self.open_one_sync(&dep, true) {
        Ok(_) => acquired.push(dep),
        Err(e) => warn!(bundle = id, dependency = %dep, error = %e, "failed to open bundle dependency"),
      }
    }
    self.record_dependencies(id, &archive, acquired);
    Ok(())
  }

  /// Hands the acquired dependencies to the entry this open registered. If
  /// that entry is already gone, the holds are given back.
  fn record_dependencies(&self, id: &str, archive: &Arc<dyn Archive<V>>, acquired: Vec<String>) {
    let orphaned = {
      let mut state = self.state.lock();
      match state.bundles.get_mut(id) {
        Some(entry) if Arc::ptr_eq(&entry.archive, archive) => {
          entry.dependencies = acquired;
          return;
        }
        _ => acquired,
      }
    };
    for dep in orphaned {
      self.release_dependency(&dep);
    }
  }

  /// Returns the archive if this call opened it.
  fn open_one_sync(&self, id: &str, as_dependency: bool) -> Result<Option<Arc<dyn Archive<V>>>, BundleError> {
    let superseded = {
      let mut state = self.state.lock();
      if let Some(entry) = state.bundles.get_mut(id) {
        if as_dependency {
          entry.counts.dependents += 1;
        }
        return Ok(None);
      }
      state.opening.remove(id)
    };
    if superseded.is_some() {
      debug!(bundle = id, "synchronous open supersedes an in-flight open");
    }

    let archive = match self.store.open(&self.path_of(id)) {
      Ok(archive) => archive,
      Err(source) => {
        self.metrics.bundle_open_failures.fetch_add(1, Ordering::Relaxed);
        warn!(bundle = id, error = %source, "failed to open bundle");
        return Err(BundleError::OpenFailed {
          bundle: id.to_owned(),
          source,
        });
      }
    };

    let raced = {
      let mut state = self.state.lock();
      match state.bundles.get_mut(id) {
        Some(entry) => {
          if as_dependency {
            entry.counts.dependents += 1;
          }
          true
        }
        None => {
          state
            .bundles
            .insert(id.to_owned(), BundleEntry::new(archive.clone(), as_dependency, Vec::new()));
          false
        }
      }
    };

    if let Some(pending) = superseded {
      pending.complete();
    }
    if raced {
      archive.unload();
      return Ok(None);
    }
    self.metrics.bundles_opened.fetch_add(1, Ordering::Relaxed);
    debug!(bundle = id, as_dependency, "opened bundle");
    Ok(Some(archive))
  }

  // --- Opening (async) ---

  /// Opens `id` and its dependencies without blocking.
  ///
  /// Concurrent opens of one bundle share a single archive read. Only the
  /// call that performs the read acquires the dependencies.
  pub fn open_bundle_async(&self, id: &str) -> BoxFuture<'static, Result<(), BundleError>> {
    let this = self.clone();
    let id = id.to_owned();
    async move { this.open_root(&id).await }.boxed()
  }

  fn begin_open(&self, id: &str, as_dependency: bool) -> Begin<V> {
    let mut state = self.state.lock();
    if let Some(entry) = state.bundles.get_mut(id) {
      if as_dependency {
        entry.counts.dependents += 1;
      }
      return Begin::Ready;
    }
    if let Some(pending) = state.opening.get(id).cloned() {
      return Begin::Wait(pending);
    }
    Begin::Claimed(Claim::register(&self.state, &mut *state, opening, id.to_owned()))
  }

  /// Suspends until the open in flight for `id` settles, following any open
  /// that replaced it, then applies the dependency increment on success.
  async fn wait_for_open(
    &self,
    id: &str,
    mut pending: Arc<Pending<ArchiveError>>,
    as_dependency: bool,
  ) -> Result<(), BundleError> {
    loop {
      (&*pending).await;
      let next = {
        let mut state = self.state.lock();
        if let Some(entry) = state.bundles.get_mut(id) {
          if as_dependency {
            entry.counts.dependents += 1;
          }
          return Ok(());
        }
        state.opening.get(id).cloned()
      };
      match next {
        Some(next) if !Arc::ptr_eq(&next, &pending) => pending = next,
        _ => {
          return Err(match pending.failure() {
            Some(source) => BundleError::OpenFailed {
              bundle: id.to_owned(),
              source,
            },
            None => BundleError::Unloaded { bundle: id.to_owned() },
          });
        }
      }
    }
  }

  /// Reads the archive for a claimed open. A failure is recorded on the claim
  /// so every waiter reports it too.
  async fn read_archive(&self, id: &str, claim: &OpenClaim<V>) -> Result<Arc<dyn Archive<V>>, BundleError> {
    match self.store.open_async(self.path_of(id)).await {
      Ok(archive) => Ok(archive),
      Err(source) => {
        self.metrics.bundle_open_failures.fetch_add(1, Ordering::Relaxed);
        warn!(bundle = id, error = %source, "failed to open bundle");
        claim.fail(source.clone());
        Err(BundleError::OpenFailed {
          bundle: id.to_owned(),
          source,
        })
      }
    }
  }

  async fn open_root(&self, id: &str) -> Result<(), BundleError> {
    let claim = match self.begin_open(id, false) {
      Begin::Ready => return Ok(()),
      Begin::Wait(pending) => return self.wait_for_open(id, pending, false).await,
      Begin::Claimed(claim) => claim,
    };

    let archive = self.read_archive(id, &claim).await?;

    // Dependencies are acquired before the root is registered, so an unload
    // of the root while they open orphans the whole open.
    let mut acquired = Vec::new();
    for dep in self.manifest.dependencies_of(id) {
      if dep == id {
        continue;
      }
      match self.open_dependency(&dep).await {
        Ok(()) => acquired.push(dep),
        Err(e) => warn!(bundle = id, dependency = %dep, error = %e, "failed to open bundle dependency"),
      }
    }

    self.finish_open(id, claim, archive, false, acquired)
  }

  async fn open_dependency(&self, id: &str) -> Result<(), BundleError> {
    let claim = match self.begin_open(id, true) {
      Begin::Ready => return Ok(()),
      Begin::Wait(pending) => return self.wait_for_open(id, pending, true).await,
      Begin::Claimed(claim) => claim,
    };
    let archive = self.read_archive(id, &claim).await?;
    self.finish_open(id, claim, archive, true, Vec::new())
  }

  /// Registers a finished open, or orphans it if it was unloaded or
  /// superseded in the meantime.
  fn finish_open(
    &self,
    id: &str,
    claim: OpenClaim<V>,
    archive: Arc<dyn Archive<V>>,
    as_dependency: bool,
    acquired: Vec<String>,
  ) -> Result<(), BundleError> {
    let orphan = {
      let mut state = self.state.lock();
      let current = claim.withdraw(&mut *state);
      if current && !state.bundles.contains_key(id) {
        state
          .bundles
          .insert(id.to_owned(), BundleEntry::new(archive, as_dependency, acquired));
        None
      } else {
        let registered = match state.bundles.get_mut(id) {
          Some(entry) => {
            if as_dependency {
              entry.counts.dependents += 1;
            }
            true
          }
          None => false,
        };
        Some((archive, acquired, registered))
      }
    };
    drop(claim);

    let Some((archive, acquired, registered)) = orphan else {
      self.metrics.bundles_opened.fetch_add(1, Ordering::Relaxed);
      debug!(bundle = id, as_dependency, "opened bundle");
      return Ok(());
    };

    debug!(bundle = id, "discarding orphaned bundle open");
    archive.unload();
    for dep in acquired {
      self.release_dependency(&dep);
    }
    if registered {
      Ok(())
    } else {
      Err(BundleError::Unloaded { bundle: id.to_owned() })
    }
  }

  // --- Assets ---

  /// Loads `asset` from `bundle`, opening the bundle first if needed.
  pub fn load_asset(&self, bundle: &str, asset: &str) -> Result<Arc<V>, BundleError> {
    let archive = match self.archive_of(bundle) {
      Some(archive) => archive,
      None => {
        self.open_bundle(bundle)?;
        self.archive_of(bundle).ok_or_else(|| BundleError::Unloaded {
          bundle: bundle.to_owned(),
        })?
      }
    };
    archive.load_asset(asset).ok_or_else(|| asset_not_found(bundle, asset))
  }

  /// Loads `asset` from `bundle` without blocking.
  ///
  /// A concurrent load of the same asset waits for the first one and then
  /// re-fetches from the warm archive.
  pub fn load_asset_async(&self, bundle: &str, asset: &str) -> BoxFuture<'static, Result<Arc<V>, BundleError>> {
    self
      .clone()
      .load_asset_owned(BundlePath::new(bundle, asset))
      .boxed()
  }

  async fn load_asset_owned(self, key: BundlePath) -> Result<Arc<V>, BundleError> {
    let archive = match self.archive_of(&key.bundle) {
      Some(archive) => archive,
      None => {
        self.open_root(&key.bundle).await?;
        self.archive_of(&key.bundle).ok_or_else(|| BundleError::Unloaded {
          bundle: key.bundle.clone(),
        })?
      }
    };

    let begin = {
      let mut state = self.state.lock();
      match state.loading.get(&key).cloned() {
        Some(pending) => Err(pending),
        None => Ok(Claim::register(&self.state, &mut *state, loading, key.clone())),
      }
    };

    let value = match begin {
      Err(pending) => {
        (&*pending).await;
        archive.load_asset(&key.asset)
      }
      Ok(claim) => {
        let value = archive.load_asset_async(&key.asset).await;
        drop(claim);
        value
      }
    };
    value.ok_or_else(|| asset_not_found(&key.bundle, &key.asset))
  }

  // --- Counting ---

  /// Adds a direct reference. No-op if `id` is not open.
  pub fn reference_bundle(&self, id: &str) {
    if let Some(entry) = self.state.lock().bundles.get_mut(id) {
      entry.counts.direct += 1;
    }
  }

  /// Removes a direct reference. No-op if `id` is not open.
  pub fn unreference_bundle(&self, id: &str) {
    let underflow = match self.state.lock().bundles.get_mut(id) {
      Some(entry) => match entry.counts.direct.checked_sub(1) {
        Some(direct) => {
          entry.counts.direct = direct;
          false
        }
        None => true,
      },
      None => false,
    };
    if underflow {
      warn!(bundle = id, "bundle reference count underflow");
    }
  }

  fn release_dependency(&self, id: &str) {
    let released = {
      let mut state = self.state.lock();
      let Some(entry) = state.bundles.get_mut(id) else {
        return;
      };
      if entry.counts.dependents == 0 {
        warn!(bundle = id, "bundle dependent count underflow");
      }
      entry.counts.dependents = entry.counts.dependents.saturating_sub(1);
      if entry.counts == BundleCounts::default() {
        state.bundles.remove(id).map(|e| e.archive)
      } else {
        None
      }
    };
    if let Some(archive) = released {
      archive.unload();
      self.metrics.bundles_unloaded.fetch_add(1, Ordering::Relaxed);
      debug!(bundle = id, "unloaded dependency bundle");
    }
  }

  // --- Unloading ---

  /// Unloads `id` if nothing keeps it open.
  ///
  /// An open still in flight is cancelled instead, and `true` is returned.
  /// With `unload_dependencies`, every dependency this bundle's open acquired
  /// loses one dependent and is unloaded once nothing keeps it open either.
  pub fn unload_bundle(&self, id: &str, unload_dependencies: bool) -> bool {
    let entry = {
      let mut state = self.state.lock();
      if state.opening.remove(id).is_some() {
        debug!(bundle = id, "cancelled in-flight bundle open");
        return true;
      }
      match state.bundles.get(id) {
        None => return false,
        Some(entry) if entry.counts != BundleCounts::default() => return false,
        Some(_) => {}
      }
      match state.bundles.remove(id) {
        Some(entry) => entry,
        None => return false,
      }
    };

    entry.archive.unload();
    self.metrics.bundles_unloaded.fetch_add(1, Ordering::Relaxed);
    debug!(bundle = id, "unloaded bundle");

    if unload_dependencies {
      for dep in &entry.dependencies {
        self.release_dependency(dep);
      }
    }
    true
  }

  // --- Queries ---

  /// True if `id` is open and has at least one direct reference.
  pub fn has_reference(&self, id: &str) -> bool {
    self.state.lock().bundles.get(id).is_some_and(|e| e.counts.direct > 0)
  }

  pub fn is_loading(&self, id: &str) -> bool {
    self.state.lock().opening.contains_key(id)
  }

  pub fn is_open(&self, id: &str) -> bool {
    self.state.lock().bundles.contains_key(id)
  }

  pub fn counts(&self, id: &str) -> Option<BundleCounts> {
    self.state.lock().bundles.get(id).map(|e| e.counts)
  }

  pub fn open_count(&self) -> usize {
    self.state.lock().bundles.len()
  }

  /// A human-readable listing of open and in-flight bundles.
  pub fn dump(&self) -> String {
    let state = self.state.lock();
    let mut open: Vec<(&String, &BundleEntry<V>)> = state.bundles.iter().collect();
    open.sort_by(|a, b| a.0.cmp(b.0));
    let mut opening: Vec<&String> = state.opening.keys().collect();
    opening.sort();

    let mut out = String::new();
    let _ = writeln!(out, "bundles: {} open, {} opening", open.len(), opening.len());
    for (id, entry) in open {
      let _ = writeln!(
        out,
        "  {} direct={} dependents={}",
        id, entry.counts.direct, entry.counts.dependents
      );
    }
    for id in opening {
      let _ = writeln!(out, "  {} (opening)", id);
    }
    out
  }
}

fn asset_not_found(bundle: &str, asset: &str) -> BundleError {
  warn!(bundle, asset, "asset not found in bundle");
  BundleError::AssetNotFound {
    bundle: bundle.to_owned(),
    asset: asset.to_owned(),
  }
}
