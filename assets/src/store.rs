use crate::bundle::BundlePath;
use crate::entry::{AssetEntry, AssetId};

use std::fmt::Write as _;
use std::sync::Arc;

use ahash::{AHashMap, AHashSet};

/// How a freshly resolved value is counted when it enters the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
  /// Take one reference, whether or not the entry already existed.
  Hold,
  /// Take one reference only if this call created the entry.
  HoldIfNew,
  /// Memoize without taking a reference.
  Track,
}

/// Result of a reference decrement.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Decrement {
  /// The count went down; carries the entry's origin bundle.
  Released(Option<String>),
  /// The count was already zero and stays there.
  Underflow,
}

/// What one sweep removed and what the caller must follow up on.
pub(crate) struct SweepOutcome<V> {
  pub(crate) evicted: Vec<(String, Arc<V>)>,
  /// Distinct origin bundles of the evicted entries, in eviction order.
  pub(crate) bundles: Vec<String>,
  /// The loose-eviction counter reached the threshold and was reset.
  pub(crate) reclaim: bool,
}

/// The two lookup tables of the cache plus the always-keep set.
///
/// Every entry is reachable both by its path and by the identity of its
/// value; the tables are only ever changed together.
pub(crate) struct AssetStore<V> {
  by_id: AHashMap<AssetId, AssetEntry<V>>,
  by_path: AHashMap<String, AssetId>,
  keep: AHashSet<String>,
  loose_evicted: usize,
}

impl<V> Default for AssetStore<V> {
  fn default() -> Self {
    Self {
      by_id: AHashMap::new(),
      by_path: AHashMap::new(),
      keep: AHashSet::new(),
      loose_evicted: 0,
    }
  }
}

impl<V> AssetStore<V> {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  pub(crate) fn len(&self) -> usize {
    self.by_id.len()
  }

  pub(crate) fn get(&self, path: &str) -> Option<Arc<V>> {
    self.by_path.get(path).and_then(|id| self.by_id.get(id)).map(AssetEntry::value)
  }

  pub(crate) fn entry(&self, id: AssetId) -> Option<&AssetEntry<V>> {
    self.by_id.get(&id)
  }

  fn entry_by_path_mut(&mut self, path: &str) -> Option<&mut AssetEntry<V>> {
    let id = self.by_path.get(path)?;
    self.by_id.get_mut(id)
  }

  /// Records a resolved value under `path` and returns the canonical value.
  ///
  /// If the path is already known its existing value wins. If the value is
  /// already known under another path, that entry is reused so two paths
  /// never alias one content object with two entries.
  pub(crate) fn admit(
    &mut self,
    path: &str,
    value: Arc<V>,
    origin: Option<BundlePath>,
    evict_after_frames: u32,
    admission: Admission,
  ) -> Arc<V> {
    let existing = self.by_path.get(path).copied().or_else(|| {
      let id = AssetId::of(&value);
      self.by_id.contains_key(&id).then_some(id)
    });

    if let Some(id) = existing {
      if let Some(entry) = self.by_id.get_mut(&id) {
        if admission == Admission::Hold {
          entry.reference();
        }
        return entry.value();
      }
    }

    let mut entry = AssetEntry::new(path.to_owned(), value, origin, evict_after_frames);
    if self.keep.contains(path) {
      entry.auto_evict = false;
    }
    if admission != Admission::Track {
      entry.reference();
    }
    let id = entry.id();
    let value = entry.value();
    self.by_path.insert(path.to_owned(), id);
    self.by_id.insert(id, entry);
    value
  }

  /// Adds one reference. Returns `None` for unmanaged values, otherwise the
  /// entry's origin bundle.
  pub(crate) fn increment(&mut self, id: AssetId) -> Option<Option<String>> {
    let entry = self.by_id.get_mut(&id)?;
    entry.reference();
    Some(entry.bundle().map(str::to_owned))
  }

  /// Removes one reference. Returns `None` for unmanaged values.
  pub(crate) fn decrement(&mut self, id: AssetId) -> Option<Decrement> {
    let entry = self.by_id.get_mut(&id)?;
    if entry.unreference() {
      Some(Decrement::Released(entry.bundle().map(str::to_owned)))
    } else {
      Some(Decrement::Underflow)
    }
  }

  pub(crate) fn set_auto_evict(&mut self, path: &str, enabled: bool) {
    if let Some(entry) = self.entry_by_path_mut(path) {
      entry.auto_evict = enabled;
    }
    if enabled {
      self.keep.remove(path);
    } else {
      self.keep.insert(path.to_owned());
    }
  }

  /// The value variant only acts on managed values. Returns whether it did.
  pub(crate) fn set_auto_evict_by_id(&mut self, id: AssetId, enabled: bool) -> bool {
    let path = match self.by_id.get(&id) {
      Some(entry) => entry.path().to_owned(),
      None => return false,
    };
    self.set_auto_evict(&path, enabled);
    true
  }

  pub(crate) fn is_always_kept(&self, path: &str) -> bool {
    self.keep.contains(path)
  }

  pub(crate) fn set_evict_after_frames(&mut self, path: &str, frames: u32) -> bool {
    match self.entry_by_path_mut(path) {
      Some(entry) => {
        entry.evict_after_frames = frames;
        true
      }
      None => false,
    }
  }

  /// Ages or evicts every unreferenced entry.
  pub(crate) fn sweep(&mut self, immediate: bool, reclaim_threshold: usize) -> SweepOutcome<V> {
    let mut marked = Vec::new();
    for (id, entry) in self.by_id.iter_mut() {
      if entry.reference_count() > 0 {
        continue;
      }
      if !entry.auto_evict || self.keep.contains(entry.path()) {
        continue;
      }
      if entry.should_evict(immediate) {
        marked.push(*id);
      } else {
        entry.age();
      }
    }

    let mut outcome = SweepOutcome {
      evicted: Vec::with_capacity(marked.len()),
      bundles: Vec::new(),
      reclaim: false,
    };
    let mut staged = AHashSet::new();

    for id in marked {
      let Some(entry) = self.by_id.remove(&id) else {
        continue;
      };
      self.by_path.remove(entry.path());

      match entry.bundle() {
        Some(bundle) => {
          if staged.insert(bundle.to_owned()) {
            outcome.bundles.push(bundle.to_owned());
          }
        }
        None => self.loose_evicted += 1,
      }
      outcome.evicted.push((entry.path().to_owned(), entry.value()));
    }

    if self.loose_evicted >= reclaim_threshold {
      self.loose_evicted = 0;
      outcome.reclaim = true;
    }
    outcome
  }

  /// One line per entry, sorted by path.
  pub(crate) fn dump(&self) -> String {
    let mut entries: Vec<&AssetEntry<V>> = self.by_id.values().collect();
    entries.sort_by(|a, b| a.path().cmp(b.path()));

    let mut out = String::new();
    let _ = writeln!(out, "assets: {}", entries.len());
    for entry in entries {
      let _ = write!(
        out,
        "  {} refs={} idle={}",
        entry.path(),
        entry.reference_count(),
        entry.frames_unreferenced()
      );
      if let Some(bundle) = entry.bundle() {
        let _ = write!(out, " bundle={}", bundle);
      }
      if !entry.auto_evict || self.keep.contains(entry.path()) {
        out.push_str(" kept");
      }
      out.push('\n');
    }
    out
  }
}
