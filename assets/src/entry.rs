use crate::bundle::BundlePath;

use std::fmt;
use std::sync::Arc;

/// The identity of a loaded value: the address of its shared allocation.
///
/// Two `Arc`s compare equal here exactly when they point at the same content
/// object, which is how the cache recognises a value handed back to it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetId(usize);

impl AssetId {
  #[inline]
  pub fn of<V>(value: &Arc<V>) -> Self {
    AssetId(Arc::as_ptr(value) as *const () as usize)
  }
}

impl fmt::Debug for AssetId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "AssetId({:#x})", self.0)
  }
}

/// Bookkeeping for one loaded asset.
pub(crate) struct AssetEntry<V> {
  value: Arc<V>,
  path: String,
  reference_count: usize,
  frames_unreferenced: u32,
  pub(crate) auto_evict: bool,
  pub(crate) evict_after_frames: u32,
  origin: Option<BundlePath>,
}

impl<V> AssetEntry<V> {
  pub(crate) fn new(path: String, value: Arc<V>, origin: Option<BundlePath>, evict_after_frames: u32) -> Self {
    Self {
      value,
      path,
      reference_count: 0,
      frames_unreferenced: 0,
      auto_evict: true,
      evict_after_frames,
      origin,
    }
  }

  #[inline]
  pub(crate) fn id(&self) -> AssetId {
    AssetId::of(&self.value)
  }

  #[inline]
  pub(crate) fn value(&self) -> Arc<V> {
    self.value.clone()
  }

  #[inline]
  pub(crate) fn path(&self) -> &str {
    &self.path
  }

  /// The bundle this asset was loaded from, if any.
  #[inline]
  pub(crate) fn bundle(&self) -> Option<&str> {
    self.origin.as_ref().map(|o| o.bundle.as_str())
  }

  #[inline]
  pub(crate) fn reference_count(&self) -> usize {
    self.reference_count
  }

  #[inline]
  pub(crate) fn frames_unreferenced(&self) -> u32 {
    self.frames_unreferenced
  }

  pub(crate) fn reference(&mut self) {
    self.reference_count += 1;
    self.frames_unreferenced = 0;
  }

  /// Returns false, leaving the count at zero, on underflow.
  pub(crate) fn unreference(&mut self) -> bool {
    match self.reference_count.checked_sub(1) {
      Some(count) => {
        self.reference_count = count;
        true
      }
      None => false,
    }
  }

  pub(crate) fn should_evict(&self, immediate: bool) -> bool {
    self.auto_evict && (immediate || self.frames_unreferenced >= self.evict_after_frames)
  }

  pub(crate) fn age(&mut self) {
    self.frames_unreferenced = self.frames_unreferenced.saturating_add(1);
  }
}
