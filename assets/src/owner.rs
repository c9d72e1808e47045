use crate::entry::AssetId;
use crate::handles::AssetCache;
use crate::request::Request;

use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;
use tracing::warn;

/// A scope guard over cache references.
///
/// Every value attached to an owner holds one reference in the cache for as
/// long as the owner lives. Dropping the owner (or calling
/// [`AssetOwner::release`]) gives all of them back.
pub struct AssetOwner<V: Send + Sync + 'static> {
  cache: AssetCache<V>,
  held: AHashMap<AssetId, Arc<V>>,
}

impl<V: Send + Sync + 'static> fmt::Debug for AssetOwner<V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("AssetOwner")
      .field("held", &self.held.keys().collect::<Vec<_>>())
      .finish()
  }
}

impl<V: Send + Sync + 'static> AssetOwner<V> {
  pub(crate) fn new(cache: AssetCache<V>) -> Self {
    Self {
      cache,
      held: AHashMap::new(),
    }
  }

  /// Takes one reference on `value` for the lifetime of this owner.
  ///
  /// Attaching a value twice holds it once. Values the cache does not manage
  /// are refused.
  pub fn attach(&mut self, value: &Arc<V>) -> bool {
    let id = AssetId::of(value);
    if self.held.contains_key(&id) {
      return true;
    }
    if !self.cache.is_managed(value) {
      warn!(asset = ?id, "refusing to attach an unmanaged asset to an owner");
      return false;
    }
    if !self.cache.reference(value) {
      return false;
    }
    self.held.insert(id, value.clone());
    true
  }

  /// Attaches every result of a finished request. Returns how many values are
  /// now held on its behalf.
  pub fn attach_request(&mut self, request: &Request<V>) -> usize {
    request
      .results()
      .iter()
      .filter(|value| self.attach(value))
      .count()
  }

  /// Gives back the reference held on `value`. Returns false if it was not
  /// attached.
  pub fn detach(&mut self, value: &Arc<V>) -> bool {
    match self.held.remove(&AssetId::of(value)) {
      Some(value) => {
        self.cache.unreference(&value);
        true
      }
      None => false,
    }
  }

  /// Gives back every held reference. The owner stays usable.
  pub fn release(&mut self) {
    for (_, value) in self.held.drain() {
      self.cache.unreference(&value);
    }
  }

  pub fn holds(&self, value: &Arc<V>) -> bool {
    self.held.contains_key(&AssetId::of(value))
  }

  pub fn len(&self) -> usize {
    self.held.len()
  }

  pub fn is_empty(&self) -> bool {
    self.held.is_empty()
  }
}

impl<V: Send + Sync + 'static> Drop for AssetOwner<V> {
  fn drop(&mut self) {
    self.release();
  }
}
