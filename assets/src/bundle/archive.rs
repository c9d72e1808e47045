use crate::error::ArchiveError;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::future::{self, BoxFuture};

/// An open archive.
///
/// Fetching an asset that was already loaded from this archive is expected to
/// be cheap and to return the same content.
pub trait Archive<V: Send + Sync + 'static>: Send + Sync {
  fn load_asset(&self, name: &str) -> Option<Arc<V>>;

  fn load_asset_async(&self, name: &str) -> BoxFuture<'static, Option<Arc<V>>> {
    Box::pin(future::ready(self.load_asset(name)))
  }

  /// Releases the archive and everything loaded from it. Called exactly once
  /// per successfully opened archive.
  fn unload(&self);
}

/// Opens archives by their full path.
pub trait ArchiveStore<V: Send + Sync + 'static>: Send + Sync + 'static {
  fn open(&self, path: &Path) -> Result<Arc<dyn Archive<V>>, ArchiveError>;

  fn open_async(&self, path: PathBuf) -> BoxFuture<'static, Result<Arc<dyn Archive<V>>, ArchiveError>> {
    Box::pin(future::ready(self.open(&path)))
  }
}

impl<V, S> ArchiveStore<V> for Arc<S>
where
  V: Send + Sync + 'static,
  S: ArchiveStore<V> + ?Sized,
{
  fn open(&self, path: &Path) -> Result<Arc<dyn Archive<V>>, ArchiveError> {
    (**self).open(path)
  }

  fn open_async(&self, path: PathBuf) -> BoxFuture<'static, Result<Arc<dyn Archive<V>>, ArchiveError>> {
    (**self).open_async(path)
  }
}
