use crate::pending::{Claim, Pending};

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::{self, BoxFuture};
use futures_util::FutureExt;
use parking_lot::Mutex;

/// Raw content loading from a flat path namespace.
///
/// A source hands out shared values; loading a path that is already loaded
/// again is expected to return the same content.
pub trait ByteSource<V: Send + Sync + 'static>: Send + Sync + 'static {
  fn load(&self, path: &str) -> Option<Arc<V>>;

  fn load_async(&self, path: &str) -> BoxFuture<'static, Option<Arc<V>>> {
    Box::pin(future::ready(self.load(path)))
  }

  /// Frees whatever the source still holds that nobody uses any more. The
  /// cache calls this after enough loose assets were evicted.
  fn reclaim_unused(&self) {}
}

impl<V, S> ByteSource<V> for Arc<S>
where
  V: Send + Sync + 'static,
  S: ByteSource<V> + ?Sized,
{
  fn load(&self, path: &str) -> Option<Arc<V>> {
    (**self).load(path)
  }

  fn load_async(&self, path: &str) -> BoxFuture<'static, Option<Arc<V>>> {
    (**self).load_async(path)
  }

  fn reclaim_unused(&self) {
    (**self).reclaim_unused()
  }
}

#[derive(Default)]
struct SourceState {
  loading: HashMap<String, Arc<Pending>>,
}

fn loading(state: &mut SourceState) -> &mut HashMap<String, Arc<Pending>> {
  &mut state.loading
}

/// A byte source that deduplicates concurrent async loads of one path.
pub(crate) struct SourceLoader<V> {
  source: Arc<dyn ByteSource<V>>,
  state: Arc<Mutex<SourceState>>,
}

impl<V> Clone for SourceLoader<V> {
  fn clone(&self) -> Self {
    Self {
      source: self.source.clone(),
      state: self.state.clone(),
    }
  }
}

impl<V: Send + Sync + 'static> SourceLoader<V> {
  pub(crate) fn new(source: Arc<dyn ByteSource<V>>) -> Self {
    Self {
      source,
      state: Arc::new(Mutex::new(SourceState::default())),
    }
  }

  pub(crate) fn load(&self, path: &str) -> Option<Arc<V>> {
    self.source.load(path)
  }

  /// The first caller for a path performs the async load. Later callers wait
  /// for it and then re-fetch synchronously.
  pub(crate) fn load_async(&self, path: &str) -> BoxFuture<'static, Option<Arc<V>>> {
    let begin = {
      let mut state = self.state.lock();
      match state.loading.get(path).cloned() {
        Some(pending) => Err(pending),
        None => Ok(Claim::register(&self.state, &mut *state, loading, path.to_owned())),
      }
    };

    let source = self.source.clone();
    let path = path.to_owned();
    match begin {
      Err(pending) => async move {
        (&*pending).await;
        source.load(&path)
      }
      .boxed(),
      Ok(claim) => {
        let load = source.load_async(&path);
        async move {
          let value = load.await;
          drop(claim);
          value
        }
        .boxed()
      }
    }
  }

  pub(crate) fn reclaim_unused(&self) {
    self.source.reclaim_unused();
  }
}
