//! This module contains the long-running tasks of the cache: the dispatcher
//! that drains the request queue and the janitor that sweeps unreferenced
//! assets once per frame.

pub(crate) mod dispatcher;
pub(crate) mod janitor;

use crate::runtime::TaskSpawner;

use std::future::Future;

use futures_util::future::{AbortHandle, Abortable};
use futures_util::FutureExt;

/// A spawned, stoppable background loop.
pub(crate) struct Driver {
  abort: AbortHandle,
}

impl Driver {
  pub(crate) fn spawn<F>(spawner: &dyn TaskSpawner, future: F) -> Self
  where
    F: Future<Output = ()> + Send + 'static,
  {
    let (abort, registration) = AbortHandle::new_pair();
    spawner.spawn(Box::pin(Abortable::new(future, registration).map(|_| ())));
    Self { abort }
  }

  /// Signals the loop to stop. It is dropped the next time its executor
  /// polls it.
  pub(crate) fn stop(self) {
    self.abort.abort();
  }
}
