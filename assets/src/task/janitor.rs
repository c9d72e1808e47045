use crate::frame::FrameClock;
use crate::shared::CacheShared;

use std::sync::{Arc, Weak};

/// Sweeps the cache once per frame until the cache is dropped.
pub(crate) async fn run<V>(cache: Weak<CacheShared<V>>, clock: Arc<FrameClock>)
where
  V: Send + Sync + 'static,
{
  loop {
    match cache.upgrade() {
      Some(shared) => {
        shared.sweep(false);
      }
      None => return,
    }
    clock.next_frame().await;
  }
}
