use crate::frame::FrameClock;
use crate::shared::CacheShared;

use std::sync::{Arc, Weak};

use tracing::trace;

/// Drains the request queue, one request at a time, under the cache's
/// current strategy. Idles a frame whenever the queue is empty.
pub(crate) async fn run<V>(cache: Weak<CacheShared<V>>, clock: Arc<FrameClock>)
where
  V: Send + Sync + 'static,
{
  loop {
    let next = match cache.upgrade() {
      Some(shared) => shared.queue.pop().map(|request| (shared, request)),
      None => return,
    };
    let Some((shared, request)) = next else {
      clock.next_frame().await;
      continue;
    };

    if request.is_done() || request.is_cancelled() {
      trace!(tasks = request.task_count(), "skipping settled request");
      continue;
    }
    let strategy = shared.strategy();
    strategy.drive(&shared, &request, &clock).await;
  }
}
