use crate::frame::FrameClock;
use crate::request::Request;
use crate::shared::CacheShared;

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How the loading driver executes a dequeued request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(rename_all = "snake_case"))]
pub enum LoadStrategy {
  /// Loads every task blocking, then completes the request. One request per
  /// frame.
  Synchronous,
  /// Starts every task at once and completes the request when all are done
  /// or it is cancelled.
  #[default]
  Batch,
  /// Loads one task at a time. A cancelled request starts no further task.
  Sequential,
}

impl fmt::Display for LoadStrategy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      LoadStrategy::Synchronous => write!(f, "synchronous"),
      LoadStrategy::Batch => write!(f, "batch"),
      LoadStrategy::Sequential => write!(f, "sequential"),
    }
  }
}

impl LoadStrategy {
  /// Runs `request` to completion under this strategy, including the
  /// completion hook.
  pub(crate) async fn drive<V>(self, shared: &Arc<CacheShared<V>>, request: &Arc<Request<V>>, clock: &FrameClock)
  where
    V: Send + Sync + 'static,
  {
    match self {
      LoadStrategy::Synchronous => {
        for (index, path) in request.pending_tasks() {
          shared.run_task(request, index, &path);
        }
        shared.finish_request(request);
        clock.next_frame().await;
      }
      LoadStrategy::Batch => {
        for (index, path) in request.pending_tasks() {
          shared.spawn_task(request.clone(), index, path);
        }
        clock
          .wait_until(|| request.is_done() || request.is_cancelled())
          .await;
        shared.finish_request(request);
      }
      LoadStrategy::Sequential => {
        for (index, path) in request.pending_tasks() {
          if request.is_cancelled() {
            break;
          }
          shared.clone().run_task_async(request.clone(), index, path).await;
          if request.is_cancelled() {
            break;
          }
        }
        shared.finish_request(request);
      }
    }
  }
}

/// The FIFO of submitted requests.
pub(crate) struct LoadingQueue<V> {
  requests: Mutex<VecDeque<Arc<Request<V>>>>,
}

impl<V> LoadingQueue<V> {
  pub(crate) fn new() -> Self {
    Self {
      requests: Mutex::new(VecDeque::new()),
    }
  }

  pub(crate) fn push(&self, request: Arc<Request<V>>) {
    self.requests.lock().push_back(request);
  }

  pub(crate) fn pop(&self) -> Option<Arc<Request<V>>> {
    self.requests.lock().pop_front()
  }

  pub(crate) fn len(&self) -> usize {
    self.requests.lock().len()
  }
}
