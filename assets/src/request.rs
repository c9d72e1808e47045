use crate::error::RequestError;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::Mutex;
use tracing::error;

type Callback<V> = Box<dyn FnOnce(&Request<V>) + Send>;

/// One asset to load as part of a [`Request`].
pub struct Task<V> {
  tag: String,
  path: String,
  result: Option<Arc<V>>,
  done: bool,
}

impl<V> Clone for Task<V> {
  fn clone(&self) -> Self {
    Self {
      tag: self.tag.clone(),
      path: self.path.clone(),
      result: self.result.clone(),
      done: self.done,
    }
  }
}

impl<V> fmt::Debug for Task<V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Task")
      .field("tag", &self.tag)
      .field("path", &self.path)
      .field("loaded", &self.result.is_some())
      .field("done", &self.done)
      .finish()
  }
}

impl<V> Task<V> {
  pub fn tag(&self) -> &str {
    &self.tag
  }

  pub fn path(&self) -> &str {
    &self.path
  }

  /// The loaded value. `None` until done, and after a failed load.
  pub fn result(&self) -> Option<&Arc<V>> {
    self.result.as_ref()
  }

  pub fn is_done(&self) -> bool {
    self.done
  }
}

struct RequestState<V> {
  tasks: Vec<Task<V>>,
  /// Set once the completion hook has run; later task results must not take
  /// a reference.
  finished: bool,
}

/// An ordered group of tagged loads completed together.
///
/// Build it with [`Request::add_task`], then hand it to
/// [`AssetCache::submit`](crate::AssetCache::submit) or
/// [`AssetCache::load_request`](crate::AssetCache::load_request). Every task
/// holds one reference on its loaded value until the request completes; keep
/// values alive past completion with [`AssetCache::reference`](crate::AssetCache::reference)
/// or an [`AssetOwner`](crate::AssetOwner).
pub struct Request<V> {
  state: Mutex<RequestState<V>>,
  index: AHashMap<String, usize>,
  cancelled: AtomicBool,
  on_complete: Mutex<Option<Callback<V>>>,
}

impl<V> Default for Request<V> {
  fn default() -> Self {
    Self {
      state: Mutex::new(RequestState {
        tasks: Vec::new(),
        finished: false,
      }),
      index: AHashMap::new(),
      cancelled: AtomicBool::new(false),
      on_complete: Mutex::new(None),
    }
  }
}

impl<V> fmt::Debug for Request<V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = self.state.lock();
    f.debug_struct("Request")
      .field("tasks", &state.tasks)
      .field("finished", &state.finished)
      .field("cancelled", &self.is_cancelled())
      .finish()
  }
}

impl<V> Request<V> {
  pub fn new() -> Self {
    Self::default()
  }

  /// Appends a task. A duplicate tag is logged and the task is dropped.
  pub fn add_task(&mut self, tag: impl Into<String>, path: impl Into<String>) -> Result<(), RequestError> {
    let tag = tag.into();
    if self.index.contains_key(&tag) {
      error!(tag = %tag, "duplicate task tag in request");
      return Err(RequestError::DuplicateTag { tag });
    }
    let tasks = &mut self.state.get_mut().tasks;
    self.index.insert(tag.clone(), tasks.len());
    tasks.push(Task {
      tag,
      path: path.into(),
      result: None,
      done: false,
    });
    Ok(())
  }

  /// Builder form of [`Request::add_task`]; duplicates are logged and skipped.
  pub fn with_task(mut self, tag: impl Into<String>, path: impl Into<String>) -> Self {
    let _ = self.add_task(tag, path);
    self
  }

  /// Sets the callback run once all tasks are done, unless the request was
  /// cancelled first.
  pub fn on_complete<F>(&mut self, callback: F)
  where
    F: FnOnce(&Request<V>) + Send + 'static,
  {
    *self.on_complete.get_mut() = Some(Box::new(callback));
  }

  /// Builder form of [`Request::on_complete`].
  pub fn with_callback<F>(mut self, callback: F) -> Self
  where
    F: FnOnce(&Request<V>) + Send + 'static,
  {
    self.on_complete(callback);
    self
  }

  pub fn task_count(&self) -> usize {
    self.state.lock().tasks.len()
  }

  pub fn done_count(&self) -> usize {
    self.state.lock().tasks.iter().filter(|t| t.done).count()
  }

  /// True once every task is done. An empty request is done.
  pub fn is_done(&self) -> bool {
    self.state.lock().tasks.iter().all(|t| t.done)
  }

  /// Suppresses the callback and stops further tasks from being submitted.
  /// Loads already in flight still run to completion.
  pub fn cancel(&self) {
    self.cancelled.store(true, Ordering::Release);
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancelled.load(Ordering::Acquire)
  }

  /// The loaded value of the task tagged `tag`.
  pub fn get(&self, tag: &str) -> Option<Arc<V>> {
    let index = *self.index.get(tag)?;
    self.state.lock().tasks[index].result.clone()
  }

  pub fn contains(&self, tag: &str) -> bool {
    self.index.contains_key(tag)
  }

  pub fn is_task_done(&self, tag: &str) -> bool {
    match self.index.get(tag) {
      Some(&index) => self.is_done_at(index),
      None => false,
    }
  }

  /// A snapshot of every task, in insertion order.
  pub fn tasks(&self) -> Vec<Task<V>> {
    self.state.lock().tasks.clone()
  }

  /// Every loaded value, in task order.
  pub fn results(&self) -> Vec<Arc<V>> {
    self
      .state
      .lock()
      .tasks
      .iter()
      .filter_map(|t| t.result.clone())
      .collect()
  }

  // --- Driving ---

  pub(crate) fn is_done_at(&self, index: usize) -> bool {
    self.state.lock().tasks.get(index).is_some_and(|t| t.done)
  }

  /// Index and path of every task that still needs loading.
  pub(crate) fn pending_tasks(&self) -> Vec<(usize, String)> {
    self
      .state
      .lock()
      .tasks
      .iter()
      .enumerate()
      .filter(|(_, t)| !t.done)
      .map(|(i, t)| (i, t.path.clone()))
      .collect()
  }

  /// Marks task `index` done. `admit` receives whether the request already
  /// finished and returns the value to store; it is not called for a task
  /// that is already done.
  pub(crate) fn record(&self, index: usize, admit: impl FnOnce(bool) -> Option<Arc<V>>) {
    let mut state = self.state.lock();
    let finished = state.finished;
    let Some(task) = state.tasks.get_mut(index) else {
      return;
    };
    if task.done {
      return;
    }
    task.result = admit(finished);
    task.done = true;
  }

  /// Runs once. Returns every value a task took a reference on.
  pub(crate) fn finish(&self) -> Option<Vec<Arc<V>>> {
    let mut state = self.state.lock();
    if state.finished {
      return None;
    }
    state.finished = true;
    Some(state.tasks.iter().filter_map(|t| t.result.clone()).collect())
  }

  pub(crate) fn take_callback(&self) -> Option<Callback<V>> {
    self.on_complete.lock().take()
  }
}
