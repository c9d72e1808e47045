use crate::frame::FrameClock;

use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;

use futures_util::task::noop_waker_ref;

/// A type-erased, sendable unit of cooperative work.
pub type BoxedTask = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A trait for spawning a future onto an asynchronous runtime.
///
/// Every spawner is paired with the [`FrameClock`] its futures suspend on.
pub trait TaskSpawner: Send + Sync + 'static {
  /// Spawns a type-erased future.
  fn spawn(&self, future: BoxedTask);

  /// The frame clock that paces futures spawned here.
  fn clock(&self) -> Arc<FrameClock>;
}

/// A single-threaded, frame-driven executor.
///
/// Nothing runs until [`FrameScheduler::tick`] is called. Each tick advances
/// the clock, polls every live task once, then polls freshly spawned tasks
/// (including ones spawned during this tick) until no new task remains.
/// Tasks are polled unconditionally on every tick, so wakers are not needed.
pub struct FrameScheduler {
  clock: Arc<FrameClock>,
  running: Mutex<Vec<BoxedTask>>,
  spawned: Mutex<Vec<BoxedTask>>,
}

impl fmt::Debug for FrameScheduler {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("FrameScheduler")
      .field("frame", &self.clock.current())
      .field("running", &self.running.lock().len())
      .field("spawned", &self.spawned.lock().len())
      .finish()
  }
}

impl Default for FrameScheduler {
  fn default() -> Self {
    Self::new()
  }
}

impl FrameScheduler {
  pub fn new() -> Self {
    Self::with_clock(Arc::new(FrameClock::new()))
  }

  pub fn with_clock(clock: Arc<FrameClock>) -> Self {
    Self {
      clock,
      running: Mutex::new(Vec::new()),
      spawned: Mutex::new(Vec::new()),
    }
  }

  /// Runs one frame. Returns the frame number that was just entered.
  pub fn tick(&self) -> u64 {
    let frame = self.clock.advance();
    self.poll_running();
    self.poll_spawned();
    frame
  }

  /// Runs `frames` consecutive frames.
  pub fn run_frames(&self, frames: u64) {
    for _ in 0..frames {
      self.tick();
    }
  }

  /// The number of tasks that have not completed yet.
  pub fn task_count(&self) -> usize {
    self.running.lock().len() + self.spawned.lock().len()
  }

  fn poll_running(&self) {
    // The lock is released while polling so tasks can spawn more work.
    let mut tasks = std::mem::take(&mut *self.running.lock());
    tasks.retain_mut(|task| poll_once(task));

    let mut running = self.running.lock();
    tasks.append(&mut running);
    *running = tasks;
  }

  fn poll_spawned(&self) {
    loop {
      let batch = std::mem::take(&mut *self.spawned.lock());
      if batch.is_empty() {
        return;
      }
      for mut task in batch {
        if poll_once(&mut task) {
          self.running.lock().push(task);
        }
      }
    }
  }
}

/// Polls a task once. Returns true while it is still pending.
fn poll_once(task: &mut BoxedTask) -> bool {
  let mut cx = Context::from_waker(noop_waker_ref());
  task.as_mut().poll(&mut cx).is_pending()
}

impl TaskSpawner for FrameScheduler {
  fn spawn(&self, future: BoxedTask) {
    self.spawned.lock().push(future);
  }

  fn clock(&self) -> Arc<FrameClock> {
    self.clock.clone()
  }
}

/// Spawns onto a Tokio runtime. The host advances [`TaskSpawner::clock`] once
/// per frame; clock waiters are woken through their real wakers.
#[cfg(feature = "tokio")]
pub struct TokioSpawner {
  handle: tokio::runtime::Handle,
  clock: Arc<FrameClock>,
}

#[cfg(feature = "tokio")]
impl TokioSpawner {
  /// Creates a spawner that uses the current Tokio runtime context.
  /// Panics if called outside of a Tokio runtime.
  pub fn new() -> Self {
    Self::with_handle(tokio::runtime::Handle::current())
  }

  pub fn with_handle(handle: tokio::runtime::Handle) -> Self {
    Self {
      handle,
      clock: Arc::new(FrameClock::new()),
    }
  }
}

#[cfg(feature = "tokio")]
impl TaskSpawner for TokioSpawner {
  fn spawn(&self, future: BoxedTask) {
    self.handle.spawn(future);
  }

  fn clock(&self) -> Arc<FrameClock> {
    self.clock.clone()
  }
}
