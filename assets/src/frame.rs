use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll, Waker};

/// A monotonically increasing frame counter shared by every cooperative task
/// of a cache.
///
/// All suspension in this crate is expressed as "wait until a condition holds
/// on some later frame". The clock owns the wakers of tasks waiting for the
/// next frame and wakes them all whenever it advances.
#[derive(Debug, Default)]
pub struct FrameClock {
  frame: AtomicU64,
  waiters: Mutex<Vec<Waker>>,
}

impl FrameClock {
  /// Creates a clock positioned at frame 0.
  pub fn new() -> Self {
    Self::default()
  }

  /// Returns the current frame number.
  #[inline]
  pub fn current(&self) -> u64 {
    self.frame.load(Ordering::Acquire)
  }

  /// Advances the clock by one frame, waking every task waiting on it.
  ///
  /// Returns the new frame number.
  pub fn advance(&self) -> u64 {
    let frame = self.frame.fetch_add(1, Ordering::AcqRel) + 1;
    let waiters = std::mem::take(&mut *self.waiters.lock());
    for waker in waiters {
      waker.wake();
    }
    frame
  }

  /// Returns a future that resolves on the next frame.
  pub fn next_frame(&self) -> NextFrame<'_> {
    self.after(1)
  }

  /// Returns a future that resolves once `frames` frames have elapsed.
  ///
  /// `after(0)` is immediately ready.
  pub fn after(&self, frames: u64) -> NextFrame<'_> {
    NextFrame {
      clock: self,
      target: self.current() + frames,
    }
  }

  /// Suspends across frames until `condition` returns true.
  ///
  /// The condition is checked immediately, and then once per frame.
  pub async fn wait_until(&self, mut condition: impl FnMut() -> bool) {
    while !condition() {
      self.next_frame().await;
    }
  }
}

/// The `Future` returned by [`FrameClock::next_frame`] and [`FrameClock::after`].
#[must_use = "futures do nothing unless you .await or poll them"]
#[derive(Debug)]
pub struct NextFrame<'a> {
  clock: &'a FrameClock,
  target: u64,
}

impl<'a> Future for NextFrame<'a> {
  type Output = u64;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let current = self.clock.current();
    if current >= self.target {
      return Poll::Ready(current);
    }

    let mut waiters = self.clock.waiters.lock();

    // The clock may have advanced between the first check and taking the
    // waiter lock.
    let current = self.clock.current();
    if current >= self.target {
      return Poll::Ready(current);
    }

    if !waiters.iter().any(|w| w.will_wake(cx.waker())) {
      waiters.push(cx.waker().clone());
    }
    Poll::Pending
  }
}
