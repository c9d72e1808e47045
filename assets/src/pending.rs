use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

struct Inner<E> {
  complete: bool,
  failure: Option<E>,
  waiters: VecDeque<Waker>,
}

/// A one-shot completion signal shared by everyone waiting on an in-flight
/// operation.
///
/// It carries no value. Waiters re-inspect the owning state once it fires,
/// which keeps the outcome in exactly one place. The one exception is a
/// failure, which leaves nothing behind in the owning state and is therefore
/// recorded on the signal itself.
pub(crate) struct Pending<E = ()> {
  inner: Mutex<Inner<E>>,
}

impl<E> Pending<E> {
  pub(crate) fn new() -> Self {
    Self {
      inner: Mutex::new(Inner {
        complete: false,
        failure: None,
        waiters: VecDeque::new(),
      }),
    }
  }

  /// Completes the signal, waking all waiters. Completing twice is a no-op.
  pub(crate) fn complete(&self) {
    let waiters = {
      let mut inner = self.inner.lock();
      if inner.complete {
        return;
      }
      inner.complete = true;
      std::mem::take(&mut inner.waiters)
    };
    for waker in waiters {
      waker.wake();
    }
  }

  /// Records why the operation failed. Ignored once the signal completed.
  pub(crate) fn fail(&self, error: E) {
    let mut inner = self.inner.lock();
    if !inner.complete {
      inner.failure = Some(error);
    }
  }

  pub(crate) fn failure(&self) -> Option<E>
  where
    E: Clone,
  {
    self.inner.lock().failure.clone()
  }

  #[cfg(test)]
  pub(crate) fn is_complete(&self) -> bool {
    self.inner.lock().complete
  }
}

impl<E> Future for &Pending<E> {
  type Output = ();

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let mut inner = self.inner.lock();
    if inner.complete {
      return Poll::Ready(());
    }
    if !inner.waiters.iter().any(|w| w.will_wake(cx.waker())) {
      inner.waiters.push_back(cx.waker().clone());
    }
    Poll::Pending
  }
}

/// Selects one in-flight ledger inside a piece of shared state.
pub(crate) type Ledger<S, K, E = ()> = fn(&mut S) -> &mut HashMap<K, Arc<Pending<E>>>;

/// Exclusive ownership of one in-flight ledger slot.
///
/// The claimant performs the operation while every later caller for the same
/// key waits on the slot's [`Pending`]. Dropping the claim withdraws the slot
/// (if it is still the current one for its key) and completes the signal, so
/// waiters are released even when the claimant's future is dropped early.
///
/// The state lock must not be held when a claim is dropped.
pub(crate) struct Claim<S, K: Eq + Hash, E = ()> {
  state: Arc<Mutex<S>>,
  ledger: Ledger<S, K, E>,
  key: K,
  pending: Arc<Pending<E>>,
}

impl<S, K: Eq + Hash, E> Claim<S, K, E> {
  /// Registers a fresh slot for `key`, replacing nothing. The caller has
  /// already checked that no slot exists, under the same guard.
  pub(crate) fn register(state: &Arc<Mutex<S>>, guard: &mut S, ledger: Ledger<S, K, E>, key: K) -> Self
  where
    K: Clone,
  {
    let pending = Arc::new(Pending::new());
    ledger(guard).insert(key.clone(), pending.clone());
    Self {
      state: state.clone(),
      ledger,
      key,
      pending,
    }
  }

  /// True while this claim's slot is still the registered one for its key.
  pub(crate) fn is_current(&self, guard: &mut S) -> bool {
    (self.ledger)(guard)
      .get(&self.key)
      .is_some_and(|p| Arc::ptr_eq(p, &self.pending))
  }

  /// Removes the slot if it is still current. Returns whether it was.
  pub(crate) fn withdraw(&self, guard: &mut S) -> bool {
    if self.is_current(guard) {
      (self.ledger)(guard).remove(&self.key);
      true
    } else {
      false
    }
  }

  /// Records a failure for the waiters; the slot is still released on drop.
  pub(crate) fn fail(&self, error: E) {
    self.pending.fail(error);
  }
}

impl<S, K: Eq + Hash, E> Drop for Claim<S, K, E> {
  fn drop(&mut self) {
    {
      let mut guard = self.state.lock();
      self.withdraw(&mut guard);
    }
    self.pending.complete();
  }
}
