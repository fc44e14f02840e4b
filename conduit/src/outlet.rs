// src/outlet.rs

//! The consumer-facing side of a conduit.
//!
//! The outtake relay only pulls an item out of the buffer once a receiver is
//! waiting for one (demand) and the intake relay has reported an item pending,
//! then parks it in a single-item slot until the receiver takes it. The relay
//! therefore never sits inside a blocking `dequeue` on behalf of a receiver
//! that may give up: items stay in the buffer until they are asked for, which
//! is what lets a priority buffer reorder everything sent before a receive.
//!
//! Receivers may wait synchronously (thread park) or asynchronously (task
//! waker); both register through the same [`Waiter`] slot under the outlet
//! lock, so a wakeup can never be lost between the state check and the wait.

use crate::error::{RecvError, RecvErrorTimeout};
use crate::telemetry::{self, names};

use futures_core::Stream;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::thread::{self, Thread};
use std::time::{Duration, Instant};

/// A receiver blocked on the outlet, either a parked thread or a task.
#[derive(Debug)]
enum Waiter {
  Sync(Thread),
  Async(Waker),
}

impl Waiter {
  fn wake(self) {
    match self {
      Waiter::Sync(thread) => thread.unpark(),
      Waiter::Async(waker) => waker.wake(),
    }
  }

  fn will_wake(&self, waker: &Waker) -> bool {
    match self {
      Waiter::Async(self_waker) => self_waker.will_wake(waker),
      Waiter::Sync(_) => false,
    }
  }
}

/// One-shot cancellation flag. Firing it twice is a no-op.
#[derive(Debug, Default)]
pub(crate) struct CancelSignal {
  fired: AtomicBool,
}

impl CancelSignal {
  /// Returns `true` only for the call that actually fired the signal.
  pub(crate) fn fire(&self) -> bool {
    self
      .fired
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .is_ok()
  }

  pub(crate) fn is_fired(&self) -> bool {
    self.fired.load(Ordering::Acquire)
  }
}

struct OutletState<T> {
  /// An item offered by the relay, waiting for the receiver to take it.
  ready: Option<T>,
  /// The registered receiver. Its presence is the demand signal for the relay.
  waiter: Option<Waiter>,
  /// Items in the buffer that the relay has not pulled yet.
  pending: usize,
  /// The intake relay has closed the buffer.
  input_closed: bool,
  /// The relay is pulling an item for the registered receiver.
  pulling: bool,
  /// The relay has exited; nothing more will be offered.
  closed: bool,
}

/// State shared by the receiving endpoint and the outtake relay.
pub(crate) struct Outlet<T> {
  state: Mutex<OutletState<T>>,
  /// The relay waits here for demand and for pickup.
  relay_cv: Condvar,
  cancel: CancelSignal,
}

impl<T> fmt::Debug for Outlet<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = self.state.lock();
    f.debug_struct("Outlet")
      .field("has_ready", &state.ready.is_some())
      .field("has_waiter", &state.waiter.is_some())
      .field("pending", &state.pending)
      .field("input_closed", &state.input_closed)
      .field("closed", &state.closed)
      .field("cancelled", &self.cancel.is_fired())
      .finish()
  }
}

/// Outcome of a single receive attempt against the outlet state.
enum Attempt<T> {
  Item(T),
  Disconnected,
  Pending,
}

impl<T> Outlet<T> {
  pub(crate) fn new() -> Self {
    Outlet {
      state: Mutex::new(OutletState {
        ready: None,
        waiter: None,
        pending: 0,
        input_closed: false,
        pulling: false,
        closed: false,
      }),
      relay_cv: Condvar::new(),
      cancel: CancelSignal::default(),
    }
  }

  // --- Intake side ---

  /// Called by the intake relay after each successful `enqueue`.
  pub(crate) fn item_enqueued(&self) {
    let mut state = self.state.lock();
    state.pending += 1;
    self.relay_cv.notify_all();
  }

  /// Called by the intake relay once the buffer has been closed.
  pub(crate) fn close_input(&self) {
    let mut state = self.state.lock();
    state.input_closed = true;
    self.relay_cv.notify_all();
  }

  // --- Relay side ---

  /// Blocks the relay until it should call `dequeue`: a receiver is waiting
  /// and an item is pending, or input has ended and nothing is pending (so
  /// `dequeue` reports the end without blocking). Returns `false` if the
  /// outlet was cancelled instead.
  pub(crate) fn wait_for_demand(&self) -> bool {
    let mut state = self.state.lock();
    loop {
      if self.cancel.is_fired() {
        return false;
      }
      if state.pending > 0 && state.waiter.is_some() {
        state.pending -= 1;
        state.pulling = true;
        return true;
      }
      if state.pending == 0 && state.input_closed {
        return true;
      }
      self.relay_cv.wait(&mut state);
    }
  }

  /// Offers `item` to the receiver and blocks until it is taken.
  ///
  /// On cancellation the item is handed back undelivered. If the receiver
  /// stopped waiting while the item was being pulled, the item stays offered
  /// to the next receive.
  pub(crate) fn deliver(&self, item: T) -> Result<(), T> {
    let mut state = self.state.lock();
    state.pulling = false;
    if self.cancel.is_fired() {
      return Err(item);
    }
    state.ready = Some(item);
    if let Some(waiter) = state.waiter.take() {
      waiter.wake();
    }
    while state.ready.is_some() && !self.cancel.is_fired() {
      self.relay_cv.wait(&mut state);
    }
    match state.ready.take() {
      Some(item) => Err(item),
      None => Ok(()),
    }
  }

  /// Marks the outlet closed and wakes a waiting receiver. Called exactly
  /// once, by the relay on exit.
  pub(crate) fn close(&self) {
    let waiter = {
      let mut state = self.state.lock();
      state.closed = true;
      state.pulling = false;
      state.waiter.take()
    };
    if let Some(waiter) = waiter {
      waiter.wake();
    }
  }

  // --- Receiver side ---

  /// Fires the cancellation signal, releasing the relay and any receiver.
  /// Returns `false` if it had already fired.
  pub(crate) fn cancel(&self) -> bool {
    if !self.cancel.fire() {
      return false;
    }
    let waiter = {
      let mut state = self.state.lock();
      self.relay_cv.notify_all();
      state.waiter.take()
    };
    if let Some(waiter) = waiter {
      waiter.wake();
    }
    tracing::debug!("conduit receive side cancelled");
    telemetry::log_event(names::RECEIVER, names::CANCELLED, None);
    telemetry::increment_counter(names::RECEIVER, names::CANCELLED);
    true
  }

  #[cfg(test)]
  pub(crate) fn is_cancelled(&self) -> bool {
    self.cancel.is_fired()
  }

  /// Whether every later receive will report disconnection.
  pub(crate) fn is_terminated(&self) -> bool {
    if self.cancel.is_fired() {
      return true;
    }
    let state = self.state.lock();
    state.closed && state.ready.is_none()
  }

  /// Takes a ready item, or registers `make_waiter` as demand.
  fn attempt(&self, state: &mut OutletState<T>, make_waiter: impl FnOnce() -> Option<Waiter>) -> Attempt<T> {
    if let Some(item) = state.ready.take() {
      state.waiter = None;
      self.relay_cv.notify_all();
      return Attempt::Item(item);
    }
    if state.closed || self.cancel.is_fired() {
      state.waiter = None;
      return Attempt::Disconnected;
    }
    if let Some(waiter) = make_waiter() {
      state.waiter = Some(waiter);
      self.relay_cv.notify_all();
    }
    Attempt::Pending
  }

  /// Withdraws demand registered by a receiver that stopped waiting.
  fn withdraw(&self) {
    self.state.lock().waiter = None;
  }

  fn recv_blocking(&self, deadline: Option<Instant>) -> Result<T, RecvErrorTimeout> {
    loop {
      {
        let mut state = self.state.lock();
        let registered = matches!(state.waiter, Some(Waiter::Sync(_)));
        match self.attempt(&mut state, || (!registered).then(|| Waiter::Sync(thread::current()))) {
          Attempt::Item(item) => return Ok(item),
          Attempt::Disconnected => return Err(RecvErrorTimeout::Disconnected),
          Attempt::Pending => {}
        }
      }

      match deadline {
        None => thread::park(),
        Some(deadline) => {
          let now = Instant::now();
          if now >= deadline {
            // Final check before withdrawing demand.
            let mut state = self.state.lock();
            match self.attempt(&mut state, || None) {
              Attempt::Item(item) => return Ok(item),
              Attempt::Disconnected => return Err(RecvErrorTimeout::Disconnected),
              // An item is already on its way out of the buffer for us.
              Attempt::Pending if state.pulling => {}
              Attempt::Pending => {
                state.waiter = None;
                return Err(RecvErrorTimeout::Timeout);
              }
            }
            drop(state);
            thread::park();
          } else {
            thread::park_timeout(deadline - now);
          }
        }
      }
    }
  }

  fn poll_recv(&self, cx: &mut Context<'_>) -> Poll<Result<T, RecvError>> {
    let mut state = self.state.lock();
    let stale = match &state.waiter {
      Some(waiter) => !waiter.will_wake(cx.waker()),
      None => true,
    };
    match self.attempt(&mut state, || stale.then(|| Waiter::Async(cx.waker().clone()))) {
      Attempt::Item(item) => Poll::Ready(Ok(item)),
      Attempt::Disconnected => Poll::Ready(Err(RecvError::Disconnected)),
      Attempt::Pending => Poll::Pending,
    }
  }
}

/// The receiving half of a conduit, for synchronous code.
///
/// `recv` blocks until an item is available or the conduit is drained and
/// every sender has closed. Dropping the receiver (or calling
/// [`close`](Receiver::close)) cancels delivery and releases the outtake
/// relay even if producers are still sending.
pub struct Receiver<T> {
  pub(crate) outlet: Arc<Outlet<T>>,
}

impl<T> fmt::Debug for Receiver<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Receiver").field("outlet", &self.outlet).finish()
  }
}

impl<T> Receiver<T> {
  /// Receives the next item, blocking the current thread until one is
  /// available.
  ///
  /// Returns `Err(RecvError::Disconnected)` once the conduit is drained and
  /// every sender has closed, or after [`close`](Receiver::close). That state
  /// is terminal: every later call returns the same error immediately.
  pub fn recv(&mut self) -> Result<T, RecvError> {
    self.outlet.recv_blocking(None).map_err(|_| RecvError::Disconnected)
  }

  /// Like [`recv`](Receiver::recv), but gives up after `timeout`.
  pub fn recv_timeout(&mut self, timeout: Duration) -> Result<T, RecvErrorTimeout> {
    let deadline = Instant::now().checked_add(timeout);
    self.outlet.recv_blocking(deadline)
  }

  /// Stops receiving. Delivery of anything still buffered is abandoned, the
  /// outtake relay exits promptly, and every later receive reports
  /// disconnection. Calling this more than once is a no-op.
  pub fn close(&self) {
    self.outlet.cancel();
  }

  /// Whether the conduit is drained and closed, or this side was closed.
  ///
  /// Once every sender has closed and the last item has been received, the
  /// outtake relay closes the receiving side on its own, so this may report
  /// `false` for a short moment after the final `recv`.
  pub fn is_closed(&self) -> bool {
    self.outlet.is_terminated()
  }

  /// Converts into an asynchronous receiver over the same conduit.
  pub fn to_async(self) -> AsyncReceiver<T> {
    // Skip our Drop: it would cancel the conduit.
    let outlet = unsafe { std::ptr::read(&self.outlet) };
    mem::forget(self);
    AsyncReceiver { outlet }
  }
}

impl<T> Iterator for Receiver<T> {
  type Item = T;

  fn next(&mut self) -> Option<T> {
    self.recv().ok()
  }
}

impl<T> Drop for Receiver<T> {
  fn drop(&mut self) {
    self.outlet.cancel();
  }
}

/// The receiving half of a conduit, for async code.
///
/// Also implements [`Stream`], ending once the conduit is drained and closed.
pub struct AsyncReceiver<T> {
  pub(crate) outlet: Arc<Outlet<T>>,
}

impl<T> fmt::Debug for AsyncReceiver<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("AsyncReceiver").field("outlet", &self.outlet).finish()
  }
}

impl<T> AsyncReceiver<T> {
  /// Returns a future resolving to the next item, or to
  /// `Err(RecvError::Disconnected)` once the conduit is drained and closed.
  pub fn recv(&mut self) -> RecvFuture<'_, T> {
    RecvFuture {
      outlet: &self.outlet,
      registered: false,
    }
  }

  /// See [`Receiver::close`].
  pub fn close(&self) {
    self.outlet.cancel();
  }

  /// See [`Receiver::is_closed`].
  pub fn is_closed(&self) -> bool {
    self.outlet.is_terminated()
  }

  /// Converts into a synchronous receiver over the same conduit.
  pub fn to_sync(self) -> Receiver<T> {
    let outlet = unsafe { std::ptr::read(&self.outlet) };
    mem::forget(self);
    Receiver { outlet }
  }
}

impl<T> Drop for AsyncReceiver<T> {
  fn drop(&mut self) {
    self.outlet.cancel();
  }
}

impl<T> Stream for AsyncReceiver<T> {
  type Item = T;

  fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
    let res = futures_util::ready!(self.outlet.poll_recv(cx));
    Poll::Ready(res.ok())
  }
}

/// Future returned by [`AsyncReceiver::recv`].
#[must_use = "futures do nothing unless you .await or poll them"]
pub struct RecvFuture<'a, T> {
  outlet: &'a Outlet<T>,
  registered: bool,
}

impl<T> fmt::Debug for RecvFuture<'_, T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RecvFuture")
      .field("registered", &self.registered)
      .finish_non_exhaustive()
  }
}

impl<T> Future for RecvFuture<'_, T> {
  type Output = Result<T, RecvError>;

  fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let poll = self.outlet.poll_recv(cx);
    self.registered = poll.is_pending();
    poll
  }
}

impl<T> Drop for RecvFuture<'_, T> {
  fn drop(&mut self) {
    // A dropped future no longer wants an item. Anything already offered, or
    // already being pulled for it, stays in the slot for the next receive.
    if self.registered {
      self.outlet.withdraw();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn cancel_signal_fires_once() {
    let signal = CancelSignal::default();
    assert!(!signal.is_fired());
    assert!(signal.fire());
    assert!(!signal.fire());
    assert!(signal.is_fired());
  }

  #[test]
  fn relay_waits_for_demand() {
    let outlet = Arc::new(Outlet::<u32>::new());
    outlet.item_enqueued();
    let relay = {
      let outlet = Arc::clone(&outlet);
      thread::spawn(move || {
        if outlet.wait_for_demand() {
          outlet.deliver(11).map_err(|_| ()).unwrap();
        }
        outlet.close();
      })
    };
    thread::sleep(Duration::from_millis(50));
    assert!(!relay.is_finished());

    let mut rx = Receiver { outlet: Arc::clone(&outlet) };
    assert_eq!(rx.recv(), Ok(11));
    relay.join().unwrap();
    assert_eq!(rx.recv(), Err(RecvError::Disconnected));
    assert!(rx.is_closed());
  }

  #[test]
  fn relay_does_not_pull_while_nothing_is_pending() {
    let outlet = Arc::new(Outlet::<u32>::new());
    let relay = {
      let outlet = Arc::clone(&outlet);
      thread::spawn(move || outlet.wait_for_demand())
    };
    let mut rx = Receiver { outlet: Arc::clone(&outlet) };
    assert_eq!(rx.recv_timeout(Duration::from_millis(30)), Err(RecvErrorTimeout::Timeout));
    assert!(!relay.is_finished());

    // Demand came and went without an item, so a later item is not pulled
    // until someone asks again.
    outlet.item_enqueued();
    thread::sleep(Duration::from_millis(30));
    assert!(!relay.is_finished());

    rx.close();
    assert!(!relay.join().unwrap());
  }

  #[test]
  fn relay_finishes_without_demand_once_input_is_drained() {
    let outlet = Arc::new(Outlet::<u32>::new());
    let relay = {
      let outlet = Arc::clone(&outlet);
      thread::spawn(move || {
        let pull = outlet.wait_for_demand();
        outlet.close();
        pull
      })
    };
    outlet.close_input();
    assert!(relay.join().unwrap());
    let rx = Receiver { outlet: Arc::clone(&outlet) };
    assert!(rx.is_closed());
  }

  #[test]
  fn timed_out_receive_still_takes_item_being_pulled() {
    let outlet = Arc::new(Outlet::<u32>::new());
    outlet.item_enqueued();
    let relay = {
      let outlet = Arc::clone(&outlet);
      thread::spawn(move || {
        assert!(outlet.wait_for_demand());
        // A slow `dequeue`, outlasting the receive timeout.
        thread::sleep(Duration::from_millis(100));
        outlet.deliver(7)
      })
    };
    let mut rx = Receiver { outlet: Arc::clone(&outlet) };
    assert_eq!(rx.recv_timeout(Duration::from_millis(20)), Ok(7));
    assert_eq!(relay.join().unwrap(), Ok(()));
  }

  #[test]
  fn cancel_releases_relay_waiting_for_pickup() {
    let outlet = Arc::new(Outlet::<u32>::new());
    let relay = {
      let outlet = Arc::clone(&outlet);
      thread::spawn(move || outlet.deliver(3))
    };
    thread::sleep(Duration::from_millis(50));
    assert!(outlet.cancel());
    assert!(!outlet.cancel());
    assert_eq!(relay.join().unwrap(), Err(3));
    assert!(outlet.is_terminated());
  }

  #[test]
  fn timed_out_receive_withdraws_demand() {
    let outlet = Arc::new(Outlet::<u32>::new());
    let mut rx = Receiver { outlet: Arc::clone(&outlet) };
    assert_eq!(rx.recv_timeout(Duration::from_millis(20)), Err(RecvErrorTimeout::Timeout));
    assert!(outlet.state.lock().waiter.is_none());
  }

  #[test]
  fn offered_item_survives_timeout_for_next_receive() {
    let outlet = Arc::new(Outlet::<&'static str>::new());
    let relay = {
      let outlet = Arc::clone(&outlet);
      thread::spawn(move || outlet.deliver("kept"))
    };
    let mut rx = Receiver { outlet: Arc::clone(&outlet) };
    thread::sleep(Duration::from_millis(30));
    assert_eq!(rx.recv_timeout(Duration::from_millis(200)), Ok("kept"));
    assert_eq!(relay.join().unwrap(), Ok(()));
  }

  #[test]
  fn to_async_and_back_keeps_conduit_open() {
    let outlet = Arc::new(Outlet::<u8>::new());
    let rx = Receiver { outlet: Arc::clone(&outlet) };
    let rx = rx.to_async().to_sync();
    assert!(!outlet.is_cancelled());
    drop(rx);
    assert!(outlet.is_cancelled());
  }
}
