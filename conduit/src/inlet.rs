// src/inlet.rs

//! The producer-facing side of a conduit.
//!
//! Senders hand values to the intake relay through a single rendezvous slot.
//! A `send` returns as soon as the relay has moved the value into the buffer,
//! so it only ever waits on the relay (never on the consumer), and by the time
//! it returns the value is visible to the buffer's ordering.

use crate::error::{CloseError, SendError};

use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct InletState<T> {
  /// The value waiting to be picked up by the intake relay.
  slot: Option<T>,
  /// Number of values ever placed in `slot`.
  posted: u64,
  /// Number of values the relay has taken out of `slot`.
  taken: u64,
  /// Number of values the relay has moved into the buffer.
  accepted: u64,
  /// Open `Sender` handles. The send side is closed once this reaches zero.
  senders: usize,
  /// Set when the intake relay has exited; nothing will be picked up anymore.
  relay_gone: bool,
}

/// State shared by every `Sender` and the intake relay.
pub(crate) struct Inlet<T> {
  state: Mutex<InletState<T>>,
  /// Signalled when a value is posted or the last sender closes.
  relay_cv: Condvar,
  /// Signalled when the slot frees up or a value is accepted.
  sender_cv: Condvar,
}

impl<T> fmt::Debug for Inlet<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = self.state.lock();
    f.debug_struct("Inlet")
      .field("posted", &state.posted)
      .field("accepted", &state.accepted)
      .field("senders", &state.senders)
      .field("relay_gone", &state.relay_gone)
      .finish_non_exhaustive()
  }
}

impl<T> Inlet<T> {
  /// Creates an inlet with one open sender.
  pub(crate) fn new() -> Self {
    Inlet {
      state: Mutex::new(InletState {
        slot: None,
        posted: 0,
        taken: 0,
        accepted: 0,
        senders: 1,
        relay_gone: false,
      }),
      relay_cv: Condvar::new(),
      sender_cv: Condvar::new(),
    }
  }

  fn add_sender(&self) {
    self.state.lock().senders += 1;
  }

  fn remove_sender(&self) {
    let mut state = self.state.lock();
    state.senders -= 1;
    if state.senders == 0 {
      self.relay_cv.notify_one();
    }
  }

  /// Hands `value` to the intake relay and waits until it has been enqueued.
  ///
  /// If the relay exits before taking the value, the value is handed back.
  /// A value the relay took but never enqueued (its buffer panicked) is lost
  /// with the relay.
  fn post(&self, value: T) -> Result<(), T> {
    let mut state = self.state.lock();
    while state.slot.is_some() && !state.relay_gone {
      self.sender_cv.wait(&mut state);
    }
    if state.relay_gone {
      return Err(value);
    }

    state.slot = Some(value);
    state.posted += 1;
    let ticket = state.posted;
    self.relay_cv.notify_one();

    while state.accepted < ticket && !state.relay_gone {
      self.sender_cv.wait(&mut state);
    }
    if state.taken < ticket {
      // Still in the slot: nobody else can post until it is taken.
      if let Some(value) = state.slot.take() {
        return Err(value);
      }
    }
    Ok(())
  }

  /// Called by the intake relay. Blocks until a value is posted, or returns
  /// `None` once every sender has closed.
  pub(crate) fn take(&self) -> Option<T> {
    let mut state = self.state.lock();
    loop {
      if let Some(value) = state.slot.take() {
        state.taken += 1;
        // Let the next sender post while this value is being enqueued.
        self.sender_cv.notify_all();
        return Some(value);
      }
      if state.senders == 0 {
        return None;
      }
      self.relay_cv.wait(&mut state);
    }
  }

  /// Called by the intake relay after the value returned by `take` has been
  /// enqueued.
  pub(crate) fn accept(&self) {
    let mut state = self.state.lock();
    state.accepted += 1;
    self.sender_cv.notify_all();
  }

  /// Called once by the intake relay on exit, including on unwind.
  pub(crate) fn relay_exited(&self) {
    let mut state = self.state.lock();
    state.relay_gone = true;
    self.sender_cv.notify_all();
  }

  #[cfg(test)]
  fn sender_count(&self) -> usize {
    self.state.lock().senders
  }

  #[cfg(test)]
  fn posted(&self) -> u64 {
    self.state.lock().posted
  }
}

/// The sending half of a conduit.
///
/// `send` never waits for the consumer: values are parked in the conduit's
/// buffer until they are received. Senders can be cloned; the send side of the
/// conduit is closed once every clone has been closed or dropped, after which
/// the receiver drains what is left and then reports disconnection.
pub struct Sender<T> {
  pub(crate) inlet: Arc<Inlet<T>>,
  pub(crate) closed: AtomicBool,
}

impl<T> fmt::Debug for Sender<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Sender")
      .field("inlet", &self.inlet)
      .field("closed", &self.closed.load(Ordering::Relaxed))
      .finish()
  }
}

impl<T> Sender<T> {
  pub(crate) fn new(inlet: Arc<Inlet<T>>) -> Self {
    Sender {
      inlet,
      closed: AtomicBool::new(false),
    }
  }

  /// Sends a value into the conduit.
  ///
  /// Returns once the value is in the buffer. Fails, handing the value back,
  /// only if this handle was closed or the intake relay is gone.
  pub fn send(&self, value: T) -> Result<(), SendError<T>> {
    if self.closed.load(Ordering::Acquire) {
      return Err(SendError::Closed(value));
    }
    self.inlet.post(value).map_err(SendError::Closed)
  }

  /// Closes this sender handle. Equivalent to dropping it, but reports
  /// whether the handle was already closed.
  pub fn close(&mut self) -> Result<(), CloseError> {
    if self
      .closed
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
      .is_ok()
    {
      self.inlet.remove_sender();
      Ok(())
    } else {
      Err(CloseError)
    }
  }

  /// Whether this handle has been closed.
  pub fn is_closed(&self) -> bool {
    self.closed.load(Ordering::Acquire)
  }
}

impl<T> Clone for Sender<T> {
  fn clone(&self) -> Self {
    self.inlet.add_sender();
    Sender::new(Arc::clone(&self.inlet))
  }
}

impl<T> Drop for Sender<T> {
  fn drop(&mut self) {
    if !self.closed.swap(true, Ordering::AcqRel) {
      self.inlet.remove_sender();
    }
  }
}
