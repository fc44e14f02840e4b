use super::Buffer;

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::fmt;

struct FifoState<T> {
  items: VecDeque<T>,
  closed: bool,
}

/// A first-in, first-out buffer: items come out in the order they went in.
pub struct Fifo<T> {
  state: Mutex<FifoState<T>>,
  not_empty: Condvar,
}

impl<T> fmt::Debug for Fifo<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = self.state.lock();
    f.debug_struct("Fifo")
      .field("len", &state.items.len())
      .field("closed", &state.closed)
      .finish()
  }
}

impl<T> Default for Fifo<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T> Fifo<T> {
  /// Creates an empty FIFO buffer.
  pub fn new() -> Self {
    Self::with_capacity(0)
  }

  /// Creates an empty FIFO buffer with room for `capacity` items before it
  /// reallocates. This is a sizing hint, not a bound.
  pub fn with_capacity(capacity: usize) -> Self {
    Self {
      state: Mutex::new(FifoState {
        items: VecDeque::with_capacity(capacity),
        closed: false,
      }),
      not_empty: Condvar::new(),
    }
  }

  /// Number of items currently held.
  pub fn len(&self) -> usize {
    self.state.lock().items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.state.lock().items.is_empty()
  }

  /// Whether `close` has been called. Items may still be pending.
  pub fn is_closed(&self) -> bool {
    self.state.lock().closed
  }
}

impl<T: Send> Buffer<T> for Fifo<T> {
  fn enqueue(&self, item: T) {
    let mut state = self.state.lock();
    state.items.push_back(item);
    // Only the outtake relay waits here.
    self.not_empty.notify_one();
  }

  fn dequeue(&self) -> Option<T> {
    let mut state = self.state.lock();
    while state.items.is_empty() && !state.closed {
      self.not_empty.wait(&mut state);
    }
    state.items.pop_front()
  }

  fn close(&self) {
    let mut state = self.state.lock();
    state.closed = true;
    self.not_empty.notify_all();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;
  use std::thread;
  use std::time::Duration;

  #[test]
  fn dequeues_in_arrival_order() {
    let fifo = Fifo::new();
    for i in [3, 1, 4, 1, 5] {
      fifo.enqueue(i);
    }
    assert_eq!(fifo.len(), 5);
    let drained: Vec<_> = (0..5).filter_map(|_| fifo.dequeue()).collect();
    assert_eq!(drained, vec![3, 1, 4, 1, 5]);
    assert!(fifo.is_empty());
  }

  #[test]
  fn closed_and_empty_returns_none_repeatedly() {
    let fifo = Fifo::<u8>::new();
    fifo.close();
    assert!(fifo.is_closed());
    assert_eq!(fifo.dequeue(), None);
    assert_eq!(fifo.dequeue(), None);
  }

  #[test]
  fn close_drains_pending_items_first() {
    let fifo = Fifo::with_capacity(4);
    fifo.enqueue("a");
    fifo.enqueue("b");
    fifo.close();
    assert_eq!(fifo.dequeue(), Some("a"));
    assert_eq!(fifo.dequeue(), Some("b"));
    assert_eq!(fifo.dequeue(), None);
  }

  #[test]
  fn dequeue_blocks_until_enqueue() {
    let fifo = Arc::new(Fifo::new());
    let consumer = {
      let fifo = Arc::clone(&fifo);
      thread::spawn(move || fifo.dequeue())
    };
    thread::sleep(Duration::from_millis(50));
    assert!(!consumer.is_finished());
    fifo.enqueue(42);
    assert_eq!(consumer.join().unwrap(), Some(42));
  }

  #[test]
  fn close_wakes_blocked_dequeue() {
    let fifo = Arc::new(Fifo::<i32>::new());
    let consumer = {
      let fifo = Arc::clone(&fifo);
      thread::spawn(move || fifo.dequeue())
    };
    thread::sleep(Duration::from_millis(50));
    fifo.close();
    assert_eq!(consumer.join().unwrap(), None);
  }
}
