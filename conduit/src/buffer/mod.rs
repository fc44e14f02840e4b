//! Buffering disciplines for a conduit.
//!
//! A conduit never applies backpressure to its senders: everything handed over
//! is parked in a [`Buffer`] until the receiving side asks for it. The buffer
//! decides *which* pending item comes out next. Two disciplines ship with the
//! crate:
//!
//! - [`Fifo`]: strict arrival order.
//! - [`Heap`]: a binary min-heap ordered by a caller-supplied `less` function.
//!
//! Any type implementing [`Buffer`] can be handed to
//! [`with_buffer`](crate::with_buffer) or
//! [`ConduitBuilder::buffer`](crate::ConduitBuilder::buffer).

mod fifo;
mod heap;

pub use fifo::Fifo;
pub use heap::Heap;

use std::sync::Arc;

/// A dynamically sized buffer sitting between the two relays of a conduit.
///
/// The intake relay is the only caller of `enqueue` and `close`, and the
/// outtake relay the only caller of `dequeue`, but implementations must still
/// be safe for concurrent use from any number of threads.
///
/// The conduit keeps its own count of pending items, so a buffer shared with a
/// conduit (for example through an `Arc`) may be inspected but must not be
/// fed or drained from outside it.
pub trait Buffer<T>: Send + Sync {
  /// Adds an item to the buffer. Must not block beyond internal locking.
  fn enqueue(&self, item: T);

  /// Removes and returns the next item.
  ///
  /// If the buffer is empty and not closed, blocks until an item is added or
  /// the buffer is closed. If the buffer is empty and closed, returns `None`
  /// immediately.
  fn dequeue(&self) -> Option<T>;

  /// Signals that no more items will be added, waking every blocked
  /// `dequeue`.
  fn close(&self);
}

impl<T, B: Buffer<T> + ?Sized> Buffer<T> for Arc<B> {
  #[inline]
  fn enqueue(&self, item: T) {
    (**self).enqueue(item)
  }

  #[inline]
  fn dequeue(&self) -> Option<T> {
    (**self).dequeue()
  }

  #[inline]
  fn close(&self) {
    (**self).close()
  }
}

impl<T, B: Buffer<T> + ?Sized> Buffer<T> for Box<B> {
  #[inline]
  fn enqueue(&self, item: T) {
    (**self).enqueue(item)
  }

  #[inline]
  fn dequeue(&self) -> Option<T> {
    (**self).dequeue()
  }

  #[inline]
  fn close(&self) {
    (**self).close()
  }
}
