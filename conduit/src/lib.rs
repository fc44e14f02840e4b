//! Unbounded, dynamically-buffered conduits for Rust.
//!
//! A conduit pairs a [`Sender`] that never waits on the consumer with a
//! [`Receiver`] that blocks until an item is available or the conduit is
//! drained and closed. Pending items live in a pluggable [`Buffer`]: the
//! default [`Fifo`](buffer::Fifo) preserves send order, while
//! [`Heap`](buffer::Heap) turns the conduit into a priority queue.
//!
//! ```
//! use fibre_conduit::buffer::Heap;
//!
//! let (tx, mut rx) = fibre_conduit::with_buffer(Heap::new());
//! tx.send(2).unwrap();
//! tx.send(1).unwrap();
//! tx.send(0).unwrap();
//! drop(tx);
//!
//! assert_eq!(rx.recv(), Ok(0));
//! assert_eq!(rx.recv(), Ok(1));
//! assert_eq!(rx.recv(), Ok(2));
//! assert!(rx.recv().is_err());
//! ```

pub mod buffer;
pub mod error;
pub mod telemetry;

mod builder;
mod conduit;
mod inlet;
mod outlet;

pub use buffer::Buffer;
pub use builder::{ConduitBuilder, DEFAULT_RELAY_NAME};
pub use conduit::{unbounded, with_buffer};
pub use error::{BuildError, CloseError, RecvError, RecvErrorTimeout, SendError};
pub use inlet::Sender;
pub use outlet::{AsyncReceiver, Receiver, RecvFuture};
