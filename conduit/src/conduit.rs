// src/conduit.rs

//! Orchestration of a conduit.
//!
//! Every conduit runs two relay threads around its buffer:
//!
//! ```text
//! Sender ──► intake relay ──► Buffer ──► outtake relay ──► Receiver
//! ```
//!
//! The intake relay moves each sent value into the buffer, reports it to the
//! outlet as pending, and closes the buffer once every sender is gone. The
//! outtake relay waits until a receiver is waiting and an item is pending,
//! pulls the next item out of the buffer and hands it over, and closes the
//! receiving side once the buffer is drained and closed or the receiver
//! cancels.

use crate::buffer::{Buffer, Fifo};
use crate::builder::ConduitBuilder;
use crate::error::BuildError;
use crate::inlet::{Inlet, Sender};
use crate::outlet::{Outlet, Receiver};
use crate::telemetry::{self, names};

use std::sync::Arc;
use std::thread;

/// Creates a conduit that delivers items in the order they were sent.
///
/// Equivalent to `with_buffer(Fifo::new())`.
///
/// # Panics
///
/// Panics if the OS fails to spawn a relay thread, like [`std::thread::spawn`].
/// Use [`ConduitBuilder`] to handle that case.
///
/// # Examples
///
/// ```
/// let (tx, mut rx) = fibre_conduit::unbounded();
/// tx.send("a").unwrap();
/// tx.send("b").unwrap();
/// drop(tx);
/// assert_eq!(rx.recv(), Ok("a"));
/// assert_eq!(rx.recv(), Ok("b"));
/// assert!(rx.recv().is_err());
/// ```
pub fn unbounded<T: Send + 'static>() -> (Sender<T>, Receiver<T>) {
  with_buffer(Fifo::new())
}

/// Creates a conduit over the given buffer, which decides the order in which
/// pending items are delivered.
///
/// # Panics
///
/// Panics if the OS fails to spawn a relay thread.
///
/// # Examples
///
/// ```
/// use fibre_conduit::buffer::Heap;
///
/// let (tx, mut rx) = fibre_conduit::with_buffer(Heap::new());
/// for v in [2, 1, 0] {
///   tx.send(v).unwrap();
/// }
/// drop(tx);
/// assert_eq!(rx.by_ref().collect::<Vec<_>>(), vec![0, 1, 2]);
/// ```
pub fn with_buffer<T, B>(buffer: B) -> (Sender<T>, Receiver<T>)
where
  T: Send + 'static,
  B: Buffer<T> + 'static,
{
  match ConduitBuilder::new().buffer(buffer).build() {
    Ok(pair) => pair,
    Err(err) => panic!("{}", err),
  }
}

/// Relay thread settings resolved by the builder.
#[derive(Debug, Clone)]
pub(crate) struct RelayConfig {
  pub(crate) name: String,
  pub(crate) stack_size: Option<usize>,
}

impl RelayConfig {
  fn thread(&self, role: &str) -> thread::Builder {
    let builder = thread::Builder::new().name(format!("{}-{}", self.name, role));
    match self.stack_size {
      Some(size) => builder.stack_size(size),
      None => builder,
    }
  }
}

/// Spawns both relays around `buffer` and returns the endpoints.
pub(crate) fn launch<T: Send + 'static>(
  buffer: Arc<dyn Buffer<T>>,
  config: &RelayConfig,
) -> Result<(Sender<T>, Receiver<T>), BuildError> {
  let inlet = Arc::new(Inlet::new());
  let outlet = Arc::new(Outlet::new());
  let sender = Sender::new(Arc::clone(&inlet));
  let receiver = Receiver {
    outlet: Arc::clone(&outlet),
  };

  {
    let outlet = Arc::clone(&outlet);
    let buffer = Arc::clone(&buffer);
    config
      .thread("intake")
      .spawn(move || run_intake(inlet, outlet, buffer))
      .map_err(|err| spawn_failed("intake", err))?;
  }
  // On failure `sender` is dropped on return, which lets the intake relay
  // close the buffer and exit.
  config
    .thread("outtake")
    .spawn(move || run_outtake(outlet, buffer))
    .map_err(|err| spawn_failed("outtake", err))?;

  Ok((sender, receiver))
}

fn spawn_failed(role: &str, err: std::io::Error) -> BuildError {
  tracing::warn!(role, error = %err, "failed to spawn conduit relay");
  BuildError::Spawn(err)
}

/// Ends input however the intake relay exits, including on unwind: marks the
/// inlet dead so no sender waits on it forever, then closes the buffer and
/// tells the outlet.
struct IntakeExit<'a, T> {
  inlet: &'a Inlet<T>,
  outlet: &'a Outlet<T>,
  buffer: &'a dyn Buffer<T>,
}

impl<T> Drop for IntakeExit<'_, T> {
  fn drop(&mut self) {
    self.inlet.relay_exited();
    self.buffer.close();
    self.outlet.close_input();
    telemetry::log_event(names::INTAKE, names::BUFFER_CLOSED, None);
  }
}

fn run_intake<T: Send + 'static>(
  inlet: Arc<Inlet<T>>,
  outlet: Arc<Outlet<T>>,
  buffer: Arc<dyn Buffer<T>>,
) {
  let _exit = IntakeExit {
    inlet: &inlet,
    outlet: &outlet,
    buffer: &*buffer,
  };
  tracing::debug!("intake relay started");

  while let Some(item) = inlet.take() {
    buffer.enqueue(item);
    outlet.item_enqueued();
    telemetry::increment_counter(names::INTAKE, names::ENQUEUED);
    tracing::trace!("item enqueued");
    inlet.accept();
  }

  tracing::debug!("intake relay finished: every sender closed");
}

/// Closes the receiving side exactly once, however the outtake relay exits.
struct OuttakeExit<'a, T>(&'a Outlet<T>);

impl<T> Drop for OuttakeExit<'_, T> {
  fn drop(&mut self) {
    self.0.close();
    telemetry::log_event(names::OUTTAKE, names::OUTLET_CLOSED, None);
  }
}

fn run_outtake<T: Send + 'static>(outlet: Arc<Outlet<T>>, buffer: Arc<dyn Buffer<T>>) {
  let _exit = OuttakeExit(&outlet);
  tracing::debug!("outtake relay started");

  while outlet.wait_for_demand() {
    let Some(item) = buffer.dequeue() else {
      tracing::debug!("outtake relay finished: buffer drained and closed");
      return;
    };

    match outlet.deliver(item) {
      Ok(()) => {
        tracing::trace!("item delivered");
        telemetry::increment_counter(names::OUTTAKE, names::DELIVERED);
      }
      Err(undelivered) => {
        drop(undelivered);
        telemetry::increment_counter(names::OUTTAKE, names::DROPPED);
        tracing::debug!("outtake relay finished: cancelled during delivery");
        return;
      }
    }
  }

  tracing::debug!("outtake relay finished: cancelled");
}
