// src/builder.rs

use crate::buffer::{Buffer, Fifo};
use crate::conduit::{self, RelayConfig};
use crate::error::BuildError;
use crate::inlet::Sender;
use crate::outlet::{AsyncReceiver, Receiver};

use core::fmt;
use std::sync::Arc;

/// Prefix of the relay thread names when none is configured.
pub const DEFAULT_RELAY_NAME: &str = "fibre-conduit";

/// A builder for conduits with a custom buffer or relay thread settings.
///
/// ```
/// use fibre_conduit::buffer::Heap;
/// use fibre_conduit::ConduitBuilder;
///
/// let (tx, mut rx) = ConduitBuilder::new()
///   .buffer(Heap::with_less(|a: &u32, b: &u32| a > b))
///   .name("jobs")
///   .build()
///   .expect("spawn relays");
/// tx.send(1).unwrap();
/// tx.send(5).unwrap();
/// assert_eq!(rx.recv(), Ok(5));
/// ```
pub struct ConduitBuilder<T> {
  buffer: Option<Arc<dyn Buffer<T>>>,
  name: String,
  stack_size: Option<usize>,
}

// Manual Debug implementation: the buffer is a trait object.
impl<T> fmt::Debug for ConduitBuilder<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ConduitBuilder")
      .field("has_custom_buffer", &self.buffer.is_some())
      .field("name", &self.name)
      .field("stack_size", &self.stack_size)
      .finish()
  }
}

impl<T: Send + 'static> Default for ConduitBuilder<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T: Send + 'static> ConduitBuilder<T> {
  /// Creates a builder for a FIFO conduit with default relay settings.
  pub fn new() -> Self {
    Self {
      buffer: None,
      name: DEFAULT_RELAY_NAME.to_string(),
      stack_size: None,
    }
  }

  /// Sets the buffer that holds pending items and decides delivery order.
  /// Defaults to [`Fifo`].
  pub fn buffer<B: Buffer<T> + 'static>(mut self, buffer: B) -> Self {
    let buffer: Arc<dyn Buffer<T>> = Arc::new(buffer);
    self.buffer = Some(buffer);
    self
  }

  /// Sets the relay thread name prefix. The relays are named
  /// `<name>-intake` and `<name>-outtake`.
  pub fn name(mut self, name: impl Into<String>) -> Self {
    self.name = name.into();
    self
  }

  /// Sets the stack size of both relay threads, in bytes.
  pub fn stack_size(mut self, size: usize) -> Self {
    self.stack_size = Some(size);
    self
  }

  fn validate(&self) -> Result<(), BuildError> {
    if self.name.contains('\0') {
      return Err(BuildError::InvalidThreadName);
    }
    Ok(())
  }

  /// Spawns the relays and returns the endpoints of a conduit with a
  /// synchronous receiver.
  pub fn build(self) -> Result<(Sender<T>, Receiver<T>), BuildError> {
    self.validate()?;
    let config = RelayConfig {
      name: self.name,
      stack_size: self.stack_size,
    };
    let buffer: Arc<dyn Buffer<T>> = match self.buffer {
      Some(buffer) => buffer,
      None => Arc::new(Fifo::new()),
    };
    conduit::launch(buffer, &config)
  }

  /// Like [`build`](ConduitBuilder::build), with an asynchronous receiver.
  pub fn build_async(self) -> Result<(Sender<T>, AsyncReceiver<T>), BuildError> {
    let (tx, rx) = self.build()?;
    Ok((tx, rx.to_async()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::buffer::Heap;

  #[test]
  fn rejects_nul_in_thread_name() {
    let err = ConduitBuilder::<u8>::new().name("bad\0name").build().unwrap_err();
    assert!(matches!(err, BuildError::InvalidThreadName));
  }

  #[test]
  fn builds_with_custom_settings() {
    let (tx, mut rx) = ConduitBuilder::new()
      .name("named")
      .stack_size(256 * 1024)
      .build()
      .unwrap();
    tx.send(()).unwrap();
    assert_eq!(rx.recv(), Ok(()));
    let dbg = format!("{:?}", ConduitBuilder::<u8>::new().buffer(Heap::new()));
    assert!(dbg.contains("has_custom_buffer: true"));
  }
}
