// src/error.rs

use core::fmt;
use std::io;

// Implements `into_inner`, `Display` and `Error` for enums whose every variant
// carries the rejected value back to the caller.
macro_rules! impl_error_for_enum_with_inner {
    (
        $enum_name:ident < $generic_param:ident >,
        $($variant:ident ( $message:expr ) ),+
        $(,)?
    ) => {
        impl<$generic_param> $enum_name<$generic_param> {
            /// Consumes the error, returning the value that could not be sent.
            #[inline]
            pub fn into_inner(self) -> $generic_param {
                match self {
                    $( $enum_name::$variant(v) => v, )+
                }
            }
        }

        impl<$generic_param> fmt::Display for $enum_name<$generic_param> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $( $enum_name::$variant(_) => f.write_str($message), )+
                }
            }
        }

        impl<$generic_param> std::error::Error for $enum_name<$generic_param> {}
    };
}

/// Error returned by [`Sender::send`](crate::Sender::send) when the value
/// could not be handed to the conduit. The value is returned.
#[derive(PartialEq, Eq, Clone)]
pub enum SendError<T> {
  /// This sender handle was closed, or the intake relay is no longer running.
  Closed(T),
}

// Not derived: `T` need not be `Debug` for the error to be printable.
impl<T> fmt::Debug for SendError<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SendError::Closed(_) => write!(f, "SendError::Closed(..)"),
    }
  }
}

impl_error_for_enum_with_inner!(
  SendError<T>,
  Closed("conduit closed"),
);

/// Error returned by blocking and async receive operations.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RecvError {
  /// The conduit is drained and every sender has closed, or the receiving
  /// side was closed. This state is terminal.
  Disconnected,
}
impl std::error::Error for RecvError {}
impl fmt::Display for RecvError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RecvError::Disconnected => write!(f, "conduit disconnected (drained and closed)"),
    }
  }
}

/// Error returned by `recv_timeout` operations.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RecvErrorTimeout {
  /// The conduit is drained and closed, or the receiving side was closed.
  Disconnected,
  /// The timeout elapsed before an item could be received.
  Timeout,
}

impl std::error::Error for RecvErrorTimeout {}
impl fmt::Display for RecvErrorTimeout {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RecvErrorTimeout::Disconnected => write!(f, "conduit disconnected"),
      RecvErrorTimeout::Timeout => write!(f, "receive operation timed out"),
    }
  }
}

impl From<RecvError> for RecvErrorTimeout {
  fn from(err: RecvError) -> Self {
    match err {
      RecvError::Disconnected => RecvErrorTimeout::Disconnected,
    }
  }
}

/// Error returned when attempting to close an already closed sender handle.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct CloseError;
impl std::error::Error for CloseError {}
impl fmt::Display for CloseError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "sender is already closed")
  }
}

/// Error returned by [`ConduitBuilder::build`](crate::ConduitBuilder::build).
#[derive(Debug)]
pub enum BuildError {
  /// The relay thread name contains an interior NUL byte.
  InvalidThreadName,
  /// The operating system refused to spawn a relay thread.
  Spawn(io::Error),
}

impl fmt::Display for BuildError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BuildError::InvalidThreadName => write!(f, "relay thread name must not contain NUL bytes"),
      BuildError::Spawn(err) => write!(f, "failed to spawn conduit relay thread: {}", err),
    }
  }
}

impl std::error::Error for BuildError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      BuildError::Spawn(err) => Some(err),
      BuildError::InvalidThreadName => None,
    }
  }
}

impl From<io::Error> for BuildError {
  fn from(err: io::Error) -> Self {
    BuildError::Spawn(err)
  }
}
