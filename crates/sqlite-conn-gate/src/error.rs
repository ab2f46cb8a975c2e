//! Error types for sqlite-conn-gate

use std::time::Duration;

use thiserror::Error;

/// Errors that may occur when checking a resource out of a [`ConnectionGate`]
///
/// [`ConnectionGate`]: crate::ConnectionGate
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
   /// The gate has no resource installed yet
   #[error("Connection gate has not been opened")]
   NotOpen,

   /// `open` was called on a gate that already holds (or held) a resource
   #[error("Connection gate has already been opened")]
   AlreadyOpen,

   /// The gate has been closed and cannot be used
   #[error("Connection gate has been closed")]
   Closed,

   /// No ticket was granted within the requested duration
   #[error("Timed out after {0:?} waiting for the connection")]
   AcquireTimeout(Duration),

   /// A ticket was released to a gate that did not issue it, or that has a
   /// different ticket outstanding
   #[error("Ticket {ticket} is not the outstanding ticket of this gate (outstanding: {outstanding:?})")]
   UnknownTicket {
      ticket: u64,
      outstanding: Option<u64>,
   },
}

/// A type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;
