//! # sqlite-conn-gate
//!
//! A small async gate that hands out a single connection to one caller at a
//! time, for engines (like an embedded SQLite handle) that must never be used
//! concurrently but sit under a layer that expects a connection pool.
//!
//! ## Core Types
//!
//! - **[`ConnectionGate`]**: Owns the resource and queues callers fairly
//! - **[`Ticket`]**: RAII checkout token that dereferences to the resource
//! - **[`Error`]**: Error type for gate misuse and lifecycle violations
//!
//! ## Guarantees
//!
//! - **One holder**: at most one ticket is outstanding at any instant
//! - **FIFO**: waiters are granted the ticket in arrival order
//! - **Cancellation-safe**: an abandoned `acquire()` leaves no phantom slot
//! - **Loud misuse**: foreign tickets and use after close are errors
//!
//! ```
//! use sqlite_conn_gate::ConnectionGate;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> sqlite_conn_gate::Result<()> {
//!    let gate = ConnectionGate::new();
//!    gate.open(String::from("connection")).await?;
//!
//!    let ticket = gate.acquire().await?;
//!    assert_eq!(ticket.as_str(), "connection");
//!    gate.release(ticket)?;
//!    Ok(())
//! }
//! ```

mod error;
mod gate;
mod ticket;

pub use error::{Error, Result};
pub use gate::ConnectionGate;
pub use ticket::Ticket;
