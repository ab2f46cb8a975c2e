//! Single-holder gate serializing access to one connection

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::ticket::Ticket;

static NEXT_GATE_ID: AtomicU64 = AtomicU64::new(1);

/// Bookkeeping shared between a gate and the tickets it issues.
#[derive(Debug)]
pub(crate) struct GateState {
   /// Process-unique id, used to reject tickets issued by another gate
   pub(crate) id: u64,

   next_ticket: AtomicU64,

   /// Id of the ticket currently checked out, if any
   pub(crate) outstanding: Mutex<Option<u64>>,

   opened: AtomicBool,
   closed: AtomicBool,

   /// Number of `acquire` calls currently queued
   waiting: AtomicUsize,
}

impl GateState {
   fn new() -> Self {
      Self {
         id: NEXT_GATE_ID.fetch_add(1, Ordering::Relaxed),
         next_ticket: AtomicU64::new(1),
         outstanding: Mutex::new(None),
         opened: AtomicBool::new(false),
         closed: AtomicBool::new(false),
         waiting: AtomicUsize::new(0),
      }
   }
}

/// Decrements the waiter count when an `acquire` is granted or abandoned.
struct WaitingGuard<'a>(&'a GateState);

impl<'a> WaitingGuard<'a> {
   fn enter(state: &'a GateState) -> Self {
      state.waiting.fetch_add(1, Ordering::SeqCst);
      Self(state)
   }
}

impl Drop for WaitingGuard<'_> {
   fn drop(&mut self) {
      self.0.waiting.fetch_sub(1, Ordering::SeqCst);
   }
}

/// Serializes access to a single resource across any number of async callers.
///
/// ## Architecture
///
/// The resource lives in a slot behind tokio's fair mutex, so queued callers are
/// granted access strictly in arrival order. Each grant is wrapped in a
/// [`Ticket`] that carries a gate-unique id; the gate records which id is
/// outstanding so that [`release`](Self::release) can reject tickets it never
/// issued.
///
/// ## Lifecycle
///
/// ```text
/// 1. new()      - empty gate, acquire fails with NotOpen
/// 2. open(c)    - installs the resource
/// 3. acquire()  - waits for the slot, returns a Ticket
/// 4. release(t) - returns the slot and wakes the next waiter
/// 5. close()    - waits for the holder, takes the resource out for good
/// ```
///
/// Dropping an `acquire()` future before it resolves removes the caller from the
/// queue. Dropping a granted ticket returns it to the gate just like `release`.
#[derive(Debug)]
pub struct ConnectionGate<C> {
   slot: Arc<AsyncMutex<Option<C>>>,
   state: Arc<GateState>,
}

impl<C> ConnectionGate<C> {
   /// Create an empty gate. Call [`open`](Self::open) before acquiring.
   pub fn new() -> Self {
      Self {
         slot: Arc::new(AsyncMutex::new(None)),
         state: Arc::new(GateState::new()),
      }
   }

   /// Create a gate that already holds `resource`.
   pub fn with_resource(resource: C) -> Self {
      let state = GateState::new();
      state.opened.store(true, Ordering::SeqCst);
      Self {
         slot: Arc::new(AsyncMutex::new(Some(resource))),
         state: Arc::new(state),
      }
   }

   /// Install the guarded resource. A gate can only be opened once.
   pub async fn open(&self, resource: C) -> Result<()> {
      if self.state.closed.load(Ordering::SeqCst) {
         return Err(Error::Closed);
      }

      let mut slot = self.slot.lock().await;
      if self.state.opened.swap(true, Ordering::SeqCst) {
         return Err(Error::AlreadyOpen);
      }

      *slot = Some(resource);
      debug!(gate = self.state.id, "Connection gate opened");
      Ok(())
   }

   /// Wait until no other ticket is outstanding and check the resource out.
   pub async fn acquire(&self) -> Result<Ticket<C>> {
      if self.state.closed.load(Ordering::SeqCst) {
         return Err(Error::Closed);
      }

      let guard = {
         let _waiting = WaitingGuard::enter(&self.state);
         trace!(gate = self.state.id, "Waiting for connection");
         Arc::clone(&self.slot).lock_owned().await
      };

      self.grant(guard)
   }

   /// Like [`acquire`](Self::acquire), but gives up after `timeout`.
   ///
   /// A timed out caller leaves the wait queue; it never holds a slot.
   pub async fn acquire_timeout(&self, timeout: Duration) -> Result<Ticket<C>> {
      match tokio::time::timeout(timeout, self.acquire()).await {
         Ok(ticket) => ticket,
         Err(_) => {
            debug!(gate = self.state.id, ?timeout, "Timed out waiting for connection");
            Err(Error::AcquireTimeout(timeout))
         }
      }
   }

   fn grant(&self, guard: OwnedMutexGuard<Option<C>>) -> Result<Ticket<C>> {
      // Waiters queued before close() still reach the slot; they must not use it
      if self.state.closed.load(Ordering::SeqCst) {
         return Err(Error::Closed);
      }

      let guard = OwnedMutexGuard::try_map(guard, |slot| slot.as_mut()).map_err(|_| {
         if self.state.closed.load(Ordering::SeqCst) {
            Error::Closed
         } else {
            Error::NotOpen
         }
      })?;

      let id = self.state.next_ticket.fetch_add(1, Ordering::Relaxed);
      {
         let mut outstanding = self.state.outstanding.lock();
         debug_assert!(outstanding.is_none(), "two tickets outstanding at once");
         *outstanding = Some(id);
      }

      trace!(gate = self.state.id, ticket = id, "Ticket granted");
      Ok(Ticket::new(id, guard, Arc::clone(&self.state)))
   }

   /// Return a ticket to the gate, waking the next waiter if any.
   ///
   /// Fails with [`Error::UnknownTicket`] when the ticket was issued by another
   /// gate; this gate's state is left untouched in that case.
   pub fn release(&self, ticket: Ticket<C>) -> Result<()> {
      let outstanding = *self.state.outstanding.lock();

      if ticket.gate_id() != self.state.id || outstanding != Some(ticket.id()) {
         return Err(Error::UnknownTicket {
            ticket: ticket.id(),
            outstanding,
         });
      }

      ticket.mark_released();
      Ok(())
   }

   /// Close the gate and take the resource back out.
   ///
   /// Waits for the current ticket holder to finish. Callers already queued,
   /// and every later `acquire`, fail with [`Error::Closed`].
   pub async fn close(&self) -> Result<Option<C>> {
      if self.state.closed.swap(true, Ordering::SeqCst) {
         return Err(Error::Closed);
      }

      let mut slot = self.slot.lock().await;
      debug!(gate = self.state.id, "Connection gate closed");
      Ok(slot.take())
   }

   /// Returns true once [`close`](Self::close) has been called
   pub fn is_closed(&self) -> bool {
      self.state.closed.load(Ordering::SeqCst)
   }

   /// Returns true while a ticket is checked out
   pub fn is_checked_out(&self) -> bool {
      self.state.outstanding.lock().is_some()
   }

   /// Number of callers currently queued in `acquire`
   pub fn waiting(&self) -> usize {
      self.state.waiting.load(Ordering::SeqCst)
   }
}

impl<C> Default for ConnectionGate<C> {
   fn default() -> Self {
      Self::new()
   }
}

impl<C> Clone for ConnectionGate<C> {
   fn clone(&self) -> Self {
      Self {
         slot: Arc::clone(&self.slot),
         state: Arc::clone(&self.state),
      }
   }
}
