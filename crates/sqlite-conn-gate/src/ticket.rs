//! Checkout ticket granting exclusive access to the gated resource

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use tokio::sync::OwnedMappedMutexGuard;
use tracing::{trace, warn};

use crate::gate::GateState;

/// RAII token for exclusive access to the resource behind a
/// [`ConnectionGate`](crate::ConnectionGate).
///
/// Dereferences to the resource. Hand it back with
/// [`ConnectionGate::release`](crate::ConnectionGate::release); a ticket that is
/// dropped instead is returned to the gate as well, with a warning.
#[must_use = "if unused, the connection is immediately returned to the gate"]
pub struct Ticket<C> {
   id: u64,
   released: bool,
   state: Arc<GateState>,
   // Unlocks after Drop::drop has cleared the outstanding id
   guard: OwnedMappedMutexGuard<Option<C>, C>,
}

impl<C> Ticket<C> {
   pub(crate) fn new(id: u64, guard: OwnedMappedMutexGuard<Option<C>, C>, state: Arc<GateState>) -> Self {
      Self {
         id,
         released: false,
         state,
         guard,
      }
   }

   /// Gate-unique id of this ticket
   pub fn id(&self) -> u64 {
      self.id
   }

   pub(crate) fn gate_id(&self) -> u64 {
      self.state.id
   }

   pub(crate) fn mark_released(mut self) {
      self.released = true;
   }
}

impl<C> Drop for Ticket<C> {
   fn drop(&mut self) {
      if !self.released {
         warn!(
            gate = self.state.id,
            ticket = self.id,
            "Ticket dropped without release; returning connection to the gate"
         );
      }

      let mut outstanding = self.state.outstanding.lock();
      if *outstanding == Some(self.id) {
         *outstanding = None;
      }
      trace!(gate = self.state.id, ticket = self.id, "Ticket returned");
   }
}

impl<C> Deref for Ticket<C> {
   type Target = C;

   fn deref(&self) -> &Self::Target {
      &self.guard
   }
}

impl<C> DerefMut for Ticket<C> {
   fn deref_mut(&mut self) -> &mut Self::Target {
      &mut self.guard
   }
}

impl<C> std::fmt::Debug for Ticket<C> {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.debug_struct("Ticket")
         .field("id", &self.id)
         .field("gate", &self.state.id)
         .finish_non_exhaustive()
   }
}
