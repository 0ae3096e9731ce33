//! Deferred mutation: typed action queues and structural commands.
//!
//! Systems often hold only read access to the data they want to change.
//! Rather than widening their declared access (and serializing the
//! schedule), they append requests to a queue and a dedicated consumer
//! system, ordered after the producers, applies them:
//!
//! - [`ActionQueue`] carries typed in-place mutations (damage, intents,
//!   status changes). One producer task appends, one consumer task drains;
//!   the schedule serializes the two, so the queue itself needs no locking.
//! - [`Commands`] carries structural changes (spawn, destroy, insert,
//!   remove), which no system may perform mid-tick. Pushes are lock-free
//!   from any worker; the world applies the batch at the end-of-tick
//!   barrier.

mod command;

pub use command::Commands;
pub(crate) use command::{Command, CommandQueue};

use crate::ecs::component::Component;

/// A drain-once-per-tick queue of typed actions.
///
/// Backed by a doubling vec: push is amortized O(1) and a drain keeps the
/// backing allocation, so a warmed-up queue allocates nothing in steady
/// state. Ordering holds within one queue only.
///
/// A queue is an ordinary component, so it rides entities: attach
/// `ActionQueue<AiIntent>` per agent, or one `ActionQueue<PlayerCommand>`
/// on a controller entity. The consumer system takes write access, which
/// is what places it after the producer in the schedule.
#[derive(Debug)]
pub struct ActionQueue<A> {
    actions: Vec<A>,
}

impl<A> ActionQueue<A> {
    /// An empty queue. First pushes grow it from zero.
    pub fn new() -> Self {
        Self {
            actions: Vec::new(),
        }
    }

    /// An empty queue pre-sized for `capacity` actions.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            actions: Vec::with_capacity(capacity),
        }
    }

    /// Append an action. Amortized O(1).
    #[inline]
    pub fn push(&mut self, action: A) {
        self.actions.push(action);
    }

    /// Take every queued action, in push order. The count resets to zero;
    /// the backing capacity is retained for the next tick.
    pub fn drain(&mut self) -> std::vec::Drain<'_, A> {
        self.actions.drain(..)
    }

    /// Queued actions not yet drained.
    #[inline]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Current backing capacity, in actions.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.actions.capacity()
    }
}

impl<A> Default for ActionQueue<A> {
    fn default() -> Self {
        Self::new()
    }
}

/// Queues are components. Two queues landing on the same entity in one
/// batch merge by appending, so neither side's actions are lost.
impl<A: Send + Sync + 'static> Component for ActionQueue<A> {
    const COMBINE: Option<fn(&mut Self, Self)> =
        Some(|existing, incoming| existing.actions.extend(incoming.actions));
}
