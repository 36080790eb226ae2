//! One cell of the pool's slot vector (§3 "Pooled connection", §4.E "Slot
//! allocation").

use std::time::{Duration, Instant};

use crate::channel::Channel;

/// The three states a slot can be in. `Connecting` is a fourth, transient
/// state not named directly in the spec's prose but required to reserve a
/// slot across the (lock-releasing) duration of `Channel::connect` without
/// letting two acquirers race to construct a channel for the same index.
#[derive(Default)]
pub(super) enum SlotState {
    #[default]
    Empty,
    Connecting,
    Free(Channel),
    Leased {
        channel: Channel,
        acquired_at: Instant,
        budget: Duration,
    },
}

/// A slot plus the generation counter that guards against handing a
/// force-reclaimed or already-reassigned lease back to a stale holder
/// (§5 "Deadlock avoidance" companion concern: ABA on slot reuse).
#[derive(Default)]
pub(super) struct SlotCell {
    pub state: SlotState,
    pub generation: u64,
}

impl SlotCell {
    pub fn is_free(&self) -> bool {
        matches!(self.state, SlotState::Free(_))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.state, SlotState::Empty)
    }
}
