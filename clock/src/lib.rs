//! Slot clock types for fork choice.
//!
//! A slot is divided into three intervals. Each interval is represented by a [`TickKind`].
//! The fork choice store only needs to know which interval it is in to decide whether a block is
//! timely enough to receive proposer boost and when attestations from the previous slot may be
//! applied.
//!
//! Producing ticks on a timer is the responsibility of the caller.

use helper_functions::misc;
use serde::{Deserialize, Serialize};
use types::{
    phase0::primitives::{Epoch, Slot},
    preset::Preset,
};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Deserialize, Serialize)]
pub struct Tick {
    pub slot: Slot,
    pub kind: TickKind,
}

impl Tick {
    #[must_use]
    pub const fn new(slot: Slot, kind: TickKind) -> Self {
        Self { slot, kind }
    }

    #[must_use]
    pub const fn start_of_slot(slot: Slot) -> Self {
        Self::new(slot, TickKind::Propose)
    }

    #[must_use]
    pub fn epoch<P: Preset>(self) -> Epoch {
        misc::compute_epoch_at_slot::<P>(self.slot)
    }

    #[must_use]
    pub const fn is_before_attesting_interval(self) -> bool {
        matches!(self.kind, TickKind::Propose)
    }
}

/// One variant per interval of a slot.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Deserialize, Serialize)]
pub enum TickKind {
    Propose,
    Attest,
    Aggregate,
}
