use arithmetic::U64Ext as _;
use typenum::Unsigned as _;
use types::{
    phase0::primitives::{Epoch, Gwei, Slot},
    preset::Preset,
};

#[must_use]
pub fn compute_epoch_at_slot<P: Preset>(slot: Slot) -> Epoch {
    slot.div_typenum::<P::SlotsPerEpoch>()
}

#[must_use]
pub const fn compute_start_slot_at_epoch<P: Preset>(epoch: Epoch) -> Slot {
    epoch.saturating_mul(P::SlotsPerEpoch::U64)
}

#[must_use]
pub fn is_epoch_start<P: Preset>(slot: Slot) -> bool {
    slots_since_epoch_start::<P>(slot) == 0
}

// `consensus-specs` uses this in at least 2 places:
// - <https://github.com/ethereum/consensus-specs/blob/v1.3.0/specs/phase0/fork-choice.md#compute_slots_since_epoch_start>
// - <https://github.com/ethereum/consensus-specs/blob/v1.3.0/specs/phase0/validator.md#broadcast-attestation>
#[must_use]
pub fn slots_since_epoch_start<P: Preset>(slot: Slot) -> u64 {
    slot.mod_typenum::<P::SlotsPerEpoch>()
}

// Saturates at `GENESIS_EPOCH`.
#[must_use]
pub fn previous_epoch<P: Preset>(slot: Slot) -> Epoch {
    compute_epoch_at_slot::<P>(slot).saturating_sub(1)
}

/// Weight of the attesters assigned to a single slot.
///
/// See [`get_proposer_score`](https://github.com/ethereum/consensus-specs/blob/v1.4.0/specs/phase0/fork-choice.md#get_proposer_score).
#[must_use]
pub fn committee_weight<P: Preset>(total_active_balance: Gwei) -> Gwei {
    total_active_balance.div_typenum::<P::SlotsPerEpoch>()
}
