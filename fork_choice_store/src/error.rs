use thiserror::Error;
use types::{
    nonstandard::ExecutionStatus,
    phase0::primitives::{Epoch, Slot, ValidatorIndex, H256},
};

use crate::misc::NodeIndex;

#[derive(Debug, Error)]
pub enum Error {
    #[error(
        "attestation votes for a block newer than the attestation \
         (beacon_block_root: {beacon_block_root:?}, block_slot: {block_slot}, slot: {slot})"
    )]
    AttestationForFutureBlock {
        beacon_block_root: H256,
        block_slot: Slot,
        slot: Slot,
    },
    #[error(
        "attestation targets an epoch from the future \
         (target_epoch: {target_epoch}, current_epoch: {current_epoch})"
    )]
    AttestationForFutureEpoch {
        target_epoch: Epoch,
        current_epoch: Epoch,
    },
    #[error(
        "attestation targets an epoch before the previous one \
         (target_epoch: {target_epoch}, current_epoch: {current_epoch})"
    )]
    AttestationForPastEpoch {
        target_epoch: Epoch,
        current_epoch: Epoch,
    },
    #[error(
        "attestation target epoch does not match its slot \
         (target_epoch: {target_epoch}, slot_epoch: {slot_epoch})"
    )]
    AttestationTargetEpochMismatch {
        target_epoch: Epoch,
        slot_epoch: Epoch,
    },
    #[error(
        "block is not newer than the latest finalized block \
         (block_root: {block_root:?}, slot: {slot}, finalized_slot: {finalized_slot})"
    )]
    BlockAtOrBeforeFinalizedSlot {
        block_root: H256,
        slot: Slot,
        finalized_slot: Slot,
    },
    #[error("delta would overflow weight of node {node_index}")]
    DeltaOverflow { node_index: NodeIndex },
    #[error(
        "block is from the future \
         (block_root: {block_root:?}, slot: {slot}, current_slot: {current_slot})"
    )]
    FutureSlot {
        block_root: H256,
        slot: Slot,
        current_slot: Slot,
    },
    #[error("pruning would leave a dangling index (node_index: {node_index})")]
    IndexOverflow { node_index: NodeIndex },
    #[error("number of deltas does not match number of nodes (deltas: {deltas}, nodes: {nodes})")]
    InvalidDeltaLength { deltas: usize, nodes: usize },
    #[error(
        "execution status of block cannot be changed \
         (block_root: {block_root:?}, old: {old}, new: {new})"
    )]
    InvalidExecutionStatusTransition {
        block_root: H256,
        old: ExecutionStatus,
        new: ExecutionStatus,
    },
    #[error("node index is out of bounds: {node_index}")]
    InvalidNodeIndex { node_index: NodeIndex },
    #[error("no viable head found (start_root: {start_root:?}, best_root: {best_root:?})")]
    NoViableHead { start_root: H256, best_root: H256 },
    #[error(
        "block does not descend from the finalized checkpoint \
         (block_root: {block_root:?}, finalized_root: {finalized_root:?})"
    )]
    NotFinalizedDescendant {
        block_root: H256,
        finalized_root: H256,
    },
    #[error(
        "parent of block has an invalid execution payload \
         (block_root: {block_root:?}, parent_root: {parent_root:?})"
    )]
    ParentPayloadInvalid { block_root: H256, parent_root: H256 },
    #[error(
        "block is not newer than its parent \
         (block_root: {block_root:?}, slot: {slot}, parent_slot: {parent_slot})"
    )]
    SlotNotAfterParent {
        block_root: H256,
        slot: Slot,
        parent_slot: Slot,
    },
    #[error("checkpoint block is not in the block tree: {root:?}")]
    UnknownAncestorForCheckpoint { root: H256 },
    #[error("block is not in the block tree: {block_root:?}")]
    UnknownBlock { block_root: H256 },
    #[error(
        "parent of block is not in the block tree \
         (block_root: {block_root:?}, parent_root: {parent_root:?})"
    )]
    UnknownParent { block_root: H256, parent_root: H256 },
    #[error("validator index does not fit in usize: {validator_index}")]
    ValidatorIndexOverflow { validator_index: ValidatorIndex },
}
