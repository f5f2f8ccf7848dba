use serde::Serialize;
use types::{
    nonstandard::ExecutionStatus,
    phase0::{
        containers::Checkpoint,
        primitives::{Epoch, ExecutionBlockHash, Gwei, Slot, ValidatorIndex, H256},
    },
};

pub type Difference = i64;
pub type NodeIndex = usize;

/// A block that has passed the state transition, reduced to what fork choice needs.
///
/// The checkpoints are taken from the post-state of the block.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct NewBlock {
    pub slot: Slot,
    pub block_root: H256,
    pub parent_root: H256,
    pub state_root: H256,
    pub target_root: H256,
    pub justified_checkpoint: Checkpoint,
    pub finalized_checkpoint: Checkpoint,
    // `None` if the state transition did not compute them.
    // See `unrealized_checkpoints_of` in `store.rs` for how they are derived in that case.
    pub unrealized_checkpoints: Option<UnrealizedCheckpoints>,
    pub execution_status: ExecutionStatus,
    pub execution_payload_block_hash: Option<ExecutionBlockHash>,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct UnrealizedCheckpoints {
    pub justified: Checkpoint,
    pub finalized: Checkpoint,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BlockNode {
    pub slot: Slot,
    pub block_root: H256,
    pub parent_root: H256,
    pub state_root: H256,
    pub target_root: H256,
    pub justified_checkpoint: Checkpoint,
    pub finalized_checkpoint: Checkpoint,
    pub unrealized_justified_checkpoint: Checkpoint,
    pub unrealized_finalized_checkpoint: Checkpoint,
    pub execution_status: ExecutionStatus,
    pub execution_payload_block_hash: Option<ExecutionBlockHash>,
    pub weight: Gwei,
    pub parent: Option<NodeIndex>,
    pub best_child: Option<NodeIndex>,
    pub best_descendant: Option<NodeIndex>,
}

impl BlockNode {
    /// Creates a node with no weight and no links.
    ///
    /// Links are filled in by [`BlockTree::insert`](crate::BlockTree::insert).
    #[must_use]
    pub const fn new(
        block: NewBlock,
        unrealized_justified_checkpoint: Checkpoint,
        unrealized_finalized_checkpoint: Checkpoint,
    ) -> Self {
        let NewBlock {
            slot,
            block_root,
            parent_root,
            state_root,
            target_root,
            justified_checkpoint,
            finalized_checkpoint,
            execution_status,
            execution_payload_block_hash,
            ..
        } = block;

        Self {
            slot,
            block_root,
            parent_root,
            state_root,
            target_root,
            justified_checkpoint,
            finalized_checkpoint,
            unrealized_justified_checkpoint,
            unrealized_finalized_checkpoint,
            execution_status,
            execution_payload_block_hash,
            weight: 0,
            parent: None,
            best_child: None,
            best_descendant: None,
        }
    }

    #[must_use]
    pub const fn checkpoints(&self) -> [Checkpoint; 4] {
        [
            self.justified_checkpoint,
            self.finalized_checkpoint,
            self.unrealized_justified_checkpoint,
            self.unrealized_finalized_checkpoint,
        ]
    }
}

/// Read-only view of a [`BlockNode`] with links resolved to block roots.
#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
pub struct NodeSnapshot {
    pub slot: Slot,
    pub block_root: H256,
    pub parent_root: H256,
    pub state_root: H256,
    pub target_root: H256,
    pub justified_checkpoint: Checkpoint,
    pub finalized_checkpoint: Checkpoint,
    pub unrealized_justified_checkpoint: Checkpoint,
    pub unrealized_finalized_checkpoint: Checkpoint,
    pub weight: Gwei,
    pub parent: Option<H256>,
    pub best_child: Option<H256>,
    pub best_descendant: Option<H256>,
    pub execution_status: ExecutionStatus,
    pub execution_payload_block_hash: Option<ExecutionBlockHash>,
}

/// Store-wide values that decide whether a node may become the head.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Viability {
    pub justified_checkpoint: Checkpoint,
    pub finalized_checkpoint: Checkpoint,
    pub current_epoch: Epoch,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
pub struct LatestMessage {
    pub epoch: Epoch,
    pub root: H256,
}

#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct ProposerBoost {
    pub root: H256,
    pub score: Gwei,
}

/// A single validator's vote extracted from a verified attestation.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct AttestationVote {
    pub validator_index: ValidatorIndex,
    pub slot: Slot,
    pub target_epoch: Epoch,
    pub beacon_block_root: H256,
    pub effective_balance: Gwei,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AttestationAction {
    Accept,
    DelayUntilSlot,
    Ignore,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ApplyTickChanges {
    TickUpdated,
    SlotUpdated { finalized_checkpoint_updated: bool },
}
