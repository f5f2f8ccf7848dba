use std::sync::Arc;

use anyhow::{bail, ensure, Result};
use arithmetic::I64Ext as _;
use clock::Tick;
use helper_functions::misc;
use im::Vector;
use itertools::Itertools as _;
use log::{debug, info, warn};
use types::{
    config::Config as ChainConfig,
    nonstandard::{ExecutionStatus, PayloadStatus},
    phase0::{
        containers::Checkpoint,
        primitives::{Epoch, ExecutionBlockHash, Gwei, Slot, ValidatorIndex, H256},
    },
    preset::Preset,
};

use crate::{
    error::Error,
    misc::{
        ApplyTickChanges, AttestationAction, AttestationVote, BlockNode, LatestMessage, NewBlock,
        NodeSnapshot, ProposerBoost, Viability,
    },
    proto_array::BlockTree,
    store_config::StoreConfig,
    votes::VoteRegistry,
};

/// [`Store`] from the Fork Choice specification.
///
/// [`Store`]: https://github.com/ethereum/consensus-specs/blob/v1.4.0/specs/phase0/fork-choice.md#store
#[derive(Clone)]
pub struct Store<P: Preset> {
    chain_config: Arc<ChainConfig>,
    store_config: StoreConfig,
    tick: Tick,
    justified_checkpoint: Checkpoint,
    finalized_checkpoint: Checkpoint,
    unrealized_justified_checkpoint: Checkpoint,
    unrealized_finalized_checkpoint: Checkpoint,
    // Zero when no block is boosted, as in `consensus-specs`.
    // The root is kept even if the boosted block is pruned.
    proposer_boost_root: H256,
    proposer_boost_expiry_slot: Slot,
    // The boost included in the weights currently stored in `Store.block_tree`.
    // It has to be subtracted before a new one is added.
    previous_proposer_boost: ProposerBoost,
    block_tree: BlockTree<P>,
    votes: VoteRegistry,
    justified_balances: Vector<Gwei>,
    // Attestations cannot affect fork choice until their slots have passed.
    // This field is used to store them in the meantime.
    queued_attestations: Vector<AttestationVote>,
    head: H256,
}

impl<P: Preset> Store<P> {
    /// [`get_forkchoice_store`](https://github.com/ethereum/consensus-specs/blob/v1.4.0/specs/phase0/fork-choice.md#get_forkchoice_store)
    ///
    /// The anchor becomes both the justified and the finalized checkpoint.
    pub fn new(
        chain_config: Arc<ChainConfig>,
        store_config: StoreConfig,
        anchor: NewBlock,
    ) -> Result<Self> {
        chain_config.validate()?;

        let epoch = misc::compute_epoch_at_slot::<P>(anchor.slot);
        let checkpoint = Checkpoint::new(epoch, anchor.block_root);

        let viability = Viability {
            justified_checkpoint: checkpoint,
            finalized_checkpoint: checkpoint,
            current_epoch: epoch,
        };

        let mut block_tree = BlockTree::new(store_config.prune_threshold);

        block_tree.insert(BlockNode::new(anchor, checkpoint, checkpoint), &viability)?;

        Ok(Self {
            chain_config,
            store_config,
            tick: Tick::start_of_slot(anchor.slot),
            justified_checkpoint: checkpoint,
            finalized_checkpoint: checkpoint,
            unrealized_justified_checkpoint: checkpoint,
            unrealized_finalized_checkpoint: checkpoint,
            proposer_boost_root: H256::zero(),
            proposer_boost_expiry_slot: anchor.slot,
            previous_proposer_boost: ProposerBoost::default(),
            block_tree,
            votes: VoteRegistry::default(),
            justified_balances: Vector::new(),
            queued_attestations: Vector::new(),
            head: anchor.block_root,
        })
    }

    #[must_use]
    pub fn chain_config(&self) -> &ChainConfig {
        &self.chain_config
    }

    #[must_use]
    pub const fn store_config(&self) -> StoreConfig {
        self.store_config
    }

    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    #[must_use]
    pub const fn slot(&self) -> Slot {
        self.tick.slot
    }

    #[must_use]
    pub fn current_epoch(&self) -> Epoch {
        self.tick.epoch::<P>()
    }

    #[must_use]
    pub fn previous_epoch(&self) -> Epoch {
        misc::previous_epoch::<P>(self.slot())
    }

    #[must_use]
    pub const fn justified_checkpoint(&self) -> Checkpoint {
        self.justified_checkpoint
    }

    #[must_use]
    pub const fn finalized_checkpoint(&self) -> Checkpoint {
        self.finalized_checkpoint
    }

    #[must_use]
    pub const fn unrealized_justified_checkpoint(&self) -> Checkpoint {
        self.unrealized_justified_checkpoint
    }

    #[must_use]
    pub const fn unrealized_finalized_checkpoint(&self) -> Checkpoint {
        self.unrealized_finalized_checkpoint
    }

    #[must_use]
    pub fn finalized_slot(&self) -> Slot {
        misc::compute_start_slot_at_epoch::<P>(self.finalized_checkpoint.epoch)
    }

    #[must_use]
    pub const fn proposer_boost_root(&self) -> H256 {
        self.proposer_boost_root
    }

    #[must_use]
    pub const fn block_tree(&self) -> &BlockTree<P> {
        &self.block_tree
    }

    #[must_use]
    pub const fn justified_balances(&self) -> &Vector<Gwei> {
        &self.justified_balances
    }

    #[must_use]
    pub const fn queued_attestations(&self) -> &Vector<AttestationVote> {
        &self.queued_attestations
    }

    /// Returns the head as of the last call to [`Self::update_head`].
    #[must_use]
    pub const fn head(&self) -> H256 {
        self.head
    }

    pub fn heads(&self) -> impl Iterator<Item = H256> + '_ {
        self.block_tree.heads().map(|node| node.block_root)
    }

    #[must_use]
    pub fn all_nodes(&self) -> Vec<NodeSnapshot> {
        self.block_tree.snapshot()
    }

    /// Returns `true` if the block or any of its ancestors has not been verified by an execution
    /// engine yet.
    #[must_use]
    pub fn is_optimistic(&self, block_root: H256) -> bool {
        self.block_tree
            .ancestors(block_root)
            .any(|node| node.execution_status.is_optimistic())
    }

    #[must_use]
    pub fn contains_block(&self, block_root: H256) -> bool {
        self.block(block_root).is_some()
    }

    /// Returns the block if it is known and descends from the finalized checkpoint.
    #[must_use]
    pub fn block(&self, block_root: H256) -> Option<&BlockNode> {
        self.block_tree
            .get(block_root)
            .filter(|_| self.is_descendant_of_finalized(block_root))
    }

    #[must_use]
    pub fn weight(&self, block_root: H256) -> Option<Gwei> {
        self.block_tree.get(block_root).map(|node| node.weight)
    }

    #[must_use]
    pub fn justified_block(&self) -> Option<&BlockNode> {
        self.block_tree.get(self.justified_checkpoint.root)
    }

    #[must_use]
    pub fn finalized_block(&self) -> Option<&BlockNode> {
        self.block_tree.get(self.finalized_checkpoint.root)
    }

    /// [`get_ancestor`](https://github.com/ethereum/consensus-specs/blob/v1.4.0/specs/phase0/fork-choice.md#get_ancestor)
    #[must_use]
    pub fn ancestor(&self, block_root: H256, slot: Slot) -> Option<H256> {
        self.block_tree
            .ancestor_at_slot(block_root, slot)
            .map(|node| node.block_root)
    }

    pub fn ancestors(&self, block_root: H256) -> impl Iterator<Item = &BlockNode> {
        self.block_tree.ancestors(block_root)
    }

    #[must_use]
    pub fn non_ancestors(&self, block_root: H256) -> Vec<&BlockNode> {
        self.block_tree.non_ancestors(block_root)
    }

    #[must_use]
    pub fn is_descendant(&self, ancestor_root: H256, descendant_root: H256) -> bool {
        self.block_tree.is_descendant(ancestor_root, descendant_root)
    }

    #[must_use]
    pub fn is_descendant_of_finalized(&self, block_root: H256) -> bool {
        self.is_descendant(self.finalized_checkpoint.root, block_root)
    }

    /// Returns the block at `slot` in the chain ending with the current head.
    ///
    /// Returns `None` if the slot was skipped.
    #[must_use]
    pub fn canonical_block_at_slot(&self, slot: Slot) -> Option<&BlockNode> {
        self.block_tree
            .ancestor_at_slot(self.head, slot)
            .filter(|node| node.slot == slot)
    }

    pub fn blocks_at_slot(&self, slot: Slot) -> impl Iterator<Item = &BlockNode> {
        self.block_tree.nodes_at_slot(slot)
    }

    pub fn blocks_by_parent_root(&self, parent_root: H256) -> impl Iterator<Item = &BlockNode> {
        self.block_tree
            .iter()
            .filter(move |node| node.parent_root == parent_root)
    }

    #[must_use]
    pub fn latest_message(&self, validator_index: ValidatorIndex) -> Option<LatestMessage> {
        self.votes.latest_message(validator_index)
    }

    #[must_use]
    pub fn is_equivocating(&self, validator_index: ValidatorIndex) -> bool {
        self.votes.is_equivocating(validator_index)
    }

    /// [`on_tick`](https://github.com/ethereum/consensus-specs/blob/v1.4.0/specs/phase0/fork-choice.md#on_tick)
    pub fn apply_tick(&mut self, new_tick: Tick) -> Result<Option<ApplyTickChanges>> {
        let old_tick = self.tick;

        // If multiple tick updates are performed in quick succession, they can come in any order.
        if new_tick <= old_tick {
            return Ok(None);
        }

        // > update store time
        self.tick = new_tick;

        if new_tick.slot <= old_tick.slot {
            return Ok(Some(ApplyTickChanges::TickUpdated));
        }

        let old_finalized_checkpoint = self.finalized_checkpoint;

        self.clear_expired_proposer_boost();

        // > If a new epoch, pull-up justification and finalization from previous epoch
        if new_tick.epoch::<P>() > old_tick.epoch::<P>() {
            self.update_checkpoints(
                self.unrealized_justified_checkpoint,
                self.unrealized_finalized_checkpoint,
            )?;
        }

        self.process_queued_attestations()?;

        Ok(Some(ApplyTickChanges::SlotUpdated {
            finalized_checkpoint_updated: old_finalized_checkpoint != self.finalized_checkpoint,
        }))
    }

    /// Adds a block that has passed the state transition to the block tree.
    ///
    /// Roughly corresponds to [`on_block`] from the Fork Choice specification.
    /// Blocks that are already present are ignored.
    ///
    /// [`on_block`]: https://github.com/ethereum/consensus-specs/blob/v1.4.0/specs/phase0/fork-choice.md#on_block
    pub fn on_block(&mut self, block: NewBlock) -> Result<()> {
        let NewBlock {
            slot,
            block_root,
            parent_root,
            justified_checkpoint,
            finalized_checkpoint,
            ..
        } = block;

        if self.block_tree.contains(block_root) {
            debug!("block already in block tree: {block_root:?}");
            return Ok(());
        }

        let Some(parent) = self.block_tree.get(parent_root) else {
            bail!(Error::UnknownParent {
                block_root,
                parent_root,
            });
        };

        ensure!(
            slot > parent.slot,
            Error::SlotNotAfterParent {
                block_root,
                slot,
                parent_slot: parent.slot,
            },
        );

        // > Blocks cannot be in the future.
        ensure!(
            slot <= self.slot(),
            Error::FutureSlot {
                block_root,
                slot,
                current_slot: self.slot(),
            },
        );

        // > Check that block is later than the finalized epoch slot
        let finalized_slot = self.finalized_slot();

        ensure!(
            slot > finalized_slot,
            Error::BlockAtOrBeforeFinalizedSlot {
                block_root,
                slot,
                finalized_slot,
            },
        );

        // > Check block is a descendant of the finalized block at the checkpoint finalized slot
        ensure!(
            self.ancestor(parent_root, finalized_slot) == Some(self.finalized_checkpoint.root),
            Error::NotFinalizedDescendant {
                block_root,
                finalized_root: self.finalized_checkpoint.root,
            },
        );

        ensure!(
            !parent.execution_status.is_invalid(),
            Error::ParentPayloadInvalid {
                block_root,
                parent_root,
            },
        );

        let (unrealized_justified_checkpoint, unrealized_finalized_checkpoint) =
            unrealized_checkpoints_of::<P>(&block, parent);

        let node = BlockNode::new(
            block,
            unrealized_justified_checkpoint,
            unrealized_finalized_checkpoint,
        );

        let viability = self.viability();

        self.block_tree.insert(node, &viability)?;

        // > Add proposer score boost if the block is timely
        //
        // Only the first timely block in a slot is boosted.
        // See <https://github.com/ethereum/consensus-specs/pull/3352>.
        let is_timely = self.slot() == slot && self.tick.is_before_attesting_interval();
        let is_first_block = self.proposer_boost_root.is_zero();

        if self.store_config.proposer_boost_enabled && is_timely && is_first_block {
            self.apply_proposer_boost(block_root, slot);
        }

        // > Update checkpoints in store if necessary
        self.update_checkpoints(justified_checkpoint, finalized_checkpoint)?;

        // > Eagerly compute unrealized justification and finality
        self.update_unrealized_checkpoints(
            unrealized_justified_checkpoint,
            unrealized_finalized_checkpoint,
        );

        // > If the block is from a prior epoch, apply the realized values
        if misc::compute_epoch_at_slot::<P>(slot) < self.current_epoch() {
            self.update_checkpoints(
                unrealized_justified_checkpoint,
                unrealized_finalized_checkpoint,
            )?;
        }

        Ok(())
    }

    /// Checks whether a vote can be applied right away.
    ///
    /// Roughly corresponds to [`validate_on_attestation`] from the Fork Choice specification.
    /// Votes for unknown blocks are accepted. They carry no weight until the block is imported.
    ///
    /// [`validate_on_attestation`]: https://github.com/ethereum/consensus-specs/blob/v1.4.0/specs/phase0/fork-choice.md#validate_on_attestation
    pub fn validate_attestation(&self, vote: &AttestationVote) -> Result<AttestationAction> {
        let AttestationVote {
            slot,
            target_epoch,
            beacon_block_root,
            ..
        } = *vote;

        if beacon_block_root.is_zero() {
            return Ok(AttestationAction::Ignore);
        }

        let current_epoch = self.current_epoch();

        // > Attestations must be from the current or previous epoch
        ensure!(
            target_epoch <= current_epoch,
            Error::AttestationForFutureEpoch {
                target_epoch,
                current_epoch,
            },
        );

        ensure!(
            target_epoch >= self.previous_epoch(),
            Error::AttestationForPastEpoch {
                target_epoch,
                current_epoch,
            },
        );

        // > Check that the epoch number and slot number are matching
        let slot_epoch = misc::compute_epoch_at_slot::<P>(slot);

        ensure!(
            target_epoch == slot_epoch,
            Error::AttestationTargetEpochMismatch {
                target_epoch,
                slot_epoch,
            },
        );

        // > Attestations must not be for blocks in the future.
        if let Some(node) = self.block_tree.get(beacon_block_root) {
            ensure!(
                node.slot <= slot,
                Error::AttestationForFutureBlock {
                    beacon_block_root,
                    block_slot: node.slot,
                    slot,
                },
            );
        }

        // > Attestations can only affect the fork choice of subsequent slots.
        if slot >= self.slot() {
            return Ok(AttestationAction::DelayUntilSlot);
        }

        Ok(AttestationAction::Accept)
    }

    /// [`on_attestation`](https://github.com/ethereum/consensus-specs/blob/v1.4.0/specs/phase0/fork-choice.md#on_attestation)
    ///
    /// Weights are not recomputed until the next call to [`Self::update_head`].
    pub fn on_attestation(&mut self, vote: AttestationVote) -> Result<AttestationAction> {
        let action = self.validate_attestation(&vote)?;

        match action {
            AttestationAction::Accept => self.apply_attestation(vote)?,
            AttestationAction::DelayUntilSlot => self.queued_attestations.push_back(vote),
            AttestationAction::Ignore => {}
        }

        Ok(action)
    }

    /// [`on_attester_slashing`](https://github.com/ethereum/consensus-specs/blob/v1.4.0/specs/phase0/fork-choice.md#on_attester_slashing)
    pub fn on_attester_slashing(
        &mut self,
        slashable_indices: impl IntoIterator<Item = ValidatorIndex>,
    ) {
        for validator_index in slashable_indices {
            if self.votes.mark_equivocating(validator_index) {
                debug!("validator marked as equivocating: {validator_index}");
            }
        }
    }

    /// Replaces the balances used to weigh votes.
    ///
    /// The caller is expected to supply the effective balances of the justified state.
    pub fn update_balances(&mut self, balances: impl IntoIterator<Item = Gwei>) {
        self.justified_balances = balances.into_iter().collect();
    }

    pub fn on_execution_payload_result(
        &mut self,
        block_root: H256,
        status: PayloadStatus,
    ) -> Result<()> {
        let node_index = self
            .block_tree
            .index_of(block_root)
            .ok_or(Error::UnknownBlock { block_root })?;

        match status {
            PayloadStatus::Valid => {
                self.block_tree
                    .set_execution_status(node_index, ExecutionStatus::Valid)?;
            }
            PayloadStatus::Invalid => {
                let invalidated = self.block_tree.invalidate_subtree(node_index)?;
                warn!(
                    "execution payload invalid \
                     (block_root: {block_root:?}, invalidated: {invalidated})",
                );
            }
            PayloadStatus::Optimistic => {}
        }

        Ok(())
    }

    /// Handles an `INVALID` response that carries a latest valid hash.
    ///
    /// Every block between the latest valid one and `block_root` is invalidated together with its
    /// descendants. The block whose payload hash is `latest_valid_hash` and its ancestors are
    /// marked as valid. If no ancestor of `block_root` has that payload hash, only the subtree
    /// rooted at `block_root` is invalidated.
    pub fn on_invalid_execution_payload(
        &mut self,
        block_root: H256,
        latest_valid_hash: Option<ExecutionBlockHash>,
    ) -> Result<()> {
        ensure!(
            self.block_tree.contains(block_root),
            Error::UnknownBlock { block_root },
        );

        let latest_valid = latest_valid_hash.and_then(|latest_valid_hash| {
            self.block_tree
                .ancestors(block_root)
                .tuple_windows()
                .find(|(_, parent)| parent.execution_payload_block_hash == Some(latest_valid_hash))
                .map(|(first_invalid, latest_valid)| {
                    (first_invalid.block_root, latest_valid.block_root)
                })
        });

        let first_invalid_root = match latest_valid {
            Some((first_invalid_root, latest_valid_root)) => {
                let latest_valid_index = self.node_index(latest_valid_root)?;
                self.block_tree.validate_with_ancestors(latest_valid_index)?;
                first_invalid_root
            }
            None => block_root,
        };

        let first_invalid_index = self.node_index(first_invalid_root)?;
        let invalidated = self.block_tree.invalidate_subtree(first_invalid_index)?;

        warn!(
            "execution payload invalid \
             (block_root: {block_root:?}, latest_valid_hash: {latest_valid_hash:?}, \
             invalidated: {invalidated})",
        );

        Ok(())
    }

    pub fn apply_proposer_boost(&mut self, block_root: H256, slot: Slot) {
        debug!("proposer boost applied (block_root: {block_root:?}, slot: {slot})");

        self.proposer_boost_root = block_root;
        self.proposer_boost_expiry_slot = slot.saturating_add(1);
    }

    /// Recomputes weights and returns the new head.
    ///
    /// See [`get_head`](https://github.com/ethereum/consensus-specs/blob/v1.4.0/specs/phase0/fork-choice.md#get_head).
    pub fn update_head(&mut self) -> Result<H256> {
        self.clear_expired_proposer_boost();

        let mut deltas = self.votes.compute_deltas(
            &self.block_tree,
            &self.justified_balances,
            self.current_epoch(),
        )?;

        let ProposerBoost {
            root: previous_root,
            score: previous_score,
        } = self.previous_proposer_boost;

        if let Some(node_index) = self.block_tree.index_of(previous_root) {
            let delta = deltas
                .get_mut(node_index)
                .ok_or(Error::InvalidNodeIndex { node_index })?;

            *delta = delta
                .checked_sub_gwei(previous_score)
                .ok_or(Error::DeltaOverflow { node_index })?;
        }

        let mut proposer_boost = ProposerBoost::default();

        if self.store_config.proposer_boost_enabled {
            let boosted = self
                .block_tree
                .get(self.proposer_boost_root)
                .filter(|node| !node.execution_status.is_invalid())
                .and_then(|node| self.block_tree.index_of(node.block_root));

            if let Some(node_index) = boosted {
                let score = self.proposer_score();

                let delta = deltas
                    .get_mut(node_index)
                    .ok_or(Error::InvalidNodeIndex { node_index })?;

                *delta = delta
                    .checked_add_gwei(score)
                    .ok_or(Error::DeltaOverflow { node_index })?;

                proposer_boost = ProposerBoost {
                    root: self.proposer_boost_root,
                    score,
                };
            }
        }

        self.previous_proposer_boost = proposer_boost;

        let viability = self.viability();

        self.block_tree.apply_weight_deltas(deltas, &viability)?;

        let head = self
            .block_tree
            .find_head(self.justified_checkpoint.root, &viability)?;

        if head != self.head {
            debug!("head changed (old: {:?}, new: {head:?})", self.head);
        }

        self.head = head;

        Ok(head)
    }

    /// Moves the finalized checkpoint forward and prunes the block tree.
    ///
    /// Checkpoints that are not newer than the current one are ignored.
    pub fn advance_finality(&mut self, finalized_checkpoint: Checkpoint) -> Result<()> {
        if finalized_checkpoint.epoch <= self.finalized_checkpoint.epoch {
            return Ok(());
        }

        info!(
            "finalized checkpoint updated (old: {:?}, new: {finalized_checkpoint:?})",
            self.finalized_checkpoint,
        );

        self.finalized_checkpoint = finalized_checkpoint;

        // The justified checkpoint must not conflict with the finalized one.
        let justified_conflicts = self.justified_checkpoint.epoch < finalized_checkpoint.epoch
            || !self.is_descendant(finalized_checkpoint.root, self.justified_checkpoint.root);

        if justified_conflicts {
            info!(
                "justified checkpoint replaced by finalized checkpoint (old: {:?})",
                self.justified_checkpoint,
            );

            self.justified_checkpoint = finalized_checkpoint;
        }

        if self.unrealized_justified_checkpoint.epoch < finalized_checkpoint.epoch {
            self.unrealized_justified_checkpoint = finalized_checkpoint;
        }

        if self.unrealized_finalized_checkpoint.epoch < finalized_checkpoint.epoch {
            self.unrealized_finalized_checkpoint = finalized_checkpoint;
        }

        if !self.block_tree.contains(finalized_checkpoint.root) {
            warn!("finalized block is not in block tree: {finalized_checkpoint:?}");
            return Ok(());
        }

        self.block_tree.prune(finalized_checkpoint.root)?;

        Ok(())
    }

    fn update_checkpoints(
        &mut self,
        justified_checkpoint: Checkpoint,
        finalized_checkpoint: Checkpoint,
    ) -> Result<()> {
        // > Update justified checkpoint
        if justified_checkpoint.epoch > self.justified_checkpoint.epoch {
            info!(
                "justified checkpoint updated (old: {:?}, new: {justified_checkpoint:?})",
                self.justified_checkpoint,
            );

            self.justified_checkpoint = justified_checkpoint;
        }

        // > Update finalized checkpoint
        self.advance_finality(finalized_checkpoint)
    }

    /// [`update_unrealized_checkpoints`](https://github.com/ethereum/consensus-specs/blob/v1.4.0/specs/phase0/fork-choice.md#update_unrealized_checkpoints)
    fn update_unrealized_checkpoints(
        &mut self,
        unrealized_justified_checkpoint: Checkpoint,
        unrealized_finalized_checkpoint: Checkpoint,
    ) {
        // > Update unrealized justified checkpoint
        if unrealized_justified_checkpoint.epoch > self.unrealized_justified_checkpoint.epoch {
            self.unrealized_justified_checkpoint = unrealized_justified_checkpoint;
        }

        // > Update unrealized finalized checkpoint
        if unrealized_finalized_checkpoint.epoch > self.unrealized_finalized_checkpoint.epoch {
            self.unrealized_finalized_checkpoint = unrealized_finalized_checkpoint;
        }
    }

    fn apply_attestation(&mut self, vote: AttestationVote) -> Result<()> {
        let AttestationVote {
            validator_index,
            target_epoch,
            beacon_block_root,
            effective_balance,
            ..
        } = vote;

        let position = usize::try_from(validator_index)
            .map_err(|_| Error::ValidatorIndexOverflow { validator_index })?;

        // Votes that do not replace the latest message leave the balance alone.
        if !self
            .votes
            .record_vote(validator_index, target_epoch, beacon_block_root)?
        {
            return Ok(());
        }

        while self.justified_balances.len() <= position {
            self.justified_balances.push_back(0);
        }

        if let Some(balance) = self.justified_balances.get_mut(position) {
            *balance = effective_balance;
        }

        Ok(())
    }

    fn process_queued_attestations(&mut self) -> Result<()> {
        let current_slot = self.slot();

        let (ready, pending): (Vector<_>, Vector<_>) =
            core::mem::take(&mut self.queued_attestations)
                .into_iter()
                .partition(|vote| vote.slot < current_slot);

        self.queued_attestations = pending;

        if !ready.is_empty() {
            debug!(
                "applying {} queued attestations (slot: {current_slot})",
                ready.len(),
            );
        }

        for vote in ready {
            self.apply_attestation(vote)?;
        }

        Ok(())
    }

    fn clear_expired_proposer_boost(&mut self) {
        if !self.proposer_boost_root.is_zero() && self.slot() >= self.proposer_boost_expiry_slot {
            debug!("proposer boost expired: {:?}", self.proposer_boost_root);
            self.proposer_boost_root = H256::zero();
        }
    }

    /// [`get_proposer_score`](https://github.com/ethereum/consensus-specs/blob/v1.4.0/specs/phase0/fork-choice.md#get_proposer_score)
    fn proposer_score(&self) -> Gwei {
        let total_balance: Gwei = self.justified_balances.iter().sum();
        let committee_weight = misc::committee_weight::<P>(total_balance);
        self.chain_config.proposer_score(committee_weight)
    }

    fn viability(&self) -> Viability {
        Viability {
            justified_checkpoint: self.justified_checkpoint,
            finalized_checkpoint: self.finalized_checkpoint,
            current_epoch: self.current_epoch(),
        }
    }

    fn node_index(&self, block_root: H256) -> Result<usize> {
        self.block_tree
            .index_of(block_root)
            .ok_or_else(|| Error::UnknownBlock { block_root }.into())
    }
}

// Unrealized checkpoints are normally computed by the state transition.
// Blocks whose state transition did not compute them fall back to the values they are
// guaranteed to have. A block that starts a new epoch has no pending justification yet,
// so its realized checkpoints are used. Other blocks inherit them from their parent.
fn unrealized_checkpoints_of<P: Preset>(
    block: &NewBlock,
    parent: &BlockNode,
) -> (Checkpoint, Checkpoint) {
    let (justified, finalized) = match block.unrealized_checkpoints {
        Some(unrealized) => (unrealized.justified, unrealized.finalized),
        None if is_first_in_epoch::<P>(block.slot, parent.slot) => {
            (block.justified_checkpoint, block.finalized_checkpoint)
        }
        None => (
            parent.unrealized_justified_checkpoint,
            parent.unrealized_finalized_checkpoint,
        ),
    };

    // Unrealized checkpoints are never behind realized ones.
    (
        later_checkpoint(justified, block.justified_checkpoint),
        later_checkpoint(finalized, block.finalized_checkpoint),
    )
}

fn is_first_in_epoch<P: Preset>(slot: Slot, parent_slot: Slot) -> bool {
    misc::compute_epoch_at_slot::<P>(slot) > misc::compute_epoch_at_slot::<P>(parent_slot)
}

fn later_checkpoint(left: Checkpoint, right: Checkpoint) -> Checkpoint {
    if right.epoch > left.epoch {
        right
    } else {
        left
    }
}
