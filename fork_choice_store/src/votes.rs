use arithmetic::I64Ext as _;
use im::{HashSet, Vector};
use types::{
    phase0::primitives::{Epoch, Gwei, ValidatorIndex, H256},
    preset::Preset,
};

use crate::{
    error::Error,
    misc::{Difference, LatestMessage},
    proto_array::BlockTree,
};

/// Latest message of a single validator.
///
/// `next_root` only starts contributing weight once `next_epoch` is reached.
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct VoteTracker {
    pub current_root: H256,
    pub next_root: H256,
    pub next_epoch: Epoch,
}

#[derive(Clone, Default, Debug)]
pub struct VoteRegistry {
    votes: Vector<VoteTracker>,
    // Balances that the weights currently stored in the block tree were computed with.
    applied_balances: Vector<Gwei>,
    equivocating_indices: HashSet<ValidatorIndex>,
}

impl VoteRegistry {
    #[must_use]
    pub fn len(&self) -> usize {
        self.votes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    #[must_use]
    pub fn get(&self, validator_index: ValidatorIndex) -> Option<&VoteTracker> {
        let position = usize::try_from(validator_index).ok()?;
        self.votes.get(position)
    }

    pub fn get_or_create(
        &mut self,
        validator_index: ValidatorIndex,
    ) -> Result<&mut VoteTracker, Error> {
        let position = position_of(validator_index)?;

        while self.votes.len() <= position {
            self.votes.push_back(VoteTracker::default());
        }

        self.votes
            .get_mut(position)
            .ok_or(Error::ValidatorIndexOverflow { validator_index })
    }

    /// Records a vote unless the validator already has one for the same or a later epoch.
    ///
    /// Returns `true` if the vote was recorded.
    pub fn record_vote(
        &mut self,
        validator_index: ValidatorIndex,
        target_epoch: Epoch,
        block_root: H256,
    ) -> Result<bool, Error> {
        let vote = self.get_or_create(validator_index)?;

        if target_epoch > vote.next_epoch || *vote == VoteTracker::default() {
            vote.next_root = block_root;
            vote.next_epoch = target_epoch;
            return Ok(true);
        }

        Ok(false)
    }

    /// Excludes the validator from fork choice.
    ///
    /// The weight it contributes is removed by the next call to [`Self::compute_deltas`].
    pub fn mark_equivocating(&mut self, validator_index: ValidatorIndex) -> bool {
        self.equivocating_indices.insert(validator_index).is_none()
    }

    #[must_use]
    pub fn is_equivocating(&self, validator_index: ValidatorIndex) -> bool {
        self.equivocating_indices.contains(&validator_index)
    }

    #[must_use]
    pub fn latest_message(&self, validator_index: ValidatorIndex) -> Option<LatestMessage> {
        self.get(validator_index)
            .filter(|vote| **vote != VoteTracker::default())
            .map(|vote| LatestMessage {
                epoch: vote.next_epoch,
                root: vote.next_root,
            })
    }

    /// Computes per-node weight changes since the last call.
    ///
    /// Pending votes become current once `current_epoch` reaches their epoch and their block is
    /// present in `block_tree`. Votes for unknown blocks stay pending and contribute nothing.
    /// Each changed vote moves the old balance away from the old block and the new balance to
    /// the new block, so the deltas sum to the change in total balance of counted votes.
    pub fn compute_deltas<P: Preset>(
        &mut self,
        block_tree: &BlockTree<P>,
        new_balances: &Vector<Gwei>,
        current_epoch: Epoch,
    ) -> Result<Vec<Difference>, Error> {
        let mut deltas = vec![0; block_tree.len()];

        for ((position, vote), validator_index) in self.votes.iter_mut().enumerate().zip(0..) {
            if vote.current_root.is_zero() && vote.next_root.is_zero() {
                continue;
            }

            let old_balance = self
                .applied_balances
                .get(position)
                .copied()
                .unwrap_or_default();

            if self.equivocating_indices.contains(&validator_index) {
                if !vote.current_root.is_zero() {
                    subtract_balance(&mut deltas, block_tree, vote.current_root, old_balance)?;
                    vote.current_root = H256::zero();
                }

                continue;
            }

            let new_balance = new_balances.get(position).copied().unwrap_or_default();

            let promote = vote.next_epoch <= current_epoch
                && !vote.next_root.is_zero()
                && block_tree.contains(vote.next_root);

            let next_root = if promote {
                vote.next_root
            } else {
                vote.current_root
            };

            if vote.current_root != next_root || old_balance != new_balance {
                subtract_balance(&mut deltas, block_tree, vote.current_root, old_balance)?;
                add_balance(&mut deltas, block_tree, next_root, new_balance)?;
                vote.current_root = next_root;
            }
        }

        self.applied_balances = new_balances.clone();

        Ok(deltas)
    }
}

// The zero root stands for no vote. Roots missing from `block_tree` are either pruned or not
// imported yet. None of them carry weight.
fn add_balance<P: Preset>(
    deltas: &mut [Difference],
    block_tree: &BlockTree<P>,
    block_root: H256,
    balance: Gwei,
) -> Result<(), Error> {
    if block_root.is_zero() {
        return Ok(());
    }

    let Some(node_index) = block_tree.index_of(block_root) else {
        return Ok(());
    };

    let delta = deltas
        .get_mut(node_index)
        .ok_or(Error::InvalidNodeIndex { node_index })?;

    *delta = delta
        .checked_add_gwei(balance)
        .ok_or(Error::DeltaOverflow { node_index })?;

    Ok(())
}

fn subtract_balance<P: Preset>(
    deltas: &mut [Difference],
    block_tree: &BlockTree<P>,
    block_root: H256,
    balance: Gwei,
) -> Result<(), Error> {
    if block_root.is_zero() {
        return Ok(());
    }

    let Some(node_index) = block_tree.index_of(block_root) else {
        return Ok(());
    };

    let delta = deltas
        .get_mut(node_index)
        .ok_or(Error::InvalidNodeIndex { node_index })?;

    *delta = delta
        .checked_sub_gwei(balance)
        .ok_or(Error::DeltaOverflow { node_index })?;

    Ok(())
}

fn position_of(validator_index: ValidatorIndex) -> Result<usize, Error> {
    usize::try_from(validator_index).map_err(|_| Error::ValidatorIndexOverflow { validator_index })
}

#[cfg(test)]
mod tests {
    use im::vector;
    use types::{
        nonstandard::ExecutionStatus,
        phase0::{consts::GENESIS_EPOCH, containers::Checkpoint},
        preset::Minimal,
    };

    use crate::misc::{BlockNode, NewBlock, Viability};

    use super::*;

    const BALANCE: Gwei = 42;
    const VALIDATOR_COUNT: usize = 16;

    fn root(index: usize) -> H256 {
        H256::from_low_u64_be(u64::try_from(index).unwrap_or_default())
    }

    // Block `root(index + 1)` is stored at index `index`.
    fn chain(length: usize) -> Result<BlockTree<Minimal>, Error> {
        let mut block_tree = BlockTree::default();

        for index in 0..length {
            insert_block(&mut block_tree, index, root(index + 1), root(index))?;
        }

        Ok(block_tree)
    }

    fn insert_block(
        block_tree: &mut BlockTree<Minimal>,
        index: usize,
        block_root: H256,
        parent_root: H256,
    ) -> Result<(), Error> {
        let checkpoint = Checkpoint::default();

        let viability = Viability {
            justified_checkpoint: checkpoint,
            finalized_checkpoint: checkpoint,
            current_epoch: GENESIS_EPOCH,
        };

        let block = NewBlock {
            slot: u64::try_from(index).unwrap_or_default(),
            block_root,
            parent_root,
            state_root: H256::zero(),
            target_root: H256::zero(),
            justified_checkpoint: checkpoint,
            finalized_checkpoint: checkpoint,
            unrealized_checkpoints: None,
            execution_status: ExecutionStatus::PreMerge,
            execution_payload_block_hash: None,
        };

        block_tree.insert(BlockNode::new(block, checkpoint, checkpoint), &viability)?;

        Ok(())
    }

    fn registry(
        votes: impl IntoIterator<Item = VoteTracker>,
        balances: Vector<Gwei>,
    ) -> VoteRegistry {
        VoteRegistry {
            votes: votes.into_iter().collect(),
            applied_balances: balances,
            equivocating_indices: HashSet::new(),
        }
    }

    fn vote(current_root: H256, next_root: H256) -> VoteTracker {
        VoteTracker {
            current_root,
            next_root,
            next_epoch: 0,
        }
    }

    #[test]
    fn zero_hash_votes_produce_no_deltas() -> Result<(), Error> {
        let block_tree = chain(VALIDATOR_COUNT)?;
        let votes = core::iter::repeat_n(VoteTracker::default(), VALIDATOR_COUNT);
        let balances = core::iter::repeat_n(0, VALIDATOR_COUNT).collect::<Vector<_>>();
        let mut registry = registry(votes, balances.clone());

        let deltas = registry.compute_deltas(&block_tree, &balances, 0)?;

        assert_eq!(deltas, [0; VALIDATOR_COUNT]);
        assert!(registry.votes.iter().all(|vote| vote.current_root == vote.next_root));

        Ok(())
    }

    #[test]
    fn all_voted_the_same() -> Result<(), Error> {
        let block_tree = chain(VALIDATOR_COUNT)?;
        let votes = core::iter::repeat_n(vote(H256::zero(), root(1)), VALIDATOR_COUNT);
        let balances = core::iter::repeat_n(BALANCE, VALIDATOR_COUNT).collect::<Vector<_>>();
        let mut registry = registry(votes, balances.clone());

        let deltas = registry.compute_deltas(&block_tree, &balances, 0)?;

        assert_eq!(deltas[0], 42 * 16);
        assert!(deltas[1..].iter().all(|delta| *delta == 0));

        Ok(())
    }

    #[test]
    fn different_votes() -> Result<(), Error> {
        let block_tree = chain(VALIDATOR_COUNT)?;
        let votes = (0..VALIDATOR_COUNT).map(|index| vote(H256::zero(), root(index + 1)));
        let balances = core::iter::repeat_n(BALANCE, VALIDATOR_COUNT).collect::<Vector<_>>();
        let mut registry = registry(votes, balances.clone());

        let deltas = registry.compute_deltas(&block_tree, &balances, 0)?;

        assert_eq!(deltas, [42; VALIDATOR_COUNT]);

        Ok(())
    }

    #[test]
    fn moving_votes() -> Result<(), Error> {
        let block_tree = chain(VALIDATOR_COUNT)?;
        let votes = core::iter::repeat_n(vote(root(1), root(2)), VALIDATOR_COUNT);
        let balances = core::iter::repeat_n(BALANCE, VALIDATOR_COUNT).collect::<Vector<_>>();
        let mut registry = registry(votes, balances.clone());

        let deltas = registry.compute_deltas(&block_tree, &balances, 0)?;

        assert_eq!(deltas[0], -42 * 16);
        assert_eq!(deltas[1], 42 * 16);
        assert!(deltas[2..].iter().all(|delta| *delta == 0));
        assert_eq!(deltas.iter().sum::<Difference>(), 0);

        Ok(())
    }

    #[test]
    fn changing_balances() -> Result<(), Error> {
        let block_tree = chain(VALIDATOR_COUNT)?;
        let votes = core::iter::repeat_n(vote(root(1), root(2)), VALIDATOR_COUNT);
        let old_balances = core::iter::repeat_n(BALANCE, VALIDATOR_COUNT).collect();
        let new_balances = core::iter::repeat_n(BALANCE * 2, VALIDATOR_COUNT).collect();
        let mut registry = registry(votes, old_balances);

        let deltas = registry.compute_deltas(&block_tree, &new_balances, 0)?;

        assert_eq!(deltas[0], -42 * 16);
        assert_eq!(deltas[1], 84 * 16);
        assert!(deltas[2..].iter().all(|delta| *delta == 0));

        Ok(())
    }

    #[test]
    fn validator_appears() -> Result<(), Error> {
        let block_tree = chain(2)?;
        let votes = core::iter::repeat_n(vote(root(1), root(2)), 2);
        let mut registry = registry(votes, vector![BALANCE]);

        let deltas = registry.compute_deltas(&block_tree, &vector![BALANCE, BALANCE], 0)?;

        assert_eq!(deltas, [-42, 84]);
        assert!(registry.votes.iter().all(|vote| vote.current_root == vote.next_root));

        Ok(())
    }

    #[test]
    fn validator_disappears() -> Result<(), Error> {
        let block_tree = chain(2)?;
        let votes = core::iter::repeat_n(vote(root(1), root(2)), 2);
        let mut registry = registry(votes, vector![BALANCE, BALANCE]);

        let deltas = registry.compute_deltas(&block_tree, &vector![BALANCE], 0)?;

        assert_eq!(deltas, [-84, 42]);
        assert!(registry.votes.iter().all(|vote| vote.current_root == vote.next_root));

        Ok(())
    }

    #[test]
    fn equivocating_validators_are_removed_once() -> Result<(), Error> {
        let block_tree = chain(2)?;
        let votes = core::iter::repeat_n(vote(root(1), root(2)), 2);
        let balances = vector![31, 32];
        let mut registry = registry(votes, balances.clone());

        assert!(registry.mark_equivocating(0));
        assert!(!registry.mark_equivocating(0));

        let deltas = registry.compute_deltas(&block_tree, &balances, 0)?;

        assert_eq!(deltas, [-(31 + 32), 32]);

        let deltas = registry.compute_deltas(&block_tree, &balances, 0)?;

        assert_eq!(deltas, [0, 0]);

        Ok(())
    }

    #[test]
    fn votes_stay_pending_until_epoch_and_block_are_reached() -> Result<(), Error> {
        let mut block_tree = chain(2)?;
        let balances = vector![BALANCE];
        let mut registry = VoteRegistry::default();

        registry.record_vote(0, 1, root(3))?;

        // The epoch has not been reached yet.
        assert_eq!(registry.compute_deltas(&block_tree, &balances, 0)?, [0, 0]);

        // The block has not been imported yet.
        assert_eq!(registry.compute_deltas(&block_tree, &balances, 1)?, [0, 0]);
        assert_eq!(registry.get(0).map(|vote| vote.current_root), Some(H256::zero()));

        block_tree = chain(3)?;

        assert_eq!(registry.compute_deltas(&block_tree, &balances, 1)?, [0, 0, 42]);
        assert_eq!(registry.get(0).map(|vote| vote.current_root), Some(root(3)));

        Ok(())
    }

    #[test]
    fn only_votes_for_later_epochs_replace_pending_votes() -> Result<(), Error> {
        let mut registry = VoteRegistry::default();

        assert!(registry.record_vote(3, 0, root(1))?);
        assert!(!registry.record_vote(3, 0, root(2))?);
        assert!(registry.record_vote(3, 2, root(2))?);
        assert!(!registry.record_vote(3, 1, root(1))?);

        assert_eq!(registry.len(), 4);
        assert_eq!(registry.latest_message(0), None);
        assert_eq!(
            registry.latest_message(3),
            Some(LatestMessage {
                epoch: 2,
                root: root(2),
            }),
        );

        Ok(())
    }

    #[test]
    fn deltas_sum_to_zero_when_balances_are_unchanged() -> Result<(), Error> {
        let block_tree = chain(4)?;
        let balances = vector![10, 20, 30, 40, 50];
        let mut registry = VoteRegistry::default();

        for (validator_index, block) in [(0, 1), (1, 2), (2, 2), (3, 3), (4, 4)] {
            registry.record_vote(validator_index, 0, root(block))?;
        }

        registry.compute_deltas(&block_tree, &balances, 0)?;

        for (validator_index, block) in [(0, 4), (1, 1), (3, 2)] {
            registry.record_vote(validator_index, 1, root(block))?;
        }

        let deltas = registry.compute_deltas(&block_tree, &balances, 1)?;

        assert_eq!(deltas.iter().sum::<Difference>(), 0);
        assert_eq!(deltas, [20 - 10, 40 - 20, -40, 10]);

        Ok(())
    }

    // ```text
    // 0x00 <- root(1)
    // ```
    #[test]
    fn validators_without_a_current_vote_do_not_weigh_zero_root() -> Result<(), Error> {
        let mut block_tree = BlockTree::default();

        insert_block(&mut block_tree, 0, H256::zero(), H256::zero())?;
        insert_block(&mut block_tree, 1, root(1), H256::zero())?;

        let mut registry = VoteRegistry::default();

        registry.record_vote(0, 1, root(1))?;

        // The vote is still pending, but the balance of the validator changes from 0 to 42.
        assert_eq!(registry.compute_deltas(&block_tree, &vector![BALANCE], 0)?, [0, 0]);
        assert_eq!(registry.compute_deltas(&block_tree, &vector![BALANCE * 2], 0)?, [0, 0]);

        assert_eq!(registry.compute_deltas(&block_tree, &vector![BALANCE], 1)?, [0, 42]);

        Ok(())
    }
}
