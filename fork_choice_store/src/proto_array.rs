//! Flat, index-addressed block tree.
//!
//! Nodes are stored in insertion order. Since a parent must be inserted before its children,
//! every node has a higher index than all of its ancestors. This lets weights and best
//! descendants be recomputed with backward passes over the array without any recursion.

use core::marker::PhantomData;

use derivative::Derivative;
use hash_hasher::HashedMap;
use helper_functions::misc;
use log::debug;
use types::{
    nonstandard::ExecutionStatus,
    phase0::{
        consts::GENESIS_EPOCH,
        containers::Checkpoint,
        primitives::{Slot, H256},
    },
    preset::Preset,
};

use crate::{
    error::Error,
    misc::{BlockNode, Difference, NodeIndex, NodeSnapshot, Viability},
};

#[derive(Derivative)]
#[derivative(Clone(bound = ""), Default(bound = ""), Debug(bound = ""))]
pub struct BlockTree<P: Preset> {
    prune_threshold: usize,
    nodes: Vec<BlockNode>,
    indices: HashedMap<H256, NodeIndex>,
    #[derivative(Debug = "ignore")]
    phantom: PhantomData<P>,
}

impl<P: Preset> BlockTree<P> {
    #[must_use]
    pub fn new(prune_threshold: usize) -> Self {
        Self {
            prune_threshold,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn contains(&self, block_root: H256) -> bool {
        self.indices.contains_key(&block_root)
    }

    #[must_use]
    pub fn index_of(&self, block_root: H256) -> Option<NodeIndex> {
        self.indices.get(&block_root).copied()
    }

    #[must_use]
    pub fn get(&self, block_root: H256) -> Option<&BlockNode> {
        self.index_of(block_root)
            .and_then(|node_index| self.get_by_index(node_index))
    }

    #[must_use]
    pub fn get_by_index(&self, node_index: NodeIndex) -> Option<&BlockNode> {
        self.nodes.get(node_index)
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &BlockNode> {
        self.nodes.iter()
    }

    /// Iterates over the node with `block_root` and its ancestors, newest first.
    ///
    /// Yields nothing if `block_root` is unknown.
    pub fn ancestors(&self, block_root: H256) -> impl Iterator<Item = &BlockNode> {
        core::iter::successors(self.get(block_root), |node| {
            node.parent
                .and_then(|parent_index| self.get_by_index(parent_index))
        })
    }

    /// Returns nodes inserted before the node with `block_root` that are not its ancestors,
    /// newest first.
    #[must_use]
    pub fn non_ancestors(&self, block_root: H256) -> Vec<&BlockNode> {
        let Some(start_index) = self.index_of(block_root) else {
            return vec![];
        };

        let mut next_ancestor = self
            .get_by_index(start_index)
            .and_then(|node| node.parent);

        self.nodes
            .iter()
            .take(start_index)
            .enumerate()
            .rev()
            .filter_map(|(node_index, node)| {
                if Some(node_index) == next_ancestor {
                    next_ancestor = node.parent;
                    None
                } else {
                    Some(node)
                }
            })
            .collect()
    }

    pub fn nodes_at_slot(&self, slot: Slot) -> impl Iterator<Item = &BlockNode> {
        self.nodes.iter().filter(move |node| node.slot == slot)
    }

    /// Nodes that no other node has chosen as its best child.
    pub fn heads(&self) -> impl Iterator<Item = &BlockNode> {
        self.nodes.iter().filter(|node| node.best_child.is_none())
    }

    /// Returns `true` if `ancestor_root` is `descendant_root` or one of its ancestors.
    ///
    /// Returns `false` if either of them is unknown.
    #[must_use]
    pub fn is_descendant(&self, ancestor_root: H256, descendant_root: H256) -> bool {
        let Some(ancestor) = self.get(ancestor_root) else {
            return false;
        };

        self.ancestors(descendant_root)
            .take_while(|node| node.slot >= ancestor.slot)
            .any(|node| node.block_root == ancestor_root)
    }

    /// Returns the newest ancestor of `block_root` (or the block itself) with a slot at or
    /// before `slot`.
    #[must_use]
    pub fn ancestor_at_slot(&self, block_root: H256, slot: Slot) -> Option<&BlockNode> {
        self.ancestors(block_root).find(|node| node.slot <= slot)
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<NodeSnapshot> {
        self.nodes
            .iter()
            .map(|node| NodeSnapshot {
                slot: node.slot,
                block_root: node.block_root,
                parent_root: node.parent_root,
                state_root: node.state_root,
                target_root: node.target_root,
                justified_checkpoint: node.justified_checkpoint,
                finalized_checkpoint: node.finalized_checkpoint,
                unrealized_justified_checkpoint: node.unrealized_justified_checkpoint,
                unrealized_finalized_checkpoint: node.unrealized_finalized_checkpoint,
                weight: node.weight,
                parent: self.root_at(node.parent),
                best_child: self.root_at(node.best_child),
                best_descendant: self.root_at(node.best_descendant),
                execution_status: node.execution_status,
                execution_payload_block_hash: node.execution_payload_block_hash,
            })
            .collect()
    }

    /// Appends a node to the tree and links it to its parent.
    ///
    /// The first node inserted becomes the root of the tree and does not need a parent.
    /// Inserting a node that is already present returns its existing index.
    pub fn insert(
        &mut self,
        mut node: BlockNode,
        viability: &Viability,
    ) -> Result<NodeIndex, Error> {
        if let Some(node_index) = self.index_of(node.block_root) {
            return Ok(node_index);
        }

        let parent = if self.nodes.is_empty() {
            None
        } else {
            let parent_index = self
                .index_of(node.parent_root)
                .ok_or(Error::UnknownParent {
                    block_root: node.block_root,
                    parent_root: node.parent_root,
                })?;

            Some(parent_index)
        };

        node.weight = 0;
        node.parent = parent;
        node.best_child = None;
        node.best_descendant = None;

        let node_index = self.nodes.len();

        self.indices.insert(node.block_root, node_index);
        self.nodes.push(node);

        // Walk all the way up so that best descendants are usable before the next weight update.
        let mut child_index = node_index;
        let mut parent_index = parent;

        while let Some(current_index) = parent_index {
            self.maybe_update_best_child_and_descendant(current_index, child_index, viability)?;
            child_index = current_index;
            parent_index = self.node(current_index)?.parent;
        }

        Ok(node_index)
    }

    /// Applies `deltas` (indexed by node) to node weights and recomputes best descendants.
    pub fn apply_weight_deltas(
        &mut self,
        mut deltas: Vec<Difference>,
        viability: &Viability,
    ) -> Result<(), Error> {
        if deltas.len() != self.nodes.len() {
            return Err(Error::InvalidDeltaLength {
                deltas: deltas.len(),
                nodes: self.nodes.len(),
            });
        }

        for node_index in (0..self.nodes.len()).rev() {
            let node = self
                .nodes
                .get_mut(node_index)
                .ok_or(Error::InvalidNodeIndex { node_index })?;

            let node_delta = deltas
                .get(node_index)
                .copied()
                .ok_or(Error::InvalidNodeIndex { node_index })?;

            node.weight = node
                .weight
                .checked_add_signed(node_delta)
                .ok_or(Error::DeltaOverflow { node_index })?;

            // Children come after their parents, so the parent has not been visited yet.
            if let Some(parent_index) = node.parent {
                let parent_delta = deltas.get_mut(parent_index).ok_or(Error::InvalidNodeIndex {
                    node_index: parent_index,
                })?;

                *parent_delta = parent_delta
                    .checked_add(node_delta)
                    .ok_or(Error::DeltaOverflow {
                        node_index: parent_index,
                    })?;
            }
        }

        // Best children must be chosen after all weights are final.
        // Otherwise a sibling with a lower index would be compared using its old weight.
        for node_index in (0..self.nodes.len()).rev() {
            if let Some(parent_index) = self.node(node_index)?.parent {
                self.maybe_update_best_child_and_descendant(parent_index, node_index, viability)?;
            }
        }

        Ok(())
    }

    /// Follows the best descendant of the node with `start_root`.
    ///
    /// [`Self::insert`] and [`Self::apply_weight_deltas`] always set `best_child` and
    /// `best_descendant` together, so the best descendant is enough to find the head.
    pub fn find_head(&self, start_root: H256, viability: &Viability) -> Result<H256, Error> {
        let start_index = self
            .index_of(start_root)
            .ok_or(Error::UnknownAncestorForCheckpoint { root: start_root })?;

        let start = self.node(start_index)?;
        let best = self.node(start.best_descendant.unwrap_or(start_index))?;

        if !self.is_node_viable_for_head(best, viability) {
            return Err(Error::NoViableHead {
                start_root,
                best_root: best.block_root,
            });
        }

        Ok(best.block_root)
    }

    #[must_use]
    pub fn is_viable_for_head(&self, block_root: H256, viability: &Viability) -> bool {
        self.get(block_root)
            .is_some_and(|node| self.is_node_viable_for_head(node, viability))
    }

    /// Makes the node with `finalized_root` the root of the tree.
    ///
    /// Removes all nodes that do not descend from it. Does nothing if fewer than
    /// `prune_threshold` nodes precede it. Returns the removed nodes.
    pub fn prune(&mut self, finalized_root: H256) -> Result<Vec<BlockNode>, Error> {
        let finalized_index = self
            .index_of(finalized_root)
            .ok_or(Error::UnknownAncestorForCheckpoint {
                root: finalized_root,
            })?;

        if finalized_index < self.prune_threshold {
            return Ok(vec![]);
        }

        let mut new_indices = vec![None; self.nodes.len()];
        let mut retained = Vec::with_capacity(self.nodes.len() - finalized_index);
        let mut removed = Vec::with_capacity(finalized_index);

        for (old_index, node) in self.nodes.iter().copied().enumerate() {
            let descends_from_finalized = old_index == finalized_index
                || (old_index > finalized_index
                    && node
                        .parent
                        .and_then(|parent_index| new_indices.get(parent_index).copied().flatten())
                        .is_some());

            if descends_from_finalized {
                if let Some(new_index) = new_indices.get_mut(old_index) {
                    *new_index = Some(retained.len());
                }

                retained.push(node);
            } else {
                removed.push(node);
            }
        }

        let rebase = |node_index: NodeIndex| {
            new_indices
                .get(node_index)
                .copied()
                .flatten()
                .ok_or(Error::IndexOverflow { node_index })
        };

        for node in &mut retained {
            // The parent of the new root is the only link allowed to point outside the tree.
            node.parent = match node.parent {
                Some(parent_index) if node.block_root != finalized_root => {
                    Some(rebase(parent_index)?)
                }
                _ => None,
            };

            node.best_child = node.best_child.map(rebase).transpose()?;
            node.best_descendant = node.best_descendant.map(rebase).transpose()?;
        }

        self.indices = retained
            .iter()
            .enumerate()
            .map(|(node_index, node)| (node.block_root, node_index))
            .collect();

        self.nodes = retained;

        debug!(
            "pruned block tree (finalized_root: {finalized_root:?}, removed: {}, remaining: {})",
            removed.len(),
            self.nodes.len(),
        );

        Ok(removed)
    }

    pub fn set_execution_status(
        &mut self,
        node_index: NodeIndex,
        status: ExecutionStatus,
    ) -> Result<(), Error> {
        let node = self.node_mut(node_index)?;
        let old = node.execution_status;

        if !old.can_transition_to(status) {
            return Err(Error::InvalidExecutionStatusTransition {
                block_root: node.block_root,
                old,
                new: status,
            });
        }

        node.execution_status = status;

        Ok(())
    }

    /// Marks the node at `node_index` and all of its descendants as [`ExecutionStatus::Invalid`].
    ///
    /// Fails without modifying anything if any of them cannot become invalid.
    /// Returns the number of nodes whose status changed.
    pub fn invalidate_subtree(&mut self, node_index: NodeIndex) -> Result<usize, Error> {
        self.node(node_index)?;

        let mut in_subtree = vec![false; self.nodes.len()];
        let mut subtree = vec![];

        for (index, node) in self.nodes.iter().enumerate().skip(node_index) {
            let is_in_subtree = index == node_index
                || node
                    .parent
                    .and_then(|parent_index| in_subtree.get(parent_index).copied())
                    .unwrap_or_default();

            if !is_in_subtree {
                continue;
            }

            if let Some(flag) = in_subtree.get_mut(index) {
                *flag = true;
            }

            if !node.execution_status.can_transition_to(ExecutionStatus::Invalid) {
                return Err(Error::InvalidExecutionStatusTransition {
                    block_root: node.block_root,
                    old: node.execution_status,
                    new: ExecutionStatus::Invalid,
                });
            }

            if !node.execution_status.is_invalid() {
                subtree.push(index);
            }
        }

        for index in &subtree {
            self.node_mut(*index)?.execution_status = ExecutionStatus::Invalid;
        }

        Ok(subtree.len())
    }

    /// Marks the node at `node_index` and its optimistically imported ancestors as
    /// [`ExecutionStatus::Valid`].
    ///
    /// Stops at the first ancestor that is already valid or predates the merge.
    /// Fails without modifying anything if an invalid node is encountered.
    pub fn validate_with_ancestors(&mut self, node_index: NodeIndex) -> Result<usize, Error> {
        let mut chain = vec![];
        let mut next_index = Some(node_index);

        while let Some(index) = next_index {
            let node = self.node(index)?;

            match node.execution_status {
                ExecutionStatus::PreMerge | ExecutionStatus::Valid => break,
                ExecutionStatus::Syncing => chain.push(index),
                ExecutionStatus::Invalid => {
                    return Err(Error::InvalidExecutionStatusTransition {
                        block_root: node.block_root,
                        old: ExecutionStatus::Invalid,
                        new: ExecutionStatus::Valid,
                    })
                }
            }

            next_index = node.parent;
        }

        for index in &chain {
            self.node_mut(*index)?.execution_status = ExecutionStatus::Valid;
        }

        Ok(chain.len())
    }

    fn node(&self, node_index: NodeIndex) -> Result<&BlockNode, Error> {
        self.nodes
            .get(node_index)
            .ok_or(Error::InvalidNodeIndex { node_index })
    }

    fn node_mut(&mut self, node_index: NodeIndex) -> Result<&mut BlockNode, Error> {
        self.nodes
            .get_mut(node_index)
            .ok_or(Error::InvalidNodeIndex { node_index })
    }

    fn root_at(&self, node_index: Option<NodeIndex>) -> Option<H256> {
        node_index
            .and_then(|node_index| self.get_by_index(node_index))
            .map(|node| node.block_root)
    }

    // There are four outcomes:
    // - The child is already the best child but no longer leads to a viable head. It is removed.
    // - The child is already the best child. The best descendant of the parent is refreshed.
    // - The child is not the best child but becomes the best child.
    // - The child is not the best child and does not become the best child.
    fn maybe_update_best_child_and_descendant(
        &mut self,
        parent_index: NodeIndex,
        child_index: NodeIndex,
        viability: &Viability,
    ) -> Result<(), Error> {
        let child = self.node(child_index)?;
        let parent = self.node(parent_index)?;

        let child_leads_to_viable_head = self.leads_to_viable_head(child, viability)?;

        let change_to_none = (None, None);
        let change_to_child = (
            Some(child_index),
            Some(child.best_descendant.unwrap_or(child_index)),
        );
        let no_change = (parent.best_child, parent.best_descendant);

        let (best_child, best_descendant) = match parent.best_child {
            Some(best_child_index) if best_child_index == child_index => {
                if child_leads_to_viable_head {
                    change_to_child
                } else {
                    change_to_none
                }
            }
            Some(best_child_index) => {
                let best_child = self.node(best_child_index)?;
                let best_child_leads_to_viable_head =
                    self.leads_to_viable_head(best_child, viability)?;

                match (child_leads_to_viable_head, best_child_leads_to_viable_head) {
                    (true, false) => change_to_child,
                    (false, true) => no_change,
                    // Ties are broken in favor of the lexicographically higher root.
                    _ if (child.weight, child.block_root)
                        >= (best_child.weight, best_child.block_root) =>
                    {
                        change_to_child
                    }
                    _ => no_change,
                }
            }
            None if child_leads_to_viable_head => change_to_child,
            None => no_change,
        };

        let parent = self.node_mut(parent_index)?;

        parent.best_child = best_child;
        parent.best_descendant = best_descendant;

        Ok(())
    }

    fn leads_to_viable_head(&self, node: &BlockNode, viability: &Viability) -> Result<bool, Error> {
        let best_descendant_is_viable = match node.best_descendant {
            Some(node_index) => self.is_node_viable_for_head(self.node(node_index)?, viability),
            None => false,
        };

        Ok(best_descendant_is_viable || self.is_node_viable_for_head(node, viability))
    }

    // See [`filter_block_tree`] and [`node_is_viable_for_head` in Lighthouse].
    //
    // [`filter_block_tree`]:                      https://github.com/ethereum/consensus-specs/blob/v1.4.0/specs/phase0/fork-choice.md#filter_block_tree
    // [`node_is_viable_for_head` in Lighthouse]:  https://github.com/sigp/lighthouse/blob/v5.1.3/consensus/proto_array/src/proto_array.rs#L990
    fn is_node_viable_for_head(&self, node: &BlockNode, viability: &Viability) -> bool {
        if node.execution_status.is_invalid() {
            return false;
        }

        let Viability {
            justified_checkpoint,
            finalized_checkpoint,
            current_epoch,
        } = *viability;

        let node_epoch = misc::compute_epoch_at_slot::<P>(node.slot);

        // Blocks from prior epochs would have their unrealized checkpoints pulled up by now.
        let voting_source = if current_epoch > node_epoch {
            node.unrealized_justified_checkpoint
        } else {
            node.justified_checkpoint
        };

        let correct_justified = justified_checkpoint.epoch == GENESIS_EPOCH
            || voting_source.epoch == justified_checkpoint.epoch
            || voting_source.epoch + 2 >= current_epoch;

        let correct_finalized = finalized_checkpoint.epoch == GENESIS_EPOCH
            || self.is_finalized_checkpoint_or_descendant(node, finalized_checkpoint);

        correct_justified && correct_finalized
    }

    fn is_finalized_checkpoint_or_descendant(
        &self,
        node: &BlockNode,
        finalized_checkpoint: Checkpoint,
    ) -> bool {
        if node.checkpoints().contains(&finalized_checkpoint) {
            return true;
        }

        let finalized_slot = misc::compute_start_slot_at_epoch::<P>(finalized_checkpoint.epoch);

        // The first ancestor at or before the finalized slot must be the finalized block itself.
        // Skipped slots may place it before the start of the epoch.
        core::iter::successors(Some(node), |node| {
            node.parent
                .and_then(|parent_index| self.get_by_index(parent_index))
        })
        .find(|node| node.slot <= finalized_slot)
        .is_some_and(|node| node.block_root == finalized_checkpoint.root)
    }
}
