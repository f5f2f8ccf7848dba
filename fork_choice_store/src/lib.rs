//! Implementation of [Beacon Chain Fork Choice].
//!
//! Blocks are kept in a [`BlockTree`], a flat array of nodes in the style of [`proto_array`].
//! A parent always precedes its children, so weights and best descendants can be maintained
//! with backward passes over the array. The head is found by following best descendant links
//! from the justified block, which makes head lookups O(1) after weights are updated.
//!
//! Votes are not applied to the tree directly. [`VoteRegistry`] keeps the latest vote of every
//! validator along with the balances used the last time weights were computed. Each head update
//! turns the votes that changed since then into per-node deltas.
//!
//! [`Store`] ties the two together and adds the parts of the Fork Choice specification that
//! depend on time: proposer boost, checkpoint updates at epoch boundaries and delayed
//! attestations. It also tracks the execution status of blocks so that optimistically imported
//! blocks can later be validated or invalidated along with their descendants.
//!
//! Blocks are expected to have passed the state transition before they are added. Only the
//! validations that depend on fork choice state are performed here.
//!
//! This implementation makes use of persistent data structures, but they are not required for the
//! algorithm to work. They're only used to make snapshots cheap.
//!
//! Notes on nomenclature:
//! - Pruning means removing finalized ancestors and abandoned forks from the block tree.
//! - A vote is pending until its target epoch is reached and its block is in the tree.
//!
//! [Beacon Chain Fork Choice]: https://github.com/ethereum/consensus-specs/blob/v1.4.0/specs/phase0/fork-choice.md
//! [`proto_array`]:            https://github.com/protolambda/lmd-ghost/tree/242f0dced3b34feed0d4e9d2fd0e5e66e448c359#array-based-stateful-dag-proto_array

pub use crate::{
    error::Error,
    misc::{
        ApplyTickChanges, AttestationAction, AttestationVote, BlockNode, Difference, LatestMessage,
        NewBlock, NodeIndex, NodeSnapshot, ProposerBoost, UnrealizedCheckpoints, Viability,
    },
    proto_array::BlockTree,
    store::Store,
    store_config::{StoreConfig, DEFAULT_PRUNE_THRESHOLD},
    votes::{VoteRegistry, VoteTracker},
};

mod error;
mod misc;
mod proto_array;
mod store;
mod store_config;
mod votes;
