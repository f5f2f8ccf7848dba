use fork_choice_store::{BlockNode, Store};
use futures::{
    channel::mpsc::{TrySendError, UnboundedSender},
    sink::Drain,
};
use helper_functions::misc;
use log::debug;
use serde::Serialize;
use strum::AsRefStr;
use types::{
    phase0::{
        containers::Checkpoint,
        primitives::{Epoch, Slot, H256},
    },
    preset::Preset,
};

#[derive(Clone, Copy, PartialEq, Eq, Debug, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Topic {
    ChainReorg,
    FinalizedCheckpoint,
    Head,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Event {
    ChainReorg(ChainReorgEvent),
    FinalizedCheckpoint(FinalizedCheckpointEvent),
    Head(HeadEvent),
}

impl Event {
    #[must_use]
    pub const fn topic(&self) -> Topic {
        match self {
            Self::ChainReorg(_) => Topic::ChainReorg,
            Self::FinalizedCheckpoint(_) => Topic::FinalizedCheckpoint,
            Self::Head(_) => Topic::Head,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
pub struct HeadEvent {
    pub slot: Slot,
    pub block: H256,
    pub state: H256,
    pub epoch_transition: bool,
    pub execution_optimistic: bool,
}

impl HeadEvent {
    pub(crate) fn new<P: Preset>(store: &Store<P>, head: &BlockNode) -> Self {
        Self {
            slot: head.slot,
            block: head.block_root,
            state: head.state_root,
            epoch_transition: misc::is_epoch_start::<P>(head.slot),
            execution_optimistic: store.is_optimistic(head.block_root),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
pub struct ChainReorgEvent {
    pub slot: Slot,
    pub depth: u64,
    pub old_head_block: H256,
    pub new_head_block: H256,
    pub old_head_state: H256,
    pub new_head_state: H256,
    pub epoch: Epoch,
    pub execution_optimistic: bool,
}

impl ChainReorgEvent {
    // `depth` is the distance from the old head to the newest block it shares with the new head.
    pub(crate) fn new<P: Preset>(
        store: &Store<P>,
        old_head: &BlockNode,
        new_head: &BlockNode,
    ) -> Self {
        let common_ancestor_slot = store
            .ancestors(new_head.block_root)
            .find(|node| store.is_descendant(node.block_root, old_head.block_root))
            .map_or_else(
                // The old head is no longer in the block tree if an alternate chain was finalized.
                || misc::compute_start_slot_at_epoch::<P>(old_head.finalized_checkpoint.epoch),
                |node| node.slot,
            );

        Self {
            slot: new_head.slot,
            depth: common_ancestor_slot.abs_diff(old_head.slot),
            old_head_block: old_head.block_root,
            new_head_block: new_head.block_root,
            old_head_state: old_head.state_root,
            new_head_state: new_head.state_root,
            epoch: misc::compute_epoch_at_slot::<P>(new_head.slot),
            execution_optimistic: store.is_optimistic(new_head.block_root),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
pub struct FinalizedCheckpointEvent {
    pub block: H256,
    pub state: H256,
    pub epoch: Epoch,
    pub execution_optimistic: bool,
}

impl FinalizedCheckpointEvent {
    pub(crate) fn new<P: Preset>(store: &Store<P>, checkpoint: Checkpoint) -> Self {
        let state = store
            .finalized_block()
            .map(|node| node.state_root)
            .unwrap_or_default();

        Self {
            block: checkpoint.root,
            state,
            epoch: checkpoint.epoch,
            execution_optimistic: store.is_optimistic(checkpoint.root),
        }
    }
}

/// Destination for events emitted by the mutator.
pub trait EventSink: Send + 'static {
    fn send_event(&self, event: Event);
}

impl<S: EventSink> EventSink for Option<S> {
    fn send_event(&self, event: Event) {
        if let Some(sink) = self {
            sink.send_event(event);
        }
    }
}

impl EventSink for UnboundedSender<Event> {
    fn send_event(&self, event: Event) {
        if let Err(event) = self.unbounded_send(event).map_err(TrySendError::into_inner) {
            debug!(
                "{} event dropped because the receiver was dropped",
                event.topic().as_ref(),
            );
        }
    }
}

impl EventSink for Drain<Event> {
    fn send_event(&self, _event: Event) {}
}
