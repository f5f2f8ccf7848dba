// The mutator is the only code that mutates `Store`.
// It applies mutations in the order they were sent, recomputes the head after each one,
// and only then publishes the new snapshot. Readers never observe a store between a mutation
// and the head update that follows it.

use std::sync::{mpsc::Receiver, Arc};

use anyhow::Result;
use arc_swap::ArcSwap;
use fork_choice_store::{BlockNode, Store};
use log::{debug, warn};
use std_ext::ArcExt as _;
use types::{phase0::containers::Checkpoint, preset::Preset};

use crate::{
    events::{ChainReorgEvent, Event, EventSink, FinalizedCheckpointEvent, HeadEvent},
    messages::{Mutation, MutatorMessage},
};

pub struct Mutator<P: Preset, W, S> {
    store: Arc<Store<P>>,
    store_snapshot: Arc<ArcSwap<Store<P>>>,
    mutator_rx: Receiver<MutatorMessage<W>>,
    event_tx: S,
}

impl<P: Preset, W, S: EventSink> Mutator<P, W, S> {
    pub fn new(
        store_snapshot: Arc<ArcSwap<Store<P>>>,
        mutator_rx: Receiver<MutatorMessage<W>>,
        event_tx: S,
    ) -> Self {
        Self {
            store: store_snapshot.load_full(),
            store_snapshot,
            mutator_rx,
            event_tx,
        }
    }

    pub fn run(&mut self) -> Result<()> {
        // The loop also ends if every sender is dropped without sending `Stop`.
        while let Ok(message) = self.mutator_rx.recv() {
            match message {
                MutatorMessage::Mutation {
                    wait_group,
                    mutation,
                } => {
                    self.handle_mutation(mutation)?;
                    drop(wait_group);
                }
                MutatorMessage::Stop => break,
            }
        }

        debug!("mutator stopped (head: {:?})", self.store.head());

        Ok(())
    }

    fn handle_mutation(&mut self, mutation: Mutation) -> Result<()> {
        let name = mutation.as_ref().to_owned();
        let old_head = self.head_node();
        let old_finalized_checkpoint = self.store.finalized_checkpoint();

        let result = match mutation {
            Mutation::Tick(tick) => self
                .store_mut()
                .apply_tick(tick)
                .map(|changes| changes.is_some()),
            Mutation::Block(block) => self.store_mut().on_block(block).map(|()| true),
            Mutation::Attestation(vote) => self.store_mut().on_attestation(vote).map(|_| true),
            Mutation::AttesterSlashing(validator_indices) => {
                self.store_mut().on_attester_slashing(validator_indices);
                Ok(true)
            }
            Mutation::Balances(balances) => {
                self.store_mut().update_balances(balances);
                Ok(true)
            }
            Mutation::PayloadStatus { block_root, status } => self
                .store_mut()
                .on_execution_payload_result(block_root, status)
                .map(|()| true),
            Mutation::InvalidPayload {
                block_root,
                latest_valid_hash,
            } => self
                .store_mut()
                .on_invalid_execution_payload(block_root, latest_valid_hash)
                .map(|()| true),
            Mutation::ProposerBoost { block_root, slot } => {
                self.store_mut().apply_proposer_boost(block_root, slot);
                Ok(true)
            }
        };

        match result {
            Ok(true) => {}
            Ok(false) => return Ok(()),
            Err(error) => {
                warn!("{name} rejected: {error:#}");
                return Ok(());
            }
        }

        // Failing to find a head means the store is no longer usable.
        self.store_mut().update_head()?;
        self.update_store_snapshot();
        self.send_events(old_head, old_finalized_checkpoint);

        Ok(())
    }

    fn send_events(&self, old_head: Option<BlockNode>, old_finalized_checkpoint: Checkpoint) {
        if let Some(new_head) = self.head_node() {
            if old_head.map(|old| old.block_root) != Some(new_head.block_root) {
                self.send_head_events(old_head, &new_head);
            }
        }

        let finalized_checkpoint = self.store.finalized_checkpoint();

        if finalized_checkpoint != old_finalized_checkpoint {
            let event = FinalizedCheckpointEvent::new(&self.store, finalized_checkpoint);
            self.event_tx.send_event(Event::FinalizedCheckpoint(event));
        }
    }

    fn send_head_events(&self, old_head: Option<BlockNode>, new_head: &BlockNode) {
        if let Some(old_head) = old_head {
            if !self
                .store
                .is_descendant(old_head.block_root, new_head.block_root)
            {
                let event = ChainReorgEvent::new(&self.store, &old_head, new_head);

                debug!("chain reorganized: {event:?}");

                self.event_tx.send_event(Event::ChainReorg(event));
            }
        }

        self.event_tx
            .send_event(Event::Head(HeadEvent::new(&self.store, new_head)));
    }

    fn head_node(&self) -> Option<BlockNode> {
        self.store.block_tree().get(self.store.head()).copied()
    }

    fn update_store_snapshot(&self) {
        // `ArcSwap::rcu` is not necessary here because there is only one thread mutating the store.
        self.store_snapshot.store(self.store.clone_arc());
    }

    fn store_mut(&mut self) -> &mut Store<P> {
        self.store.make_mut()
    }
}
