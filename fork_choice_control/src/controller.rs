// Instead of mutating `Store` directly, the `on_*` methods send messages to a mutator thread.
// Query methods operate on a recent but potentially out-of-date snapshot of `Store`.
// This serves to accomplish 2 things:
// - Query methods do not need to wait.
// - The `on_*` methods return quickly and can thus be called from `async` tasks.

use core::panic::AssertUnwindSafe;
use std::{
    sync::{mpsc::Sender, Arc},
    thread::{Builder, JoinHandle},
};

use anyhow::{Context as _, Result};
use arc_swap::{ArcSwap, Guard};
use clock::Tick;
use crossbeam_utils::sync::WaitGroup;
use fork_choice_store::{
    AttestationVote, LatestMessage, NewBlock, NodeSnapshot, Store, StoreConfig,
};
use log::error;
use std_ext::ArcExt as _;
use thiserror::Error;
use types::{
    config::Config as ChainConfig,
    nonstandard::PayloadStatus,
    phase0::{
        containers::Checkpoint,
        primitives::{ExecutionBlockHash, Gwei, Slot, ValidatorIndex, H256},
    },
    preset::Preset,
};

use crate::{
    events::EventSink,
    messages::{Mutation, MutatorMessage},
    mutator::Mutator,
    wait::Wait,
};

pub struct Controller<P: Preset, W: Wait = ()> {
    // The latest consistent snapshot of the store.
    store_snapshot: Arc<ArcSwap<Store<P>>>,
    wait_group: W::Swappable,
    mutator_tx: Sender<MutatorMessage<W>>,
}

impl<P: Preset, W: Wait> Drop for Controller<P, W> {
    fn drop(&mut self) {
        MutatorMessage::Stop.send(&self.mutator_tx);
    }
}

impl<P: Preset, W: Wait> Controller<P, W> {
    pub fn new(
        chain_config: Arc<ChainConfig>,
        store_config: StoreConfig,
        anchor: NewBlock,
        tick: Tick,
        event_tx: impl EventSink,
    ) -> Result<(Arc<Self>, MutatorHandle<W>)> {
        let mut store = Store::new(chain_config, store_config, anchor)?;

        store.apply_tick(tick)?;

        let store_snapshot = Arc::new(ArcSwap::from_pointee(store));
        let wait_group = W::Swappable::default();
        let (mutator_tx, mutator_rx) = std::sync::mpsc::channel();

        let mut mutator = Mutator::new(store_snapshot.clone_arc(), mutator_rx, event_tx);
        let mutator_wait_group = wait_group.clone();

        let join_handle = Builder::new()
            .name("store-mutator".to_owned())
            .spawn(move || {
                // The closure should be unwind safe.
                // The instance of `Store` used by the mutator may become inconsistent but cannot be
                // observed because the shared snapshot is only updated with consistent values.
                let result = std::panic::catch_unwind(AssertUnwindSafe(|| mutator.run()))
                    .map_err(panics::payload_into_error)
                    .context(Error::MutatorPanicked)
                    .and_then(|result| result.context(Error::MutatorFailed));

                if let Err(error) = &result {
                    error!("{error:?}");
                    W::poison(&mutator_wait_group);
                }

                result
            })?;

        let controller = Arc::new(Self {
            store_snapshot,
            wait_group,
            mutator_tx: mutator_tx.clone(),
        });

        let mutator_handle = MutatorHandle {
            join_handle: Some(join_handle),
            mutator_tx,
        };

        Ok((controller, mutator_handle))
    }

    // This should be called at the start of every tick.
    // Ticks that are not newer than the current one are ignored by `Store`.
    pub fn on_tick(&self, tick: Tick) {
        self.send_mutation(Mutation::Tick(tick));
    }

    pub fn on_block(&self, block: NewBlock) {
        self.send_mutation(Mutation::Block(block));
    }

    pub fn on_attestation(&self, vote: AttestationVote) {
        self.send_mutation(Mutation::Attestation(vote));
    }

    pub fn on_attester_slashing(&self, validator_indices: Vec<ValidatorIndex>) {
        self.send_mutation(Mutation::AttesterSlashing(validator_indices));
    }

    pub fn on_justified_balances(&self, balances: Vec<Gwei>) {
        self.send_mutation(Mutation::Balances(balances));
    }

    pub fn on_execution_payload_result(&self, block_root: H256, status: PayloadStatus) {
        self.send_mutation(Mutation::PayloadStatus { block_root, status });
    }

    pub fn on_invalid_execution_payload(
        &self,
        block_root: H256,
        latest_valid_hash: Option<ExecutionBlockHash>,
    ) {
        self.send_mutation(Mutation::InvalidPayload {
            block_root,
            latest_valid_hash,
        });
    }

    pub fn on_proposer_boost(&self, block_root: H256, slot: Slot) {
        self.send_mutation(Mutation::ProposerBoost { block_root, slot });
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<Store<P>> {
        self.store_snapshot.load_full()
    }

    #[must_use]
    pub fn head(&self) -> H256 {
        self.store_snapshot().head()
    }

    #[must_use]
    pub fn heads(&self) -> Vec<H256> {
        self.store_snapshot().heads().collect()
    }

    #[must_use]
    pub fn justified_checkpoint(&self) -> Checkpoint {
        self.store_snapshot().justified_checkpoint()
    }

    #[must_use]
    pub fn finalized_checkpoint(&self) -> Checkpoint {
        self.store_snapshot().finalized_checkpoint()
    }

    #[must_use]
    pub fn is_optimistic(&self, block_root: H256) -> bool {
        self.store_snapshot().is_optimistic(block_root)
    }

    #[must_use]
    pub fn all_nodes(&self) -> Vec<NodeSnapshot> {
        self.store_snapshot().all_nodes()
    }

    #[must_use]
    pub fn latest_message(&self, validator_index: ValidatorIndex) -> Option<LatestMessage> {
        self.store_snapshot().latest_message(validator_index)
    }

    fn store_snapshot(&self) -> Guard<Arc<Store<P>>> {
        self.store_snapshot.load()
    }

    fn send_mutation(&self, mutation: Mutation) {
        // Assume that sending to an unbounded channel never blocks.
        MutatorMessage::Mutation {
            wait_group: W::load_and_clone(&self.wait_group),
            mutation,
        }
        .send(&self.mutator_tx);
    }
}

impl<P: Preset> Controller<P, WaitGroup> {
    /// Blocks until every message sent before the call has been processed.
    pub fn wait_for_tasks(&self) {
        let wait_group = core::mem::take(
            &mut *self
                .wait_group
                .lock()
                .expect("Controller.wait_group mutex is poisoned"),
        );

        wait_group.wait();
    }
}

/// A wrapper over [`JoinHandle`] that can be used to wait for the mutator thread to finish.
///
/// In normal operation the mutator thread should be joined explicitly using
/// [`MutatorHandle::join`]. Tests may drop [`MutatorHandle`], at which point the mutator thread
/// will be joined implicitly.
pub struct MutatorHandle<W> {
    join_handle: Option<JoinHandle<Result<()>>>,
    mutator_tx: Sender<MutatorMessage<W>>,
}

impl<W> Drop for MutatorHandle<W> {
    fn drop(&mut self) {
        // Stop the mutator thread to avoid a deadlock if the corresponding `Controller` hasn't been
        // dropped yet.
        MutatorMessage::Stop.send(&self.mutator_tx);

        let result = self.join_internal();

        if !std::thread::panicking() {
            result.expect("mutator thread should succeed when joined implicitly")
        }
    }
}

impl<W> MutatorHandle<W> {
    pub fn join(mut self) -> Result<()> {
        self.join_internal()
    }

    fn join_internal(&mut self) -> Result<()> {
        // `MutatorHandle::join_internal` is called twice when joined explicitly.
        match self.join_handle.take() {
            Some(join_handle) => join_handle
                .join()
                .expect("mutator thread handles panics internally"),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Error)]
enum Error {
    #[error("mutator panicked")]
    MutatorPanicked,
    #[error("mutator failed")]
    MutatorFailed,
}
