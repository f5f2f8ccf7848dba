use std::sync::mpsc::Sender;

use clock::Tick;
use fork_choice_store::{AttestationVote, NewBlock};
use log::debug;
use strum::AsRefStr;
use types::{
    nonstandard::PayloadStatus,
    phase0::primitives::{ExecutionBlockHash, Gwei, Slot, ValidatorIndex, H256},
};

// A `wait_group` is attached to every mutation to make `Controller::wait_for_tasks` work.
// It is dropped once the mutation has been applied and the snapshot published.
pub enum MutatorMessage<W> {
    Mutation { wait_group: W, mutation: Mutation },
    Stop,
}

impl<W> MutatorMessage<W> {
    pub(crate) fn send(self, tx: &Sender<Self>) {
        if tx.send(self).is_err() {
            // This can happen if the mutator thread exits early due to failure.
            debug!("send to mutator failed because the receiver was dropped");
        }
    }
}

#[derive(AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Mutation {
    Tick(Tick),
    Block(NewBlock),
    Attestation(AttestationVote),
    AttesterSlashing(Vec<ValidatorIndex>),
    Balances(Vec<Gwei>),
    PayloadStatus {
        block_root: H256,
        status: PayloadStatus,
    },
    InvalidPayload {
        block_root: H256,
        latest_valid_hash: Option<ExecutionBlockHash>,
    },
    ProposerBoost {
        block_root: H256,
        slot: Slot,
    },
}
