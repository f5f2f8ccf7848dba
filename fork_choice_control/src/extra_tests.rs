use std::sync::Arc;

use anyhow::Result;
use clock::{Tick, TickKind};
use crossbeam_utils::sync::WaitGroup;
use fork_choice_store::{AttestationVote, NewBlock, StoreConfig};
use futures::channel::mpsc::UnboundedReceiver;
use types::{
    config::Config,
    nonstandard::{ExecutionStatus, PayloadStatus},
    phase0::{
        containers::Checkpoint,
        primitives::{Slot, ValidatorIndex, H256},
    },
    preset::Minimal,
};

use crate::{
    controller::{Controller, MutatorHandle},
    events::{ChainReorgEvent, Event, FinalizedCheckpointEvent, HeadEvent, Topic},
};

type TestController = Arc<Controller<Minimal, WaitGroup>>;

const GENESIS_ROOT: H256 = H256::repeat_byte(0x01);

fn start() -> Result<(
    TestController,
    MutatorHandle<WaitGroup>,
    UnboundedReceiver<Event>,
)> {
    let (event_tx, event_rx) = futures::channel::mpsc::unbounded();

    let genesis = NewBlock {
        execution_status: ExecutionStatus::PreMerge,
        execution_payload_block_hash: None,
        ..block(0, GENESIS_ROOT, H256::zero())
    };

    let (controller, mutator_handle) = Controller::new(
        Arc::new(Config::minimal()),
        StoreConfig::default(),
        genesis,
        Tick::start_of_slot(0),
        event_tx,
    )?;

    Ok((controller, mutator_handle, event_rx))
}

fn block(slot: Slot, block_root: H256, parent_root: H256) -> NewBlock {
    let genesis_checkpoint = Checkpoint::new(0, GENESIS_ROOT);

    NewBlock {
        slot,
        block_root,
        parent_root,
        state_root: H256::from_low_u64_be(slot),
        target_root: H256::zero(),
        justified_checkpoint: genesis_checkpoint,
        finalized_checkpoint: genesis_checkpoint,
        unrealized_checkpoints: None,
        execution_status: ExecutionStatus::Syncing,
        execution_payload_block_hash: Some(block_root),
    }
}

fn vote(validator_index: ValidatorIndex, slot: Slot, beacon_block_root: H256) -> AttestationVote {
    AttestationVote {
        validator_index,
        slot,
        target_epoch: 0,
        beacon_block_root,
        effective_balance: 32,
    }
}

fn chain_root(slot: Slot) -> H256 {
    H256::from_low_u64_be(0x1000 + slot)
}

fn drain(events: &mut UnboundedReceiver<Event>) -> Vec<Event> {
    core::iter::from_fn(|| events.try_next().ok().flatten()).collect()
}

#[test]
fn head_follows_votes_and_reorgs_are_reported() -> Result<()> {
    let (controller, _mutator_handle, mut events) = start()?;

    let root_a = H256::repeat_byte(0x0a);
    let root_b = H256::repeat_byte(0x0b);

    controller.on_tick(Tick::new(1, TickKind::Attest));
    controller.on_block(block(1, root_a, GENESIS_ROOT));
    controller.on_block(block(1, root_b, GENESIS_ROOT));
    controller.on_tick(Tick::start_of_slot(2));

    for validator_index in 0..3 {
        controller.on_attestation(vote(validator_index, 1, root_a));
    }

    controller.wait_for_tasks();

    assert_eq!(controller.head(), root_a);
    assert_eq!(controller.heads().len(), 2);

    drain(&mut events);

    // Attestations from the current slot are applied in the next one.
    for validator_index in 3..7 {
        controller.on_attestation(vote(validator_index, 2, root_b));
    }

    controller.on_tick(Tick::start_of_slot(3));
    controller.wait_for_tasks();

    assert_eq!(controller.head(), root_b);

    let events = drain(&mut events);

    assert_eq!(
        events.last(),
        Some(&Event::Head(HeadEvent {
            slot: 1,
            block: root_b,
            state: H256::from_low_u64_be(1),
            epoch_transition: false,
            execution_optimistic: true,
        })),
    );

    assert!(events.contains(&Event::ChainReorg(ChainReorgEvent {
        slot: 1,
        depth: 1,
        old_head_block: root_a,
        new_head_block: root_b,
        old_head_state: H256::from_low_u64_be(1),
        new_head_state: H256::from_low_u64_be(1),
        epoch: 0,
        execution_optimistic: true,
    })));

    Ok(())
}

// ```text
// 0 <- 1 <- ... <- 8 <- ... <- 16 <- 17 (finalizes 8)
// ```
#[test]
fn finalization_is_reported_and_prunes_snapshot() -> Result<()> {
    let (controller, _mutator_handle, mut events) = start()?;
    let checkpoint = Checkpoint::new(1, chain_root(8));

    controller.on_tick(Tick::new(17, TickKind::Attest));

    for slot in 1..=16 {
        let parent_root = if slot == 1 {
            GENESIS_ROOT
        } else {
            chain_root(slot - 1)
        };

        controller.on_block(block(slot, chain_root(slot), parent_root));
    }

    controller.on_block(NewBlock {
        justified_checkpoint: checkpoint,
        finalized_checkpoint: checkpoint,
        ..block(17, chain_root(17), chain_root(16))
    });

    controller.wait_for_tasks();

    assert_eq!(controller.head(), chain_root(17));
    assert_eq!(controller.finalized_checkpoint(), checkpoint);
    assert_eq!(controller.justified_checkpoint(), checkpoint);
    assert_eq!(controller.all_nodes().len(), 10);

    let finalized_events = drain(&mut events)
        .into_iter()
        .filter(|event| event.topic() == Topic::FinalizedCheckpoint)
        .collect::<Vec<_>>();

    assert_eq!(
        finalized_events,
        [Event::FinalizedCheckpoint(FinalizedCheckpointEvent {
            block: chain_root(8),
            state: H256::from_low_u64_be(8),
            epoch: 1,
            execution_optimistic: true,
        })],
    );

    Ok(())
}

#[test]
fn rejected_objects_do_not_stop_mutator() -> Result<()> {
    let (controller, _mutator_handle, _events) = start()?;
    let root_a = H256::repeat_byte(0x0a);

    controller.on_tick(Tick::new(1, TickKind::Attest));
    controller.on_block(block(1, H256::repeat_byte(0xff), H256::repeat_byte(0xee)));
    controller.on_block(block(2, H256::repeat_byte(0xdd), GENESIS_ROOT));
    controller.on_block(block(1, root_a, GENESIS_ROOT));
    controller.wait_for_tasks();

    assert_eq!(controller.head(), root_a);
    assert_eq!(controller.all_nodes().len(), 2);

    Ok(())
}

#[test]
fn invalid_payload_moves_head_back_to_valid_ancestor() -> Result<()> {
    let (controller, _mutator_handle, mut events) = start()?;
    let root_a = H256::repeat_byte(0x0a);

    controller.on_tick(Tick::new(1, TickKind::Attest));
    controller.on_block(block(1, root_a, GENESIS_ROOT));
    controller.wait_for_tasks();

    assert_eq!(controller.head(), root_a);
    assert!(controller.is_optimistic(root_a));

    drain(&mut events);

    controller.on_execution_payload_result(root_a, PayloadStatus::Invalid);
    controller.wait_for_tasks();

    assert_eq!(controller.head(), GENESIS_ROOT);
    assert!(!controller.is_optimistic(GENESIS_ROOT));

    let events = drain(&mut events);

    assert!(matches!(
        events.as_slice(),
        [Event::ChainReorg(_), Event::Head(HeadEvent { block, .. })] if *block == GENESIS_ROOT,
    ));

    Ok(())
}

#[test]
fn snapshots_taken_earlier_are_not_affected_by_later_mutations() -> Result<()> {
    let (controller, _mutator_handle, _events) = start()?;

    let snapshot = controller.snapshot();

    controller.on_tick(Tick::new(1, TickKind::Attest));
    controller.on_block(block(1, H256::repeat_byte(0x0a), GENESIS_ROOT));
    controller.wait_for_tasks();

    assert_eq!(snapshot.all_nodes().len(), 1);
    assert_eq!(snapshot.head(), GENESIS_ROOT);
    assert_eq!(controller.all_nodes().len(), 2);

    Ok(())
}

#[test]
fn mutator_stops_when_controller_is_dropped() -> Result<()> {
    let (controller, mutator_handle, _events) = start()?;

    controller.on_justified_balances(vec![32; 4]);
    controller.on_attester_slashing(vec![0]);

    drop(controller);

    mutator_handle.join()
}
