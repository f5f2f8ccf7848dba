//! Supporting code for the fork choice store.
//!
//! This crate handles the following concerns:
//! - Serializing mutations of the store on a dedicated thread.
//! - Publishing consistent snapshots of the store to readers.
//! - [Waiting for task completion](`Controller::wait_for_tasks`).
//! - Notifying other components of the application about changes to the head and finality.
//! - Testing.

pub use crate::{
    controller::{Controller, MutatorHandle},
    events::{ChainReorgEvent, Event, EventSink, FinalizedCheckpointEvent, HeadEvent, Topic},
    wait::Wait,
};

mod controller;
mod events;
mod messages;
mod mutator;
mod wait;

#[cfg(test)]
mod extra_tests;
