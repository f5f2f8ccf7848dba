use std::sync::{Arc, Mutex};

use crossbeam_utils::sync::WaitGroup;

/// Tracks messages sent to the mutator so that tests can wait for them to be processed.
///
/// Production code uses `()`, which tracks nothing.
pub trait Wait: Clone + Default + Send + 'static {
    // Shared by the `Controller` and the mutator thread.
    type Swappable: Clone + Default + Send + Sync + 'static;

    fn load_and_clone(swappable: &Self::Swappable) -> Self;

    // Called by the mutator thread when it fails.
    // Later calls to `Controller::wait_for_tasks` panic instead of returning normally.
    fn poison(swappable: &Self::Swappable);
}

impl Wait for () {
    type Swappable = ();

    fn load_and_clone((): &Self::Swappable) -> Self {}

    fn poison((): &Self::Swappable) {}
}

impl Wait for WaitGroup {
    type Swappable = Arc<Mutex<Self>>;

    fn load_and_clone(swappable: &Self::Swappable) -> Self {
        swappable
            .lock()
            .expect("Controller.wait_group mutex is poisoned")
            .clone()
    }

    fn poison(swappable: &Self::Swappable) {
        std::panic::catch_unwind(|| {
            let _guard = swappable.lock();
            panic!("panicking to poison Controller.wait_group mutex");
        })
        .expect_err("closure should intentionally panic to poison mutex");
    }
}
