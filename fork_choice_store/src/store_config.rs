use derivative::Derivative;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Derivative)]
#[derivative(Default)]
pub struct StoreConfig {
    // Pruning is skipped while fewer than this many nodes precede the finalized block.
    #[derivative(Default(value = "DEFAULT_PRUNE_THRESHOLD"))]
    pub prune_threshold: usize,
    #[derivative(Default(value = "true"))]
    pub proposer_boost_enabled: bool,
}

/// Prune on every finalization. A nonzero threshold batches pruning at the cost of keeping
/// nodes that can no longer become the head.
pub const DEFAULT_PRUNE_THRESHOLD: usize = 0;
