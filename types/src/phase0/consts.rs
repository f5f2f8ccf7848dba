use crate::phase0::primitives::Epoch;

pub const GENESIS_EPOCH: Epoch = 0;
