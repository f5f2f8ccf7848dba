use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Verdict returned by an execution engine for a single payload.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadStatus {
    Valid,
    Invalid,
    Optimistic,
}

impl PayloadStatus {
    #[must_use]
    pub const fn is_valid(self) -> bool {
        matches!(self, Self::Valid)
    }

    #[must_use]
    pub const fn is_invalid(self) -> bool {
        matches!(self, Self::Invalid)
    }

    #[must_use]
    pub const fn is_optimistic(self) -> bool {
        matches!(self, Self::Optimistic)
    }
}

/// Execution payload status of a block as tracked by fork choice.
///
/// `Syncing` blocks were imported optimistically. Their payloads have not been verified yet.
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    Debug,
    AsRefStr,
    Display,
    EnumString,
    Deserialize,
    Serialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExecutionStatus {
    PreMerge,
    Syncing,
    Valid,
    Invalid,
}

impl ExecutionStatus {
    #[must_use]
    pub const fn is_valid(self) -> bool {
        matches!(self, Self::Valid)
    }

    #[must_use]
    pub const fn is_invalid(self) -> bool {
        matches!(self, Self::Invalid)
    }

    #[must_use]
    pub const fn is_optimistic(self) -> bool {
        matches!(self, Self::Syncing)
    }

    /// Whether a node with status `self` may be moved to status `new`.
    ///
    /// Setting a status a node already has is allowed and has no effect.
    #[must_use]
    pub const fn can_transition_to(self, new: Self) -> bool {
        matches!(
            (self, new),
            (Self::Syncing, Self::Valid | Self::Invalid)
                | (Self::PreMerge, Self::PreMerge)
                | (Self::Syncing, Self::Syncing)
                | (Self::Valid, Self::Valid)
                | (Self::Invalid, Self::Invalid),
        )
    }
}
