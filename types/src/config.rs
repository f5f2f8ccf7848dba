use core::num::NonZeroU64;
use std::{borrow::Cow, collections::BTreeMap};

use nonzero_ext::nonzero;
use serde::{de::IgnoredAny, Deserialize, Serialize};
use thiserror::Error;

use crate::{
    phase0::primitives::{Gwei, UnixSeconds},
    preset::PresetName,
};

/// Configuration variables customizable at runtime.
///
/// See [configurations in `consensus-specs`](https://github.com/ethereum/consensus-specs/tree/aac851f860fa384916f62027b2dbe3318a354c5b/configs).
///
/// Only the variables used by fork choice and the slot clock are included.
/// Unknown variables are accepted and ignored so that full network configurations can be loaded.
#[expect(
    clippy::unsafe_derive_deserialize,
    reason = "A false positive triggered by `nonzero!`. \
              `Config` has no invariants. It is intended to be deserialized from user input. \
              The `unsafe` block in `nonzero!` only operates on the literal passed to it."
)]
#[expect(
    clippy::struct_field_names,
    reason = "struct_field_name is allowed to have config_name, as it starts with the same name as struct"
)]
#[derive(Debug, Deserialize, Serialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Config {
    // Meta
    pub config_name: Cow<'static, str>,
    pub preset_base: PresetName,

    // Genesis
    pub min_genesis_time: UnixSeconds,

    // Time parameters
    pub seconds_per_slot: NonZeroU64,

    // Fork choice
    pub proposer_score_boost: u64,

    #[serde(flatten, skip_serializing)]
    pub unknown: BTreeMap<String, IgnoredAny>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Meta
            //
            // Use `default` as the default `config_name` and override it in `Config::mainnet`.
            // This way custom network data will be kept separate from mainnet data if a user
            // forgets to specify a custom `CONFIG_NAME`.
            config_name: Cow::Borrowed("default"),
            preset_base: PresetName::Mainnet,

            // Genesis
            min_genesis_time: 0,

            // Time parameters
            seconds_per_slot: nonzero!(12_u64),

            // Fork choice
            proposer_score_boost: 40,

            unknown: BTreeMap::new(),
        }
    }
}

impl Config {
    /// [Mainnet configuration](https://github.com/eth-clients/mainnet/blob/978f1794eada6f85bee76e4d2d5959a5fb8e0cc5/metadata/config.yaml).
    #[must_use]
    pub fn mainnet() -> Self {
        Self {
            // Meta
            config_name: Cow::Borrowed("mainnet"),

            // Genesis
            min_genesis_time: 1_606_824_000,

            ..Self::default()
        }
    }

    /// [Minimal configuration](https://github.com/ethereum/consensus-specs/blob/aac851f860fa384916f62027b2dbe3318a354c5b/configs/minimal.yaml).
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            // Meta
            config_name: Cow::Borrowed("minimal"),
            preset_base: PresetName::Minimal,

            // Genesis
            min_genesis_time: 1_578_009_600,

            // Time parameters
            seconds_per_slot: nonzero!(6_u64),

            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.config_name.is_empty() {
            return Err(Error::NameEmpty);
        }

        // See <https://github.com/ethereum/consensus-specs/blob/aac851f860fa384916f62027b2dbe3318a354c5b/configs/mainnet.yaml#L10>.
        for character in self.config_name.chars() {
            if !matches!(character, 'a'..='z' | '0'..='9' | '-') {
                return Err(Error::NameContainsIllegalCharacters);
            }
        }

        if self.proposer_score_boost > 100 {
            return Err(Error::ProposerScoreBoostTooHigh {
                proposer_score_boost: self.proposer_score_boost,
            });
        }

        Ok(())
    }

    /// Weight granted to a timely block, given the weight of one slot's worth of attesters.
    ///
    /// See [`get_proposer_score`](https://github.com/ethereum/consensus-specs/blob/v1.4.0/specs/phase0/fork-choice.md#get_proposer_score).
    #[must_use]
    pub const fn proposer_score(&self, committee_weight: Gwei) -> Gwei {
        committee_weight.saturating_mul(self.proposer_score_boost) / 100
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration name is empty")]
    NameEmpty,
    #[error("configuration name contains illegal characters")]
    NameContainsIllegalCharacters,
    #[error("proposer score boost is a percentage and cannot exceed 100: {proposer_score_boost}")]
    ProposerScoreBoostTooHigh { proposer_score_boost: u64 },
}

#[expect(
    clippy::needless_pass_by_value,
    reason = "Refactoring worsens readability, which is more important in tests."
)]
