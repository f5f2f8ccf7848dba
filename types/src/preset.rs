use core::{fmt::Debug, hash::Hash};

use serde_with::{DeserializeFromStr, SerializeDisplay};
use strum::{Display, EnumString};
use typenum::{NonZero, Unsigned, U32, U8};

/// Compile-time configuration variables.
///
/// See [presets in `consensus-specs`](https://github.com/ethereum/consensus-specs/tree/aac851f860fa384916f62027b2dbe3318a354c5b/presets).
/// Only the variables fork choice depends on are included.
pub trait Preset: Copy + Eq + Ord + Hash + Default + Debug + Send + Sync + 'static {
    type SlotsPerEpoch: Unsigned + NonZero;

    // Meta
    const NAME: PresetName;
}

/// [Mainnet preset](https://github.com/ethereum/consensus-specs/tree/aac851f860fa384916f62027b2dbe3318a354c5b/presets/mainnet).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Debug)]
pub struct Mainnet;

impl Preset for Mainnet {
    type SlotsPerEpoch = U32;

    const NAME: PresetName = PresetName::Mainnet;
}

/// [Minimal preset](https://github.com/ethereum/consensus-specs/tree/aac851f860fa384916f62027b2dbe3318a354c5b/presets/minimal).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Debug)]
pub struct Minimal;

impl Preset for Minimal {
    type SlotsPerEpoch = U8;

    const NAME: PresetName = PresetName::Minimal;
}

#[derive(
    Clone, Copy, PartialEq, Eq, Debug, Display, EnumString, DeserializeFromStr, SerializeDisplay,
)]
#[strum(serialize_all = "lowercase")]
pub enum PresetName {
    Mainnet,
    Minimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preset_names_round_trip_through_strings() -> Result<(), strum::ParseError> {
        assert_eq!(Mainnet::NAME.to_string(), "mainnet");
        assert_eq!("minimal".parse::<PresetName>()?, Minimal::NAME);
        Ok(())
    }

    #[test]
    fn minimal_epochs_are_shorter() {
        assert_eq!(<<Mainnet as Preset>::SlotsPerEpoch as Unsigned>::U64, 32);
        assert_eq!(<<Minimal as Preset>::SlotsPerEpoch as Unsigned>::U64, 8);
    }
}
