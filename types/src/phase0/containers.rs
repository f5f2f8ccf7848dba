use serde::{Deserialize, Serialize};

use crate::phase0::primitives::{Epoch, H256};

#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Debug, Deserialize, Serialize,
)]
#[serde(deny_unknown_fields)]
pub struct Checkpoint {
    pub epoch: Epoch,
    pub root: H256,
}

impl Checkpoint {
    #[must_use]
    pub const fn new(epoch: Epoch, root: H256) -> Self {
        Self { epoch, root }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn checkpoint_serializes_root_as_hex() -> Result<(), serde_json::Error> {
        let checkpoint = Checkpoint::new(3, H256::repeat_byte(0xab));

        let json = serde_json::to_value(checkpoint)?;

        assert_eq!(
            json,
            json!({
                "epoch": 3,
                "root": "0xabababababababababababababababababababababababababababababababab",
            }),
        );

        assert_eq!(serde_json::from_value::<Checkpoint>(json)?, checkpoint);

        Ok(())
    }

    #[test]
    fn checkpoint_rejects_unknown_fields() {
        let result = serde_json::from_value::<Checkpoint>(json!({
            "epoch": 0,
            "root": "0x0000000000000000000000000000000000000000000000000000000000000000",
            "slot": 0,
        }));

        assert!(result.is_err());
    }
}
