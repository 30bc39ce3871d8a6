use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Name of one training island together with its position on the migration ring.
///
/// The position is the trailing run of decimal digits in the name, so `"3"`,
/// `"island-3"` and `"worker3"` all sit at index 3.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IslandId {
    name: String,
    index: usize,
}

impl IslandId {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> usize {
        self.index
    }

    fn prefix(&self) -> &str {
        &self.name[..suffix_start(&self.name)]
    }

    /// The island that follows this one on a ring of `total_islands` islands.
    ///
    /// A ring of size one wraps onto itself. `total_islands` of zero is rejected
    /// at configuration time; here it is treated like a ring of one.
    pub fn successor(&self, total_islands: usize) -> IslandId {
        let ring = total_islands.max(1);
        let index = (self.index % ring + 1) % ring;
        IslandId {
            name: format!("{}{}", self.prefix(), index),
            index,
        }
    }
}

/// Byte offset where the trailing run of ASCII digits begins.
fn suffix_start(name: &str) -> usize {
    name.len()
        - name
            .bytes()
            .rev()
            .take_while(u8::is_ascii_digit)
            .count()
}

impl FromStr for IslandId {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidIslandId {
            island_id: name.to_string(),
        };

        let digits = &name[suffix_start(name)..];
        if digits.is_empty() {
            return Err(invalid());
        }

        let index = digits.parse::<usize>().map_err(|_| invalid())?;

        Ok(Self {
            name: name.to_string(),
            index,
        })
    }
}

impl TryFrom<String> for IslandId {
    type Error = Error;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        name.parse()
    }
}

impl From<IslandId> for String {
    fn from(island_id: IslandId) -> Self {
        island_id.name
    }
}

impl fmt::Display for IslandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn island(name: &str) -> IslandId {
        name.parse().unwrap()
    }

    #[test]
    fn bare_index() {
        let id = island("7");
        assert_eq!(id.index(), 7);
        assert_eq!(id.name(), "7");
    }

    #[test]
    fn multi_digit_suffix() {
        let id = island("island-12");
        assert_eq!(id.index(), 12);
    }

    #[test]
    fn missing_suffix_rejected() {
        for name in ["", "island", "3a", "island-", "île"] {
            assert!(
                matches!(name.parse::<IslandId>(), Err(Error::InvalidIslandId { .. })),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn non_ascii_prefix() {
        let id = island("île-2");
        assert_eq!(id.index(), 2);
        assert_eq!(id.successor(3).name(), "île-0");
    }

    #[test]
    fn successor_follows_ring() {
        for n in 2..12 {
            for i in 0..n {
                let next = island(&i.to_string()).successor(n);
                assert_eq!(next.index(), (i + 1) % n);
            }
        }
    }

    #[test]
    fn last_island_wraps_to_zero() {
        assert_eq!(island("9").successor(10), island("0"));
    }

    #[test]
    fn largest_index_does_not_overflow() {
        let id = island(&format!("island-{}", usize::MAX));
        assert_eq!(id.index(), usize::MAX);

        let next = id.successor(10);
        assert_eq!(next.index(), (usize::MAX % 10 + 1) % 10);
        assert_eq!(next.name(), format!("island-{}", next.index()));
        assert_eq!(id.successor(1).index(), 0);
    }

    #[test]
    fn index_beyond_usize_rejected() {
        assert!(matches!(
            "island-99999999999999999999999".parse::<IslandId>(),
            Err(Error::InvalidIslandId { .. })
        ));
    }

    #[test]
    fn single_island_ring_wraps_onto_itself() {
        assert_eq!(island("0").successor(1), island("0"));
    }

    #[test]
    fn successor_keeps_prefix() {
        assert_eq!(island("island-3").successor(10).name(), "island-4");
        assert_eq!(island("pod-09").successor(10).name(), "pod-0");
    }

    #[test]
    fn deserializes_from_string() {
        let id: IslandId = serde_json::from_str("\"island-5\"").unwrap();
        assert_eq!(id.index(), 5);
        assert!(serde_json::from_str::<IslandId>("\"island\"").is_err());
    }
}
