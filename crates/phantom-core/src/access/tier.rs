//! ============================================================================
//! Tier Ordering Table - Fixed total order over membership tiers
//! ============================================================================
//! Tiers are resolved externally (token holdings) and only ranked here.
//! Unknown identifiers are errors, never coerced to a default.
//! ============================================================================

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use crate::error::UnknownTierError;

/// Membership tiers, lowest to highest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    /// No resolved membership
    #[default]
    Unauthorized,
    /// Entry level - the weakest tier that unlocks anything
    EntryLevel,
    /// Operator - standard tooling
    Operator,
    /// Shadow elite - advanced tooling
    ShadowElite,
    /// Phantom council - everything tier-gated
    PhantomCouncil,
}

impl Tier {
    /// All tiers in rank order
    pub const ALL: [Tier; 5] = [
        Tier::Unauthorized,
        Tier::EntryLevel,
        Tier::Operator,
        Tier::ShadowElite,
        Tier::PhantomCouncil,
    ];

    /// Get the numeric rank for comparison
    pub fn rank(&self) -> u8 {
        match self {
            Tier::Unauthorized => 0,
            Tier::EntryLevel => 1,
            Tier::Operator => 2,
            Tier::ShadowElite => 3,
            Tier::PhantomCouncil => 4,
        }
    }

    /// Inverse of [`Tier::rank`]
    pub fn from_rank(rank: u8) -> Result<Self, UnknownTierError> {
        Tier::ALL
            .iter()
            .copied()
            .find(|t| t.rank() == rank)
            .ok_or_else(|| UnknownTierError::new(rank.to_string()))
    }

    /// Stable identifier, as used in config and stored records
    pub fn id(&self) -> &'static str {
        match self {
            Tier::Unauthorized => "UNAUTHORIZED",
            Tier::EntryLevel => "ENTRY_LEVEL",
            Tier::Operator => "OPERATOR",
            Tier::ShadowElite => "SHADOW_ELITE",
            Tier::PhantomCouncil => "PHANTOM_COUNCIL",
        }
    }

    /// Get human-readable tier name
    pub fn display_name(&self) -> &'static str {
        match self {
            Tier::Unauthorized => "No Access",
            Tier::EntryLevel => "Entry Level",
            Tier::Operator => "Operator",
            Tier::ShadowElite => "Shadow Elite",
            Tier::PhantomCouncil => "Phantom Council",
        }
    }

    /// Next tier up, if any
    pub fn next(&self) -> Option<Tier> {
        Tier::from_rank(self.rank() + 1).ok()
    }

    /// True for every tier above UNAUTHORIZED
    pub fn is_member(&self) -> bool {
        *self > Tier::Unauthorized
    }

    /// Parse a tier that a resource *requires*.
    /// An unknown identifier is a configuration defect: log it and require
    /// the highest tier rather than guessing.
    pub fn fail_closed_required(raw: &str) -> Tier {
        raw.parse().unwrap_or_else(|e: UnknownTierError| {
            warn!("{} - treating requirement as {}", e, Tier::PhantomCouncil.id());
            Tier::PhantomCouncil
        })
    }

    /// Parse a tier that an identity *holds*.
    /// Unknown identifiers grant nothing.
    pub fn fail_closed_granted(raw: &str) -> Tier {
        raw.parse().unwrap_or_else(|e: UnknownTierError| {
            warn!("{} - treating identity as {}", e, Tier::Unauthorized.id());
            Tier::Unauthorized
        })
    }
}

impl PartialOrd for Tier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Tier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl FromStr for Tier {
    type Err = UnknownTierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tier::ALL
            .iter()
            .copied()
            .find(|t| t.id() == s)
            .ok_or_else(|| UnknownTierError::new(s))
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ordering() {
        assert!(Tier::Unauthorized < Tier::EntryLevel);
        assert!(Tier::EntryLevel < Tier::Operator);
        assert!(Tier::Operator < Tier::ShadowElite);
        assert!(Tier::ShadowElite < Tier::PhantomCouncil);
    }

    #[test]
    fn test_ordering_is_total_and_injective() {
        for a in Tier::ALL {
            for b in Tier::ALL {
                let outcomes = [
                    a.rank() > b.rank(),
                    a.rank() < b.rank(),
                    a.rank() == b.rank(),
                ];
                assert_eq!(outcomes.iter().filter(|o| **o).count(), 1);
                assert_eq!(a.rank() == b.rank(), a == b);
            }
        }
    }

    #[test]
    fn test_rank_round_trip_and_unknown_rank() {
        for t in Tier::ALL {
            assert_eq!(Tier::from_rank(t.rank()).unwrap(), t);
        }
        let err = Tier::from_rank(5).unwrap_err();
        assert_eq!(err.identifier(), "5");
    }

    #[test]
    fn test_parse_is_exact() {
        assert_eq!("SHADOW_ELITE".parse::<Tier>().unwrap(), Tier::ShadowElite);
        assert!("shadow_elite".parse::<Tier>().is_err());
        assert!("DIAMOND".parse::<Tier>().is_err());
        assert!("".parse::<Tier>().is_err());
    }

    #[test]
    fn test_fail_closed_parsing() {
        assert_eq!(Tier::fail_closed_required("DIAMOND"), Tier::PhantomCouncil);
        assert_eq!(Tier::fail_closed_granted("DIAMOND"), Tier::Unauthorized);
        assert_eq!(Tier::fail_closed_required("OPERATOR"), Tier::Operator);
        assert_eq!(Tier::fail_closed_granted("OPERATOR"), Tier::Operator);
    }

    #[test]
    fn test_next_tier() {
        assert_eq!(Tier::Unauthorized.next(), Some(Tier::EntryLevel));
        assert_eq!(Tier::PhantomCouncil.next(), None);
        assert!(!Tier::Unauthorized.is_member());
        assert!(Tier::EntryLevel.is_member());
    }

    #[test]
    fn test_serde_uses_identifiers() {
        let json = serde_json::to_string(&Tier::PhantomCouncil).unwrap();
        assert_eq!(json, "\"PHANTOM_COUNCIL\"");
        let back: Tier = serde_json::from_str("\"ENTRY_LEVEL\"").unwrap();
        assert_eq!(back, Tier::EntryLevel);
    }
}
