use serde::{Serialize, Serializer};
use std::fmt;

use crate::errors::{TierError, TierResult};

/// Predicted viewership tier, 0 (minimal) to 4 (max).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier {
    Minimal = 0,
    Low = 1,
    Average = 2,
    High = 3,
    Max = 4,
}

impl Tier {
    pub const ALL: [Tier; 5] = [Tier::Minimal, Tier::Low, Tier::Average, Tier::High, Tier::Max];

    pub fn from_index(index: usize) -> TierResult<Self> {
        Tier::ALL
            .get(index)
            .copied()
            .ok_or_else(|| TierError::internal(format!("tier index {index} out of range")))
    }

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn label(&self) -> &'static str {
        match self {
            Tier::Minimal => "Minimal viewership",
            Tier::Low => "Low viewership",
            Tier::Average => "Average viewership",
            Tier::High => "High viewership",
            Tier::Max => "Max viewership",
        }
    }

    /// Headline shown to the user, e.g. `Predicted Tier: 3 - High viewership`.
    pub fn headline(&self) -> String {
        format!("Predicted Tier: {} - {}", self.index(), self.label())
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.index(), self.label())
    }
}

impl Serialize for Tier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

/// Static legend shown under every prediction. It describes three TVT bands
/// while the models predict five tiers; the text is kept verbatim.
pub const TIER_LEGEND_TITLE: &str = "Viewership Tier Description";

pub const TIER_LEGEND: [&str; 3] = [
    "T1: Greater than 4.5 TVTs",
    "T2: Between 2.9 and 4.5 TVTs",
    "T3: Less than 2.9 TVTs",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_cover_all_five_tiers() {
        let labels: Vec<&str> = Tier::ALL.iter().map(|t| t.label()).collect();
        assert_eq!(
            labels,
            vec![
                "Minimal viewership",
                "Low viewership",
                "Average viewership",
                "High viewership",
                "Max viewership"
            ]
        );
    }

    #[test]
    fn index_round_trips() {
        for (i, tier) in Tier::ALL.iter().enumerate() {
            assert_eq!(Tier::from_index(i).unwrap(), *tier);
            assert_eq!(tier.index(), i);
        }
        assert!(Tier::from_index(5).is_err());
    }

    #[test]
    fn headline_matches_display_format() {
        assert_eq!(Tier::High.headline(), "Predicted Tier: 3 - High viewership");
        assert_eq!(serde_json::to_string(&Tier::Max).unwrap(), "4");
    }

    #[test]
    fn legend_keeps_three_bands() {
        assert_eq!(TIER_LEGEND.len(), 3);
        assert!(TIER_LEGEND[0].starts_with("T1"));
    }
}
