//! Tier classification
//!
//! Bucketed categories used by the secondary indices. Thresholds live in
//! [`TierTable`] so a deployment can tune them without touching code; the
//! default table is the canonical one.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::domain::catalog::Record;

/// Market capitalization tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketCapTier {
    /// Below the small-cap floor.
    Micro,
    /// Small cap.
    Small,
    /// Mid cap.
    Mid,
    /// At or above the large-cap floor.
    Large,
}

impl MarketCapTier {
    /// Every tier in ascending order.
    pub const ALL: [Self; 4] = [Self::Micro, Self::Small, Self::Mid, Self::Large];

    /// Wire name of the tier.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Micro => "micro",
            Self::Small => "small",
            Self::Mid => "mid",
            Self::Large => "large",
        }
    }
}

/// Average dollar volume tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeTier {
    /// Thinly traded.
    Low,
    /// Moderately traded.
    Medium,
    /// Heavily traded.
    High,
}

impl VolumeTier {
    /// Every tier in ascending order.
    pub const ALL: [Self; 3] = [Self::Low, Self::Medium, Self::High];

    /// Wire name of the tier.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Debt-to-equity tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeverageTier {
    /// Conservatively financed.
    Low,
    /// Moderately levered.
    Medium,
    /// Highly levered.
    High,
}

impl LeverageTier {
    /// Every tier in ascending order.
    pub const ALL: [Self; 3] = [Self::Low, Self::Medium, Self::High];

    /// Wire name of the tier.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

macro_rules! tier_text {
    ($tier:ty, $label:literal) => {
        impl std::fmt::Display for $tier {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $tier {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let wanted = s.trim().to_lowercase();
                Self::ALL
                    .into_iter()
                    .find(|tier| tier.as_str() == wanted)
                    .ok_or_else(|| format!("Invalid {}: {s}", $label))
            }
        }
    };
}

tier_text!(MarketCapTier, "market cap tier");
tier_text!(VolumeTier, "volume tier");
tier_text!(LeverageTier, "leverage tier");

/// Lower bounds for each tier.
///
/// A value equal to a floor belongs to the higher tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierTable {
    /// Market cap at which a record becomes small cap.
    pub small_cap_floor: Decimal,
    /// Market cap at which a record becomes mid cap.
    pub mid_cap_floor: Decimal,
    /// Market cap at which a record becomes large cap.
    pub large_cap_floor: Decimal,
    /// Dollar volume at which a record becomes medium volume.
    pub medium_volume_floor: Decimal,
    /// Dollar volume at which a record becomes high volume.
    pub high_volume_floor: Decimal,
    /// Debt-to-equity at which a record becomes medium leverage.
    pub medium_leverage_floor: f64,
    /// Debt-to-equity at which a record becomes high leverage.
    pub high_leverage_floor: f64,
}

impl Default for TierTable {
    fn default() -> Self {
        Self {
            small_cap_floor: dec!(300000000),
            mid_cap_floor: dec!(2000000000),
            large_cap_floor: dec!(10000000000),
            medium_volume_floor: dec!(1000000),
            high_volume_floor: dec!(5000000),
            medium_leverage_floor: 0.5,
            high_leverage_floor: 1.5,
        }
    }
}

impl TierTable {
    /// Classify a market capitalization.
    #[must_use]
    pub fn market_cap_tier(&self, market_cap: Decimal) -> MarketCapTier {
        if market_cap >= self.large_cap_floor {
            MarketCapTier::Large
        } else if market_cap >= self.mid_cap_floor {
            MarketCapTier::Mid
        } else if market_cap >= self.small_cap_floor {
            MarketCapTier::Small
        } else {
            MarketCapTier::Micro
        }
    }

    /// Classify an average dollar volume.
    #[must_use]
    pub fn volume_tier(&self, dollar_volume: Decimal) -> VolumeTier {
        if dollar_volume >= self.high_volume_floor {
            VolumeTier::High
        } else if dollar_volume >= self.medium_volume_floor {
            VolumeTier::Medium
        } else {
            VolumeTier::Low
        }
    }

    /// Classify a debt-to-equity ratio. Non-finite ratios are unclassified.
    #[must_use]
    pub fn leverage_tier(&self, ratio: f64) -> Option<LeverageTier> {
        if !ratio.is_finite() {
            return None;
        }
        Some(if ratio >= self.high_leverage_floor {
            LeverageTier::High
        } else if ratio >= self.medium_leverage_floor {
            LeverageTier::Medium
        } else {
            LeverageTier::Low
        })
    }

    /// Market cap tier of a record, if it reports one.
    #[must_use]
    pub fn classify_market_cap(&self, record: &Record) -> Option<MarketCapTier> {
        record.market_cap.map(|cap| self.market_cap_tier(cap))
    }

    /// Volume tier of a record, if it reports a volume.
    #[must_use]
    pub fn classify_volume(&self, record: &Record) -> Option<VolumeTier> {
        record.dollar_volume().map(|dv| self.volume_tier(dv))
    }

    /// Leverage tier of a record, if it reports a ratio.
    #[must_use]
    pub fn classify_leverage(&self, record: &Record) -> Option<LeverageTier> {
        record
            .debt_to_equity
            .and_then(|ratio| self.leverage_tier(ratio))
    }

    /// Check that each dimension's floors are strictly ascending.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.small_cap_floor < self.mid_cap_floor && self.mid_cap_floor < self.large_cap_floor)
        {
            return Err("market cap floors must be strictly ascending".to_string());
        }
        if self.medium_volume_floor >= self.high_volume_floor {
            return Err("volume floors must be strictly ascending".to_string());
        }
        if !(self.medium_leverage_floor.is_finite()
            && self.high_leverage_floor.is_finite()
            && self.medium_leverage_floor < self.high_leverage_floor)
        {
            return Err("leverage floors must be finite and strictly ascending".to_string());
        }
        Ok(())
    }
}
