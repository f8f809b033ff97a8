//! IB commission tiers
//!
//! Tier is a function of trailing-30-day referred volume:
//!
//! | Tier     | Trailing volume | Rate |
//! |----------|-----------------|------|
//! | BRONZE   | < 2M            | 20%  |
//! | SILVER   | 2M ..< 5M       | 25%  |
//! | GOLD     | 5M ..= 10M      | 30%  |
//! | PLATINUM | > 10M           | 35%  |
//!
//! Accrual is charged slice by slice: the part of a volume update that falls
//! below a threshold earns the lower rate, the part above earns the higher
//! one. Earlier accruals are never rescaled.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::money::{MoneyError, checked_add, checked_mul};

/// Commission tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    Bronze,
    Silver,
    Gold,
    Platinum,
}

const SILVER_FLOOR: i64 = 2_000_000;
const GOLD_FLOOR: i64 = 5_000_000;
const PLATINUM_ABOVE: i64 = 10_000_000;

impl Tier {
    /// Tier for a trailing volume
    pub fn for_volume(volume: Decimal) -> Tier {
        if volume > Decimal::from(PLATINUM_ABOVE) {
            Tier::Platinum
        } else if volume >= Decimal::from(GOLD_FLOOR) {
            Tier::Gold
        } else if volume >= Decimal::from(SILVER_FLOOR) {
            Tier::Silver
        } else {
            Tier::Bronze
        }
    }

    /// Commission rate as a fraction of volume
    pub fn rate(&self) -> Decimal {
        match self {
            Tier::Bronze => Decimal::new(20, 2),
            Tier::Silver => Decimal::new(25, 2),
            Tier::Gold => Decimal::new(30, 2),
            Tier::Platinum => Decimal::new(35, 2),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Bronze => "BRONZE",
            Tier::Silver => "SILVER",
            Tier::Gold => "GOLD",
            Tier::Platinum => "PLATINUM",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Part of a volume update charged at one tier's rate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierSlice {
    pub tier: Tier,
    pub volume: Decimal,
    pub commission: Decimal,
}

/// Breakdown of one accrual
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TieredCommission {
    pub slices: Vec<TierSlice>,
    /// Tier after the update
    pub tier: Tier,
}

impl TieredCommission {
    /// Every rate is below 1, so the total never exceeds the charged volume.
    pub fn total(&self) -> Decimal {
        self.slices.iter().map(|s| s.commission).sum()
    }
}

/// Charge `delta` of new volume on top of `trailing` volume
///
/// Slice boundaries are the tier floors (2M, 5M) and the PLATINUM threshold
/// (10M, exclusive: exactly 10M is still GOLD). Fails with
/// [`MoneyError::Overflow`] when `trailing + delta` is not representable.
pub fn tiered_commission(trailing: Decimal, delta: Decimal) -> Result<TieredCommission, MoneyError> {
    let start = trailing.max(Decimal::ZERO);
    let end = checked_add(start, delta.max(Decimal::ZERO))?;

    let bounds = [
        Decimal::from(SILVER_FLOOR),
        Decimal::from(GOLD_FLOOR),
        Decimal::from(PLATINUM_ABOVE),
    ];

    let mut slices: Vec<TierSlice> = Vec::new();
    let mut cursor = start;
    while cursor < end {
        let next = bounds
            .iter()
            .copied()
            .find(|b| *b > cursor)
            .map_or(end, |b| b.min(end));

        let volume = next - cursor;
        // A slice never straddles a bound, so its midpoint names its tier.
        let tier = Tier::for_volume(cursor + volume / Decimal::TWO);
        let commission = checked_mul(volume, tier.rate())?;
        match slices.last_mut() {
            Some(last) if last.tier == tier => {
                last.volume = checked_add(last.volume, volume)?;
                last.commission = checked_add(last.commission, commission)?;
            }
            _ => slices.push(TierSlice {
                tier,
                volume,
                commission,
            }),
        }
        cursor = next;
    }

    Ok(TieredCommission {
        slices,
        tier: Tier::for_volume(end),
    })
}
