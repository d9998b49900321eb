//! saturating money arithmetic for stakes and payouts.

use std::{fmt, ops};

use serde::{Deserialize, Serialize};

/// An amount of coins staked, pooled or paid out.
///
/// All arithmetic saturates; a payout can never wrap into a jackpot.
#[derive(
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Copy,
    Clone,
    Hash,
)]
pub struct Coins(u32,);

impl Coins {
    /// Const for zero coins.
    pub const ZERO: Self = Self(0,);

    /// Creates an amount with the given number of coins.
    #[must_use]
    pub const fn new(value: u32,) -> Self {
        Self(value,)
    }

    /// The raw integer amount.
    #[must_use]
    pub const fn amount(&self,) -> u32 {
        self.0
    }
}

impl From<Coins,> for u32 {
    fn from(val: Coins,) -> Self {
        val.0
    }
}

impl ops::Add for Coins {
    type Output = Self;

    fn add(self, rhs: Self,) -> Self {
        Self(self.0.saturating_add(rhs.0,),)
    }
}

impl ops::AddAssign for Coins {
    fn add_assign(&mut self, rhs: Self,) {
        self.0 = self.0.saturating_add(rhs.0,);
    }
}

impl ops::Sub for Coins {
    type Output = Self;

    fn sub(self, rhs: Self,) -> Self {
        Self(self.0.saturating_sub(rhs.0,),)
    }
}

impl ops::SubAssign for Coins {
    fn sub_assign(&mut self, rhs: Self,) {
        self.0 = self.0.saturating_sub(rhs.0,);
    }
}

impl ops::Mul<u32,> for Coins {
    type Output = Self;

    fn mul(self, rhs: u32,) -> Self {
        Self(self.0.saturating_mul(rhs,),)
    }
}

impl ops::Div<u32,> for Coins {
    type Output = Self;

    fn div(self, rhs: u32,) -> Self {
        Self(self.0.saturating_div(rhs,),)
    }
}

impl ops::Rem<u32,> for Coins {
    type Output = Self;

    fn rem(self, rhs: u32,) -> Self {
        Self(self.0 % rhs,)
    }
}

impl fmt::Display for Coins {
    fn fmt(&self, f: &mut fmt::Formatter<'_,>,) -> fmt::Result {
        let amount = self.0;
        if amount >= 1_000_000 {
            write!(
                f,
                "{},{:03},{:03}",
                amount / 1_000_000,
                (amount % 1_000_000) / 1000,
                amount % 1_000
            )
        } else if amount >= 1_000 {
            write!(f, "{},{:03}", amount / 1000, amount % 1000)
        } else {
            write!(f, "{amount}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coins_formatting() {
        assert_eq!(format!("{}", Coins::ZERO), "0");
        assert_eq!(Coins::new(123).to_string(), "123");
        assert_eq!(Coins::new(1_000).to_string(), "1,000");
        assert_eq!(Coins::new(1_234).to_string(), "1,234");
        assert_eq!(Coins::new(12_345).to_string(), "12,345");
        assert_eq!(Coins::new(123_456).to_string(), "123,456");
        assert_eq!(Coins::new(1_234_567).to_string(), "1,234,567");
    }

    #[test]
    fn coins_saturate() {
        assert_eq!(Coins::new(1) - Coins::new(2), Coins::ZERO);
        assert_eq!(Coins::new(u32::MAX) + Coins::new(1), Coins::new(u32::MAX));
        assert_eq!(Coins::new(u32::MAX) * 2, Coins::new(u32::MAX));
    }

    #[test]
    fn coins_division() {
        assert_eq!(Coins::new(450) / 2, Coins::new(225));
        assert_eq!(Coins::new(451) % 2, Coins::new(1));
    }
}
