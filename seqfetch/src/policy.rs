use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// Bitmask describing how much data a fetch pulls for one identifier.
///
/// Flags combine freely with `|`. A task acts on at most one of the primary
/// fetch flags, checked in the order `ALL`, `FEATURES`, `CORE_FEATURES`;
/// `PRODUCTS` and `RECURSIVE` are add-ons evaluated independently.
#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RetrievalPolicy(u8);

impl RetrievalPolicy {
    /// No data beyond resolving the identifier.
    pub const NONE: Self = Self(0);
    /// The complete record. Only honoured when it is the sole flag set.
    pub const ALL: Self = Self(1 << 0);
    /// Every feature overlapping the range.
    pub const FEATURES: Self = Self(1 << 1);
    /// Gene, mRNA and coding-region features overlapping the range.
    pub const CORE_FEATURES: Self = Self(1 << 2);
    /// Follow product identifiers of mRNA and coding-region features.
    pub const PRODUCTS: Self = Self(1 << 3);
    /// Follow the reference map into component sequences.
    pub const RECURSIVE: Self = Self(1 << 4);

    const NAMES: [(Self, &'static str); 5] = [
        (Self::ALL, "all"),
        (Self::FEATURES, "features"),
        (Self::CORE_FEATURES, "core_features"),
        (Self::PRODUCTS, "products"),
        (Self::RECURSIVE, "recursive"),
    ];

    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Build a policy from raw bits, dropping unknown ones.
    pub const fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & 0b1_1111)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True when every flag in `other` is also set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    /// True when `self` is exactly the whole-record policy.
    pub const fn is_whole_record(self) -> bool {
        self.0 == Self::ALL.0
    }
}

impl BitOr for RetrievalPolicy {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for RetrievalPolicy {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for RetrievalPolicy {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Display for RetrievalPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let mut first = true;
        for (flag, name) in Self::NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}
