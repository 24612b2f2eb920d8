//! Array flag bits (layout and ownership).

use serde::{Deserialize, Serialize};
use std::ops::{BitOr, BitOrAssign};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArrayFlags(u32);

impl ArrayFlags {
    pub const NONE: Self = Self(0);
    pub const C_CONTIGUOUS: Self = Self(0x0001);
    pub const F_CONTIGUOUS: Self = Self(0x0002);
    pub const OWNDATA: Self = Self(0x0004);
    pub const ALIGNED: Self = Self(0x0100);
    pub const WRITEABLE: Self = Self(0x0400);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl BitOr for ArrayFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ArrayFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}
