//! BAR slot enumeration and default sizing.
//!
//! A standard endpoint function has six BAR slots. The driver-side default
//! sizes below are what the function requests when the endpoint controller
//! reports no fixed size for a slot:
//!
//! ```text
//! BAR  Default size  Purpose
//! ──── ───────────── ─────────────────────────────────────────────
//!  0   512 B         Command register block (first free BAR wins)
//!  1   512 B         Spare register window
//!  2   1 KiB         Spare register window
//!  3   16 KiB        Small bulk window
//!  4   128 KiB       Medium bulk window
//!  5   1 MiB         Shared data buffer
//! ```
//!
//! A controller-reported fixed size overrides the table entry; a reserved
//! slot is never requested at all.

/// Number of BAR slots on a standard endpoint function.
pub const BAR_COUNT: usize = 6;

/// Default requested size per BAR slot, indexed by BAR number.
pub const DEFAULT_BAR_SIZE: [u64; BAR_COUNT] = [512, 512, 1024, 16_384, 131_072, 1_048_576];

/// A BAR slot index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(usize)]
pub enum BarNo {
    /// BAR 0.
    Bar0 = 0,
    /// BAR 1.
    Bar1 = 1,
    /// BAR 2.
    Bar2 = 2,
    /// BAR 3.
    Bar3 = 3,
    /// BAR 4.
    Bar4 = 4,
    /// BAR 5.
    Bar5 = 5,
}

impl BarNo {
    /// All slots, in index order.
    pub const ALL: [Self; BAR_COUNT] = [
        Self::Bar0,
        Self::Bar1,
        Self::Bar2,
        Self::Bar3,
        Self::Bar4,
        Self::Bar5,
    ];

    /// Slot index as `usize`.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Slot for a raw index, if in range.
    #[must_use]
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Bar0),
            1 => Some(Self::Bar1),
            2 => Some(Self::Bar2),
            3 => Some(Self::Bar3),
            4 => Some(Self::Bar4),
            5 => Some(Self::Bar5),
            _ => None,
        }
    }

    /// Default requested size for this slot.
    #[must_use]
    pub const fn default_size(self) -> u64 {
        DEFAULT_BAR_SIZE[self.index()]
    }
}

impl std::fmt::Display for BarNo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BAR{}", self.index())
    }
}
