//! Endpoint controller capability descriptor.
//!
//! Controllers differ in which BAR slots they implement: some reserve
//! slots for internal use, some force a slot to 64-bit addressing, some
//! pin a slot to a fixed window size, and some require allocations at a
//! particular alignment. The negotiator consumes this descriptor to
//! produce a concrete BAR layout.

use xmt_proto::bar::{BarNo, BAR_COUNT};

/// Capability set reported by an endpoint controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpcFeatures {
    /// Per-slot fixed window size; `None` means the function chooses.
    pub bar_fixed_size: [Option<u64>; BAR_COUNT],
    /// Bitmap of slots the controller keeps for itself.
    pub reserved_bar: u8,
    /// Bitmap of slots that are 64-bit no matter what the function asks.
    pub bar_fixed_64bit: u8,
    /// Required allocation alignment in bytes; 0 means none.
    pub align: u64,
    /// The controller signals link-up; the command loop must wait for it.
    pub linkup_notifier: bool,
    /// The controller signals core-init; BAR programming must wait for it.
    pub core_init_notifier: bool,
}

impl EpcFeatures {
    /// Whether the controller keeps `bar` for itself.
    #[must_use]
    pub const fn is_reserved(&self, bar: BarNo) -> bool {
        self.reserved_bar & (1 << bar.index()) != 0
    }

    /// Whether `bar` is forced to 64-bit addressing.
    #[must_use]
    pub const fn is_fixed_64bit(&self, bar: BarNo) -> bool {
        self.bar_fixed_64bit & (1 << bar.index()) != 0
    }

    /// Controller-fixed size for `bar`, if any.
    #[must_use]
    pub const fn fixed_size(&self, bar: BarNo) -> Option<u64> {
        self.bar_fixed_size[bar.index()]
    }

    /// First slot not reserved by the controller, accounting for 64-bit
    /// slots consuming the following slot as well.
    #[must_use]
    pub fn first_free_bar(&self) -> Option<BarNo> {
        let mut index = 0;
        while index < BAR_COUNT {
            let bar = BarNo::from_index(index)?;
            if !self.is_reserved(bar) {
                return Some(bar);
            }
            index += if self.is_fixed_64bit(bar) { 2 } else { 1 };
        }
        None
    }
}

impl Default for EpcFeatures {
    /// A permissive controller: every slot free, no fixed sizes, no
    /// alignment requirement, no notifiers.
    fn default() -> Self {
        Self {
            bar_fixed_size: [None; BAR_COUNT],
            reserved_bar: 0,
            bar_fixed_64bit: 0,
            align: 0,
            linkup_notifier: false,
            core_init_notifier: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permissive_controller_frees_bar0() {
        let features = EpcFeatures::default();
        assert_eq!(features.first_free_bar(), Some(BarNo::Bar0));
        assert!(!features.is_reserved(BarNo::Bar3));
    }

    #[test]
    fn reserved_slots_are_skipped() {
        let features = EpcFeatures {
            reserved_bar: 0b0000_0011,
            ..EpcFeatures::default()
        };
        assert_eq!(features.first_free_bar(), Some(BarNo::Bar2));
    }

    #[test]
    fn fully_reserved_controller_has_no_free_bar() {
        let features = EpcFeatures {
            reserved_bar: 0b0011_1111,
            ..EpcFeatures::default()
        };
        assert_eq!(features.first_free_bar(), None);
    }
}
