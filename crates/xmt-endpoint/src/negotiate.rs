//! Capability negotiation: controller feature set in, BAR layout out.
//!
//! The negotiator reconciles three inputs — the driver's default size
//! table, the controller's fixed-size/64-bit/reserved overrides, and the
//! register block's space requirement — into a [`BarPlan`] the allocator
//! executes without further decisions.

use xmt_proto::bar::{BarNo, BAR_COUNT};
use xmt_proto::regs::BLOCK_SIZE;

use crate::error::{Result, XmtError};
use crate::features::EpcFeatures;

/// Negotiated outcome for one BAR slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarEntry {
    /// Effective requested size in bytes.
    pub size: u64,
    /// The slot uses 64-bit addressing and consumes the following slot.
    pub is_64bit: bool,
    /// The controller keeps this slot; it is never allocated or
    /// programmed.
    pub reserved: bool,
}

/// Concrete BAR layout produced by negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarPlan {
    entries: [BarEntry; BAR_COUNT],
    reg_bar: BarNo,
}

impl BarPlan {
    /// The slot hosting the command register block.
    #[must_use]
    pub const fn reg_bar(&self) -> BarNo {
        self.reg_bar
    }

    /// Negotiated outcome for `bar`.
    #[must_use]
    pub const fn entry(&self, bar: BarNo) -> BarEntry {
        self.entries[bar.index()]
    }

    /// Slots in ascending order, stepping over the upper halves of 64-bit
    /// windows.
    pub fn slots(&self) -> impl Iterator<Item = BarNo> + '_ {
        let mut index = 0;
        std::iter::from_fn(move || {
            let bar = BarNo::from_index(index)?;
            index += if self.entry(bar).is_64bit { 2 } else { 1 };
            Some(bar)
        })
    }
}

/// Negotiate a BAR layout against `features`.
///
/// The register BAR starts from the controller's first free slot and moves
/// on past slots that are reserved, fixed at a size smaller than the
/// register block, or 64-bit without room for the consumed upper slot.
///
/// # Errors
///
/// Returns [`XmtError::NoFreeBar`] when no slot can host the register
/// block.
pub fn negotiate(features: &EpcFeatures) -> Result<BarPlan> {
    let mut entries = [BarEntry {
        size: 0,
        is_64bit: false,
        reserved: false,
    }; BAR_COUNT];

    for bar in BarNo::ALL {
        entries[bar.index()] = BarEntry {
            size: features.fixed_size(bar).unwrap_or(bar.default_size()),
            is_64bit: features.is_fixed_64bit(bar),
            reserved: features.is_reserved(bar),
        };
    }

    let first_free = features.first_free_bar().ok_or(XmtError::NoFreeBar)?;
    let reg_bar = select_reg_bar(features, &entries, first_free)?;

    // The register BAR requests exactly the rounded block, unless the
    // controller pins the slot to a (necessarily larger) fixed size.
    entries[reg_bar.index()].size = features
        .fixed_size(reg_bar)
        .unwrap_or(BLOCK_SIZE as u64);

    tracing::info!(
        "Negotiated BAR layout: register block on {reg_bar}, {} slots reserved",
        features.reserved_bar.count_ones()
    );

    Ok(BarPlan { entries, reg_bar })
}

fn select_reg_bar(
    features: &EpcFeatures,
    entries: &[BarEntry; BAR_COUNT],
    first_free: BarNo,
) -> Result<BarNo> {
    let mut index = first_free.index();
    while index < BAR_COUNT {
        let bar = BarNo::from_index(index).ok_or(XmtError::NoFreeBar)?;
        let entry = entries[bar.index()];
        let step = if entry.is_64bit { 2 } else { 1 };

        if entry.reserved {
            index += step;
            continue;
        }
        if let Some(fixed) = features.fixed_size(bar) {
            if fixed < BLOCK_SIZE as u64 {
                tracing::debug!(
                    "{bar} fixed at {fixed} bytes, too small for the {BLOCK_SIZE}-byte register block"
                );
                index += step;
                continue;
            }
        }
        if entry.is_64bit && index + 1 >= BAR_COUNT {
            index += step;
            continue;
        }
        return Ok(bar);
    }
    Err(XmtError::NoFreeBar)
}
