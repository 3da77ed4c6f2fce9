//! Backing-memory allocation and BAR programming.
//!
//! Executes a negotiated [`BarPlan`]: allocates the register block's
//! backing region, then every bulk window, then (at core-init time)
//! programs the windows into the controller. Only the register BAR is
//! load-bearing — a bulk window that fails to allocate or program is
//! logged and skipped, and the function carries on without it.

use std::sync::Arc;

use xmt_proto::bar::{BarNo, BAR_COUNT};

use crate::buffer::SharedBuffer;
use crate::controller::{BarAssignment, EndpointController};
use crate::error::{Result, XmtError};
use crate::features::EpcFeatures;
use crate::negotiate::BarPlan;

/// Round `size` up to the controller's alignment requirement.
fn align_up(size: u64, align: u64) -> u64 {
    if align <= 1 {
        size
    } else {
        size.next_multiple_of(align)
    }
}

/// Backing regions allocated for a BAR plan.
#[derive(Debug)]
pub struct BarSpaces {
    regions: [Option<Arc<SharedBuffer>>; BAR_COUNT],
    reg_bar: BarNo,
    data_bar: Option<BarNo>,
}

impl BarSpaces {
    /// Allocate backing memory for every non-reserved slot in `plan`.
    ///
    /// The register BAR allocation is mandatory; each bulk window is
    /// attempted and skipped on failure. The largest surviving bulk
    /// window becomes the shared data buffer.
    ///
    /// # Errors
    ///
    /// Returns [`XmtError::RegisterBarTooSmall`] if a hand-built plan
    /// pins the register BAR below the block size, or
    /// [`XmtError::OutOfSpace`] if the register backing memory cannot be
    /// allocated.
    pub fn allocate(plan: &BarPlan, features: &EpcFeatures) -> Result<Self> {
        let reg_bar = plan.reg_bar();
        let reg_size = plan.entry(reg_bar).size;
        if reg_size < xmt_proto::regs::BLOCK_SIZE as u64 {
            return Err(XmtError::RegisterBarTooSmall {
                bar: reg_bar,
                fixed: reg_size,
                needed: xmt_proto::regs::BLOCK_SIZE as u64,
            });
        }

        let mut regions: [Option<Arc<SharedBuffer>>; BAR_COUNT] = Default::default();

        let reg_alloc = align_up(reg_size, features.align);
        #[allow(clippy::cast_possible_truncation)]
        let reg_region = SharedBuffer::try_new(reg_alloc as usize).ok_or(XmtError::OutOfSpace {
            bar: reg_bar,
            size: reg_alloc,
        })?;
        tracing::debug!("Allocated {reg_alloc} bytes of register space on {reg_bar}");
        regions[reg_bar.index()] = Some(Arc::new(reg_region));

        let mut data_bar: Option<BarNo> = None;
        for bar in plan.slots() {
            let entry = plan.entry(bar);
            if bar == reg_bar || entry.reserved {
                continue;
            }
            let size = align_up(entry.size, features.align);
            #[allow(clippy::cast_possible_truncation)]
            let Some(region) = SharedBuffer::try_new(size as usize) else {
                tracing::warn!("Failed to allocate {size} bytes for {bar}, continuing without it");
                continue;
            };
            tracing::debug!("Allocated {size} bytes of bulk space on {bar}");
            regions[bar.index()] = Some(Arc::new(region));
            if data_bar.is_none_or(|best| entry.size > plan.entry(best).size) {
                data_bar = Some(bar);
            }
        }

        Ok(Self {
            regions,
            reg_bar,
            data_bar,
        })
    }

    /// Program every allocated window into the controller.
    ///
    /// A failure on a bulk window releases that window and continues; a
    /// failure on the register BAR is fatal.
    ///
    /// # Errors
    ///
    /// Propagates the controller error for the register BAR only.
    pub fn program(&mut self, controller: &mut dyn EndpointController, plan: &BarPlan) -> Result<()> {
        for bar in plan.slots() {
            let entry = plan.entry(bar);
            if entry.reserved {
                continue;
            }
            let Some(region) = &self.regions[bar.index()] else {
                continue;
            };
            let assignment = BarAssignment {
                bar,
                size: region.capacity() as u64,
                is_64bit: entry.is_64bit,
            };
            if let Err(err) = controller.set_bar(&assignment) {
                tracing::error!("Failed to set {bar}: {err}");
                self.regions[bar.index()] = None;
                if bar == self.reg_bar {
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Unprogram and release every allocated window. Idempotent.
    pub fn release(&mut self, controller: &mut dyn EndpointController) {
        for bar in BarNo::ALL {
            if self.regions[bar.index()].take().is_some() {
                controller.clear_bar(bar);
                tracing::debug!("Released backing memory for {bar}");
            }
        }
        self.data_bar = None;
    }

    /// Backing region for the register BAR.
    ///
    /// # Panics
    ///
    /// Panics if called after [`release`](Self::release).
    #[must_use]
    pub fn reg_region(&self) -> Arc<SharedBuffer> {
        Arc::clone(
            self.regions[self.reg_bar.index()]
                .as_ref()
                .expect("register region released"),
        )
    }

    /// The slot backing the shared data buffer, if any bulk window
    /// survived allocation.
    #[must_use]
    pub const fn data_bar(&self) -> Option<BarNo> {
        self.data_bar
    }

    /// The shared data buffer, if any bulk window survived allocation.
    #[must_use]
    pub fn data_buffer(&self) -> Option<Arc<SharedBuffer>> {
        let bar = self.data_bar?;
        self.regions[bar.index()].as_ref().map(Arc::clone)
    }
}
