//! Software endpoint controller.
//!
//! A controller implementation with no hardware behind it, used by CI and
//! the demo binary: it hands out a configurable capability set and records
//! every header write, BAR programming, and raised interrupt. A recorder
//! handle cloned before the controller moves into the function lets tests
//! observe that activity afterwards.

use std::sync::{Arc, Mutex};

use xmt_proto::bar::BarNo;
use xmt_proto::pcie::FunctionHeader;
use xmt_proto::regs::IrqKind;

use crate::controller::{BarAssignment, EndpointController};
use crate::error::{Result, XmtError};
use crate::features::EpcFeatures;

/// Activity recorded by a [`SoftController`].
#[derive(Debug, Default)]
pub struct SoftRecording {
    /// Headers written, in order.
    pub headers: Vec<FunctionHeader>,
    /// BAR windows programmed, in order.
    pub programmed: Vec<BarAssignment>,
    /// BAR slots cleared, in order.
    pub cleared: Vec<BarNo>,
    /// Interrupts raised, in order.
    pub irqs: Vec<(IrqKind, u32)>,
}

/// Shared view of a [`SoftController`]'s recording.
#[derive(Debug, Clone)]
pub struct SoftRecorder {
    inner: Arc<Mutex<SoftRecording>>,
}

impl SoftRecorder {
    /// Run `f` against the recording.
    pub fn with<R>(&self, f: impl FnOnce(&SoftRecording) -> R) -> R {
        f(&self.inner.lock().expect("recording lock poisoned"))
    }

    /// Whether `bar` was ever programmed.
    #[must_use]
    pub fn bar_programmed(&self, bar: BarNo) -> bool {
        self.with(|r| r.programmed.iter().any(|a| a.bar == bar))
    }

    /// Number of interrupts raised so far.
    #[must_use]
    pub fn irq_count(&self) -> usize {
        self.with(|r| r.irqs.len())
    }
}

/// Software endpoint controller for CI and demos.
#[derive(Debug)]
pub struct SoftController {
    features: EpcFeatures,
    recording: Arc<Mutex<SoftRecording>>,
    fail_set_bar: u8,
}

impl SoftController {
    /// Create a controller reporting `features`.
    #[must_use]
    pub fn new(features: EpcFeatures) -> Self {
        Self {
            features,
            recording: Arc::new(Mutex::new(SoftRecording::default())),
            fail_set_bar: 0,
        }
    }

    /// Make programming of `bar` fail, for exercising partial-success
    /// paths.
    #[must_use]
    pub fn with_set_bar_failure(mut self, bar: BarNo) -> Self {
        self.fail_set_bar |= 1 << bar.index();
        self
    }

    /// A recorder handle; clone before moving the controller into a
    /// function.
    #[must_use]
    pub fn recorder(&self) -> SoftRecorder {
        SoftRecorder {
            inner: Arc::clone(&self.recording),
        }
    }

    fn record<R>(&self, f: impl FnOnce(&mut SoftRecording) -> R) -> R {
        f(&mut self.recording.lock().expect("recording lock poisoned"))
    }
}

impl Default for SoftController {
    fn default() -> Self {
        Self::new(EpcFeatures::default())
    }
}

impl EndpointController for SoftController {
    fn features(&self) -> EpcFeatures {
        self.features.clone()
    }

    fn write_header(&mut self, header: &FunctionHeader) -> Result<()> {
        tracing::debug!(
            "Soft controller: header {:04x}:{:04x}",
            header.vendor_id,
            header.device_id
        );
        self.record(|r| r.headers.push(*header));
        Ok(())
    }

    fn set_bar(&mut self, assignment: &BarAssignment) -> Result<()> {
        if self.fail_set_bar & (1 << assignment.bar.index()) != 0 {
            return Err(XmtError::controller(format!(
                "injected set_bar failure for {}",
                assignment.bar
            )));
        }
        tracing::debug!(
            "Soft controller: programmed {} ({} bytes, 64-bit: {})",
            assignment.bar,
            assignment.size,
            assignment.is_64bit
        );
        self.record(|r| r.programmed.push(*assignment));
        Ok(())
    }

    fn clear_bar(&mut self, bar: BarNo) {
        self.record(|r| r.cleared.push(bar));
    }

    fn raise_irq(&mut self, kind: IrqKind, number: u32) -> Result<()> {
        tracing::trace!("Soft controller: raise {kind} #{number}");
        self.record(|r| r.irqs.push((kind, number)));
        Ok(())
    }
}
