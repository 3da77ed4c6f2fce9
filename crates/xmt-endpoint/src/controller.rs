//! Endpoint controller interface.
//!
//! The controller is the platform collaborator that owns the physical
//! PCIe core: it reports its capability set, accepts configuration-header
//! writes, programs and clears BAR windows, and raises interrupts toward
//! the host. Everything else — negotiation, allocation, the command loop —
//! lives on this side of the seam.

use xmt_proto::bar::BarNo;
use xmt_proto::pcie::FunctionHeader;
use xmt_proto::regs::IrqKind;

use crate::error::Result;
use crate::features::EpcFeatures;

/// A BAR window as handed to the controller for programming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarAssignment {
    /// Slot to program.
    pub bar: BarNo,
    /// Effective window size in bytes.
    pub size: u64,
    /// Whether the window uses 64-bit addressing (consumes the next slot).
    pub is_64bit: bool,
}

/// Interface to an endpoint controller.
///
/// Implementations are expected to be driven from one function at a time;
/// the function serializes access internally.
pub trait EndpointController: Send {
    /// The controller's capability set.
    fn features(&self) -> EpcFeatures;

    /// Write the function's configuration-space header.
    ///
    /// # Errors
    ///
    /// Returns an error if the controller rejects the header write; this
    /// is fatal to core initialization.
    fn write_header(&mut self, header: &FunctionHeader) -> Result<()>;

    /// Program one BAR window.
    ///
    /// # Errors
    ///
    /// Returns an error if the window cannot be programmed. The function
    /// treats this as fatal only for the register BAR.
    fn set_bar(&mut self, assignment: &BarAssignment) -> Result<()>;

    /// Unprogram one BAR window. Must tolerate slots that were never
    /// programmed.
    fn clear_bar(&mut self, bar: BarNo);

    /// Raise a completion interrupt toward the host.
    ///
    /// # Errors
    ///
    /// Returns an error if the interrupt cannot be raised.
    fn raise_irq(&mut self, kind: IrqKind, number: u32) -> Result<()>;
}
