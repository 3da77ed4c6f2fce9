//! PCI identification for the XMT endpoint function.
//!
//! The concrete product enumerates as `1e2e:ff01`; the test variant uses
//! wildcard identifiers so a host driver built for CI matches anything.

/// XMT vendor ID (Mercedes-Benz R&D North America).
pub const XMT_VENDOR_ID: u16 = 0x1E2E;

/// XMT device ID for the concrete product.
pub const XMT_DEVICE_ID: u16 = 0xFF01;

/// Wildcard ID, matched by either half of a vendor/device pair in the
/// test variant.
pub const ANY_ID: u16 = 0xFFFF;

/// PCI base class "other" — the function is not a storage, network, or
/// display device.
pub const CLASS_OTHER: u8 = 0xFF;

/// Legacy interrupt pin selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InterruptPin {
    /// No legacy interrupt.
    None = 0,
    /// INTA# — the default for single-function endpoints.
    IntA = 1,
    /// INTB#.
    IntB = 2,
    /// INTC#.
    IntC = 3,
    /// INTD#.
    IntD = 4,
}

/// Configuration-space header fields the endpoint function presents to
/// the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionHeader {
    /// Vendor ID.
    pub vendor_id: u16,
    /// Device ID.
    pub device_id: u16,
    /// Base class code.
    pub baseclass_code: u8,
    /// Legacy interrupt pin.
    pub interrupt_pin: InterruptPin,
}

impl FunctionHeader {
    /// Header of the concrete XMT product.
    #[must_use]
    pub const fn xmt() -> Self {
        Self {
            vendor_id: XMT_VENDOR_ID,
            device_id: XMT_DEVICE_ID,
            baseclass_code: CLASS_OTHER,
            interrupt_pin: InterruptPin::IntA,
        }
    }

    /// Header of the wildcard test variant.
    #[must_use]
    pub const fn test_variant() -> Self {
        Self {
            vendor_id: ANY_ID,
            device_id: ANY_ID,
            baseclass_code: CLASS_OTHER,
            interrupt_pin: InterruptPin::IntA,
        }
    }
}

impl Default for FunctionHeader {
    fn default() -> Self {
        Self::xmt()
    }
}

/// Format a `vendor:device` string for use with `lspci -d`.
#[must_use]
pub fn lspci_filter() -> String {
    format!("{XMT_VENDOR_ID:04x}:{XMT_DEVICE_ID:04x}")
}
