//! Command register block — the wire contract with the host driver.
//!
//! The block is a packed little-endian layout at the start of the register
//! BAR. Field order and widths are fixed; the host writes everything
//! except `status`, the endpoint function writes `status` and reads the
//! rest. A second host command must not be issued while `status` reads
//! [`status::IN_PROGRESS`].
//!
//! ```text
//! offset  width  field
//! ──────  ─────  ──────────────────────────────────────────────
//!  0x00   u32    magic        protocol identifier + version
//!  0x04   u32    command      requested operation, 0 = none
//!  0x08   u32    status       result code, written by the endpoint
//!  0x0c   u64    src_addr     source offset into the data buffer
//!  0x14   u64    dst_addr     destination offset into the data buffer
//!  0x1c   u32    size         transfer length in bytes
//!  0x20   u32    checksum     CRC-32 over the destination range
//!  0x24   u32    irq_type     completion signal kind
//!  0x28   u32    irq_number   completion signal number
//!  0x2c   u32    flags        reserved, must be zero
//! ```
//!
//! 48 payload bytes, block size rounded up to [`BLOCK_SIZE`].

/// Protocol identifier. The low byte is the protocol version; any layout
/// change bumps it.
pub const XMT_MAGIC: u32 = 0x584D_5401; // "XMT", version 1

/// Payload bytes actually used by the block.
pub const PAYLOAD_SIZE: usize = 48;

/// Block size as allocated in the register BAR: payload rounded up to a
/// 128-byte boundary.
pub const BLOCK_SIZE: usize = 128;

/// Field byte offsets within the block.
pub mod offset {
    /// `magic: u32`
    pub const MAGIC: usize = 0x00;
    /// `command: u32`
    pub const COMMAND: usize = 0x04;
    /// `status: u32`
    pub const STATUS: usize = 0x08;
    /// `src_addr: u64`
    pub const SRC_ADDR: usize = 0x0C;
    /// `dst_addr: u64`
    pub const DST_ADDR: usize = 0x14;
    /// `size: u32`
    pub const SIZE: usize = 0x1C;
    /// `checksum: u32`
    pub const CHECKSUM: usize = 0x20;
    /// `irq_type: u32`
    pub const IRQ_TYPE: usize = 0x24;
    /// `irq_number: u32`
    pub const IRQ_NUMBER: usize = 0x28;
    /// `flags: u32`
    pub const FLAGS: usize = 0x2C;
}

/// Status codes written by the endpoint function.
pub mod status {
    /// No command handled yet.
    pub const NONE: u32 = 0;
    /// A command is being executed; the host must not issue another.
    pub const IN_PROGRESS: u32 = 1;
    /// The last command completed and the checksum gate passed.
    pub const SUCCESS: u32 = 2;
    /// Bad magic, unknown command, or zero-length transfer. The buffer
    /// was not touched.
    pub const INVALID_REQUEST: u32 = 3;
    /// The requested range crosses the data buffer capacity. No copy
    /// occurred.
    pub const OVERFLOW: u32 = 4;
    /// The copy finished but the destination CRC did not match the
    /// supplied `checksum` field.
    pub const CHECKSUM_MISMATCH: u32 = 5;
}

/// Command codes written by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Command {
    /// No operation pending.
    Noop = 0,
    /// Copy `size` bytes from `src_addr` to `dst_addr` within the shared
    /// data buffer, then validate the destination CRC.
    StartTransfer = 1,
    /// Liveness probe: validate the magic and report success.
    QueryStatus = 2,
}

impl Command {
    /// Decode a raw command register value. Unknown values are a protocol
    /// violation and decode to `None`.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Noop),
            1 => Some(Self::StartTransfer),
            2 => Some(Self::QueryStatus),
            _ => None,
        }
    }
}

/// Completion-signal kind selected by the `irq_type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum IrqKind {
    /// Legacy INTx.
    Intx = 0,
    /// Message Signaled Interrupt.
    Msi = 1,
    /// Extended MSI.
    MsiX = 2,
}

impl IrqKind {
    /// Decode a raw `irq_type` value.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Intx),
            1 => Some(Self::Msi),
            2 => Some(Self::MsiX),
            _ => None,
        }
    }
}

impl std::fmt::Display for IrqKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Intx => write!(f, "INTx"),
            Self::Msi => write!(f, "MSI"),
            Self::MsiX => write!(f, "MSI-X"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_field_offsets() {
        // The layout is __packed: u32 fields butt up against the u64s.
        assert_eq!(offset::MAGIC, 0);
        assert_eq!(offset::COMMAND, 4);
        assert_eq!(offset::STATUS, 8);
        assert_eq!(offset::SRC_ADDR, 12);
        assert_eq!(offset::DST_ADDR, 20);
        assert_eq!(offset::SIZE, 28);
        assert_eq!(offset::CHECKSUM, 32);
        assert_eq!(offset::IRQ_TYPE, 36);
        assert_eq!(offset::IRQ_NUMBER, 40);
        assert_eq!(offset::FLAGS, 44);
    }

    #[test]
    fn block_rounds_payload_to_128() {
        assert_eq!(PAYLOAD_SIZE, offset::FLAGS + 4);
        assert_eq!(BLOCK_SIZE, PAYLOAD_SIZE.next_multiple_of(128));
    }

    #[test]
    fn command_decoding() {
        assert_eq!(Command::from_raw(0), Some(Command::Noop));
        assert_eq!(Command::from_raw(1), Some(Command::StartTransfer));
        assert_eq!(Command::from_raw(2), Some(Command::QueryStatus));
        assert_eq!(Command::from_raw(3), None);
    }

    #[test]
    fn irq_kind_decoding() {
        assert_eq!(IrqKind::from_raw(0), Some(IrqKind::Intx));
        assert_eq!(IrqKind::from_raw(2), Some(IrqKind::MsiX));
        assert_eq!(IrqKind::from_raw(9), None);
    }

    #[test]
    fn magic_version_byte() {
        assert_eq!(XMT_MAGIC & 0xFF, 1);
        assert_eq!(XMT_MAGIC >> 8, 0x0058_4D54); // "XMT"
    }
}
