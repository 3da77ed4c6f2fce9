//! Typed access to the command register block.
//!
//! [`RegisterBlock`] is a view over the register BAR's backing region.
//! Fields are read and written as little-endian values at the offsets
//! fixed by [`xmt_proto::regs`]; the block itself stays a byte array so
//! the packed, unaligned wire layout costs nothing to honor.
//!
//! The same handle serves both sides: the endpoint's command loop polls
//! `command` and writes `status`, while host-side code (tests, the demo
//! binary) fills in a transfer descriptor and writes `command` last as
//! the doorbell.

use std::sync::Arc;

use xmt_proto::regs::{offset, Command, IrqKind, XMT_MAGIC};

use crate::buffer::SharedBuffer;

/// A transfer descriptor as the host submits it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferRequest {
    /// Source offset into the shared data buffer.
    pub src_addr: u64,
    /// Destination offset into the shared data buffer.
    pub dst_addr: u64,
    /// Transfer length in bytes.
    pub size: u32,
    /// Expected CRC-32 over the destination range.
    pub checksum: u32,
    /// Completion signal kind.
    pub irq_kind: IrqKind,
    /// Completion signal number.
    pub irq_number: u32,
}

/// View over the register BAR backing region.
#[derive(Debug, Clone)]
pub struct RegisterBlock {
    mem: Arc<SharedBuffer>,
}

impl RegisterBlock {
    /// Wrap the register BAR's backing region.
    ///
    /// # Panics
    ///
    /// Panics if the region is smaller than the register block — the
    /// allocator never produces one.
    #[must_use]
    pub fn new(mem: Arc<SharedBuffer>) -> Self {
        assert!(
            mem.capacity() >= xmt_proto::regs::BLOCK_SIZE,
            "register region smaller than the block"
        );
        Self { mem }
    }

    fn read_u32(&self, at: usize) -> u32 {
        let mut raw = [0u8; 4];
        self.mem
            .read_at(at as u64, &mut raw)
            .expect("field inside block");
        u32::from_le_bytes(raw)
    }

    fn write_u32(&self, at: usize, value: u32) {
        self.mem
            .write_at(at as u64, &value.to_le_bytes())
            .expect("field inside block");
    }

    fn read_u64(&self, at: usize) -> u64 {
        let mut raw = [0u8; 8];
        self.mem
            .read_at(at as u64, &mut raw)
            .expect("field inside block");
        u64::from_le_bytes(raw)
    }

    fn write_u64(&self, at: usize, value: u64) {
        self.mem
            .write_at(at as u64, &value.to_le_bytes())
            .expect("field inside block");
    }

    /// Protocol identifier field.
    #[must_use]
    pub fn magic(&self) -> u32 {
        self.read_u32(offset::MAGIC)
    }

    /// Raw command field.
    #[must_use]
    pub fn command(&self) -> u32 {
        self.read_u32(offset::COMMAND)
    }

    /// Status field.
    #[must_use]
    pub fn status(&self) -> u32 {
        self.read_u32(offset::STATUS)
    }

    /// Set the status field (endpoint side).
    pub fn set_status(&self, status: u32) {
        self.write_u32(offset::STATUS, status);
    }

    /// Source offset field.
    #[must_use]
    pub fn src_addr(&self) -> u64 {
        self.read_u64(offset::SRC_ADDR)
    }

    /// Destination offset field.
    #[must_use]
    pub fn dst_addr(&self) -> u64 {
        self.read_u64(offset::DST_ADDR)
    }

    /// Transfer length field.
    #[must_use]
    pub fn size(&self) -> u32 {
        self.read_u32(offset::SIZE)
    }

    /// Expected-checksum field.
    #[must_use]
    pub fn checksum(&self) -> u32 {
        self.read_u32(offset::CHECKSUM)
    }

    /// Raw completion-signal kind field.
    #[must_use]
    pub fn irq_type(&self) -> u32 {
        self.read_u32(offset::IRQ_TYPE)
    }

    /// Completion-signal number field.
    #[must_use]
    pub fn irq_number(&self) -> u32 {
        self.read_u32(offset::IRQ_NUMBER)
    }

    /// Reserved flags field.
    #[must_use]
    pub fn flags(&self) -> u32 {
        self.read_u32(offset::FLAGS)
    }

    /// Host side: fill in a transfer descriptor and ring the doorbell.
    /// The command field is written last so a concurrent poll never sees
    /// a half-written descriptor behind a latched command.
    pub fn enqueue_transfer(&self, request: &TransferRequest) {
        self.write_u32(offset::MAGIC, XMT_MAGIC);
        self.write_u64(offset::SRC_ADDR, request.src_addr);
        self.write_u64(offset::DST_ADDR, request.dst_addr);
        self.write_u32(offset::SIZE, request.size);
        self.write_u32(offset::CHECKSUM, request.checksum);
        self.write_u32(offset::IRQ_TYPE, request.irq_kind as u32);
        self.write_u32(offset::IRQ_NUMBER, request.irq_number);
        self.write_u32(offset::FLAGS, 0);
        self.write_u32(offset::COMMAND, Command::StartTransfer as u32);
    }

    /// Host side: submit a liveness probe.
    pub fn enqueue_query(&self, irq_kind: IrqKind, irq_number: u32) {
        self.write_u32(offset::MAGIC, XMT_MAGIC);
        self.write_u32(offset::IRQ_TYPE, irq_kind as u32);
        self.write_u32(offset::IRQ_NUMBER, irq_number);
        self.write_u32(offset::COMMAND, Command::QueryStatus as u32);
    }

    /// Host side: acknowledge a terminal status by clearing the command.
    pub fn clear_command(&self) {
        self.write_u32(offset::COMMAND, Command::Noop as u32);
    }

    /// Raw host-side field write, for exercising malformed blocks.
    pub fn write_raw_u32(&self, at: usize, value: u32) {
        self.write_u32(at, value);
    }
}
