//! Host-facing window over the shared data buffer.
//!
//! This is the surface a host process sees: byte-stream `read`/`write`
//! anchored at the buffer start, offset-addressed `read_at`/`write_at`,
//! and `map`, which hands out a page-granular view bounded by the buffer
//! capacity. Every entry point rejects lengths crossing the capacity
//! ceiling before touching memory.
//!
//! Opening a window enforces no exclusivity — any number of holders can
//! clone one. That matches the device it models and is a known gap, not a
//! guarantee.

use std::sync::Arc;

use crate::buffer::SharedBuffer;
use crate::error::{Result, XmtError};

/// Page granularity for mapped views.
pub const PAGE_SIZE: u64 = 4096;

/// Host window over the shared data buffer.
#[derive(Debug, Clone)]
pub struct HostWindow {
    buffer: Arc<SharedBuffer>,
}

impl HostWindow {
    /// Open a window over `buffer`. No exclusivity is enforced.
    #[must_use]
    pub fn open(buffer: Arc<SharedBuffer>) -> Self {
        Self { buffer }
    }

    /// Buffer capacity visible through this window.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Copy `out.len()` bytes from the start of the buffer.
    ///
    /// # Errors
    ///
    /// Returns [`XmtError::Overflow`] if the length exceeds capacity.
    pub fn read(&self, out: &mut [u8]) -> Result<usize> {
        self.read_at(0, out)
    }

    /// Copy `data.len()` bytes to the start of the buffer.
    ///
    /// # Errors
    ///
    /// Returns [`XmtError::Overflow`] if the length exceeds capacity.
    pub fn write(&self, data: &[u8]) -> Result<usize> {
        self.write_at(0, data)
    }

    /// Copy `out.len()` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`XmtError::Overflow`] if the range crosses capacity.
    pub fn read_at(&self, offset: u64, out: &mut [u8]) -> Result<usize> {
        self.buffer.read_at(offset, out)?;
        Ok(out.len())
    }

    /// Copy `data.len()` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`XmtError::Overflow`] if the range crosses capacity.
    pub fn write_at(&self, offset: u64, data: &[u8]) -> Result<usize> {
        self.buffer.write_at(offset, data)?;
        Ok(data.len())
    }

    /// Establish a mapped view of `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`XmtError::UnalignedOffset`] if `offset` is not
    /// page-aligned, or [`XmtError::Overflow`] if the view crosses
    /// capacity.
    pub fn map(&self, offset: u64, len: u64) -> Result<MappedWindow> {
        if offset % PAGE_SIZE != 0 {
            return Err(XmtError::UnalignedOffset {
                offset,
                page: PAGE_SIZE,
            });
        }
        let capacity = self.buffer.capacity() as u64;
        if offset.checked_add(len).is_none_or(|end| end > capacity) {
            return Err(XmtError::overflow(offset, len, capacity));
        }
        tracing::debug!("Mapped {len} bytes of the data buffer at offset {offset:#x}");
        Ok(MappedWindow {
            buffer: Arc::clone(&self.buffer),
            base: offset,
            len,
        })
    }
}

/// A page-granular view into the shared data buffer.
///
/// Offsets are relative to the view base; every access is bounds-checked
/// against the view length, which in turn was checked against the buffer
/// capacity at map time.
#[derive(Debug, Clone)]
pub struct MappedWindow {
    buffer: Arc<SharedBuffer>,
    base: u64,
    len: u64,
}

impl MappedWindow {
    /// View length in bytes.
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.len
    }

    /// Whether the view is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn check(&self, offset: u64, len: u64) -> Result<u64> {
        if offset.checked_add(len).is_none_or(|end| end > self.len) {
            return Err(XmtError::overflow(offset, len, self.len));
        }
        Ok(self.base + offset)
    }

    /// Read from the view at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`XmtError::Overflow`] if the range crosses the view.
    pub fn read_at(&self, offset: u64, out: &mut [u8]) -> Result<()> {
        let at = self.check(offset, out.len() as u64)?;
        self.buffer.read_at(at, out)
    }

    /// Write to the view at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`XmtError::Overflow`] if the range crosses the view.
    pub fn write_at(&self, offset: u64, data: &[u8]) -> Result<()> {
        let at = self.check(offset, data.len() as u64)?;
        self.buffer.write_at(at, data)
    }
}
