//! Bounds-checked arena over a BAR's backing memory.
//!
//! Every BAR allocation — the register block and the bulk data windows —
//! is a [`SharedBuffer`]: one contiguous region addressed only by
//! offset/length pairs validated against a single capacity invariant.
//! Raw pointers never escape.
//!
//! The command loop and the host window mutate the same region from
//! different threads. Each operation takes the interior lock for its own
//! duration only; no ordering is enforced *across* operations, so a host
//! write racing a device-side transfer interleaves at operation
//! granularity. Coordinating the two paths is the protocol's job (the
//! host must not touch a range while `status` reads in-progress), not
//! this type's.

use std::sync::Mutex;

use crate::error::{Result, XmtError};

/// One contiguous backing region with a fixed capacity.
#[derive(Debug)]
pub struct SharedBuffer {
    mem: Mutex<Box<[u8]>>,
    capacity: usize,
}

impl SharedBuffer {
    /// Allocate a zeroed region of `capacity` bytes.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            mem: Mutex::new(vec![0u8; capacity].into_boxed_slice()),
            capacity,
        }
    }

    /// Allocate a zeroed region of `capacity` bytes, reporting failure
    /// instead of aborting when the memory is not available.
    #[must_use]
    pub fn try_new(capacity: usize) -> Option<Self> {
        let mut mem = Vec::new();
        mem.try_reserve_exact(capacity).ok()?;
        mem.resize(capacity, 0);
        Some(Self {
            mem: Mutex::new(mem.into_boxed_slice()),
            capacity,
        })
    }

    /// Region capacity in bytes.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    fn check(&self, offset: u64, len: u64) -> Result<(usize, usize)> {
        let in_bounds = offset
            .checked_add(len)
            .is_some_and(|end| end <= self.capacity as u64);
        if !in_bounds {
            return Err(XmtError::overflow(offset, len, self.capacity as u64));
        }
        // Fits in usize: both ends are <= capacity, which is a usize.
        #[allow(clippy::cast_possible_truncation)]
        let pair = (offset as usize, len as usize);
        Ok(pair)
    }

    /// Copy `out.len()` bytes starting at `offset` into `out`.
    ///
    /// # Errors
    ///
    /// Returns [`XmtError::Overflow`] if the range crosses capacity.
    pub fn read_at(&self, offset: u64, out: &mut [u8]) -> Result<()> {
        let (offset, len) = self.check(offset, out.len() as u64)?;
        let mem = self.mem.lock().expect("buffer lock poisoned");
        out.copy_from_slice(&mem[offset..offset + len]);
        Ok(())
    }

    /// Copy `data` into the region starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`XmtError::Overflow`] if the range crosses capacity.
    pub fn write_at(&self, offset: u64, data: &[u8]) -> Result<()> {
        let (offset, len) = self.check(offset, data.len() as u64)?;
        let mut mem = self.mem.lock().expect("buffer lock poisoned");
        mem[offset..offset + len].copy_from_slice(data);
        Ok(())
    }

    /// Move `len` bytes from `src` to `dst` within the region. Overlapping
    /// ranges behave like `memmove`.
    ///
    /// # Errors
    ///
    /// Returns [`XmtError::Overflow`] if either range crosses capacity.
    pub fn copy_within(&self, src: u64, dst: u64, len: u64) -> Result<()> {
        let (src, len) = self.check(src, len)?;
        let (dst, _) = self.check(dst, len as u64)?;
        let mut mem = self.mem.lock().expect("buffer lock poisoned");
        mem.copy_within(src..src + len, dst);
        Ok(())
    }

    /// CRC-32 (IEEE) over `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`XmtError::Overflow`] if the range crosses capacity.
    pub fn crc32(&self, offset: u64, len: u64) -> Result<u32> {
        let (offset, len) = self.check(offset, len)?;
        let mem = self.mem.lock().expect("buffer lock poisoned");
        Ok(crc32fast::hash(&mem[offset..offset + len]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_write_round_trip() {
        let buf = SharedBuffer::new(64);
        buf.write_at(8, &[1, 2, 3, 4]).unwrap();
        let mut out = [0u8; 4];
        buf.read_at(8, &mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4]);
    }

    #[test]
    fn range_crossing_capacity_is_rejected() {
        let buf = SharedBuffer::new(64);
        assert!(matches!(
            buf.write_at(60, &[0u8; 8]),
            Err(XmtError::Overflow { .. })
        ));
        assert!(buf.read_at(64, &mut [0u8; 1]).is_err());
        assert!(buf.copy_within(0, 60, 8).is_err());
        assert!(buf.crc32(32, 33).is_err());
    }

    #[test]
    fn offset_overflow_is_rejected() {
        let buf = SharedBuffer::new(64);
        assert!(buf.read_at(u64::MAX, &mut [0u8; 2]).is_err());
    }

    #[test]
    fn overlapping_copy_behaves_like_memmove() {
        let buf = SharedBuffer::new(16);
        buf.write_at(0, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        buf.copy_within(0, 4, 8).unwrap();
        let mut out = [0u8; 12];
        buf.read_at(0, &mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4, 1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn crc_matches_crc32fast() {
        let buf = SharedBuffer::new(32);
        let data = b"xmt checksum gate";
        buf.write_at(4, data).unwrap();
        assert_eq!(buf.crc32(4, data.len() as u64).unwrap(), crc32fast::hash(data));
    }
}
