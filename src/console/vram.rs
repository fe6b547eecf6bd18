//! Memory-mapped video memory.
//!
//! Framebuffers are addressed the way the console addresses them: as absolute
//! integers inside the VRAM window. Cells are relaxed atomics so the worker
//! can draw while the host reads, with the same tearing semantics real
//! hardware has.

use crate::console::ConsoleError;
use std::sync::atomic::{AtomicU8, Ordering};

/// First address of the VRAM window.
pub const VRAM_BASE: u32 = 0x1F00_0000;
/// Size of the VRAM window in bytes (6 MiB).
pub const VRAM_SIZE: u32 = 0x0060_0000;

pub struct VideoMemory {
    base: u32,
    cells: Box<[AtomicU8]>,
}

impl std::fmt::Debug for VideoMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoMemory")
            .field("base", &format_args!("{:#010x}", self.base))
            .field("size", &self.cells.len())
            .finish()
    }
}

impl VideoMemory {
    /// Allocate the standard VRAM window, zero-filled.
    pub fn new() -> Self {
        Self::with_window(VRAM_BASE, VRAM_SIZE)
    }

    pub fn with_window(base: u32, size: u32) -> Self {
        let cells = (0..size).map(|_| AtomicU8::new(0)).collect();
        Self { base, cells }
    }

    pub fn size(&self) -> u32 {
        self.cells.len() as u32
    }

    /// Check that `[addr, addr + len)` lies entirely inside the window.
    pub fn check_range(&self, addr: u32, len: u32) -> Result<(), ConsoleError> {
        let end = self.base as u64 + self.cells.len() as u64;
        let req_end = addr as u64 + len as u64;
        if addr < self.base || req_end > end {
            return Err(ConsoleError::AddressOutOfRange {
                addr,
                len,
                base: self.base,
                size: self.size(),
            });
        }
        Ok(())
    }

    #[inline]
    fn offset(&self, addr: u32) -> Option<usize> {
        let off = addr.checked_sub(self.base)? as usize;
        (off < self.cells.len()).then_some(off)
    }

    /// Cells backing `[addr, addr + len)`, clipped to the window, plus the
    /// index of the first backed byte within the request.
    fn span(&self, addr: u32, len: usize) -> (usize, &[AtomicU8]) {
        let size = self.cells.len() as i64;
        let start = i64::from(addr) - i64::from(self.base);
        let lo = start.clamp(0, size);
        let hi = start.saturating_add(len as i64).clamp(0, size);
        if hi <= lo {
            return (0, &[]);
        }
        ((lo - start) as usize, &self.cells[lo as usize..hi as usize])
    }

    /// Write one byte. Addresses outside the window are ignored.
    #[inline]
    pub fn write_u8(&self, addr: u32, value: u8) {
        if let Some(off) = self.offset(addr) {
            self.cells[off].store(value, Ordering::Relaxed);
        }
    }

    /// Read one byte. Addresses outside the window read as zero.
    #[inline]
    pub fn read_u8(&self, addr: u32) -> u8 {
        self.offset(addr)
            .map(|off| self.cells[off].load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Write a contiguous run of bytes starting at `addr`.
    pub fn write(&self, addr: u32, bytes: &[u8]) {
        let (skip, cells) = self.span(addr, bytes.len());
        for (cell, b) in cells.iter().zip(&bytes[skip..]) {
            cell.store(*b, Ordering::Relaxed);
        }
    }

    /// Copy `out.len()` bytes starting at `addr` into `out`.
    pub fn read_into(&self, addr: u32, out: &mut [u8]) {
        let (skip, cells) = self.span(addr, out.len());
        out.fill(0);
        for (slot, cell) in out[skip..].iter_mut().zip(cells) {
            *slot = cell.load(Ordering::Relaxed);
        }
    }

    /// Fill `len` bytes starting at `addr` with a repeating pattern.
    pub fn fill_pattern(&self, addr: u32, len: u32, pattern: &[u8]) {
        if pattern.is_empty() {
            return;
        }
        let (skip, cells) = self.span(addr, len as usize);
        for (i, cell) in cells.iter().enumerate() {
            cell.store(pattern[(skip + i) % pattern.len()], Ordering::Relaxed);
        }
    }
}

impl Default for VideoMemory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_back_written_bytes() {
        let vram = VideoMemory::with_window(0x1000, 64);
        vram.write(0x1010, &[1, 2, 3]);
        let mut out = [0u8; 3];
        vram.read_into(0x1010, &mut out);
        assert_eq!(out, [1, 2, 3]);
    }

    #[test]
    fn out_of_window_access_is_ignored() {
        let vram = VideoMemory::with_window(0x1000, 16);
        vram.write_u8(0x0fff, 9);
        vram.write_u8(0x1010, 9);
        assert_eq!(vram.read_u8(0x0fff), 0);
        assert_eq!(vram.read_u8(0x1010), 0);
    }

    #[test]
    fn runs_straddling_the_window_are_clipped() {
        let vram = VideoMemory::with_window(0x1000, 8);
        vram.write(0x0ffe, &[1, 2, 3, 4]);
        assert_eq!(vram.read_u8(0x1000), 3);
        assert_eq!(vram.read_u8(0x1001), 4);

        vram.fill_pattern(0x1006, 4, &[7, 8]);
        assert_eq!((vram.read_u8(0x1006), vram.read_u8(0x1007)), (7, 8));

        let mut out = [9u8; 4];
        vram.read_into(0x0fff, &mut out);
        assert_eq!(out, [0, 3, 4, 0]);
        vram.read_into(0x2000, &mut out);
        assert_eq!(out, [0; 4]);
    }

    #[test]
    fn range_check_rejects_overflowing_regions() {
        let vram = VideoMemory::with_window(0x1000, 16);
        assert!(vram.check_range(0x1000, 16).is_ok());
        assert!(vram.check_range(0x1001, 16).is_err());
        assert!(vram.check_range(0x0ff0, 4).is_err());
    }
}
