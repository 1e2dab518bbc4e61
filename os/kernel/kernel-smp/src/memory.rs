//! # Memory Control Primitives
//!
//! The four virtual-memory operations the orchestrator sequences when it
//! prepares a core: claim a partition, map a window onto part of it, copy
//! bytes through the window, unmap the window. The virtual memory manager
//! behind them is platform code.

use kernel_memory_addresses::{PhysicalRange, VirtualAddress};

/// Access rights of a mapping window.
#[bitfield_struct::bitfield(u8)]
pub struct MemoryAccess {
    /// Window may be read.
    pub readable: bool,
    /// Window may be written.
    pub writable: bool,
    /// Window may be executed.
    pub executable: bool,
    /// Window is accessible from user mode.
    pub user: bool,
    #[bits(4)]
    __: u8,
}

impl MemoryAccess {
    /// Access used for every window onto another core's partition.
    pub const READ_WRITE_USER: Self = Self::new()
        .with_readable(true)
        .with_writable(true)
        .with_user(true);
}

/// A physical range mapped into the caller's address space.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct MappedWindow {
    /// Where the range is visible to the caller.
    pub virtual_address: VirtualAddress,
    /// The physical bytes behind the window.
    pub physical: PhysicalRange,
}

impl MappedWindow {
    #[inline]
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.physical.size()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoryControlError {
    #[error("range {0} is already in use")]
    InUse(PhysicalRange),
    #[error("range {0} lies outside physical memory")]
    OutOfRange(PhysicalRange),
    #[error("no virtual address space left to map {0}")]
    NoVirtualSpace(PhysicalRange),
    #[error("no window is mapped at {0}")]
    NotMapped(VirtualAddress),
}

/// Virtual-memory primitives used to fill another core's partition.
pub trait MemoryControl {
    /// Remove `range` from the free physical pool.
    ///
    /// # Errors
    /// If the range is in use or outside physical memory.
    fn claim(&mut self, range: PhysicalRange) -> Result<(), MemoryControlError>;

    /// Map `range` into the caller's address space with `access`.
    ///
    /// # Errors
    /// If no virtual space is left or the range cannot be mapped.
    fn map(&mut self, range: PhysicalRange, access: MemoryAccess) -> Result<MappedWindow, MemoryControlError>;

    /// Copy `source` to the start of `window` and return the bytes transferred.
    ///
    /// A result short of `source.len()` means the copy was cut off.
    fn copy(&mut self, window: &MappedWindow, source: &[u8]) -> usize;

    /// Tear down a window returned by [`MemoryControl::map`].
    ///
    /// # Errors
    /// If `window` is not currently mapped.
    fn unmap(&mut self, window: MappedWindow) -> Result<(), MemoryControlError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_are_read_write_user() {
        let access = MemoryAccess::READ_WRITE_USER;
        assert!(access.readable());
        assert!(access.writable());
        assert!(access.user());
        assert!(!access.executable());
        assert_eq!(access.into_bits(), 0b1011);
    }
}
