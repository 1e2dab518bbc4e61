//! # Kernel Executable
//!
//! Parsing the kernel binary is the loader's business; this module only
//! takes what it produces (an entry address and loadable regions) and checks
//! that it fits the per-core kernel window before any core is touched.

use core::fmt;
use heapless::Vec;
use kernel_info::memory::{KERNEL_REGION_SIZE, MAX_KERNEL_REGIONS};
use kernel_memory_addresses::VirtualAddress;

/// One loadable segment of the kernel image.
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct MemoryRegion<'a> {
    /// Offset of the segment from the image base.
    pub virtual_address: VirtualAddress,
    /// Bytes to place at that offset.
    pub data: &'a [u8],
}

impl<'a> MemoryRegion<'a> {
    #[must_use]
    pub const fn new(virtual_address: VirtualAddress, data: &'a [u8]) -> Self {
        Self { virtual_address, data }
    }

    #[inline]
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

impl fmt::Debug for MemoryRegion<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryRegion")
            .field("virtual_address", &self.virtual_address)
            .field("size", &self.size())
            .finish()
    }
}

/// What an [`ExecutableLoader`] extracts from a kernel binary.
#[derive(Debug, Copy, Clone)]
pub struct Executable<'a> {
    pub entry: VirtualAddress,
    pub regions: &'a [MemoryRegion<'a>],
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutableError {
    #[error("no executable at this path")]
    NotFound,
    #[error("executable is malformed: {0}")]
    Malformed(&'static str),
}

/// Resolves a path to an executable image.
pub trait ExecutableLoader {
    /// Open and parse the executable at `path`.
    ///
    /// # Errors
    /// [`ExecutableError::NotFound`] if nothing can be opened at `path`,
    /// [`ExecutableError::Malformed`] if its regions cannot be extracted.
    fn load(&self, path: &str) -> Result<Executable<'_>, ExecutableError>;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KernelImageError {
    #[error(transparent)]
    Executable(#[from] ExecutableError),
    #[error("{count} regions exceed the limit of {max}")]
    TooManyRegions { count: usize, max: usize },
    #[error("region {index} at {offset} (+{size:#x}) leaves the kernel window")]
    RegionOutOfBounds {
        index: usize,
        offset: VirtualAddress,
        size: u64,
    },
    #[error("no kernel has been loaded")]
    NotLoaded,
}

/// A validated kernel: entry address plus at most [`MAX_KERNEL_REGIONS`]
/// regions, each inside the kernel window.
#[derive(Debug, Clone)]
pub struct KernelImage<'a> {
    entry: VirtualAddress,
    regions: Vec<MemoryRegion<'a>, MAX_KERNEL_REGIONS>,
}

impl<'a> KernelImage<'a> {
    /// # Errors
    /// [`KernelImageError::TooManyRegions`] or
    /// [`KernelImageError::RegionOutOfBounds`].
    pub fn new(executable: Executable<'a>) -> Result<Self, KernelImageError> {
        let count = executable.regions.len();
        let regions = Vec::from_slice(executable.regions).map_err(|()| KernelImageError::TooManyRegions {
            count,
            max: MAX_KERNEL_REGIONS,
        })?;

        for (index, region) in regions.iter().enumerate() {
            let fits = region
                .virtual_address
                .as_u64()
                .checked_add(region.size())
                .is_some_and(|end| end <= KERNEL_REGION_SIZE);
            if !fits {
                return Err(KernelImageError::RegionOutOfBounds {
                    index,
                    offset: region.virtual_address,
                    size: region.size(),
                });
            }
        }

        Ok(Self {
            entry: executable.entry,
            regions,
        })
    }

    #[inline]
    #[must_use]
    pub const fn entry(&self) -> VirtualAddress {
        self.entry
    }

    #[inline]
    #[must_use]
    pub fn regions(&self) -> &[MemoryRegion<'a>] {
        &self.regions
    }
}
