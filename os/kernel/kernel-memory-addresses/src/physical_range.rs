//! # Physical Ranges
//!
//! A [`PhysicalRange`] is a non-empty, non-wrapping `[start, start + size)`
//! interval of physical memory. Every constructor validates its arguments, so
//! a range that exists is always well-formed; sub-ranges are only handed out
//! when they are fully contained in their parent.

use crate::{PageSize, PhysicalAddress};
use core::fmt;

/// Errors produced when building or carving a [`PhysicalRange`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    #[error("range at {0} is empty")]
    Empty(PhysicalAddress),
    #[error("range at {start} with size {size:#x} wraps the address space")]
    Overflow { start: PhysicalAddress, size: u64 },
    #[error("address {0} is not page aligned")]
    Unaligned(PhysicalAddress),
    #[error("range [{start}, +{size:#x}) exceeds its parent ending at {limit}")]
    OutOfBounds {
        start: PhysicalAddress,
        size: u64,
        limit: PhysicalAddress,
    },
}

/// A validated physical memory interval.
///
/// ```rust
/// # use kernel_memory_addresses::*;
/// let partition = PhysicalRange::new(PhysicalAddress::new(0x0100_0000), 0x0100_0000).unwrap();
/// let kernel = partition.sub_range(0, 0x0040_0000).unwrap();
/// assert!(partition.contains_range(&kernel));
/// assert_eq!(kernel.end().as_u64(), 0x0140_0000);
/// assert!(partition.sub_range(0x00F0_0000, 0x0020_0000).is_err());
/// ```
///
/// The layout is `#[repr(C)]` `{ start: u64, size: u64 }` so the type can sit
/// directly inside boot-parameter blocks shared with other cores.
#[repr(C)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalRange {
    start: PhysicalAddress,
    size: u64,
}

impl PhysicalRange {
    /// Build a range of `size` bytes at `start`.
    ///
    /// # Errors
    /// [`RangeError::Empty`] for `size == 0`, [`RangeError::Overflow`] if the
    /// end does not fit in 64 bits.
    pub const fn new(start: PhysicalAddress, size: u64) -> Result<Self, RangeError> {
        if size == 0 {
            return Err(RangeError::Empty(start));
        }
        if start.checked_add(size).is_none() {
            return Err(RangeError::Overflow { start, size });
        }
        Ok(Self { start, size })
    }

    /// Build a range whose start is aligned to `S`.
    ///
    /// # Errors
    /// As [`PhysicalRange::new`], plus [`RangeError::Unaligned`].
    pub fn page_aligned<S: PageSize>(start: PhysicalAddress, size: u64) -> Result<Self, RangeError> {
        if !start.is_aligned::<S>() {
            return Err(RangeError::Unaligned(start));
        }
        Self::new(start, size)
    }

    #[inline]
    #[must_use]
    pub const fn start(&self) -> PhysicalAddress {
        self.start
    }

    #[inline]
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Exclusive end address.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.start.as_u64() + self.size)
    }

    #[inline]
    #[must_use]
    pub const fn contains(&self, addr: PhysicalAddress) -> bool {
        addr.as_u64() >= self.start.as_u64() && addr.as_u64() < self.end().as_u64()
    }

    #[inline]
    #[must_use]
    pub const fn contains_range(&self, other: &Self) -> bool {
        other.start.as_u64() >= self.start.as_u64() && other.end().as_u64() <= self.end().as_u64()
    }

    #[inline]
    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.start.as_u64() < other.end().as_u64() && other.start.as_u64() < self.end().as_u64()
    }

    /// Carve `[start + offset, +size)` out of this range.
    ///
    /// # Errors
    /// Fails unless the result is non-empty and entirely inside `self`.
    pub fn sub_range(&self, offset: u64, size: u64) -> Result<Self, RangeError> {
        let start = self.start.checked_add(offset).ok_or(RangeError::Overflow {
            start: self.start,
            size: offset,
        })?;
        self.carve(start, size)
    }

    /// Carve `[start, +size)` out of this range, with `start` given absolutely.
    ///
    /// # Errors
    /// Fails unless the result is non-empty and entirely inside `self`.
    pub fn carve(&self, start: PhysicalAddress, size: u64) -> Result<Self, RangeError> {
        let candidate = Self::new(start, size)?;
        if self.contains_range(&candidate) {
            Ok(candidate)
        } else {
            Err(RangeError::OutOfBounds {
                start,
                size,
                limit: self.end(),
            })
        }
    }
}

impl fmt::Debug for PhysicalRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysicalRange({}..{})", self.start, self.end())
    }
}

impl fmt::Display for PhysicalRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, +{:#x})", self.start, self.size)
    }
}
