//! # Virtual and Physical Memory Address Types
//!
//! Strongly typed wrappers for raw memory addresses and physical ranges used
//! by the core bring-up code.
//!
//! ## Overview
//!
//! | Type | Description |
//! |------|-------------|
//! | [`MemoryAddress`] | A raw 64-bit address, either physical or virtual. |
//! | [`PhysicalAddress`] | Physical memory (RAM partitions, channel pages). |
//! | [`VirtualAddress`] | Addresses in the current address space (mapping windows, entry points). |
//! | [`PhysicalRange`] | A validated, non-empty `[start, start + size)` physical interval. |
//!
//! Page granularity is carried at the type level by [`PageSize`] markers, of
//! which [`Size4K`] is the one the bring-up path uses.
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let boot_image_end = PhysicalAddress::new(0x0140_0000 + 0x1234);
//! let channels = boot_image_end.checked_align_up::<Size4K>().unwrap();
//! assert_eq!(channels.as_u64(), 0x0140_2000);
//!
//! let window = PhysicalRange::page_aligned::<Size4K>(channels, 4 * Size4K::SIZE).unwrap();
//! assert_eq!(window.end().as_u64(), 0x0140_6000);
//! ```
//!
//! ## Design Notes
//!
//! - The address types are `#[repr(transparent)]` and implement `Copy`, `Eq`,
//!   `Ord`, and `Hash`, making them suitable as map keys or for FFI use.
//! - Range arithmetic is checked; a [`PhysicalRange`] can only be obtained
//!   through constructors that reject empty, wrapping, or out-of-parent ranges.

#![cfg_attr(not(any(test, doctest)), no_std)]

mod memory_address;
mod page_size;
mod physical_address;
mod physical_range;
mod virtual_address;

pub use memory_address::MemoryAddress;
pub use page_size::{PageSize, Size4K};
pub use physical_address::PhysicalAddress;
pub use physical_range::{PhysicalRange, RangeError};
pub use virtual_address::VirtualAddress;
