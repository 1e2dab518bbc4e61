//! # Physical Page Access for Channels
//!
//! Channel rings live in physical pages shared with another core. Code can
//! only dereference virtual addresses, so a [`PhysMapper`] turns the physical
//! page address into a pointer in the current address space. The kernel uses
//! the higher-half direct map ([`HhdmPhysMapper`]); tests map into a host buffer.

use kernel_info::memory::HHDM_BASE;
use kernel_memory_addresses::PhysicalAddress;

/// Converts physical addresses to pointers usable by the current core.
///
/// # Safety
/// Implementors guarantee that for every page-aligned `pa` handed to
/// [`PhysMapper::phys_to_ptr`] the returned pointer is either null or valid
/// for reads and writes of one full page for as long as the mapper is
/// borrowed, and that the page is only shared with the peer core.
pub unsafe trait PhysMapper {
    fn phys_to_ptr(&self, pa: PhysicalAddress) -> *mut u8;
}

/// [`PhysMapper`] for kernels with a higher-half direct map (HHDM).
///
/// Physical address `pa` is visible at `HHDM_BASE + pa`.
pub struct HhdmPhysMapper;

// SAFETY: the HHDM covers all physical memory once the kernel runs.
unsafe impl PhysMapper for HhdmPhysMapper {
    fn phys_to_ptr(&self, pa: PhysicalAddress) -> *mut u8 {
        #[allow(clippy::cast_possible_truncation)]
        let va = (HHDM_BASE + pa.as_u64()) as usize;
        core::ptr::with_exposed_provenance_mut(va)
    }
}
