//! # Memory Layout

use kernel_memory_addresses::{PageSize, Size4K};

/// One mebibyte.
pub const MIB: u64 = 1024 * 1024;

/// Page size used for mapping windows and channel rings.
pub const PAGE_SIZE: u64 = Size4K::SIZE;

/// A simple Higher Half Direct Map (HHDM) base.
/// Anything you map at [`HHDM_BASE`] + `pa` lets the kernel
/// access physical memory via a fixed offset.
pub const HHDM_BASE: u64 = 0xffff_8880_0000_0000;

/// Per-core partitions are multiples of this size.
///
/// Keeps every partition start large-page friendly.
pub const PARTITION_GRANULARITY: u64 = 4 * MIB;

/// Size of the kernel window at the bottom of every core's partition.
pub const KERNEL_REGION_SIZE: u64 = 4 * MIB;

/// Pages backing the two channels of one master/slave link (data + feedback per direction).
pub const CORE_CHANNEL_PAGES: u64 = 4;

/// Bytes backing the channels of one master/slave link.
pub const CORE_CHANNEL_SIZE: u64 = CORE_CHANNEL_PAGES * PAGE_SIZE;

/// Capacity of [`CoreInfo::kernel_command`](crate::cores::CoreInfo::kernel_command), including the NUL terminator.
pub const KERNEL_PATH_LEN: usize = 64;

/// Loadable regions a kernel image may declare.
pub const MAX_KERNEL_REGIONS: usize = 16;

const _: () = {
    assert!(PARTITION_GRANULARITY.is_multiple_of(PAGE_SIZE));
    assert!(KERNEL_REGION_SIZE.is_multiple_of(PAGE_SIZE));
    assert!(KERNEL_REGION_SIZE <= PARTITION_GRANULARITY);
    assert!(CORE_CHANNEL_PAGES == 4);
};
