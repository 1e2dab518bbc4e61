//! # Core Boot Descriptors
//!
//! The master core hands every other core a [`CoreInfo`] block describing the
//! physical partition it owns and where inside that partition the kernel, the
//! boot image, and the shared channel pages live. The booted core reads the
//! block at its partition base, so the layout is part of the master/slave ABI.
//!
//! ```text
//! memory.start ┌──────────────────────────────┐
//!              │ kernel (KERNEL_REGION_SIZE)  │
//! boot image   ├──────────────────────────────┤
//!              │ boot image (boot_image_size) │
//!              ├╌╌╌╌╌╌╌╌╌╌╌╌╌╌╌╌╌╌╌╌╌╌╌╌╌╌╌╌╌╌┤ (pad to page)
//! channels     ├──────────────────────────────┤
//!              │ 4 channel pages              │
//!              ├──────────────────────────────┤
//!              │ free for the core            │
//! memory.end   └──────────────────────────────┘
//! ```

use crate::memory::{CORE_CHANNEL_SIZE, KERNEL_PATH_LEN, KERNEL_REGION_SIZE};
use core::fmt;
use kernel_memory_addresses::{PhysicalAddress, PhysicalRange, RangeError, Size4K, VirtualAddress};

/// Identifier of a physical core.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct CoreId(u32);

impl CoreId {
    /// The core that runs discovery and boots every other core.
    pub const MASTER: Self = Self(0);

    #[inline]
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn is_master(self) -> bool {
        self.0 == Self::MASTER.0
    }
}

impl fmt::Display for CoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "core{}", self.0)
    }
}

impl From<u32> for CoreId {
    #[inline]
    fn from(value: u32) -> Self {
        Self::new(value)
    }
}

/// Reasons a [`CoreInfo`] cannot be built for a partition.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreLayoutError {
    #[error("{0} is the master core and is never booted")]
    MasterCore(CoreId),
    #[error("{core}: partition {memory} is not page aligned")]
    UnalignedPartition { core: CoreId, memory: PhysicalRange },
    #[error("{core}: kernel window does not fit the partition")]
    Kernel {
        core: CoreId,
        #[source]
        source: RangeError,
    },
    #[error("{core}: boot image does not fit the partition")]
    BootImage {
        core: CoreId,
        #[source]
        source: RangeError,
    },
    #[error("{core}: channel pages do not fit the partition")]
    Channel {
        core: CoreId,
        #[source]
        source: RangeError,
    },
    #[error("{core}: kernel command of {len} bytes exceeds {max} bytes")]
    CommandTooLong { core: CoreId, len: usize, max: usize },
}

/// Boot descriptor for one non-master core.
///
/// Every field is fixed at construction; [`CoreInfo::new`] validates that the
/// kernel, boot image, and channel pages are laid out back to back inside
/// `memory`, so a descriptor that exists is always safe to boot from.
#[repr(C)]
#[derive(Clone, Eq, PartialEq)]
pub struct CoreInfo {
    core_id: CoreId,
    _reserved: u32,
    memory: PhysicalRange,
    kernel: PhysicalRange,
    boot_image_address: PhysicalAddress,
    boot_image_size: u64,
    core_channel_address: PhysicalAddress,
    core_channel_size: u64,
    kernel_entry: VirtualAddress,
    timer_counter: u64,
    kernel_command: [u8; KERNEL_PATH_LEN],
}

const _: () = {
    assert!(size_of::<CoreInfo>() == 152);
    assert!(align_of::<CoreInfo>() == 8);
};

impl CoreInfo {
    /// Lay out kernel, boot image, and channel pages inside `memory`.
    ///
    /// # Errors
    /// A [`CoreLayoutError`] if `core_id` is the master, the partition is
    /// unaligned or too small for kernel + boot image + channel pages, or the
    /// kernel command does not fit [`KERNEL_PATH_LEN`] with its terminator.
    pub fn new(
        core_id: CoreId,
        memory: PhysicalRange,
        boot_image_size: u64,
        kernel_entry: VirtualAddress,
        timer_counter: u64,
        kernel_command: &str,
    ) -> Result<Self, CoreLayoutError> {
        if core_id.is_master() {
            return Err(CoreLayoutError::MasterCore(core_id));
        }
        if !memory.start().is_aligned::<Size4K>() {
            return Err(CoreLayoutError::UnalignedPartition { core: core_id, memory });
        }

        let kernel = memory
            .sub_range(0, KERNEL_REGION_SIZE)
            .map_err(|source| CoreLayoutError::Kernel { core: core_id, source })?;

        let boot_image_address = kernel.end();
        let boot_image_end = if boot_image_size == 0 {
            boot_image_address
        } else {
            memory
                .carve(boot_image_address, boot_image_size)
                .map_err(|source| CoreLayoutError::BootImage { core: core_id, source })?
                .end()
        };

        let core_channel_address = boot_image_end
            .checked_align_up::<Size4K>()
            .ok_or(CoreLayoutError::Channel {
                core: core_id,
                source: RangeError::Overflow {
                    start: boot_image_end,
                    size: CORE_CHANNEL_SIZE,
                },
            })?;
        memory
            .carve(core_channel_address, CORE_CHANNEL_SIZE)
            .map_err(|source| CoreLayoutError::Channel { core: core_id, source })?;

        let bytes = kernel_command.as_bytes();
        if bytes.len() >= KERNEL_PATH_LEN {
            return Err(CoreLayoutError::CommandTooLong {
                core: core_id,
                len: bytes.len(),
                max: KERNEL_PATH_LEN - 1,
            });
        }
        let mut command = [0u8; KERNEL_PATH_LEN];
        command[..bytes.len()].copy_from_slice(bytes);

        Ok(Self {
            core_id,
            _reserved: 0,
            memory,
            kernel,
            boot_image_address,
            boot_image_size,
            core_channel_address,
            core_channel_size: CORE_CHANNEL_SIZE,
            kernel_entry,
            timer_counter,
            kernel_command: command,
        })
    }

    #[inline]
    #[must_use]
    pub const fn core_id(&self) -> CoreId {
        self.core_id
    }

    /// The whole partition claimed for this core.
    #[inline]
    #[must_use]
    pub const fn memory(&self) -> PhysicalRange {
        self.memory
    }

    /// The kernel window at the bottom of [`CoreInfo::memory`].
    #[inline]
    #[must_use]
    pub const fn kernel(&self) -> PhysicalRange {
        self.kernel
    }

    #[inline]
    #[must_use]
    pub const fn boot_image_address(&self) -> PhysicalAddress {
        self.boot_image_address
    }

    #[inline]
    #[must_use]
    pub const fn boot_image_size(&self) -> u64 {
        self.boot_image_size
    }

    #[inline]
    #[must_use]
    pub const fn core_channel_address(&self) -> PhysicalAddress {
        self.core_channel_address
    }

    #[inline]
    #[must_use]
    pub const fn core_channel_size(&self) -> u64 {
        self.core_channel_size
    }

    #[inline]
    #[must_use]
    pub const fn kernel_entry(&self) -> VirtualAddress {
        self.kernel_entry
    }

    #[inline]
    #[must_use]
    pub const fn timer_counter(&self) -> u64 {
        self.timer_counter
    }

    /// The kernel path up to its NUL terminator.
    ///
    /// # Errors
    /// If the stored bytes are not UTF-8, which only happens for blocks not
    /// produced by [`CoreInfo::new`].
    pub fn kernel_command(&self) -> Result<&str, core::str::Utf8Error> {
        let len = self
            .kernel_command
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(KERNEL_PATH_LEN);
        core::str::from_utf8(&self.kernel_command[..len])
    }
}

impl fmt::Debug for CoreInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreInfo")
            .field("core_id", &self.core_id)
            .field("memory", &self.memory)
            .field("kernel", &self.kernel)
            .field("boot_image_address", &self.boot_image_address)
            .field("boot_image_size", &self.boot_image_size)
            .field("core_channel_address", &self.core_channel_address)
            .field("core_channel_size", &self.core_channel_size)
            .field("kernel_entry", &self.kernel_entry)
            .field("timer_counter", &self.timer_counter)
            .field("kernel_command", &self.kernel_command())
            .finish()
    }
}

/// What a running core knows about itself and the machine.
///
/// The master gets this from the platform; every other core derives it from
/// the [`CoreInfo`] block it was booted with (see [`SystemInformation::from_core_info`]).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SystemInformation {
    /// The core this code runs on.
    pub core_id: CoreId,

    /// Total physical memory in **bytes** visible to this core.
    pub memory_size: u64,

    /// Physical memory in **bytes** not yet claimed.
    pub memory_avail: u64,

    /// Physical location of the boot image.
    pub boot_image_address: PhysicalAddress,

    /// Size of the boot image in **bytes**.
    pub boot_image_size: u64,

    /// Timer calibration value handed to booted cores.
    pub timer_counter: u64,

    /// Base of this core's channel pages; zero on the master, which uses every other core's instead.
    pub core_channel_address: PhysicalAddress,
}

impl SystemInformation {
    /// The view of a core booted from `info`.
    #[must_use]
    pub const fn from_core_info(info: &CoreInfo) -> Self {
        let channels_end = info.core_channel_address.as_u64() + info.core_channel_size;
        Self {
            core_id: info.core_id,
            memory_size: info.memory.size(),
            memory_avail: info.memory.end().as_u64() - channels_end,
            boot_image_address: info.boot_image_address,
            boot_image_size: info.boot_image_size,
            timer_counter: info.timer_counter,
            core_channel_address: info.core_channel_address,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MIB, PAGE_SIZE};

    fn partition(start: u64, size: u64) -> PhysicalRange {
        PhysicalRange::new(PhysicalAddress::new(start), size).unwrap()
    }

    fn layout(memory: PhysicalRange, boot_image_size: u64) -> Result<CoreInfo, CoreLayoutError> {
        CoreInfo::new(
            CoreId::new(1),
            memory,
            boot_image_size,
            VirtualAddress::new(0x0010_0000),
            1234,
            "/boot/kernel",
        )
    }

    #[test]
    fn lays_out_kernel_boot_image_and_channels_back_to_back() {
        let info = layout(partition(16 * MIB, 16 * MIB - PAGE_SIZE), 0x1_2345).unwrap();

        assert_eq!(info.kernel().start().as_u64(), 16 * MIB);
        assert_eq!(info.kernel().size(), 4 * MIB);
        assert_eq!(info.boot_image_address().as_u64(), 20 * MIB);
        assert_eq!(info.boot_image_size(), 0x1_2345);
        assert_eq!(info.core_channel_address().as_u64(), 20 * MIB + 0x1_3000);
        assert_eq!(info.core_channel_size(), 4 * PAGE_SIZE);
        assert!(info.memory().contains_range(&info.kernel()));
        assert_eq!(info.kernel_command(), Ok("/boot/kernel"));
        assert_eq!(info.timer_counter(), 1234);
    }

    #[test]
    fn page_sized_boot_images_need_no_padding() {
        let info = layout(partition(8 * MIB, 8 * MIB), 2 * PAGE_SIZE).unwrap();
        assert_eq!(info.core_channel_address().as_u64(), 12 * MIB + 2 * PAGE_SIZE);
    }

    #[test]
    fn empty_boot_image_puts_channels_right_after_the_kernel() {
        let info = layout(partition(8 * MIB, 8 * MIB), 0).unwrap();
        assert_eq!(info.core_channel_address(), info.kernel().end());
    }

    #[test]
    fn too_small_partitions_are_rejected() {
        assert!(matches!(
            layout(partition(4 * MIB, 2 * MIB), 0),
            Err(CoreLayoutError::Kernel { .. })
        ));
        assert!(matches!(
            layout(partition(4 * MIB, 5 * MIB), 2 * MIB),
            Err(CoreLayoutError::BootImage { .. })
        ));
        assert!(matches!(
            layout(partition(4 * MIB, 5 * MIB), MIB - PAGE_SIZE),
            Err(CoreLayoutError::Channel { .. })
        ));
        assert!(layout(partition(4 * MIB, 5 * MIB), MIB - 4 * PAGE_SIZE).is_ok());
    }

    #[test]
    fn master_and_unaligned_partitions_are_rejected() {
        let memory = partition(16 * MIB, 16 * MIB);
        assert_eq!(
            CoreInfo::new(CoreId::MASTER, memory, 0, VirtualAddress::zero(), 0, ""),
            Err(CoreLayoutError::MasterCore(CoreId::MASTER))
        );
        assert!(matches!(
            layout(partition(16 * MIB + 1, 16 * MIB), 0),
            Err(CoreLayoutError::UnalignedPartition { .. })
        ));
    }

    #[test]
    fn kernel_command_keeps_room_for_the_terminator() {
        let memory = partition(16 * MIB, 16 * MIB);
        let longest = "k".repeat(KERNEL_PATH_LEN - 1);
        let info = CoreInfo::new(CoreId::new(2), memory, 0, VirtualAddress::zero(), 0, &longest).unwrap();
        assert_eq!(info.kernel_command(), Ok(longest.as_str()));

        let too_long = "k".repeat(KERNEL_PATH_LEN);
        assert!(matches!(
            CoreInfo::new(CoreId::new(2), memory, 0, VirtualAddress::zero(), 0, &too_long),
            Err(CoreLayoutError::CommandTooLong { len: 64, max: 63, .. })
        ));
    }

    #[test]
    fn booted_core_sees_its_own_channel_pages() {
        let info = layout(partition(32 * MIB, 16 * MIB - PAGE_SIZE), 3 * PAGE_SIZE).unwrap();
        let sys = SystemInformation::from_core_info(&info);
        assert_eq!(sys.core_id, CoreId::new(1));
        assert_eq!(sys.core_channel_address, info.core_channel_address());
        assert_eq!(sys.memory_size, 16 * MIB - PAGE_SIZE);
        assert_eq!(
            sys.memory_avail,
            info.memory().end().as_u64() - info.core_channel_address().as_u64() - 4 * PAGE_SIZE
        );
    }
}
