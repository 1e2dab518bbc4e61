//! A simulated machine for bring-up tests.
//!
//! Physical memory is one zeroed host buffer. The memory-control fake maps
//! windows onto it, the channel mapper points into it, and tests read it back,
//! so every byte the orchestrator copies and every channel message travels
//! through the same storage.

#![allow(dead_code)]

use kernel_channel::PhysMapper;
use kernel_info::cores::{CoreId, CoreInfo, SystemInformation};
use kernel_memory_addresses::{PhysicalAddress, PhysicalRange, VirtualAddress};
use kernel_smp::{
    BootSignalError, CoreDiscovery, Executable, ExecutableError, ExecutableLoader, MappedWindow, MemoryAccess,
    MemoryControl, MemoryControlError, MemoryRegion,
};
use std::collections::BTreeSet;
use std::rc::Rc;

pub const MIB: u64 = 1024 * 1024;

/// Virtual base at which the fake maps windows.
const WINDOW_BASE: u64 = 0x0000_7000_0000_0000;

/// Host-backed physical memory.
pub struct PhysicalMemory {
    base: *mut u64,
    words: usize,
}

impl PhysicalMemory {
    pub fn new(size: u64) -> Rc<Self> {
        let words = usize::try_from(size / 8).unwrap();
        let buffer = vec![0u64; words].into_boxed_slice();
        let base = Box::into_raw(buffer).cast::<u64>();
        Rc::new(Self { base, words })
    }

    pub fn size(&self) -> u64 {
        self.words as u64 * 8
    }

    pub fn ptr(&self, pa: PhysicalAddress) -> *mut u8 {
        let offset = usize::try_from(pa.as_u64()).unwrap();
        assert!(offset <= self.words * 8, "{pa} outside simulated memory");
        unsafe { self.base.cast::<u8>().add(offset) }
    }

    pub fn read(&self, pa: PhysicalAddress, len: usize) -> Vec<u8> {
        assert!(pa.as_u64() + len as u64 <= self.size());
        let mut out = vec![0u8; len];
        unsafe { std::ptr::copy_nonoverlapping(self.ptr(pa), out.as_mut_ptr(), len) };
        out
    }

    pub fn write(&self, pa: PhysicalAddress, bytes: &[u8]) {
        assert!(pa.as_u64() + bytes.len() as u64 <= self.size());
        unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.ptr(pa), bytes.len()) };
    }
}

impl Drop for PhysicalMemory {
    fn drop(&mut self) {
        let slice = std::ptr::slice_from_raw_parts_mut(self.base, self.words);
        drop(unsafe { Box::from_raw(slice) });
    }
}

/// Channel pages seen through the simulated memory.
pub struct SimMapper(pub Rc<PhysicalMemory>);

unsafe impl PhysMapper for SimMapper {
    fn phys_to_ptr(&self, pa: PhysicalAddress) -> *mut u8 {
        if pa.as_u64() >= self.0.size() {
            return std::ptr::null_mut();
        }
        self.0.ptr(pa)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Claim(PhysicalRange),
    Map(PhysicalRange),
    Copy { at: PhysicalAddress, len: usize },
    Unmap(PhysicalRange),
}

/// Memory-control fake with fault injection.
pub struct SimMemory {
    memory: Rc<PhysicalMemory>,
    pub claimed: Vec<PhysicalRange>,
    pub open: Vec<MappedWindow>,
    pub max_open: usize,
    pub ops: Vec<Op>,
    pub access: Vec<MemoryAccess>,
    /// Copies of exactly this many bytes transfer one byte less.
    pub short_copy_of: Option<usize>,
    /// Claims starting here are rejected.
    pub reject_claim_at: Option<PhysicalAddress>,
    /// Maps of ranges starting here are rejected.
    pub reject_map_at: Option<PhysicalAddress>,
    pub fail_unmap: bool,
}

impl SimMemory {
    pub fn new(memory: Rc<PhysicalMemory>) -> Self {
        Self {
            memory,
            claimed: Vec::new(),
            open: Vec::new(),
            max_open: 0,
            ops: Vec::new(),
            access: Vec::new(),
            short_copy_of: None,
            reject_claim_at: None,
            reject_map_at: None,
            fail_unmap: false,
        }
    }
}

impl MemoryControl for SimMemory {
    fn claim(&mut self, range: PhysicalRange) -> Result<(), MemoryControlError> {
        self.ops.push(Op::Claim(range));
        if range.end().as_u64() > self.memory.size() {
            return Err(MemoryControlError::OutOfRange(range));
        }
        if self.reject_claim_at == Some(range.start()) || self.claimed.iter().any(|c| c.overlaps(&range)) {
            return Err(MemoryControlError::InUse(range));
        }
        self.claimed.push(range);
        Ok(())
    }

    fn map(&mut self, range: PhysicalRange, access: MemoryAccess) -> Result<MappedWindow, MemoryControlError> {
        self.ops.push(Op::Map(range));
        self.access.push(access);
        if self.reject_map_at == Some(range.start()) {
            return Err(MemoryControlError::NoVirtualSpace(range));
        }
        let window = MappedWindow {
            virtual_address: VirtualAddress::new(WINDOW_BASE + range.start().as_u64()),
            physical: range,
        };
        self.open.push(window);
        self.max_open = self.max_open.max(self.open.len());
        Ok(window)
    }

    fn copy(&mut self, window: &MappedWindow, source: &[u8]) -> usize {
        assert!(self.open.contains(window), "copy through an unmapped window");
        let mut len = source.len().min(usize::try_from(window.size()).unwrap());
        if self.short_copy_of == Some(source.len()) {
            len -= 1;
        }
        self.ops.push(Op::Copy {
            at: window.physical.start(),
            len,
        });
        self.memory.write(window.physical.start(), &source[..len]);
        len
    }

    fn unmap(&mut self, window: MappedWindow) -> Result<(), MemoryControlError> {
        self.ops.push(Op::Unmap(window.physical));
        let Some(index) = self.open.iter().position(|w| *w == window) else {
            return Err(MemoryControlError::NotMapped(window.virtual_address));
        };
        if self.fail_unmap {
            return Err(MemoryControlError::NotMapped(window.virtual_address));
        }
        self.open.remove(index);
        Ok(())
    }
}

/// Discovery fake reporting a fixed set of cores.
pub struct SimDiscovery {
    pub cores: Vec<u32>,
    pub reject: BTreeSet<CoreId>,
    pub booted: Vec<CoreInfo>,
}

impl SimDiscovery {
    pub fn new(cores: u32) -> Self {
        Self {
            cores: (0..cores).collect(),
            reject: BTreeSet::new(),
            booted: Vec::new(),
        }
    }

    pub fn rejecting(mut self, core: u32) -> Self {
        self.reject.insert(CoreId::new(core));
        self
    }
}

impl CoreDiscovery for SimDiscovery {
    fn discover(&mut self) -> BTreeSet<CoreId> {
        self.cores.iter().copied().map(CoreId::new).collect()
    }

    fn boot(&mut self, info: &CoreInfo) -> Result<(), BootSignalError> {
        if self.reject.contains(&info.core_id()) {
            return Err(BootSignalError::Rejected);
        }
        self.booted.push(info.clone());
        Ok(())
    }
}

/// Loader serving one in-memory kernel.
pub struct SimLoader {
    pub path: &'static str,
    pub entry: VirtualAddress,
    pub regions: Vec<MemoryRegion<'static>>,
    pub malformed: bool,
}

impl SimLoader {
    /// A kernel at `/boot/kernel` with `count` regions of distinct bytes.
    pub fn with_regions(count: usize) -> Self {
        let regions = (0..count)
            .map(|i| {
                let data: Vec<u8> = (0..300).map(|b| (b as u8).wrapping_mul(7).wrapping_add(i as u8)).collect();
                MemoryRegion::new(VirtualAddress::new(i as u64 * 0x2000), Box::leak(data.into_boxed_slice()))
            })
            .collect();
        Self {
            path: "/boot/kernel",
            entry: VirtualAddress::new(0x0010_0000),
            regions,
            malformed: false,
        }
    }
}

impl ExecutableLoader for SimLoader {
    fn load(&self, path: &str) -> Result<Executable<'_>, ExecutableError> {
        if path != self.path {
            return Err(ExecutableError::NotFound);
        }
        if self.malformed {
            return Err(ExecutableError::Malformed("bad program header"));
        }
        Ok(Executable {
            entry: self.entry,
            regions: &self.regions,
        })
    }
}

/// The master's view of a machine with `memory_size` bytes.
pub fn master_info(memory_size: u64) -> SystemInformation {
    SystemInformation {
        core_id: CoreId::MASTER,
        memory_size,
        memory_avail: memory_size,
        boot_image_address: PhysicalAddress::new(0x0020_0000),
        boot_image_size: 0,
        timer_counter: 4242,
        core_channel_address: PhysicalAddress::zero(),
    }
}

/// A boot image of `size` recognisable bytes.
pub fn boot_image(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}
