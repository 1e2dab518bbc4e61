//! # Bootstrap Orchestrator
//!
//! Runs on the master core. Loads the kernel once, then for every other core
//! lays out its partition, fills it, and starts the core:
//!
//! ```text
//!  Unclaimed ──claim──► MemoryClaimed ──copy region i──► RegionsCopied(i+1) ─┐
//!                                      ▲                                      │
//!                                      └──────────────── next region ◄────────┘
//!  RegionsCopied(n) ──copy boot image, clear channels──► BootImageCopied ──signal──► Signaled
//! ```
//!
//! A failure leaves the core in the state it reached. Claimed memory is not
//! returned to the pool, and nothing is retried.
//!
//! Every copy goes through exactly one mapped window, which is unmapped
//! before the next one is opened.

use crate::config::{BootPolicy, CoreServerConfig};
use crate::discovery::{BootSignalError, CoreDiscovery};
use crate::error::{CoreError, Stage, TransferError};
use crate::executable::{ExecutableError, ExecutableLoader, KernelImage, KernelImageError};
use crate::memory::{MemoryAccess, MemoryControl};
use crate::partition::{PartitionError, PartitionPolicy, Partitioner};
use alloc::collections::{BTreeMap, BTreeSet};
use kernel_info::cores::{CoreId, CoreInfo, CoreLayoutError, SystemInformation};
use kernel_info::memory::{CORE_CHANNEL_SIZE, MIB};
use kernel_memory_addresses::{PhysicalAddress, PhysicalRange};
use log::{debug, error, info, warn};

#[allow(clippy::cast_possible_truncation)]
const CHANNEL_BYTES: usize = CORE_CHANNEL_SIZE as usize;

/// Source for clearing a core's channel pages.
static ZEROED_CHANNELS: [u8; CHANNEL_BYTES] = [0; CHANNEL_BYTES];

/// How far the boot sequence of one core got.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum CoreBootState {
    #[default]
    Unclaimed,
    MemoryClaimed,
    /// This many kernel regions are in place.
    RegionsCopied(usize),
    BootImageCopied,
    Signaled,
}

/// Result of one core's boot attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreOutcome {
    /// Furthest state reached.
    pub state: CoreBootState,
    /// Descriptor handed to the core, if its layout was valid.
    pub info: Option<CoreInfo>,
    pub error: Option<CoreError>,
}

impl CoreOutcome {
    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self.state, CoreBootState::Signaled)
    }
}

/// What [`Orchestrator::discover`] did, per non-master core.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootReport {
    cores_found: usize,
    partition_size: u64,
    outcomes: BTreeMap<CoreId, CoreOutcome>,
}

impl BootReport {
    /// Cores discovered, the master included.
    #[must_use]
    pub const fn cores_found(&self) -> usize {
        self.cores_found
    }

    /// Bytes per core partition, the separator page included.
    #[must_use]
    pub const fn partition_size(&self) -> u64 {
        self.partition_size
    }

    #[must_use]
    pub fn outcome(&self, core: CoreId) -> Option<&CoreOutcome> {
        self.outcomes.get(&core)
    }

    /// Every non-master core in ascending id order.
    pub fn cores(&self) -> impl Iterator<Item = CoreId> + '_ {
        self.outcomes.keys().copied()
    }

    /// Descriptors of the cores that were started.
    pub fn running(&self) -> impl Iterator<Item = &CoreInfo> {
        self.outcomes
            .values()
            .filter(|outcome| outcome.is_running())
            .filter_map(|outcome| outcome.info.as_ref())
    }

    /// Cores that did not reach [`CoreBootState::Signaled`].
    pub fn failed(&self) -> impl Iterator<Item = (CoreId, &CoreOutcome)> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| !outcome.is_running())
            .map(|(core, outcome)| (*core, outcome))
    }
}

/// Drives kernel loading, partitioning, and core start-up on the master.
pub struct Orchestrator<'k, L, M, D, P = PartitionPolicy> {
    config: CoreServerConfig,
    system: SystemInformation,
    boot_image: &'k [u8],
    loader: &'k L,
    memory: M,
    discovery: D,
    partitioner: P,
    kernel: Option<KernelImage<'k>>,
    cores: BTreeSet<CoreId>,
    core_info: BTreeMap<CoreId, CoreInfo>,
    states: BTreeMap<CoreId, CoreBootState>,
}

impl<'k, L, M, D> Orchestrator<'k, L, M, D>
where
    L: ExecutableLoader,
    M: MemoryControl,
    D: CoreDiscovery,
{
    /// An orchestrator partitioning memory per `config`.
    ///
    /// `system` describes the master and the machine; `boot_image` is the
    /// payload copied after the kernel of every core.
    pub fn new(
        config: CoreServerConfig,
        system: SystemInformation,
        boot_image: &'k [u8],
        loader: &'k L,
        memory: M,
        discovery: D,
    ) -> Self {
        let partitioner = config.partition();
        Self {
            config,
            system,
            boot_image,
            loader,
            memory,
            discovery,
            partitioner,
            kernel: None,
            cores: BTreeSet::new(),
            core_info: BTreeMap::new(),
            states: BTreeMap::new(),
        }
    }
}

impl<'k, L, M, D, P> Orchestrator<'k, L, M, D, P>
where
    L: ExecutableLoader,
    M: MemoryControl,
    D: CoreDiscovery,
    P: Partitioner,
{
    /// Replace the configured partitioning policy.
    pub fn with_partitioner<Q: Partitioner>(self, partitioner: Q) -> Orchestrator<'k, L, M, D, Q> {
        Orchestrator {
            config: self.config,
            system: self.system,
            boot_image: self.boot_image,
            loader: self.loader,
            memory: self.memory,
            discovery: self.discovery,
            partitioner,
            kernel: self.kernel,
            cores: self.cores,
            core_info: self.core_info,
            states: self.states,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &CoreServerConfig {
        &self.config
    }

    #[must_use]
    pub const fn kernel(&self) -> Option<&KernelImage<'k>> {
        self.kernel.as_ref()
    }

    /// Cores found by the last [`Orchestrator::discover`], the master included.
    #[must_use]
    pub const fn cores(&self) -> &BTreeSet<CoreId> {
        &self.cores
    }

    #[must_use]
    pub fn core_info(&self, core: CoreId) -> Option<&CoreInfo> {
        self.core_info.get(&core)
    }

    #[must_use]
    pub fn state(&self, core: CoreId) -> CoreBootState {
        self.states.get(&core).copied().unwrap_or_default()
    }

    #[must_use]
    pub const fn memory(&self) -> &M {
        &self.memory
    }

    #[must_use]
    pub const fn discovery(&self) -> &D {
        &self.discovery
    }

    /// Resolve the configured kernel and keep its regions for every core.
    ///
    /// # Errors
    /// [`CoreError::NotFound`] if the image cannot be opened,
    /// [`CoreError::ExecError`] if it is malformed, has more than
    /// [`MAX_KERNEL_REGIONS`](kernel_info::memory::MAX_KERNEL_REGIONS)
    /// regions, or a region leaves the kernel window.
    pub fn load_kernel(&mut self) -> Result<&KernelImage<'k>, CoreError> {
        let loader: &'k L = self.loader;
        let path = self.config.kernel_path();
        debug!("Opening : {path}");

        let executable = loader.load(path).map_err(|source| match source {
            ExecutableError::NotFound => {
                error!("kernel not found: {path}: {source}");
                CoreError::NotFound {
                    path: path.clone(),
                    source,
                }
            }
            ExecutableError::Malformed(_) => {
                error!("kernel not usable: {path}: {source}");
                CoreError::ExecError {
                    path: path.clone(),
                    source: source.into(),
                }
            }
        })?;

        debug!("Reading : {path}");
        let image = KernelImage::new(executable).map_err(|source| {
            error!("kernel not usable: {path}: {source}");
            CoreError::ExecError {
                path: path.clone(),
                source,
            }
        })?;

        debug!(
            "kernel loaded: entry {} with {} regions",
            image.entry(),
            image.regions().len()
        );
        Ok(self.kernel.insert(image))
    }

    /// Partition memory across all cores and boot every non-master core.
    ///
    /// Cores are handled one at a time in ascending id order. With
    /// [`BootPolicy::Continue`] a failed core is logged and skipped; with
    /// [`BootPolicy::Abort`] its error is returned and later cores are left
    /// untouched.
    ///
    /// # Errors
    /// [`CoreError::ExecError`] if no kernel is loaded,
    /// [`CoreError::Partition`] if the master is not among the discovered
    /// cores or memory cannot be split, or the first
    /// per-core failure under [`BootPolicy::Abort`].
    pub fn discover(&mut self) -> Result<BootReport, CoreError> {
        if self.kernel.is_none() {
            error!("cannot discover cores before the kernel is loaded");
            return Err(not_loaded(&self.config));
        }

        self.cores = self.discovery.discover();
        if !self.cores.contains(&CoreId::MASTER) {
            // Slot 0 is the master's partition; without it every slot shifts down by one.
            error!("{} not among the {} discovered cores", CoreId::MASTER, self.cores.len());
            return Err(CoreError::Partition(PartitionError::MasterMissing));
        }
        let count = self.cores.len();
        let partition_size = self
            .partitioner
            .partition_size(count, self.system.memory_size)
            .map_err(|source| {
                error!("cannot partition {} MiB across {count} cores: {source}", self.system.memory_size / MIB);
                CoreError::Partition(source)
            })?;
        info!("found {count} cores -- {} MiB per core", partition_size / MIB);

        let mut report = BootReport {
            cores_found: count,
            partition_size,
            outcomes: BTreeMap::new(),
        };

        let cores: alloc::vec::Vec<CoreId> = self.cores.iter().copied().collect();
        for (slot, core) in cores.into_iter().enumerate() {
            if core.is_master() {
                continue;
            }

            let result = self.prepare(slot, core, count).and_then(|info| self.boot_core(&info));
            let outcome = CoreOutcome {
                state: self.state(core),
                info: self.core_info.get(&core).cloned(),
                error: result.as_ref().err().cloned(),
            };
            report.outcomes.insert(core, outcome);

            if let Err(err) = result {
                match self.config.boot_policy() {
                    BootPolicy::Continue => warn!("{core} not started ({err}), continuing with the remaining cores"),
                    BootPolicy::Abort => {
                        warn!("{core} not started, aborting bring-up");
                        return Err(err);
                    }
                }
            }
        }

        Ok(report)
    }

    /// Lay out the partition of the core in `slot`.
    fn prepare(&mut self, slot: usize, core: CoreId, count: usize) -> Result<CoreInfo, CoreError> {
        let Some(kernel) = self.kernel.as_ref() else {
            return Err(not_loaded(&self.config));
        };

        let memory = self
            .partitioner
            .partition(slot, count, self.system.memory_size)
            .map_err(|source| {
                error!("{core}: no partition: {source}");
                CoreError::Partition(source)
            })?;

        let info = CoreInfo::new(
            core,
            memory,
            self.boot_image.len() as u64,
            kernel.entry(),
            self.system.timer_counter,
            self.config.kernel_path(),
        )
        .map_err(|source| {
            error!("{core}: invalid layout: {source}");
            CoreError::Layout { core, source }
        })?;

        self.core_info.insert(core, info.clone());
        Ok(info)
    }

    /// Fill the partition described by `info` and start its core.
    ///
    /// # Errors
    /// - [`CoreError::ExecError`] if no kernel is loaded
    /// - [`CoreError::OutOfMemory`] if the partition cannot be claimed or a window cannot be mapped
    /// - [`CoreError::MemoryError`] on a short copy or a failed unmap
    /// - [`CoreError::BootError`] if the core rejects the start signal or was already handled
    pub fn boot_core(&mut self, info: &CoreInfo) -> Result<(), CoreError> {
        let core = info.core_id();
        let boot_image = self.boot_image;
        let available = self.system.memory_avail;
        let Self {
            config,
            memory,
            discovery,
            kernel,
            states,
            ..
        } = self;

        let Some(kernel) = kernel.as_ref() else {
            error!("{core}: no kernel loaded");
            return Err(not_loaded(config));
        };

        let state = states.entry(core).or_default();
        if *state != CoreBootState::Unclaimed {
            error!("{core}: already handled ({state:?})");
            return Err(CoreError::BootError {
                core,
                source: BootSignalError::AlreadyAttempted,
            });
        }

        debug!(
            "Reserving: {} size={:#x} available={:#x}",
            info.memory().start(),
            info.memory().size(),
            available
        );
        memory.claim(info.memory()).map_err(|source| {
            error!("failed to reserve memory for {core} at {}: {source}", info.memory().start());
            CoreError::OutOfMemory {
                core,
                stage: Stage::Claim,
                source,
            }
        })?;
        *state = CoreBootState::MemoryClaimed;

        debug!("Starting {core} with {} MiB", info.memory().size() / MIB);

        for (index, region) in kernel.regions().iter().enumerate() {
            let stage = Stage::Region(index);
            if region.size() > 0 {
                let destination = info
                    .kernel()
                    .sub_range(region.virtual_address.as_u64(), region.size())
                    .map_err(|source| {
                        error!("{core}: {stage} does not fit the kernel window");
                        CoreError::Layout {
                            core,
                            source: CoreLayoutError::Kernel { core, source },
                        }
                    })?;
                transfer(memory, core, stage, destination, region.data)?;
            }
            debug!("{}[{index}] = {}", config.kernel_path(), region.virtual_address);
            *state = CoreBootState::RegionsCopied(index + 1);
        }

        if !boot_image.is_empty() {
            let destination = layout_range(core, info.boot_image_address(), info.boot_image_size(), Stage::BootImage)?;
            transfer(memory, core, Stage::BootImage, destination, boot_image)?;
        }
        *state = CoreBootState::BootImageCopied;

        let channels = layout_range(core, info.core_channel_address(), info.core_channel_size(), Stage::Channels)?;
        transfer(memory, core, Stage::Channels, channels, &ZEROED_CHANNELS)?;

        discovery.boot(info).map_err(|source| {
            error!("failed to boot {core}: {source}");
            CoreError::BootError { core, source }
        })?;
        *state = CoreBootState::Signaled;
        info!("{core} started");
        Ok(())
    }
}

fn not_loaded(config: &CoreServerConfig) -> CoreError {
    CoreError::ExecError {
        path: config.kernel_path().clone(),
        source: KernelImageError::NotLoaded,
    }
}

fn layout_range(
    core: CoreId,
    start: PhysicalAddress,
    size: u64,
    stage: Stage,
) -> Result<PhysicalRange, CoreError> {
    PhysicalRange::new(start, size).map_err(|source| {
        error!("{core}: invalid {stage} range: {source}");
        let source = match stage {
            Stage::Channels => CoreLayoutError::Channel { core, source },
            _ => CoreLayoutError::BootImage { core, source },
        };
        CoreError::Layout { core, source }
    })
}

/// Map `destination`, copy `source` into it, unmap.
fn transfer<M: MemoryControl>(
    memory: &mut M,
    core: CoreId,
    stage: Stage,
    destination: PhysicalRange,
    source: &[u8],
) -> Result<(), CoreError> {
    let window = memory
        .map(destination, MemoryAccess::READ_WRITE_USER)
        .map_err(|source| {
            error!("{core}: failed to map {stage} at {}: {source}", destination.start());
            CoreError::OutOfMemory { core, stage, source }
        })?;
    debug!("{core}: mapped {stage} {} at {}", window.physical, window.virtual_address);

    let copied = memory.copy(&window, source);
    if copied != source.len() {
        error!("{core}: copied {copied} of {} bytes of the {stage}", source.len());
        if let Err(err) = memory.unmap(window) {
            error!("{core}: failed to unmap {stage} after a short copy: {err}");
        }
        return Err(CoreError::MemoryError {
            core,
            stage,
            source: TransferError::ShortCopy {
                expected: source.len(),
                copied,
            },
        });
    }

    memory.unmap(window).map_err(|source| {
        error!("{core}: failed to unmap {stage} at {}: {source}", window.virtual_address);
        CoreError::MemoryError {
            core,
            stage,
            source: TransferError::Unmap(source),
        }
    })
}
