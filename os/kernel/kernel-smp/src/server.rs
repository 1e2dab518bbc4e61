//! # Core Server
//!
//! One instance runs on every core. On the master it loads the kernel,
//! boots the other cores, and attaches to all of their channels; on every
//! other core it only attaches to the channels shared with the master.

use crate::config::ConfigError;
use crate::discovery::CoreDiscovery;
use crate::error::CoreError;
use crate::executable::ExecutableLoader;
use crate::memory::MemoryControl;
use crate::orchestrator::{BootReport, Orchestrator};
use crate::partition::Partitioner;
use crate::probe;
use crate::topology::{MasterChannels, SlaveChannels, Topology};
use kernel_channel::PhysMapper;
use kernel_info::cores::{CoreId, SystemInformation};
use log::{error, info};

/// The master-only part of bring-up.
pub trait Bootstrap {
    /// # Errors
    /// If the kernel cannot be loaded.
    fn load_kernel(&mut self) -> Result<(), CoreError>;

    /// Boot every other core.
    ///
    /// # Errors
    /// If bring-up as a whole fails.
    fn discover(&mut self) -> Result<BootReport, CoreError>;
}

impl<L, M, D, P> Bootstrap for Orchestrator<'_, L, M, D, P>
where
    L: ExecutableLoader,
    M: MemoryControl,
    D: CoreDiscovery,
    P: Partitioner,
{
    fn load_kernel(&mut self) -> Result<(), CoreError> {
        Self::load_kernel(self).map(|_| ())
    }

    fn discover(&mut self) -> Result<BootReport, CoreError> {
        Self::discover(self)
    }
}

/// Bootstrap of a core that never boots others.
#[derive(Debug)]
pub enum NoBootstrap {}

impl Bootstrap for NoBootstrap {
    fn load_kernel(&mut self) -> Result<(), CoreError> {
        match *self {}
    }

    fn discover(&mut self) -> Result<BootReport, CoreError> {
        match *self {}
    }
}

/// Server of a non-master core.
pub type SlaveServer<'m, P> = CoreServer<'m, P, NoBootstrap>;

pub struct CoreServer<'m, P, B> {
    system: SystemInformation,
    mapper: &'m P,
    bootstrap: Option<B>,
    report: Option<BootReport>,
    topology: Option<Topology<'m>>,
}

impl<'m, P: PhysMapper> CoreServer<'m, P, NoBootstrap> {
    /// Server of the non-master core described by `system`.
    pub const fn slave(system: SystemInformation, mapper: &'m P) -> Self {
        Self {
            system,
            mapper,
            bootstrap: None,
            report: None,
            topology: None,
        }
    }
}

impl<'m, P: PhysMapper, B: Bootstrap> CoreServer<'m, P, B> {
    /// Server of the master core, booting others through `bootstrap`.
    pub const fn master(system: SystemInformation, mapper: &'m P, bootstrap: B) -> Self {
        Self {
            system,
            mapper,
            bootstrap: Some(bootstrap),
            report: None,
            topology: None,
        }
    }

    #[must_use]
    pub const fn core(&self) -> CoreId {
        self.system.core_id
    }

    /// Outcome of the boot pass, on the master after [`CoreServer::initialize`].
    #[must_use]
    pub const fn report(&self) -> Option<&BootReport> {
        self.report.as_ref()
    }

    #[must_use]
    pub const fn bootstrap(&self) -> Option<&B> {
        self.bootstrap.as_ref()
    }

    pub const fn topology(&mut self) -> Option<&mut Topology<'m>> {
        self.topology.as_mut()
    }

    /// Bring the core up.
    ///
    /// A non-master core attaches to its channels. The master loads the
    /// kernel, boots every other core, then attaches to the channels of the
    /// cores that were started.
    ///
    /// If discovery fails (as it does under [`BootPolicy::Abort`](crate::BootPolicy::Abort)),
    /// neither a report nor a topology is kept; the per-core states remain
    /// readable through [`CoreServer::bootstrap`].
    ///
    /// # Errors
    /// [`CoreError::Config`] if the master has no bootstrap; otherwise any
    /// error of kernel loading, discovery, or channel setup.
    pub fn initialize(&mut self) -> Result<(), CoreError> {
        let core = self.core();
        if !core.is_master() {
            let channels = SlaveChannels::build(self.mapper, core, self.system.core_channel_address)?;
            self.topology = Some(Topology::Slave(channels));
            return Ok(());
        }

        let Some(bootstrap) = self.bootstrap.as_mut() else {
            error!("{core}: no bootstrap configured");
            return Err(ConfigError::MissingBootstrap.into());
        };

        bootstrap.load_kernel()?;
        let report = bootstrap.discover()?;
        let channels = MasterChannels::build(self.mapper, report.running())?;
        info!(
            "{core}: {} of {} cores running",
            channels.len() + 1,
            report.cores_found()
        );

        self.topology = Some(Topology::Master(channels));
        self.report = Some(report);
        Ok(())
    }

    /// Exchange one ping per link.
    ///
    /// A slave sends a ping to the master. The master reads one message from
    /// every discovered core and blocks until each has sent one.
    ///
    /// # Errors
    /// [`CoreError::IoError`] if a discovered core has no channel or a channel
    /// fails.
    pub fn test(&mut self) -> Result<(), CoreError> {
        let core = self.core();
        match self.topology.as_mut() {
            Some(Topology::Slave(channels)) => probe::send_ping(channels),
            Some(Topology::Master(channels)) => {
                let cores = self.report.iter().flat_map(|report| report.cores());
                probe::await_pings(channels, cores).map(|_| ())
            }
            None => {
                error!("{core}: channels are not set up");
                Err(CoreError::IoError { core, source: None })
            }
        }
    }
}
