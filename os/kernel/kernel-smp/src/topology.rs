//! # Channel Topology
//!
//! Both ends of a master/slave link derive the same four pages from the
//! slave's `core_channel_address`; no handshake is exchanged.
//!
//! ```text
//! core_channel_address
//! +0 P  ┌───────────────────────┐  slave → master  data      (slave writes)
//! +1 P  ├───────────────────────┤  slave → master  feedback  (master writes)
//! +2 P  ├───────────────────────┤  master → slave  data      (master writes)
//! +3 P  ├───────────────────────┤  master → slave  feedback  (slave writes)
//!       └───────────────────────┘
//! ```

use crate::error::CoreError;
use alloc::collections::BTreeMap;
use kernel_channel::{ChannelError, Consumer, CoreMessage, PhysMapper, Producer};
use kernel_info::cores::{CoreId, CoreInfo};
use kernel_info::memory::PAGE_SIZE;
use kernel_memory_addresses::PhysicalAddress;
use log::{debug, error};

/// Data and feedback page of one direction.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ChannelPages {
    pub data: PhysicalAddress,
    pub feedback: PhysicalAddress,
}

/// The four channel pages of one master/slave link.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ChannelLayout {
    base: PhysicalAddress,
}

impl ChannelLayout {
    #[must_use]
    pub const fn new(core_channel_address: PhysicalAddress) -> Self {
        Self {
            base: core_channel_address,
        }
    }

    #[must_use]
    pub const fn base(&self) -> PhysicalAddress {
        self.base
    }

    /// Pages carrying messages from the slave to the master.
    #[must_use]
    pub fn to_master(&self) -> ChannelPages {
        ChannelPages {
            data: self.base,
            feedback: self.base + PAGE_SIZE,
        }
    }

    /// Pages carrying messages from the master to the slave.
    #[must_use]
    pub fn to_slave(&self) -> ChannelPages {
        ChannelPages {
            data: self.base + 2 * PAGE_SIZE,
            feedback: self.base + 3 * PAGE_SIZE,
        }
    }
}

/// The master's ends of every link, by slave core id.
pub struct MasterChannels<'m> {
    to_slave: BTreeMap<CoreId, Producer<'m, CoreMessage>>,
    from_slave: BTreeMap<CoreId, Consumer<'m, CoreMessage>>,
}

impl<'m> MasterChannels<'m> {
    /// Attach to the links of `cores`.
    ///
    /// # Errors
    /// [`CoreError::IoError`] if a core's channel pages cannot be attached.
    pub fn build<'i, M: PhysMapper>(
        mapper: &'m M,
        cores: impl IntoIterator<Item = &'i CoreInfo>,
    ) -> Result<Self, CoreError> {
        let mut to_slave = BTreeMap::new();
        let mut from_slave = BTreeMap::new();

        for info in cores {
            let core = info.core_id();
            let layout = ChannelLayout::new(info.core_channel_address());
            let out = layout.to_slave();
            let back = layout.to_master();

            let producer = Producer::new(mapper, out.data, out.feedback).map_err(|e| attach_failed(core, e))?;
            let consumer = Consumer::new(mapper, back.data, back.feedback).map_err(|e| attach_failed(core, e))?;
            debug!("{core}: channels at {}", layout.base());

            to_slave.insert(core, producer);
            from_slave.insert(core, consumer);
        }

        Ok(Self { to_slave, from_slave })
    }

    #[must_use]
    pub fn to_slave(&mut self, core: CoreId) -> Option<&mut Producer<'m, CoreMessage>> {
        self.to_slave.get_mut(&core)
    }

    #[must_use]
    pub fn from_slave(&mut self, core: CoreId) -> Option<&mut Consumer<'m, CoreMessage>> {
        self.from_slave.get_mut(&core)
    }

    /// Slave cores with a link, in ascending id order.
    pub fn cores(&self) -> impl Iterator<Item = CoreId> + '_ {
        self.to_slave.keys().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.to_slave.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_slave.is_empty()
    }
}

/// A slave's ends of its link to the master.
pub struct SlaveChannels<'m> {
    core: CoreId,
    to_master: Producer<'m, CoreMessage>,
    from_master: Consumer<'m, CoreMessage>,
}

impl<'m> SlaveChannels<'m> {
    /// Attach to the link whose pages start at `core_channel_address`.
    ///
    /// # Errors
    /// [`CoreError::IoError`] if the channel pages cannot be attached.
    pub fn build<M: PhysMapper>(
        mapper: &'m M,
        core: CoreId,
        core_channel_address: PhysicalAddress,
    ) -> Result<Self, CoreError> {
        let layout = ChannelLayout::new(core_channel_address);
        let out = layout.to_master();
        let back = layout.to_slave();

        let to_master = Producer::new(mapper, out.data, out.feedback).map_err(|e| attach_failed(core, e))?;
        let from_master = Consumer::new(mapper, back.data, back.feedback).map_err(|e| attach_failed(core, e))?;
        debug!("{core}: channels to master at {core_channel_address}");

        Ok(Self {
            core,
            to_master,
            from_master,
        })
    }

    #[must_use]
    pub const fn core(&self) -> CoreId {
        self.core
    }

    pub const fn to_master(&mut self) -> &mut Producer<'m, CoreMessage> {
        &mut self.to_master
    }

    pub const fn from_master(&mut self) -> &mut Consumer<'m, CoreMessage> {
        &mut self.from_master
    }
}

/// The channels of the running core, by role.
pub enum Topology<'m> {
    Master(MasterChannels<'m>),
    Slave(SlaveChannels<'m>),
}

fn attach_failed(core: CoreId, source: ChannelError) -> CoreError {
    error!("{core}: cannot attach channel: {source}");
    CoreError::IoError {
        core,
        source: Some(source),
    }
}
