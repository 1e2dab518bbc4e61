//! # Multiprocessor Bring-up
//!
//! The master core discovers the other cores, gives each an equal slice of
//! physical memory, copies the kernel and boot image into that slice, and
//! starts the core. Afterwards every core talks to the master through two
//! shared-memory channels whose pages both sides derive from the same
//! [`CoreInfo`](kernel_info::cores::CoreInfo).
//!
//! ```text
//!            ┌──────────────────────────── CoreServer ───────────────────────────┐
//!            │                                                                   │
//!  master:   │ load_kernel ──► discover ──► boot_core (per core) ──► channels ──► test
//!  others:   │                                                      channels ──► test
//!            └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Components
//!
//! * [`Orchestrator`]: kernel loading, partitioning, and the per-core
//!   claim → map → copy → unmap → signal sequence ([`orchestrator`])
//! * [`MasterChannels`] / [`SlaveChannels`]: the channel topology ([`topology`])
//! * [`probe`]: a one-ping-per-link self-test
//! * [`CoreServer`]: sequences the above for the core it runs on ([`server`])
//!
//! ## Platform Seams
//!
//! Everything that touches hardware or other subsystems is a trait:
//! [`ExecutableLoader`], [`MemoryControl`], [`CoreDiscovery`], [`Partitioner`],
//! and [`PhysMapper`](kernel_channel::PhysMapper) for channel pages.
//!
//! ## Errors and Logging
//!
//! Fallible operations return [`CoreError`]; [`CoreError::kind`] gives the plain
//! result code. Each failure is logged once through the [`log`] facade with the
//! operation and the core it concerns.

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

pub mod config;
pub mod discovery;
pub mod error;
pub mod executable;
pub mod memory;
pub mod orchestrator;
pub mod partition;
pub mod probe;
pub mod server;
pub mod topology;

pub use crate::config::{BootPolicy, ConfigError, CoreServerConfig, KernelPath};
pub use crate::discovery::{BootSignalError, CoreDiscovery};
pub use crate::error::{CoreError, CoreErrorKind, Stage, TransferError};
pub use crate::executable::{Executable, ExecutableError, ExecutableLoader, KernelImage, KernelImageError, MemoryRegion};
pub use crate::memory::{MappedWindow, MemoryAccess, MemoryControl, MemoryControlError};
pub use crate::orchestrator::{BootReport, CoreBootState, CoreOutcome, Orchestrator};
pub use crate::partition::{EvenPartition, PartitionError, PartitionPolicy, Partitioner};
pub use crate::server::{Bootstrap, CoreServer, NoBootstrap, SlaveServer};
pub use crate::topology::{ChannelLayout, ChannelPages, MasterChannels, SlaveChannels, Topology};
