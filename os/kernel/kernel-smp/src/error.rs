//! # Core Server Errors

use crate::config::{ConfigError, KernelPath};
use crate::discovery::BootSignalError;
use crate::executable::{ExecutableError, KernelImageError};
use crate::memory::MemoryControlError;
use crate::partition::PartitionError;
use core::fmt;
use kernel_channel::ChannelError;
use kernel_info::cores::{CoreId, CoreLayoutError};

/// The result code of a failed operation, without payload.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CoreErrorKind {
    NotFound,
    ExecError,
    OutOfMemory,
    MemoryError,
    BootError,
    IoError,
    Layout,
    Config,
}

/// Which part of a core's partition an operation was working on.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Stage {
    /// The whole partition.
    Claim,
    /// A kernel region, by index.
    Region(usize),
    BootImage,
    Channels,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Claim => f.write_str("partition"),
            Self::Region(index) => write!(f, "kernel region {index}"),
            Self::BootImage => f.write_str("boot image"),
            Self::Channels => f.write_str("channel pages"),
        }
    }
}

/// Why bytes did not arrive in a mapped window.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    #[error("copied {copied} of {expected} bytes")]
    ShortCopy { expected: usize, copied: usize },
    #[error("failed to unmap the window")]
    Unmap(#[source] MemoryControlError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("kernel not found: {path}")]
    NotFound {
        path: KernelPath,
        #[source]
        source: ExecutableError,
    },
    #[error("kernel not usable: {path}")]
    ExecError {
        path: KernelPath,
        #[source]
        source: KernelImageError,
    },
    #[error("{core}: failed to reserve or map the {stage}")]
    OutOfMemory {
        core: CoreId,
        stage: Stage,
        #[source]
        source: MemoryControlError,
    },
    #[error("{core}: failed to transfer the {stage}")]
    MemoryError {
        core: CoreId,
        stage: Stage,
        #[source]
        source: TransferError,
    },
    #[error("{core}: failed to boot")]
    BootError {
        core: CoreId,
        #[source]
        source: BootSignalError,
    },
    #[error("{core}: channel unavailable")]
    IoError {
        core: CoreId,
        #[source]
        source: Option<ChannelError>,
    },
    #[error("{core}: partition cannot hold the kernel, boot image, and channels")]
    Layout {
        core: CoreId,
        #[source]
        source: CoreLayoutError,
    },
    #[error("cannot partition physical memory")]
    Partition(#[source] PartitionError),
    #[error("invalid configuration")]
    Config(#[from] ConfigError),
}

impl CoreError {
    #[must_use]
    pub const fn kind(&self) -> CoreErrorKind {
        match self {
            Self::NotFound { .. } => CoreErrorKind::NotFound,
            Self::ExecError { .. } => CoreErrorKind::ExecError,
            Self::OutOfMemory { .. } => CoreErrorKind::OutOfMemory,
            Self::MemoryError { .. } => CoreErrorKind::MemoryError,
            Self::BootError { .. } => CoreErrorKind::BootError,
            Self::IoError { .. } => CoreErrorKind::IoError,
            Self::Layout { .. } | Self::Partition(_) => CoreErrorKind::Layout,
            Self::Config(_) => CoreErrorKind::Config,
        }
    }

    /// The core the failure concerns, if it concerns one.
    #[must_use]
    pub const fn core(&self) -> Option<CoreId> {
        match self {
            Self::OutOfMemory { core, .. }
            | Self::MemoryError { core, .. }
            | Self::BootError { core, .. }
            | Self::IoError { core, .. }
            | Self::Layout { core, .. } => Some(*core),
            Self::NotFound { .. } | Self::ExecError { .. } | Self::Partition(_) | Self::Config(_) => None,
        }
    }
}
