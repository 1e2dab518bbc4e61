//! # Core Server Configuration

use crate::partition::PartitionPolicy;
use kernel_info::memory::KERNEL_PATH_LEN;

/// Longest kernel path; one byte of [`KERNEL_PATH_LEN`] is kept for the terminator.
pub const KERNEL_PATH_MAX: usize = KERNEL_PATH_LEN - 1;

/// Kernel path as stored in the configuration.
pub type KernelPath = heapless::String<KERNEL_PATH_MAX>;

/// Kernel loaded on every core unless configured otherwise.
pub const DEFAULT_KERNEL_PATH: &str = "/boot/kernel";

const _: () = assert!(DEFAULT_KERNEL_PATH.len() <= KERNEL_PATH_MAX);

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("kernel path is empty")]
    EmptyKernelPath,
    #[error("kernel path of {len} bytes exceeds {max} bytes")]
    KernelPathTooLong { len: usize, max: usize },
    #[error("the master core needs a bootstrap to start other cores")]
    MissingBootstrap,
}

/// What the master does when one core fails to boot.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum BootPolicy {
    /// Log the failure and go on with the next core.
    #[default]
    Continue,
    /// Stop at the first failed core and report its error.
    ///
    /// Cores signaled before the failure keep running, but no boot report is
    /// returned and the master attaches to none of their channels.
    Abort,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreServerConfig {
    kernel_path: KernelPath,
    boot_policy: BootPolicy,
    partition: PartitionPolicy,
}

impl Default for CoreServerConfig {
    fn default() -> Self {
        Self {
            kernel_path: kernel_path(DEFAULT_KERNEL_PATH).unwrap_or_default(),
            boot_policy: BootPolicy::default(),
            partition: PartitionPolicy::default(),
        }
    }
}

impl CoreServerConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `path` instead of [`DEFAULT_KERNEL_PATH`].
    ///
    /// # Errors
    /// If `path` is empty or longer than [`KERNEL_PATH_MAX`] bytes.
    pub fn with_kernel_path(mut self, path: &str) -> Result<Self, ConfigError> {
        self.kernel_path = kernel_path(path)?;
        Ok(self)
    }

    #[must_use]
    pub fn with_boot_policy(mut self, policy: BootPolicy) -> Self {
        self.boot_policy = policy;
        self
    }

    #[must_use]
    pub fn with_partition(mut self, policy: PartitionPolicy) -> Self {
        self.partition = policy;
        self
    }

    #[inline]
    #[must_use]
    pub const fn kernel_path(&self) -> &KernelPath {
        &self.kernel_path
    }

    #[inline]
    #[must_use]
    pub const fn boot_policy(&self) -> BootPolicy {
        self.boot_policy
    }

    #[inline]
    #[must_use]
    pub const fn partition(&self) -> PartitionPolicy {
        self.partition
    }
}

fn kernel_path(path: &str) -> Result<KernelPath, ConfigError> {
    if path.is_empty() {
        return Err(ConfigError::EmptyKernelPath);
    }
    let mut out = KernelPath::new();
    out.push_str(path).map_err(|()| ConfigError::KernelPathTooLong {
        len: path.len(),
        max: KERNEL_PATH_MAX,
    })?;
    Ok(out)
}
