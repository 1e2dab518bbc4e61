//! # Core Discovery and Boot Signal

use alloc::collections::BTreeSet;
use kernel_info::cores::{CoreId, CoreInfo};

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BootSignalError {
    #[error("core did not accept the startup signal")]
    Rejected,
    #[error("core did not report in after the startup signal")]
    NoResponse,
    #[error("core was already handled in this boot pass")]
    AlreadyAttempted,
}

/// Enumerates the physical cores and starts them.
pub trait CoreDiscovery {
    /// Every physical core, the master included.
    fn discover(&mut self) -> BTreeSet<CoreId>;

    /// Hand `info` to its core and start it at `info.kernel_entry()`.
    ///
    /// # Errors
    /// If the core cannot be started.
    fn boot(&mut self, info: &CoreInfo) -> Result<(), BootSignalError>;
}
