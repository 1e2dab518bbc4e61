//! # Channel Messages

use core::fmt;
use kernel_info::cores::CoreId;
use kernel_memory_addresses::VirtualAddress;

/// Fixed-size records that can travel through a channel ring.
///
/// Messages are copied byte for byte into shared memory and read back by the
/// peer core, which shares our architecture, so no conversion happens.
///
/// # Safety
/// Implementors must be `#[repr(C)]`, free of padding, pointers, and
/// references, and valid for every bit pattern.
pub unsafe trait Message: Copy + 'static {}

/// Actions understood by the core server.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum CoreAction {
    /// Connectivity check, answered by logging receipt.
    Ping = 1,
}

impl TryFrom<u32> for CoreAction {
    type Error = UnknownAction;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Ping),
            other => Err(UnknownAction(other)),
        }
    }
}

/// A raw action code with no [`CoreAction`] counterpart.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
#[error("unknown core action {0}")]
pub struct UnknownAction(pub u32);

/// Control record exchanged between core servers.
///
/// Layout: `{ action: u32, core_id: u32, path: u64 }`, 16 bytes, native endian.
/// The action is kept raw so that any bit pattern read from shared memory is a
/// valid value; decode it with [`CoreMessage::action`].
#[repr(C)]
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct CoreMessage {
    action: u32,
    core_id: CoreId,
    path: VirtualAddress,
}

const _: () = assert!(size_of::<CoreMessage>() == CoreMessage::WIRE_SIZE);

// SAFETY: repr(C), three integer fields without padding.
unsafe impl Message for CoreMessage {}

impl CoreMessage {
    /// Bytes occupied by one record in a channel slot.
    pub const WIRE_SIZE: usize = 16;

    #[must_use]
    pub const fn new(action: CoreAction, core_id: CoreId, path: VirtualAddress) -> Self {
        Self {
            action: action as u32,
            core_id,
            path,
        }
    }

    /// A [`CoreAction::Ping`] sent by `core_id`.
    #[must_use]
    pub const fn ping(core_id: CoreId) -> Self {
        Self::new(CoreAction::Ping, core_id, VirtualAddress::zero())
    }

    /// # Errors
    /// If the raw action code is not a known [`CoreAction`].
    pub fn action(&self) -> Result<CoreAction, UnknownAction> {
        CoreAction::try_from(self.action)
    }

    #[must_use]
    pub const fn core_id(&self) -> CoreId {
        self.core_id
    }

    /// Address of a path string in the sender's address space, if the action carries one.
    #[must_use]
    pub const fn path(&self) -> VirtualAddress {
        self.path
    }

    /// The record exactly as it sits in a channel slot.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::WIRE_SIZE] {
        let mut out = [0u8; Self::WIRE_SIZE];
        out[0..4].copy_from_slice(&self.action.to_ne_bytes());
        out[4..8].copy_from_slice(&self.core_id.as_u32().to_ne_bytes());
        out[8..16].copy_from_slice(&self.path.as_u64().to_ne_bytes());
        out
    }
}

impl fmt::Debug for CoreMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreMessage")
            .field("action", &self.action())
            .field("core_id", &self.core_id)
            .field("path", &self.path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_carries_the_sender() {
        let msg = CoreMessage::ping(CoreId::new(3));
        assert_eq!(msg.action(), Ok(CoreAction::Ping));
        assert_eq!(msg.core_id(), CoreId::new(3));
        assert_eq!(msg.path(), VirtualAddress::zero());
    }

    #[test]
    fn bytes_follow_the_field_order() {
        let msg = CoreMessage::new(CoreAction::Ping, CoreId::new(2), VirtualAddress::new(0x1234_5678));
        let bytes = msg.to_bytes();
        assert_eq!(u32::from_ne_bytes(bytes[0..4].try_into().unwrap()), 1);
        assert_eq!(u32::from_ne_bytes(bytes[4..8].try_into().unwrap()), 2);
        assert_eq!(u64::from_ne_bytes(bytes[8..16].try_into().unwrap()), 0x1234_5678);
    }

    #[test]
    fn unknown_actions_are_reported() {
        assert_eq!(CoreAction::try_from(0), Err(UnknownAction(0)));
        assert_eq!(CoreAction::try_from(1), Ok(CoreAction::Ping));
    }
}
