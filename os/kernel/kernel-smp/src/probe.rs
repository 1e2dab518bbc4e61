//! # Channel Self-Test
//!
//! Every slave sends one ping to the master; the master waits for one message
//! from every slave. Reads block without a timeout.

use crate::error::CoreError;
use crate::topology::{MasterChannels, SlaveChannels};
use kernel_channel::{CoreAction, CoreMessage};
use kernel_info::cores::CoreId;
use log::{error, info, warn};

/// Send one [`CoreAction::Ping`] from the slave to the master.
///
/// # Errors
/// [`CoreError::IoError`] if the channel to the master rejects the message.
pub fn send_ping(channels: &mut SlaveChannels<'_>) -> Result<(), CoreError> {
    let core = channels.core();
    channels
        .to_master()
        .write(&CoreMessage::ping(core))
        .map_err(|source| {
            error!("{core}: failed to send ping: {source}");
            CoreError::IoError {
                core,
                source: Some(source),
            }
        })
}

/// Wait for one message from each of `cores` and return how many were pings.
///
/// # Errors
/// [`CoreError::IoError`] if a core has no channel, or its channel is corrupt.
pub fn await_pings(
    channels: &mut MasterChannels<'_>,
    cores: impl IntoIterator<Item = CoreId>,
) -> Result<usize, CoreError> {
    let mut pings = 0;
    for core in cores {
        let Some(channel) = channels.from_slave(core) else {
            error!("{core}: no channel from this core");
            return Err(CoreError::IoError { core, source: None });
        };

        let message = channel.read().map_err(|source| {
            error!("{core}: failed to read from channel: {source}");
            CoreError::IoError {
                core,
                source: Some(source),
            }
        })?;

        match message.action() {
            Ok(CoreAction::Ping) => {
                info!("{} sent a Ping", message.core_id());
                pings += 1;
            }
            Err(unknown) => warn!("{core}: ignoring message: {unknown}"),
        }
    }
    Ok(pings)
}
