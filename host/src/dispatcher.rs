//! ==============================================================================
//! dispatcher.rs - operator command dispatch
//! ==============================================================================
//!
//! purpose:
//!     translates an operator command into its device token and writes it to
//!     the link. one-way: no queue, no acknowledgement, no retry.
//!
//! relationships:
//!     - used by: hub.rs (inbound observer events), server.rs (http api)
//!     - uses: link.rs (write_token)
//!
//! ==============================================================================

use serde::Serialize;

use crate::domain::Command;
use crate::link::{DeviceLink, LinkError};

/// what happened to a dispatched command
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// token written to the board
    Written,
    /// no board attached, accepted and dropped
    NoDevice,
    /// the write itself failed
    Failed,
}

#[derive(Clone)]
pub struct CommandDispatcher {
    link: DeviceLink,
}

impl CommandDispatcher {
    pub fn new(link: DeviceLink) -> Self {
        Self { link }
    }

    pub async fn dispatch(&self, command: Command) -> DispatchOutcome {
        tracing::info!("{} requested", describe(command));

        match self.link.write_token(command.token()).await {
            Ok(()) => DispatchOutcome::Written,
            Err(LinkError::NotInitialized) => {
                tracing::debug!("no device attached, {} dropped", command.event_name());
                DispatchOutcome::NoDevice
            }
            Err(e) => {
                tracing::warn!("failed to send {:?}: {}", command, e);
                DispatchOutcome::Failed
            }
        }
    }
}

fn describe(command: Command) -> &'static str {
    match command {
        Command::Retract => "Manual retract",
        Command::Reverse => "Manual reverse",
        Command::SteamerOn => "Steamer ON",
    }
}
