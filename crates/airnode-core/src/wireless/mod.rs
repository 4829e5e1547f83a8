//! Wireless link: session state machine, link-control contract and the
//! attribute store holding the published values
//!
//! The radio stack lives outside this crate. It is driven through
//! [`LinkControl`] and reports back by sending [`WirelessEvent`]s into
//! [`WIRELESS_CHANNEL`], which the orchestrator drains on its own context.

mod attributes;
mod session;

pub use attributes::*;
pub use session::*;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};
use embassy_time::Duration;
use thiserror_no_std::Error;

use crate::timer::TimerError;

/// Channel capacity for queued link events
pub const WIRELESS_CAPACITY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WirelessState {
    /// The radio stack has not been enabled yet.
    NotSet,
    Idle,
    Pairing,
    Advertising,
    Connected,
    Disconnected,
}

impl WirelessState {
    pub const fn label(self) -> &'static str {
        match self {
            Self::NotSet => "not set",
            Self::Idle => "idle",
            Self::Pairing => "pairing",
            Self::Advertising => "advertising",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        }
    }
}

/// Link-layer connection identifier assigned by the radio stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionId(pub u16);

/// HCI disconnect reason
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// 0x13: the peer closed the link.
    RemoteUserTerminated,
    /// 0x16: this device closed the link.
    LocalHostTerminated,
    Other(u8),
}

impl DisconnectReason {
    pub const fn from_hci(code: u8) -> Self {
        match code {
            0x13 => Self::RemoteUserTerminated,
            0x16 => Self::LocalHostTerminated,
            other => Self::Other(other),
        }
    }

    pub const fn hci_code(self) -> u8 {
        match self {
            Self::RemoteUserTerminated => 0x13,
            Self::LocalHostTerminated => 0x16,
            Self::Other(code) => code,
        }
    }
}

/// Inbound notifications from the radio stack (and the pairing button).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WirelessEvent {
    Connected(ConnectionId),
    /// A connection attempt failed with the given non-zero HCI status.
    ConnectFailed(u8),
    Disconnected(DisconnectReason),
    SecurityFailed,
    PairingComplete { bonded: bool },
    /// The user asked for a pairing window.
    PairingRequested,
}

/// The active link.
///
/// Only the session state machine creates one, on connect, and drops it on
/// disconnect. It cannot be cloned, so at most one exists.
#[derive(Debug, PartialEq, Eq)]
pub struct SessionHandle {
    id: ConnectionId,
}

impl SessionHandle {
    pub(in crate::wireless) fn new(id: ConnectionId) -> Self {
        Self { id }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    #[error("Radio stack is not enabled")]
    NotEnabled,
    #[error("Failed to {operation} (err {code})")]
    Failed { operation: &'static str, code: i32 },
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WirelessError {
    #[error("Wireless link is busy ({state:?})")]
    Busy { state: WirelessState },
    #[error("Link request failed: {0}")]
    Link(LinkError),
    #[error("Could not arm the timeout: {0}")]
    Timer(TimerError),
}

/// Outbound requests to the radio stack.
///
/// All requests return immediately; results arrive later as
/// [`WirelessEvent`]s.
pub trait LinkControl {
    fn enable(&mut self) -> Result<(), LinkError>;

    /// Start connectable advertising of the sensor payload.
    fn start_advertising(&mut self, timeout: Duration) -> Result<(), LinkError>;

    fn stop_advertising(&mut self) -> Result<(), LinkError>;

    /// Start advertising for a bonding peer.
    fn start_pairing(&mut self, timeout: Duration) -> Result<(), LinkError>;

    fn disconnect(&mut self, handle: &SessionHandle) -> Result<(), LinkError>;

    /// Drop any (partial) bond with the peer on `handle`.
    fn remove_bond(&mut self, handle: &SessionHandle) -> Result<(), LinkError>;

    fn has_bonded_peers(&self) -> bool;
}

/// Receives the outcome of every session and pairing window.
pub trait SessionObserver {
    fn connection_established(&mut self);

    /// A data session ended. Called exactly once per session.
    fn session_complete(&mut self, success: bool);

    /// A peer finished the pairing procedure, with or without bonding.
    fn pairing_attempt(&mut self, success: bool);

    /// The pairing window closed. Called exactly once per window.
    fn pairing_finished(&mut self, bonded: bool);
}

/// Receiver type drained by the orchestrator
pub type WirelessEventReceiver<'ch> =
    Receiver<'ch, CriticalSectionRawMutex, WirelessEvent, WIRELESS_CAPACITY>;

/// Global channel for link events
pub static WIRELESS_CHANNEL: Channel<CriticalSectionRawMutex, WirelessEvent, WIRELESS_CAPACITY> =
    Channel::new();

/// Helper to get a link event sender
pub fn get_wireless_sender()
-> Sender<'static, CriticalSectionRawMutex, WirelessEvent, WIRELESS_CAPACITY> {
    WIRELESS_CHANNEL.sender()
}

/// Helper to get a link event receiver
pub fn get_wireless_receiver() -> WirelessEventReceiver<'static> {
    WIRELESS_CHANNEL.receiver()
}
