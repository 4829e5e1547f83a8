use embassy_time::{Duration, Instant};
use log::{debug, error, info, warn};

use super::{
    ConnectionId, DisconnectReason, LinkControl, LinkError, SessionHandle, SessionObserver, WirelessError,
    WirelessEvent, WirelessState,
};
use crate::timer::{DelayedWork, WorkTimer};

/// Which procedure owns the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Advertising the sensor payload to any central.
    Data,
    /// Waiting for a peer to bond.
    Pairing,
}

/// Wireless session state machine.
///
/// One data session or pairing window at a time, each bounded by its own
/// timer. Outcomes are reported through a [`SessionObserver`] exactly once.
#[derive(Debug)]
pub struct WirelessSession {
    state: WirelessState,
    mode: SessionMode,
    handle: Option<SessionHandle>,
    session_timer: DelayedWork,
    pairing_timer: DelayedWork,
    /// This device asked for the current link to close.
    forced: bool,
}

impl Default for WirelessSession {
    fn default() -> Self {
        Self::new()
    }
}

impl WirelessSession {
    pub const fn new() -> Self {
        Self {
            state: WirelessState::NotSet,
            mode: SessionMode::Data,
            handle: None,
            session_timer: DelayedWork::new(),
            pairing_timer: DelayedWork::new(),
            forced: false,
        }
    }

    pub fn state(&self) -> WirelessState {
        self.state
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn handle(&self) -> Option<&SessionHandle> {
        self.handle.as_ref()
    }

    /// Earliest pending session or pairing deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.session_timer.deadline(), self.pairing_timer.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Bring up the radio stack.
    pub fn enable(&mut self, link: &mut impl LinkControl) -> Result<(), LinkError> {
        link.enable()?;
        self.set_state(WirelessState::Idle);
        Ok(())
    }

    /// Start advertising the payload, bounded by `timeout`.
    pub fn start_session(
        &mut self,
        now: Instant,
        timeout: Duration,
        link: &mut impl LinkControl,
    ) -> Result<(), WirelessError> {
        self.ensure_idle()?;

        link.start_advertising(timeout).map_err(WirelessError::Link)?;
        if let Err(e) = self.session_timer.schedule(now, timeout) {
            log_link_error("stop advertising", link.stop_advertising());
            return Err(WirelessError::Timer(e));
        }

        self.mode = SessionMode::Data;
        self.forced = false;
        self.set_state(WirelessState::Advertising);
        Ok(())
    }

    /// Open a pairing window of `timeout`.
    pub fn start_pairing(
        &mut self,
        now: Instant,
        timeout: Duration,
        link: &mut impl LinkControl,
    ) -> Result<(), WirelessError> {
        self.ensure_idle()?;

        link.start_pairing(timeout).map_err(WirelessError::Link)?;
        if let Err(e) = self.pairing_timer.schedule(now, timeout) {
            log_link_error("stop advertising", link.stop_advertising());
            return Err(WirelessError::Timer(e));
        }

        self.mode = SessionMode::Pairing;
        self.forced = false;
        self.set_state(WirelessState::Pairing);
        Ok(())
    }

    /// Handle one link event.
    pub fn handle_event(
        &mut self,
        now: Instant,
        event: WirelessEvent,
        link: &mut impl LinkControl,
        observer: &mut dyn SessionObserver,
    ) {
        match event {
            WirelessEvent::Connected(id) => self.on_connected(id, link, observer),
            WirelessEvent::ConnectFailed(status) => {
                warn!("Connection failed (err {}), still {}", status, self.state.label());
            }
            WirelessEvent::Disconnected(reason) => self.on_disconnected(now, reason, link, observer),
            WirelessEvent::SecurityFailed => self.on_security_failed(link),
            WirelessEvent::PairingComplete { bonded } => {
                self.on_pairing_complete(bonded, link, observer)
            }
            WirelessEvent::PairingRequested => {
                debug!("Pairing requests are started by the orchestrator");
            }
        }
    }

    /// Fire any timeout that has passed.
    pub fn poll_timeouts(
        &mut self,
        now: Instant,
        link: &mut impl LinkControl,
        observer: &mut dyn SessionObserver,
    ) {
        if self.session_timer.take_expired(now) {
            self.on_session_timeout(link, observer);
        }
        if self.pairing_timer.take_expired(now) {
            self.on_pairing_timeout(link, observer);
        }
    }

    fn ensure_idle(&self) -> Result<(), WirelessError> {
        if self.state != WirelessState::Idle || self.handle.is_some() {
            return Err(WirelessError::Busy { state: self.state });
        }
        Ok(())
    }

    fn set_state(&mut self, state: WirelessState) {
        if self.state != state {
            info!("Wireless: {} -> {}", self.state.label(), state.label());
            self.state = state;
        }
    }

    fn on_connected(
        &mut self,
        id: ConnectionId,
        link: &mut impl LinkControl,
        observer: &mut dyn SessionObserver,
    ) {
        let expected = matches!(
            (self.mode, self.state),
            (SessionMode::Data, WirelessState::Advertising)
                | (SessionMode::Pairing, WirelessState::Pairing)
        );
        if self.handle.is_some() || !expected {
            warn!("Unexpected connection {:?} while {}, closing it", id, self.state.label());
            log_link_error("disconnect", link.disconnect(&SessionHandle::new(id)));
            return;
        }

        info!("Central connected ({:?}), stopping advertising", id);
        log_link_error("stop advertising", link.stop_advertising());
        self.handle = Some(SessionHandle::new(id));
        if self.mode == SessionMode::Data {
            self.set_state(WirelessState::Connected);
        }
        observer.connection_established();
    }

    fn on_disconnected(
        &mut self,
        now: Instant,
        reason: DisconnectReason,
        link: &mut impl LinkControl,
        observer: &mut dyn SessionObserver,
    ) {
        if self.handle.take().is_none() {
            debug!("Disconnect ({:?}) without an active link", reason);
            return;
        }
        info!("Central disconnected (reason 0x{:02x})", reason.hci_code());

        match (self.mode, self.state) {
            (SessionMode::Data, WirelessState::Connected) => {
                self.session_timer.cancel();
                self.set_state(WirelessState::Disconnected);
                let success = reason == DisconnectReason::RemoteUserTerminated && !self.forced;
                self.finish_session(success, observer);
            }
            (SessionMode::Pairing, WirelessState::Pairing) => {
                self.forced = false;
                self.resume_pairing(now, link, observer);
            }
            // The outcome was already reported; this only releases the link.
            _ => self.forced = false,
        }
    }

    fn resume_pairing(
        &mut self,
        now: Instant,
        link: &mut impl LinkControl,
        observer: &mut dyn SessionObserver,
    ) {
        let Some(remaining) = self.pairing_timer.remaining(now) else {
            return;
        };
        if remaining == Duration::from_ticks(0) {
            // The timeout will fire on the next poll.
            return;
        }

        info!("Resuming pairing for {} ms", remaining.as_millis());
        if let Err(e) = link.start_pairing(remaining) {
            error!("Failed to resume pairing: {}", e);
            self.pairing_timer.cancel();
            self.finish_pairing(false, observer);
        }
    }

    fn on_security_failed(&mut self, link: &mut impl LinkControl) {
        warn!("Security procedure failed");
        if self.mode != SessionMode::Pairing {
            return;
        }
        if let Some(handle) = &self.handle {
            log_link_error("remove bond", link.remove_bond(handle));
        }
    }

    fn on_pairing_complete(
        &mut self,
        bonded: bool,
        link: &mut impl LinkControl,
        observer: &mut dyn SessionObserver,
    ) {
        if self.mode != SessionMode::Pairing || self.state != WirelessState::Pairing {
            warn!("Pairing completed outside a pairing window, ignoring");
            return;
        }

        if bonded {
            info!("Pairing complete, peer bonded");
            self.pairing_timer.cancel();
            log_link_error("stop advertising", link.stop_advertising());
            self.force_disconnect(link);
            observer.pairing_attempt(true);
            self.finish_pairing(true, observer);
        } else {
            warn!("Pairing complete without bonding, waiting for another attempt");
            self.force_disconnect(link);
            observer.pairing_attempt(false);
        }
    }

    fn on_session_timeout(
        &mut self,
        link: &mut impl LinkControl,
        observer: &mut dyn SessionObserver,
    ) {
        match self.state {
            WirelessState::Advertising => {
                info!("Session timeout, stopping advertising");
                log_link_error("stop advertising", link.stop_advertising());
                self.finish_session(false, observer);
            }
            WirelessState::Connected => {
                info!("Session timeout, disconnecting central");
                if !self.force_disconnect(link) {
                    self.handle = None;
                    self.set_state(WirelessState::Disconnected);
                    self.finish_session(false, observer);
                }
            }
            state => debug!("Stale session timeout while {}", state.label()),
        }
    }

    fn on_pairing_timeout(
        &mut self,
        link: &mut impl LinkControl,
        observer: &mut dyn SessionObserver,
    ) {
        if self.mode != SessionMode::Pairing {
            return;
        }
        warn!("Pairing window closed without a bonded peer");
        log_link_error("stop advertising", link.stop_advertising());
        if self.handle.is_some() && !self.force_disconnect(link) {
            self.handle = None;
        }
        self.finish_pairing(false, observer);
    }

    /// Ask the link to close. Returns `false` if the request failed, in
    /// which case no disconnect event will follow.
    fn force_disconnect(&mut self, link: &mut impl LinkControl) -> bool {
        let Some(handle) = &self.handle else {
            return true;
        };
        self.forced = true;
        match link.disconnect(handle) {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to disconnect: {}", e);
                false
            }
        }
    }

    fn finish_session(&mut self, success: bool, observer: &mut dyn SessionObserver) {
        self.forced = false;
        self.set_state(WirelessState::Idle);
        observer.session_complete(success);
    }

    fn finish_pairing(&mut self, bonded: bool, observer: &mut dyn SessionObserver) {
        self.mode = SessionMode::Data;
        self.set_state(WirelessState::Idle);
        observer.pairing_finished(bonded);
    }
}

fn log_link_error(operation: &str, result: Result<(), LinkError>) {
    if let Err(e) = result {
        error!("Failed to {}: {}", operation, e);
    }
}
