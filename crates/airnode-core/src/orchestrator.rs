//! The duty-cycle orchestrator
//!
//! [`Orchestrator`] owns every piece of node state: configuration,
//! peripherals, both state machines, the measurement buffers and the cycle
//! timer. [`Orchestrator::run`] is a single cooperative loop: it sleeps
//! until the next cycle, a wireless timeout or an incoming link event, and
//! services whichever comes first.
//!
//! A cycle measures, optionally renders, and every Kth time publishes the
//! buffer means and starts a wireless session. It does not wait for the
//! session: the outcome arrives later through [`SessionObserver`] and moves
//! the activity back to idle.

use embassy_futures::select::{Either, select};
use embassy_time::{Duration, Instant};
use embedded_hal_async::delay::DelayNs;
use log::{debug, error, info, warn};
use thiserror_no_std::Error;

use crate::activity::{ActivityState, ActivityStateMachine};
use crate::config::Config;
use crate::error::{InitError, StartError};
use crate::events::{Event, EventSink};
use crate::measurements::{MeasurementBuffers, Variable};
use crate::peripherals::{Display, DisplayFrame, Peripherals, PowerGate, RefreshPolicy, SensorArray};
use crate::scheduler::{CycleCounter, CycleStats, next_delay};
use crate::timer::{Clock, ScheduleStatus, TimerError, WorkTimer};
use crate::wireless::{
    AttributeStore, LinkControl, SessionObserver, WirelessEvent,
    WirelessEventReceiver, WirelessSession, WirelessState,
};

/// The collaborators a node is built from.
pub trait Platform {
    type Sensors: SensorArray;
    type Display: Display;
    type Flash: PowerGate;
    type Link: LinkControl;
    type Attributes: AttributeStore;
    type Indicator: EventSink;
    type Clock: Clock;
    type Delay: DelayNs;
    type Timer: WorkTimer;
}

/// Concrete collaborators handed to [`Orchestrator::new`]
pub struct Hardware<P: Platform> {
    pub sensors: P::Sensors,
    /// Dropped when the configuration disables the display
    pub display: Option<P::Display>,
    pub flash: P::Flash,
    pub link: P::Link,
    pub attributes: P::Attributes,
    pub indicator: P::Indicator,
    pub clock: P::Clock,
    pub delay: P::Delay,
    pub timer: P::Timer,
}

type NodePeripherals<P> =
    Peripherals<<P as Platform>::Sensors, <P as Platform>::Display, <P as Platform>::Flash>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleError {
    #[error("Measurement buffers are not allocated; init() has not succeeded")]
    NotInitialized,
    #[error("Could not re-arm the cycle timer: {0}")]
    Schedule(TimerError),
}

pub struct Orchestrator<'ch, P: Platform> {
    config: Config,
    peripherals: NodePeripherals<P>,
    link: P::Link,
    attributes: P::Attributes,
    indicator: P::Indicator,
    clock: P::Clock,
    delay: P::Delay,
    work: P::Timer,
    events: WirelessEventReceiver<'ch>,
    activity: ActivityStateMachine,
    wireless: WirelessSession,
    buffers: Option<MeasurementBuffers>,
    counter: CycleCounter,
    stats: CycleStats,
    refresh: RefreshPolicy,
}

impl<'ch, P: Platform> Orchestrator<'ch, P> {
    pub fn new(config: Config, hardware: Hardware<P>, events: WirelessEventReceiver<'ch>) -> Self {
        let display = if config.display_enabled {
            hardware.display
        } else {
            None
        };

        Self {
            config,
            peripherals: Peripherals {
                sensors: hardware.sensors,
                display,
                flash: hardware.flash,
            },
            link: hardware.link,
            attributes: hardware.attributes,
            indicator: hardware.indicator,
            clock: hardware.clock,
            delay: hardware.delay,
            work: hardware.timer,
            events,
            activity: ActivityStateMachine::new(),
            wireless: WirelessSession::new(),
            buffers: None,
            counter: CycleCounter::new(config.measurements_per_interval),
            stats: CycleStats::default(),
            refresh: RefreshPolicy::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn activity_state(&self) -> ActivityState {
        self.activity.current()
    }

    pub fn wireless_state(&self) -> WirelessState {
        self.wireless.state()
    }

    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    /// Cycles completed since the last wireless session
    pub fn cycle_count(&self) -> u16 {
        self.counter.count()
    }

    pub fn buffers(&self) -> Option<&MeasurementBuffers> {
        self.buffers.as_ref()
    }

    pub fn attributes(&self) -> &P::Attributes {
        &self.attributes
    }

    /// When the next cycle is due, if one is scheduled
    pub fn next_cycle(&self) -> Option<Instant> {
        self.work.deadline()
    }

    /// Bring up every subsystem and arm the first cycle.
    ///
    /// On failure the node is left in [`ActivityState::Error`].
    pub fn init(&mut self) -> Result<(), InitError> {
        if self.activity.current() != ActivityState::Uninitialized {
            return Err(InitError::AlreadyInitialized);
        }

        self.transition(ActivityState::Initializing);
        match self.bring_up() {
            Ok(()) => {
                info!("Initialization complete");
                self.indicator.dispatch(Event::InitSuccess);
                self.transition(ActivityState::Idle);
                Ok(())
            }
            Err(e) => {
                error!("Initialization failed: {}", e);
                self.indicator.dispatch(Event::InitError);
                self.transition(ActivityState::Error);
                Err(e)
            }
        }
    }

    fn bring_up(&mut self) -> Result<(), InitError> {
        self.config.validate().map_err(InitError::Config)?;
        self.indicator.init().map_err(InitError::Indicator)?;
        if let Some(display) = self.peripherals.display.as_mut() {
            display.init().map_err(InitError::Display)?;
        }
        self.wireless
            .enable(&mut self.link)
            .map_err(InitError::Wireless)?;
        self.peripherals.sensors.init().map_err(InitError::Sensors)?;

        let buffers = MeasurementBuffers::with_capacity(self.config.buffer_capacity())
            .map_err(InitError::Buffers)?;
        self.buffers = Some(buffers);

        let now = self.clock.now();
        self.work
            .schedule(now, self.config.first_cycle_delay())
            .map_err(InitError::Schedule)?;
        info!(
            "First cycle in {} ms, then every {} ms",
            self.config.first_cycle_delay_ms,
            self.config.measurement_interval().as_millis()
        );
        Ok(())
    }

    /// Post-init startup: open a pairing window if no peer is bonded yet.
    pub fn start(&mut self) -> Result<(), StartError> {
        let state = self.activity.current();
        if state != ActivityState::Idle {
            error!("Cannot start while {}", state.label());
            self.indicator.dispatch(Event::StartupError);
            return Err(StartError::NotIdle(state));
        }

        if self.config.pair_when_unbonded && !self.link.has_bonded_peers() {
            info!("No bonded peers, entering pairing mode");
            let now = self.clock.now();
            if let Err(e) = self
                .wireless
                .start_pairing(now, self.config.pairing_timeout(), &mut self.link)
            {
                error!("Failed to enter pairing mode: {}", e);
                self.indicator.dispatch(Event::StartupError);
                return Err(StartError::Pairing(e));
            }
        }

        self.indicator.dispatch(Event::StartupSuccess);
        Ok(())
    }

    /// Run the event loop forever.
    pub async fn run(&mut self) -> ! {
        loop {
            self.step(None).await;
        }
    }

    /// Run the event loop until the clock reaches `stop`.
    ///
    /// A cycle in progress at `stop` is completed first.
    pub async fn run_until(&mut self, stop: Instant) {
        while self.clock.now() < stop {
            self.step(Some(stop)).await;
        }
    }

    async fn step(&mut self, stop: Option<Instant>) {
        if self.work.take_expired(self.clock.now()) {
            if let Err(e) = self.run_cycle().await {
                error!("Cycle aborted: {}", e);
            }
            return;
        }
        self.wait_until(earliest(self.work.deadline(), stop)).await;
    }

    /// Run one measurement cycle.
    pub async fn run_cycle(&mut self) -> Result<(), CycleError> {
        if self.buffers.is_none() {
            return Err(CycleError::NotInitialized);
        }

        let started = self.clock.now();
        let mut warnings = 0u32;
        self.stats.cycles += 1;
        info!("Cycle {} started", self.stats.cycles);

        if !self.transition(ActivityState::Measuring) {
            warnings += 1;
        }
        if let Some(warmed_up) = started.checked_add(self.config.sensor_warmup()) {
            self.wait_until(Some(warmed_up)).await;
        }

        if let Some(buffers) = self.buffers.as_mut() {
            if let Err(e) = self.peripherals.sensors.read_all(buffers).await {
                warn!("Sensor read failed: {}", e);
                self.stats.sensor_failures += 1;
                self.indicator.dispatch(Event::TaskWarning);
                warnings += 1;
            }
        }

        let transmit = self.counter.increment();

        if self.peripherals.display.is_some() && !self.update_display() {
            warnings += 1;
        }

        if !transmit {
            self.rearm(started)?;
            if warnings == 0 {
                self.indicator.dispatch(Event::TaskSuccess);
            }
            self.transition(ActivityState::Idle);
            return Ok(());
        }

        self.transition(ActivityState::Advertising);
        self.publish_means();

        let now = self.clock.now();
        match self
            .wireless
            .start_session(now, self.config.session_timeout(), &mut self.link)
        {
            Ok(()) => info!("Advertising for {} ms", self.config.session_timeout_ms),
            Err(e) => {
                warn!("Could not start wireless session: {}", e);
                self.stats.sessions_failed += 1;
                self.indicator.dispatch(Event::TaskWarning);
                self.transition(ActivityState::Idle);
            }
        }

        self.rearm(started)
    }

    /// Render the latest values. Returns `false` on any failure.
    fn update_display(&mut self) -> bool {
        let mut ok = self.transition(ActivityState::Updating);

        let full_refresh = self.refresh.next();
        let (Some(buffers), Some(display)) =
            (self.buffers.as_ref(), self.peripherals.display.as_mut())
        else {
            return ok;
        };

        let frame = DisplayFrame::from_latest(buffers, full_refresh);
        if let Err(e) = display.render(&frame) {
            warn!("Display update failed: {}", e);
            self.stats.display_failures += 1;
            self.indicator.dispatch(Event::TaskWarning);
            ok = false;
        }
        ok
    }

    /// Push the buffer means into the attribute store.
    fn publish_means(&mut self) {
        let Some(buffers) = self.buffers.as_ref() else {
            return;
        };

        let mut clamped = false;
        for variable in Variable::ALL {
            let mean = buffers.mean(variable);
            debug!("Publishing mean {} = {}{}", variable.label(), mean, variable.unit());
            if let Err(e) = self.attributes.set(variable, mean) {
                warn!("{}", e);
                clamped = true;
            }
        }
        if clamped {
            self.indicator.dispatch(Event::TaskWarning);
        }
    }

    /// Arm the next cycle one interval after `started`.
    ///
    /// A rejected deadline stops the duty cycle: the node enters
    /// [`ActivityState::Error`].
    fn rearm(&mut self, started: Instant) -> Result<(), CycleError> {
        let now = self.clock.now();
        let elapsed = now
            .checked_duration_since(started)
            .unwrap_or(Duration::MIN);
        let next = next_delay(self.config.measurement_interval(), elapsed);

        if let Some(missed_by) = next.missed_by {
            error!(
                "Deadline missed by {} ms, next cycle starts immediately",
                missed_by.as_millis()
            );
            self.stats.deadline_misses += 1;
        }

        match self.work.schedule(now, next.delay) {
            Ok(ScheduleStatus::Scheduled) => {
                debug!("Next cycle in {} ms", next.delay.as_millis());
                Ok(())
            }
            Ok(ScheduleStatus::AlreadyQueued) => {
                debug!("Next cycle already queued");
                Ok(())
            }
            Err(e) => {
                error!("Failed to schedule the next cycle: {}", e);
                self.indicator.dispatch(Event::TaskError);
                self.transition(ActivityState::Error);
                Err(CycleError::Schedule(e))
            }
        }
    }

    /// Sleep until `deadline`, servicing link events and wireless timeouts.
    ///
    /// With no deadline this only returns by never returning: it keeps
    /// servicing events.
    async fn wait_until(&mut self, deadline: Option<Instant>) {
        loop {
            self.service_wireless(None);

            let now = self.clock.now();
            if deadline.is_some_and(|deadline| now >= deadline) {
                return;
            }

            let event = match earliest(deadline, self.wireless.next_deadline()) {
                Some(wake) => {
                    let ms = millis_until(now, wake);
                    match select(self.events.receive(), self.delay.delay_ms(ms)).await {
                        Either::First(event) => Some(event),
                        Either::Second(()) => None,
                    }
                }
                None => Some(self.events.receive().await),
            };

            if let Some(event) = event {
                self.service_wireless(Some(event));
            }
        }
    }

    /// Deliver `event` (if any) and fire expired wireless timeouts.
    fn service_wireless(&mut self, event: Option<WirelessEvent>) {
        let now = self.clock.now();
        let mut outcomes = Outcomes::<P> {
            activity: &mut self.activity,
            peripherals: &mut self.peripherals,
            indicator: &mut self.indicator,
            stats: &mut self.stats,
        };

        match event {
            Some(WirelessEvent::PairingRequested) => {
                info!("Pairing requested");
                if let Err(e) =
                    self.wireless
                        .start_pairing(now, self.config.pairing_timeout(), &mut self.link)
                {
                    warn!("Cannot enter pairing mode: {}", e);
                    outcomes.indicator.dispatch(Event::TaskWarning);
                }
            }
            Some(event) => self
                .wireless
                .handle_event(now, event, &mut self.link, &mut outcomes),
            None => {}
        }

        self.wireless
            .poll_timeouts(now, &mut self.link, &mut outcomes);
    }

    /// Returns `false` if any power action failed.
    fn transition(&mut self, state: ActivityState) -> bool {
        enter_state::<P>(
            &mut self.activity,
            &mut self.peripherals,
            &mut self.indicator,
            state,
        )
    }
}

fn enter_state<P: Platform>(
    activity: &mut ActivityStateMachine,
    peripherals: &mut NodePeripherals<P>,
    indicator: &mut P::Indicator,
    state: ActivityState,
) -> bool {
    match activity.enter(state, peripherals) {
        Ok(()) => true,
        Err(_) => {
            if state != ActivityState::Error {
                indicator.dispatch(Event::TaskWarning);
            }
            false
        }
    }
}

/// Borrowed view of the orchestrator that receives session outcomes.
struct Outcomes<'a, P: Platform> {
    activity: &'a mut ActivityStateMachine,
    peripherals: &'a mut NodePeripherals<P>,
    indicator: &'a mut P::Indicator,
    stats: &'a mut CycleStats,
}

impl<P: Platform> SessionObserver for Outcomes<'_, P> {
    fn connection_established(&mut self) {
        self.indicator.dispatch(Event::ConnectionEstablished);
    }

    fn session_complete(&mut self, success: bool) {
        if success {
            info!("Wireless session complete");
            self.stats.sessions_ok += 1;
            self.indicator.dispatch(Event::TaskSuccess);
        } else {
            warn!("Wireless session unsuccessful");
            self.stats.sessions_failed += 1;
            self.indicator.dispatch(Event::TaskWarning);
        }

        // A late outcome must not power down a cycle in progress.
        if self.activity.current() == ActivityState::Advertising {
            enter_state::<P>(
                self.activity,
                self.peripherals,
                self.indicator,
                ActivityState::Idle,
            );
        }
    }

    fn pairing_attempt(&mut self, success: bool) {
        if !success {
            warn!("Pairing attempt did not bond");
            self.indicator.dispatch(Event::TaskWarning);
        }
    }

    fn pairing_finished(&mut self, bonded: bool) {
        if bonded {
            info!("Pairing finished, peer bonded");
            self.indicator.dispatch(Event::TaskSuccess);
        } else {
            warn!("Pairing window closed without a bond");
            self.indicator.dispatch(Event::TaskWarning);
        }
    }
}

fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// Whole milliseconds from `now` to `wake`, rounded up.
fn millis_until(now: Instant, wake: Instant) -> u32 {
    let wait = wake.checked_duration_since(now).unwrap_or(Duration::MIN);
    u32::try_from(wait.as_micros().div_ceil(1_000)).unwrap_or(u32::MAX)
}
