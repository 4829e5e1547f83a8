//! Desktop simulator for the airnode duty-cycle orchestrator.
//!
//! Runs the real `airnode-core` orchestrator against simulated sensors, a
//! logging display and a scripted central device, in virtual time: a delay
//! completes instantly by moving the clock forward, so hours of duty cycle
//! run in well under a second.
//!
//! The scripted central:
//! - bonds on its second pairing attempt,
//! - connects to two out of three data sessions and closes them itself,
//! - stays out of range on every third session, so it times out.
//!
//! Usage: `airnode-simulator [minutes]` (default 30). Set `RUST_LOG=debug`
//! to see every reading.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use embassy_futures::block_on;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Receiver, Sender};
use embassy_time::{Duration, Instant};
use embedded_hal_async::delay::DelayNs;
use log::{debug, error, info, trace, warn};

use airnode_core::battery::{cell_millivolts, percentage_from_millivolts};
use airnode_core::config::Config;
use airnode_core::events::{
    Color, Event, INDICATOR_CAPACITY, IndicatorError, IndicatorLed, get_indicator_receiver,
    get_indicator_sender, show,
};
use airnode_core::measurements::{MeasurementBuffers, Variable};
use airnode_core::orchestrator::{Hardware, Orchestrator, Platform};
use airnode_core::peripherals::{
    Display, DisplayError, DisplayFrame, PeripheralError, PowerGate, Sensor, SensorArray,
    SensorError, SensorReadings, read_into,
};
use airnode_core::timer::{Clock, DelayedWork};
use airnode_core::wireless::{
    ConnectionId, DisconnectReason, LinkControl, LinkError, ScaledAttributes, SessionHandle,
    WIRELESS_CAPACITY, WirelessEvent, get_wireless_receiver, get_wireless_sender,
};

const DEFAULT_MINUTES: u64 = 30;

/// Central behaviour, in milliseconds after the triggering request
const CONNECT_AFTER_MS: u64 = 1_500;
const READ_FOR_MS: u64 = 800;
const PAIRING_CONNECT_AFTER_MS: u64 = 3_000;
const PAIRING_DURATION_MS: u64 = 1_000;
const DISCONNECT_LATENCY_MS: u64 = 50;

/// Battery divider fitted on the reference board
const DIVIDER_R1: u32 = 1_031;
const DIVIDER_R2: u32 = 510;

// ---------------------------------------------------------------------------
// Virtual time
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct SimClock {
    now_ms: Rc<Cell<u64>>,
}

impl SimClock {
    fn millis(&self) -> u64 {
        self.now_ms.get()
    }

    fn hours(&self) -> f32 {
        self.now_ms.get() as f32 / 3_600_000.0
    }
}

impl Clock for SimClock {
    fn now(&self) -> Instant {
        Instant::from_millis(self.now_ms.get())
    }
}

/// Link events in flight, ordered by delivery time
type Air = Rc<RefCell<VecDeque<(u64, WirelessEvent)>>>;

/// Delay that jumps the virtual clock.
///
/// Delivers scheduled link events into the wireless channel as the clock
/// passes them, and plays queued indicator events on a logging LED.
struct SimDelay {
    clock: SimClock,
    air: Air,
    radio_events: Sender<'static, CriticalSectionRawMutex, WirelessEvent, WIRELESS_CAPACITY>,
    indicator: Receiver<'static, CriticalSectionRawMutex, Event, INDICATOR_CAPACITY>,
    led: LogLed,
}

impl SimDelay {
    async fn sleep_ms(&mut self, ms: u64) {
        let target = self.clock.millis() + ms;
        let next = self.air.borrow().front().copied();

        match next {
            Some((when, event)) if when <= target => {
                self.air.borrow_mut().pop_front();
                self.clock.now_ms.set(when.max(self.clock.millis()));
                if self.radio_events.try_send(event).is_err() {
                    warn!("Radio event queue full, dropping {:?}", event);
                }
            }
            _ => self.clock.now_ms.set(target),
        }

        while let Ok(event) = self.indicator.try_receive() {
            let indication = event.indication();
            info!(
                "[{:>8} ms] LED: {:?} -> {:?} x{}",
                self.clock.millis(),
                event,
                indication.color,
                indication.blinks
            );
            if let Err(e) = show(&mut self.led, &mut NoWait, event).await {
                error!("LED failed: {}", e);
            }
        }
    }
}

impl DelayNs for SimDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.sleep_ms(u64::from(ns).div_ceil(1_000_000)).await;
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.sleep_ms(u64::from(ms)).await;
    }
}

/// Blinking happens off the virtual timeline.
struct NoWait;

impl DelayNs for NoWait {
    async fn delay_ns(&mut self, _ns: u32) {}
}

struct LogLed;

impl IndicatorLed for LogLed {
    fn set(&mut self, color: Option<Color>) -> Result<(), IndicatorError> {
        trace!("LED {:?}", color);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sensors
// ---------------------------------------------------------------------------

struct ClimateReadings {
    temperature_celsius: f32,
    humidity_percent: f32,
    pressure_pascal: f32,
}

impl SensorReadings<3> for ClimateReadings {
    fn to_array(self) -> [f32; 3] {
        [
            self.temperature_celsius,
            self.humidity_percent,
            self.pressure_pascal,
        ]
    }
}

/// Temperature, humidity and pressure following slow daily curves.
struct ClimateSensor {
    clock: SimClock,
}

impl Sensor<3> for ClimateSensor {
    type Readings = ClimateReadings;
    const NAME: &'static str = "climate";
    const VARIABLES: [Variable; 3] = [Variable::Temperature, Variable::Humidity, Variable::Pressure];

    async fn read(&mut self) -> Result<ClimateReadings, SensorError> {
        let t = self.clock.hours();
        Ok(ClimateReadings {
            temperature_celsius: 21.0 + 2.5 * (t / 24.0 * core::f32::consts::TAU).sin(),
            humidity_percent: 45.0 + 8.0 * (t / 6.0).cos(),
            pressure_pascal: 101_325.0 + 150.0 * (t / 3.0).sin(),
        })
    }
}

struct GasReadings {
    co2_ppm: f32,
    voc_index: f32,
}

impl SensorReadings<2> for GasReadings {
    fn to_array(self) -> [f32; 2] {
        [self.co2_ppm, self.voc_index]
    }
}

/// CO2 and VOC. Every `fail_every`th read times out.
struct GasSensor {
    clock: SimClock,
    reads: u32,
    fail_every: u32,
}

impl Sensor<2> for GasSensor {
    type Readings = GasReadings;
    const NAME: &'static str = "gas";
    const VARIABLES: [Variable; 2] = [Variable::Co2, Variable::VocIndex];

    async fn read(&mut self) -> Result<GasReadings, SensorError> {
        self.reads += 1;
        if self.reads % self.fail_every == 0 {
            return Err(SensorError::Timeout {
                sensor: Self::NAME,
                operation: "read measurement",
            });
        }

        let t = self.clock.hours();
        Ok(GasReadings {
            co2_ppm: 650.0 + 250.0 * (t * 2.0).sin().abs(),
            voc_index: 100.0 + 60.0 * (t * 1.3).sin(),
        })
    }
}

struct BatteryReadings {
    level_percent: f32,
}

impl SensorReadings<1> for BatteryReadings {
    fn to_array(self) -> [f32; 1] {
        [self.level_percent]
    }
}

/// Samples the divided cell voltage, draining 20 mV per simulated hour.
struct BatteryMonitor {
    clock: SimClock,
}

impl Sensor<1> for BatteryMonitor {
    type Readings = BatteryReadings;
    const NAME: &'static str = "battery";
    const VARIABLES: [Variable; 1] = [Variable::BatteryLevel];

    async fn read(&mut self) -> Result<BatteryReadings, SensorError> {
        let cell_mv = 4_150.0 - 20.0 * self.clock.hours();
        let measured_mv = (cell_mv * DIVIDER_R2 as f32 / (DIVIDER_R1 + DIVIDER_R2) as f32) as u32;

        let cell_mv = cell_millivolts(measured_mv, DIVIDER_R1, DIVIDER_R2).map_err(|_| {
            SensorError::ReadFailed {
                sensor: Self::NAME,
                operation: "convert voltage",
                details: "invalid divider",
            }
        })?;
        Ok(BatteryReadings {
            level_percent: percentage_from_millivolts(cell_mv),
        })
    }
}

struct SimSensors {
    climate: ClimateSensor,
    gas: GasSensor,
    battery: BatteryMonitor,
}

impl PowerGate for SimSensors {
    fn activate(&mut self) -> Result<(), PeripheralError> {
        debug!("Sensors powered");
        Ok(())
    }

    fn suspend(&mut self) -> Result<(), PeripheralError> {
        debug!("Sensors suspended");
        Ok(())
    }
}

impl SensorArray for SimSensors {
    fn init(&mut self) -> Result<(), SensorError> {
        info!("Sensors detected: {}, {}, {}", ClimateSensor::NAME, GasSensor::NAME, BatteryMonitor::NAME);
        Ok(())
    }

    async fn read_all(&mut self, buffers: &mut MeasurementBuffers) -> Result<(), SensorError> {
        let results = [
            read_into(&mut self.climate, buffers).await,
            read_into(&mut self.gas, buffers).await,
            read_into(&mut self.battery, buffers).await,
        ];
        match results.into_iter().filter_map(Result::err).last() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Display and flash
// ---------------------------------------------------------------------------

struct LogDisplay {
    clock: SimClock,
}

impl PowerGate for LogDisplay {
    fn activate(&mut self) -> Result<(), PeripheralError> {
        Ok(())
    }

    fn suspend(&mut self) -> Result<(), PeripheralError> {
        Ok(())
    }
}

impl Display for LogDisplay {
    fn init(&mut self) -> Result<(), DisplayError> {
        Ok(())
    }

    fn render(&mut self, frame: &DisplayFrame) -> Result<(), DisplayError> {
        info!(
            "[{:>8} ms] Display{}: {} | {} | CO2 {} ppm | air {} | battery {}",
            self.clock.millis(),
            if frame.full_refresh { " (full refresh)" } else { "" },
            frame.temperature_label(),
            frame.humidity_label(),
            frame.co2_label(),
            frame.air_quality.label(),
            frame.battery_label()
        );
        Ok(())
    }
}

struct SimFlash;

impl PowerGate for SimFlash {
    fn activate(&mut self) -> Result<(), PeripheralError> {
        Ok(())
    }

    fn suspend(&mut self) -> Result<(), PeripheralError> {
        debug!("Flash suspended");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Radio and scripted central
// ---------------------------------------------------------------------------

struct Radio {
    clock: SimClock,
    air: Air,
    bonded: bool,
    sessions: u32,
    pairing_attempts: u32,
    next_connection: u16,
}

impl Radio {
    /// Deliver `event` `after_ms` from now.
    fn emit(&mut self, after_ms: u64, event: WirelessEvent) {
        let when = self.clock.millis() + after_ms;
        let mut air = self.air.borrow_mut();
        let index = air.iter().position(|(t, _)| *t > when).unwrap_or(air.len());
        air.insert(index, (when, event));
    }

    fn connection(&mut self) -> ConnectionId {
        self.next_connection = self.next_connection.wrapping_add(1);
        ConnectionId(self.next_connection)
    }
}

struct SimLink {
    radio: Rc<RefCell<Radio>>,
}

impl LinkControl for SimLink {
    fn enable(&mut self) -> Result<(), LinkError> {
        info!("Radio enabled");
        Ok(())
    }

    fn start_advertising(&mut self, timeout: Duration) -> Result<(), LinkError> {
        let mut radio = self.radio.borrow_mut();
        radio.sessions += 1;
        info!("Advertising (session {}, {} ms)", radio.sessions, timeout.as_millis());

        if radio.sessions % 3 == 0 {
            info!("Central is out of range this time");
            return Ok(());
        }
        let id = radio.connection();
        radio.emit(CONNECT_AFTER_MS, WirelessEvent::Connected(id));
        radio.emit(
            CONNECT_AFTER_MS + READ_FOR_MS,
            WirelessEvent::Disconnected(DisconnectReason::RemoteUserTerminated),
        );
        Ok(())
    }

    fn stop_advertising(&mut self) -> Result<(), LinkError> {
        Ok(())
    }

    fn start_pairing(&mut self, timeout: Duration) -> Result<(), LinkError> {
        let mut radio = self.radio.borrow_mut();
        radio.pairing_attempts += 1;
        info!("Pairing advertising ({} ms left)", timeout.as_millis());

        let bonded = radio.pairing_attempts >= 2;
        let id = radio.connection();
        radio.emit(PAIRING_CONNECT_AFTER_MS, WirelessEvent::Connected(id));
        radio.emit(
            PAIRING_CONNECT_AFTER_MS + PAIRING_DURATION_MS,
            WirelessEvent::PairingComplete { bonded },
        );
        if bonded {
            radio.bonded = true;
        }
        Ok(())
    }

    fn disconnect(&mut self, handle: &SessionHandle) -> Result<(), LinkError> {
        info!("Disconnecting {:?}", handle.id());
        self.radio.borrow_mut().emit(
            DISCONNECT_LATENCY_MS,
            WirelessEvent::Disconnected(DisconnectReason::LocalHostTerminated),
        );
        Ok(())
    }

    fn remove_bond(&mut self, handle: &SessionHandle) -> Result<(), LinkError> {
        info!("Removing bond with {:?}", handle.id());
        self.radio.borrow_mut().bonded = false;
        Ok(())
    }

    fn has_bonded_peers(&self) -> bool {
        self.radio.borrow().bonded
    }
}

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

struct Simulated;

impl Platform for Simulated {
    type Sensors = SimSensors;
    type Display = LogDisplay;
    type Flash = SimFlash;
    type Link = SimLink;
    type Attributes = ScaledAttributes;
    type Indicator = Sender<'static, CriticalSectionRawMutex, Event, INDICATOR_CAPACITY>;
    type Clock = SimClock;
    type Delay = SimDelay;
    type Timer = DelayedWork;
}

fn main() {
    env_logger::init();

    let minutes = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse::<u64>().ok())
        .unwrap_or(DEFAULT_MINUTES);

    let config = Config::default();
    info!("Starting airnode simulator for {} simulated minutes", minutes);
    info!("{:?}", config);

    let clock = SimClock::default();
    let air: Air = Rc::new(RefCell::new(VecDeque::new()));
    let radio = Rc::new(RefCell::new(Radio {
        clock: clock.clone(),
        air: air.clone(),
        bonded: false,
        sessions: 0,
        pairing_attempts: 0,
        next_connection: 0,
    }));

    let hardware = Hardware::<Simulated> {
        sensors: SimSensors {
            climate: ClimateSensor {
                clock: clock.clone(),
            },
            gas: GasSensor {
                clock: clock.clone(),
                reads: 0,
                fail_every: 7,
            },
            battery: BatteryMonitor {
                clock: clock.clone(),
            },
        },
        display: Some(LogDisplay {
            clock: clock.clone(),
        }),
        flash: SimFlash,
        link: SimLink { radio },
        attributes: ScaledAttributes::new(),
        indicator: get_indicator_sender(),
        clock: clock.clone(),
        delay: SimDelay {
            clock: clock.clone(),
            air,
            radio_events: get_wireless_sender(),
            indicator: get_indicator_receiver(),
            led: LogLed,
        },
        timer: DelayedWork::new(),
    };

    let mut node = Orchestrator::new(config, hardware, get_wireless_receiver());

    if let Err(e) = node.init() {
        error!("Node failed to initialize: {}", e);
        std::process::exit(1);
    }
    if let Err(e) = node.start() {
        error!("Node failed to start: {}", e);
    }

    block_on(node.run_until(Instant::from_millis(minutes * 60_000)));

    let stats = node.stats();
    info!("Simulation finished at {} ms", clock.millis());
    info!(
        "Cycles: {}, deadline misses: {}, sensor failures: {}, display failures: {}",
        stats.cycles, stats.deadline_misses, stats.sensor_failures, stats.display_failures
    );
    info!(
        "Sessions: {} successful, {} unsuccessful; activity {:?}, wireless {:?}",
        stats.sessions_ok,
        stats.sessions_failed,
        node.activity_state(),
        node.wireless_state()
    );
}
