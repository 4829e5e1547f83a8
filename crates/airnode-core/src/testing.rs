//! Test doubles shared by the unit tests

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Sender};
use embassy_time::{Duration, Instant};
use embedded_hal_async::delay::DelayNs;

use crate::activity::Action;
use crate::events::{Event, EventSink, IndicatorError};
use crate::measurements::{MeasurementBuffers, Variable};
use crate::peripherals::{
    Display, DisplayError, DisplayFrame, PeripheralError, PowerGate, SensorArray, SensorError,
    Subsystem,
};
use crate::timer::{Clock, DelayedWork, ScheduleStatus, TimerError, WorkTimer};
use crate::wireless::{
    ConnectionId, LinkControl, LinkError, SessionHandle, SessionObserver, WIRELESS_CAPACITY,
    WirelessEvent, WirelessEventReceiver,
};

pub type Shared<T> = Rc<RefCell<T>>;

pub fn at(ms: u64) -> Instant {
    Instant::from_millis(ms)
}

/// A fresh channel per test; leaked so it can be borrowed for `'static`.
pub fn leak_channel() -> &'static Channel<CriticalSectionRawMutex, WirelessEvent, WIRELESS_CAPACITY>
{
    Box::leak(Box::new(Channel::new()))
}

/// Millisecond clock shared between the clock, the delay and the sensors.
#[derive(Clone, Default)]
pub struct TestClock {
    pub now_ms: Rc<Cell<u64>>,
}

impl TestClock {
    pub fn advance(&self, ms: u64) {
        self.now_ms.set(self.now_ms.get() + ms);
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        Instant::from_millis(self.now_ms.get())
    }
}

/// Delay that advances the test clock instantly.
///
/// Link events queued in `air` are delivered into the wireless channel when
/// the clock reaches them, cutting the delay short like a real event would
/// wake the event loop.
pub struct TestDelay {
    pub clock: TestClock,
    pub air: Shared<VecDeque<(u64, WirelessEvent)>>,
    pub sender: Sender<'static, CriticalSectionRawMutex, WirelessEvent, WIRELESS_CAPACITY>,
}

impl TestDelay {
    fn sleep_ms(&mut self, ms: u64) {
        let target = self.clock.now_ms.get() + ms;
        let next = self.air.borrow().front().copied();
        match next {
            Some((when, event)) if when <= target => {
                self.air.borrow_mut().pop_front();
                self.clock.now_ms.set(when.max(self.clock.now_ms.get()));
                if self.sender.try_send(event).is_err() {
                    panic!("wireless channel full");
                }
            }
            _ => self.clock.now_ms.set(target),
        }
    }
}

impl DelayNs for TestDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.sleep_ms(u64::from(ns).div_ceil(1_000_000));
    }

    async fn delay_us(&mut self, us: u32) {
        self.sleep_ms(u64::from(us).div_ceil(1_000));
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.sleep_ms(u64::from(ms));
    }
}

/// Ordered log of every power action across all peripherals
pub type PowerLog = Shared<Vec<Action>>;

fn record(log: &PowerLog, action: Action) {
    log.borrow_mut().push(action);
}

pub struct MockFlash {
    pub power: PowerLog,
}

impl PowerGate for MockFlash {
    fn activate(&mut self) -> Result<(), PeripheralError> {
        record(&self.power, Action::Activate(Subsystem::Flash));
        Ok(())
    }

    fn suspend(&mut self) -> Result<(), PeripheralError> {
        record(&self.power, Action::Suspend(Subsystem::Flash));
        Ok(())
    }
}

/// Sensor array producing fixed readings.
pub struct MockSensors {
    pub power: PowerLog,
    pub clock: TestClock,
    /// Simulated read duration
    pub read_ms: u64,
    pub fail_init: bool,
    pub fail_read: Rc<Cell<bool>>,
    pub reads: Rc<Cell<u32>>,
}

impl MockSensors {
    pub const READINGS: [(Variable, f32); 6] = [
        (Variable::BatteryLevel, 90.0),
        (Variable::Temperature, 21.0),
        (Variable::Humidity, 45.0),
        (Variable::Pressure, 101_300.0),
        (Variable::Co2, 600.0),
        (Variable::VocIndex, 100.0),
    ];
}

impl PowerGate for MockSensors {
    fn activate(&mut self) -> Result<(), PeripheralError> {
        record(&self.power, Action::Activate(Subsystem::Sensors));
        Ok(())
    }

    fn suspend(&mut self) -> Result<(), PeripheralError> {
        record(&self.power, Action::Suspend(Subsystem::Sensors));
        Ok(())
    }
}

impl SensorArray for MockSensors {
    fn init(&mut self) -> Result<(), SensorError> {
        if self.fail_init {
            return Err(SensorError::InitializationFailed {
                sensor: "mock",
                details: "not detected",
            });
        }
        Ok(())
    }

    async fn read_all(&mut self, buffers: &mut MeasurementBuffers) -> Result<(), SensorError> {
        self.reads.set(self.reads.get() + 1);
        self.clock.advance(self.read_ms);

        if self.fail_read.get() {
            buffers.push_failure(&Variable::ALL);
            return Err(SensorError::Timeout {
                sensor: "mock",
                operation: "read measurement",
            });
        }
        for (variable, value) in Self::READINGS {
            buffers.push(variable, value);
        }
        Ok(())
    }
}

pub struct MockDisplay {
    pub power: PowerLog,
    pub frames: Shared<Vec<DisplayFrame>>,
    pub fail_render: bool,
}

impl PowerGate for MockDisplay {
    fn activate(&mut self) -> Result<(), PeripheralError> {
        record(&self.power, Action::Activate(Subsystem::Display));
        Ok(())
    }

    fn suspend(&mut self) -> Result<(), PeripheralError> {
        record(&self.power, Action::Suspend(Subsystem::Display));
        Ok(())
    }
}

impl Display for MockDisplay {
    fn init(&mut self) -> Result<(), DisplayError> {
        Ok(())
    }

    fn render(&mut self, frame: &DisplayFrame) -> Result<(), DisplayError> {
        self.frames.borrow_mut().push(*frame);
        if self.fail_render {
            return Err(DisplayError::RenderFailed {
                details: "bus error",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkCall {
    Enable,
    StartAdvertising(Duration),
    StopAdvertising,
    StartPairing(Duration),
    Disconnect(ConnectionId),
    RemoveBond(ConnectionId),
}

/// Radio stack that records every request.
#[derive(Default)]
pub struct MockLink {
    pub calls: Shared<Vec<LinkCall>>,
    pub bonded: bool,
    pub fail_enable: bool,
    pub fail_advertising: bool,
    pub fail_disconnect: bool,
}

impl MockLink {
    pub fn calls(&self) -> Vec<LinkCall> {
        self.calls.borrow().clone()
    }

    pub fn last(&self) -> Option<LinkCall> {
        self.calls.borrow().last().copied()
    }

    pub fn clear(&self) {
        self.calls.borrow_mut().clear();
    }

    fn record(&self, call: LinkCall) {
        self.calls.borrow_mut().push(call);
    }
}

fn failed(operation: &'static str) -> LinkError {
    LinkError::Failed {
        operation,
        code: -5,
    }
}

impl LinkControl for MockLink {
    fn enable(&mut self) -> Result<(), LinkError> {
        self.record(LinkCall::Enable);
        if self.fail_enable {
            return Err(failed("enable radio"));
        }
        Ok(())
    }

    fn start_advertising(&mut self, timeout: Duration) -> Result<(), LinkError> {
        self.record(LinkCall::StartAdvertising(timeout));
        if self.fail_advertising {
            return Err(failed("start advertising"));
        }
        Ok(())
    }

    fn stop_advertising(&mut self) -> Result<(), LinkError> {
        self.record(LinkCall::StopAdvertising);
        Ok(())
    }

    fn start_pairing(&mut self, timeout: Duration) -> Result<(), LinkError> {
        self.record(LinkCall::StartPairing(timeout));
        Ok(())
    }

    fn disconnect(&mut self, handle: &SessionHandle) -> Result<(), LinkError> {
        self.record(LinkCall::Disconnect(handle.id()));
        if self.fail_disconnect {
            return Err(failed("disconnect"));
        }
        Ok(())
    }

    fn remove_bond(&mut self, handle: &SessionHandle) -> Result<(), LinkError> {
        self.record(LinkCall::RemoveBond(handle.id()));
        Ok(())
    }

    fn has_bonded_peers(&self) -> bool {
        self.bonded
    }
}

#[derive(Debug, Default)]
pub struct RecordingObserver {
    pub connections: u32,
    pub sessions: Vec<bool>,
    pub attempts: Vec<bool>,
    pub pairings: Vec<bool>,
}

impl SessionObserver for RecordingObserver {
    fn connection_established(&mut self) {
        self.connections += 1;
    }

    fn session_complete(&mut self, success: bool) {
        self.sessions.push(success);
    }

    fn pairing_attempt(&mut self, success: bool) {
        self.attempts.push(success);
    }

    fn pairing_finished(&mut self, bonded: bool) {
        self.pairings.push(bonded);
    }
}

pub struct MockIndicator {
    pub events: Shared<Vec<Event>>,
    pub fail_init: bool,
}

impl EventSink for MockIndicator {
    fn init(&mut self) -> Result<(), IndicatorError> {
        if self.fail_init {
            return Err(IndicatorError::NotReady);
        }
        Ok(())
    }

    fn dispatch(&mut self, event: Event) {
        self.events.borrow_mut().push(event);
    }
}

/// Delayed work that starts rejecting schedules after `accept` successes.
pub struct FlakyTimer {
    pub inner: DelayedWork,
    pub accept: Option<u32>,
}

impl WorkTimer for FlakyTimer {
    fn schedule(&mut self, now: Instant, delay: Duration) -> Result<ScheduleStatus, TimerError> {
        if let Some(remaining) = self.accept.as_mut() {
            if *remaining == 0 {
                return Err(TimerError::Overflow);
            }
            *remaining -= 1;
        }
        self.inner.schedule(now, delay)
    }

    fn cancel(&mut self) -> bool {
        self.inner.cancel()
    }

    fn deadline(&self) -> Option<Instant> {
        self.inner.deadline()
    }

    fn take_expired(&mut self, now: Instant) -> bool {
        self.inner.take_expired(now)
    }
}

/// Receiver half of a leaked test channel
pub fn receiver_of(
    channel: &'static Channel<CriticalSectionRawMutex, WirelessEvent, WIRELESS_CAPACITY>,
) -> WirelessEventReceiver<'static> {
    channel.receiver()
}
