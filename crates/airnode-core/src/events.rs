//! User-visible events and the indicator LED
//!
//! The orchestrator reports progress only through [`EventSink::dispatch`].
//! On the node, the sink is the sending half of [`INDICATOR_CHANNEL`] and a
//! separate task blinks the RGB LED for each event it receives.

use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, RawMutex};
use embassy_sync::channel::{Channel, Receiver, Sender};
use embedded_hal_async::delay::DelayNs;
use log::{error, warn};
use thiserror_no_std::Error;

/// Channel capacity for queued indicator events
pub const INDICATOR_CAPACITY: usize = 8;

/// Half period of one blink
pub const BLINK_INTERVAL_MS: u32 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    InitSuccess,
    InitError,
    StartupSuccess,
    StartupError,
    TaskSuccess,
    TaskWarning,
    TaskError,
    ConnectionEstablished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Red,
    Green,
    Blue,
    Yellow,
}

/// How an event is shown on the LED
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Indication {
    pub color: Color,
    pub blinks: u8,
}

impl Event {
    pub const fn indication(self) -> Indication {
        let (color, blinks) = match self {
            Self::InitSuccess => (Color::Green, 3),
            Self::InitError => (Color::Red, 3),
            Self::StartupSuccess => (Color::Green, 2),
            Self::StartupError => (Color::Red, 2),
            Self::TaskSuccess => (Color::Green, 1),
            Self::ConnectionEstablished => (Color::Blue, 1),
            Self::TaskWarning => (Color::Yellow, 1),
            Self::TaskError => (Color::Red, 1),
        };
        Indication { color, blinks }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorError {
    #[error("Indicator LED is not ready")]
    NotReady,
    #[error("Failed to drive the indicator LED (err {code})")]
    SetFailed { code: i32 },
}

/// Fire-and-forget event reporting.
pub trait EventSink {
    /// Prepare the sink. Called once during initialization.
    fn init(&mut self) -> Result<(), IndicatorError> {
        Ok(())
    }

    fn dispatch(&mut self, event: Event);
}

impl<M: RawMutex, const N: usize> EventSink for Sender<'_, M, Event, N> {
    fn dispatch(&mut self, event: Event) {
        if self.try_send(event).is_err() {
            warn!("Indicator queue full, dropping {:?}", event);
        }
    }
}

/// Global channel for indicator events
pub static INDICATOR_CHANNEL: Channel<CriticalSectionRawMutex, Event, INDICATOR_CAPACITY> =
    Channel::new();

/// Helper to get an indicator event sender
pub fn get_indicator_sender()
-> Sender<'static, CriticalSectionRawMutex, Event, INDICATOR_CAPACITY> {
    INDICATOR_CHANNEL.sender()
}

/// Helper to get an indicator event receiver
pub fn get_indicator_receiver()
-> Receiver<'static, CriticalSectionRawMutex, Event, INDICATOR_CAPACITY> {
    INDICATOR_CHANNEL.receiver()
}

/// An RGB status LED.
pub trait IndicatorLed {
    /// Light the LED with `color`, or switch it off with `None`.
    fn set(&mut self, color: Option<Color>) -> Result<(), IndicatorError>;
}

/// Blink the LED as described by `event`'s [`Indication`].
pub async fn show<L, D>(led: &mut L, delay: &mut D, event: Event) -> Result<(), IndicatorError>
where
    L: IndicatorLed,
    D: DelayNs,
{
    let indication = event.indication();
    for _ in 0..indication.blinks {
        led.set(Some(indication.color))?;
        delay.delay_ms(BLINK_INTERVAL_MS).await;
        led.set(None)?;
        delay.delay_ms(BLINK_INTERVAL_MS).await;
    }
    Ok(())
}

/// Indicator task: blink the LED for every event received.
pub async fn run_indicator<M, L, D, const N: usize>(
    receiver: Receiver<'_, M, Event, N>,
    mut led: L,
    mut delay: D,
) -> !
where
    M: RawMutex,
    L: IndicatorLed,
    D: DelayNs,
{
    loop {
        let event = receiver.receive().await;
        if let Err(e) = show(&mut led, &mut delay, event).await {
            error!("Failed to show {:?}: {}", event, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    #[derive(Default)]
    struct RecordingLed {
        states: Vec<Option<Color>>,
    }

    impl IndicatorLed for RecordingLed {
        fn set(&mut self, color: Option<Color>) -> Result<(), IndicatorError> {
            self.states.push(color);
            Ok(())
        }
    }

    struct NoDelay;

    impl DelayNs for NoDelay {
        async fn delay_ns(&mut self, _ns: u32) {}
    }

    #[test]
    fn test_blink_counts() {
        assert_eq!(Event::InitSuccess.indication().blinks, 3);
        assert_eq!(Event::StartupError.indication().blinks, 2);
        assert_eq!(
            Event::TaskWarning.indication(),
            Indication {
                color: Color::Yellow,
                blinks: 1
            }
        );
        assert_eq!(Event::ConnectionEstablished.indication().color, Color::Blue);
    }

    #[test]
    fn test_show_toggles_led() {
        let mut led = RecordingLed::default();
        embassy_futures::block_on(show(&mut led, &mut NoDelay, Event::StartupSuccess)).unwrap();

        assert_eq!(
            led.states,
            [Some(Color::Green), None, Some(Color::Green), None]
        );
    }

    #[test]
    fn test_channel_sink_drops_when_full() {
        let channel: Channel<CriticalSectionRawMutex, Event, 2> = Channel::new();
        let mut sink = channel.sender();

        sink.dispatch(Event::TaskSuccess);
        sink.dispatch(Event::TaskWarning);
        sink.dispatch(Event::TaskError);

        assert_eq!(channel.try_receive(), Ok(Event::TaskSuccess));
        assert_eq!(channel.try_receive(), Ok(Event::TaskWarning));
        assert!(channel.try_receive().is_err());
    }
}
