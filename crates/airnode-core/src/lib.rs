//! Hardware-independent core library for airnode
//!
//! This crate contains the duty-cycle orchestrator of the airnode
//! battery-powered environmental sensor: the activity (power) state machine,
//! the wireless session state machine, the measurement scheduler and the
//! rolling measurement buffers. Sensors, display, radio and indicator LEDs are
//! reached only through the traits in [`peripherals`], [`wireless`] and
//! [`events`].
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets and desktop hosts (for the simulator and tests).

#![no_std]

extern crate alloc;

pub mod activity;
pub mod battery;
pub mod config;
pub mod error;
pub mod events;
pub mod measurements;
pub mod metrics;
pub mod orchestrator;
pub mod peripherals;
pub mod scheduler;
pub mod timer;
pub mod wireless;

#[cfg(test)]
pub(crate) mod testing;
