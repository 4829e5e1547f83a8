//! Node configuration
//!
//! Stored as a postcard blob so it can live in a flash partition next to the
//! bonding keys.

use alloc::vec::Vec;

use embassy_time::Duration;
use log::error;
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use crate::timer::MAX_DELAY;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("At least one measurement per advertisement interval is required")]
    NoMeasurements,
    #[error("Advertisement interval of {interval_ms} ms is too short for {measurements} measurements")]
    IntervalTooShort { interval_ms: u32, measurements: u16 },
    #[error("Sensor warm-up of {warmup_ms} ms does not fit in a {budget_ms} ms measurement interval")]
    WarmupTooLong { warmup_ms: u32, budget_ms: u32 },
    #[error("{name} must be non-zero")]
    ZeroTimeout { name: &'static str },
    #[error("{name} of {delay_ms} ms exceeds the longest schedulable delay")]
    DelayTooLong { name: &'static str, delay_ms: u64 },
    #[error("Malformed configuration blob")]
    Decode,
    #[error("Failed to encode configuration")]
    Encode,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// One wireless session is started per interval.
    pub advertisement_interval_ms: u32,
    /// Measurement cycles per advertisement interval; also the buffer capacity.
    pub measurements_per_interval: u16,
    /// Upper bound on one advertising or connected session.
    pub session_timeout_ms: u32,
    /// Upper bound on a pairing window.
    pub pairing_timeout_ms: u32,
    /// Settling time after the sensors are powered.
    pub sensor_warmup_ms: u32,
    /// Delay between a successful init and the first cycle.
    pub first_cycle_delay_ms: u32,
    pub display_enabled: bool,
    /// Enter pairing mode on startup when no peer is bonded.
    pub pair_when_unbonded: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            advertisement_interval_ms: 300_000,
            measurements_per_interval: 5,
            session_timeout_ms: 10_000,
            pairing_timeout_ms: 60_000,
            sensor_warmup_ms: 5_000,
            first_cycle_delay_ms: 1_000,
            display_enabled: true,
            pair_when_unbonded: true,
        }
    }
}

impl Config {
    /// Period of one measurement cycle.
    pub fn measurement_interval(&self) -> Duration {
        let per_cycle = self.advertisement_interval_ms / u32::from(self.measurements_per_interval.max(1));
        Duration::from_millis(u64::from(per_cycle))
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.session_timeout_ms))
    }

    pub fn pairing_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.pairing_timeout_ms))
    }

    pub fn sensor_warmup(&self) -> Duration {
        Duration::from_millis(u64::from(self.sensor_warmup_ms))
    }

    pub fn first_cycle_delay(&self) -> Duration {
        Duration::from_millis(u64::from(self.first_cycle_delay_ms))
    }

    /// Buffer capacity, equal to the measurements per interval.
    pub fn buffer_capacity(&self) -> usize {
        usize::from(self.measurements_per_interval)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.measurements_per_interval == 0 {
            return Err(ConfigError::NoMeasurements);
        }
        if self.advertisement_interval_ms < u32::from(self.measurements_per_interval) {
            return Err(ConfigError::IntervalTooShort {
                interval_ms: self.advertisement_interval_ms,
                measurements: self.measurements_per_interval,
            });
        }

        let budget_ms = self.measurement_interval().as_millis();
        if u64::from(self.sensor_warmup_ms) > budget_ms {
            return Err(ConfigError::WarmupTooLong {
                warmup_ms: self.sensor_warmup_ms,
                budget_ms: u32::try_from(budget_ms).unwrap_or(u32::MAX),
            });
        }

        if self.session_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout {
                name: "session_timeout_ms",
            });
        }
        if self.pairing_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout {
                name: "pairing_timeout_ms",
            });
        }

        let delays = [
            ("measurement interval", self.measurement_interval()),
            ("first_cycle_delay_ms", self.first_cycle_delay()),
            ("session_timeout_ms", self.session_timeout()),
            ("pairing_timeout_ms", self.pairing_timeout()),
        ];
        for (name, delay) in delays {
            if delay > MAX_DELAY {
                return Err(ConfigError::DelayTooLong {
                    name,
                    delay_ms: delay.as_millis(),
                });
            }
        }
        Ok(())
    }

    /// Decode and validate a stored configuration.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config: Self = postcard::from_bytes(bytes).map_err(|e| {
            error!("Config decode failed: {}", e);
            ConfigError::Decode
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ConfigError> {
        postcard::to_allocvec(self).map_err(|e| {
            error!("Config encode failed: {}", e);
            ConfigError::Encode
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.measurement_interval(), Duration::from_millis(60_000));
        assert_eq!(config.buffer_capacity(), 5);
    }

    #[test]
    fn test_validation() {
        let zero_k = Config {
            measurements_per_interval: 0,
            ..Config::default()
        };
        assert_eq!(zero_k.validate(), Err(ConfigError::NoMeasurements));

        let short_interval = Config {
            advertisement_interval_ms: 4,
            ..Config::default()
        };
        assert!(matches!(
            short_interval.validate(),
            Err(ConfigError::IntervalTooShort { .. })
        ));

        let long_warmup = Config {
            sensor_warmup_ms: 70_000,
            ..Config::default()
        };
        assert_eq!(
            long_warmup.validate(),
            Err(ConfigError::WarmupTooLong {
                warmup_ms: 70_000,
                budget_ms: 60_000
            })
        );

        let no_session = Config {
            session_timeout_ms: 0,
            ..Config::default()
        };
        assert!(matches!(
            no_session.validate(),
            Err(ConfigError::ZeroTimeout { .. })
        ));
    }

    #[test]
    fn test_delays_must_be_schedulable() {
        // 90 h / 3 = 30 h per cycle
        let long_interval = Config {
            advertisement_interval_ms: 324_000_000,
            measurements_per_interval: 3,
            ..Config::default()
        };
        assert_eq!(
            long_interval.validate(),
            Err(ConfigError::DelayTooLong {
                name: "measurement interval",
                delay_ms: 108_000_000
            })
        );

        let one_day = Config {
            advertisement_interval_ms: 86_400_000,
            measurements_per_interval: 1,
            first_cycle_delay_ms: 86_400_000,
            ..Config::default()
        };
        assert_eq!(one_day.validate(), Ok(()));

        let late_start = Config {
            first_cycle_delay_ms: 86_400_001,
            ..Config::default()
        };
        assert!(matches!(
            late_start.validate(),
            Err(ConfigError::DelayTooLong {
                name: "first_cycle_delay_ms",
                ..
            })
        ));

        for config in [
            Config {
                session_timeout_ms: 90_000_000,
                ..Config::default()
            },
            Config {
                pairing_timeout_ms: u32::MAX,
                ..Config::default()
            },
        ] {
            assert!(matches!(
                config.validate(),
                Err(ConfigError::DelayTooLong { .. })
            ));
        }
    }

    #[test]
    fn test_stored_config_is_validated() {
        let config = Config {
            measurements_per_interval: 3,
            display_enabled: false,
            ..Config::default()
        };
        let bytes = config.to_bytes().unwrap();
        assert_eq!(Config::from_bytes(&bytes), Ok(config));

        let invalid = Config {
            measurements_per_interval: 0,
            ..Config::default()
        };
        let bytes = invalid.to_bytes().unwrap();
        assert_eq!(Config::from_bytes(&bytes), Err(ConfigError::NoMeasurements));

        assert_eq!(Config::from_bytes(&[0xff]), Err(ConfigError::Decode));
    }
}
