//! Configuration for the pacing engine and replay sessions.
//!
//! Everything the engine needs is passed in explicitly; there is no global
//! state. Both structs deserialize with serde defaults, so a partial config
//! file only needs to name what differs.
//!
//! # Tolerance
//!
//! A send is reported as behind schedule when it lands later than
//! `tolerance_fraction * interval` past its deadline. Two presets exist:
//!
//! - [`PacingConfig::strict`]: 0.5 of an interval (default).
//! - [`PacingConfig::relaxed`]: 0.7 of an interval, for hosts with noisy
//!   schedulers where half an interval produces too many warnings.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clock::WaitStrategy;
use crate::format::FormatDescriptor;
use crate::handshake::HandshakeConfig;
use crate::topology::CpuConfig;

/// Plain-text end-of-stream marker understood by the controller-side receiver.
pub const DEFAULT_SENTINEL: &str = "SHUTDOWN";

/// Invalid configuration value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("rate must be a positive finite number of Hz, got {0}")]
    Rate(f64),
    #[error("tolerance fraction must be within [0, 1], got {0}")]
    Tolerance(f64),
    #[error("files_to_send must be at least 1")]
    NoFiles,
    #[error("sentinel must not be empty")]
    EmptySentinel,
}

/// Parameters of the paced transmitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    /// Target send rate in records per second.
    ///
    /// **Default**: 1000 Hz
    pub rate_hz: f64,

    /// Fraction of the send interval a record may land late before a
    /// schedule deviation is reported.
    ///
    /// **Default**: 0.5
    pub tolerance_fraction: f64,

    /// How the loop waits between records.
    ///
    /// **Default**: [`WaitStrategy::Spin`]
    pub wait: WaitStrategy,

    /// Message written after the last record, if any.
    ///
    /// **Default**: `Some("SHUTDOWN")`
    pub sentinel: Option<String>,

    /// CPU pinning for the thread that runs the pacing loop.
    ///
    /// **Default**: disabled
    pub cpu: CpuConfig,
}

impl PacingConfig {
    /// Default pacing with the 0.5 tolerance.
    #[must_use]
    pub fn strict() -> Self {
        Self::default()
    }

    /// Default pacing with the 0.7 tolerance.
    #[must_use]
    pub fn relaxed() -> Self {
        Self::default().with_tolerance_fraction(0.7)
    }

    /// Nominal gap between consecutive sends.
    ///
    /// Saturates at [`Duration::MAX`] for rates too slow to represent.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / self.rate_hz).unwrap_or(Duration::MAX)
    }

    /// Checks every field.
    ///
    /// # Errors
    ///
    /// Returns the first invalid field found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.rate_hz.is_finite() || self.rate_hz <= 0.0 {
            return Err(ConfigError::Rate(self.rate_hz));
        }
        if !(0.0..=1.0).contains(&self.tolerance_fraction) {
            return Err(ConfigError::Tolerance(self.tolerance_fraction));
        }
        if self.sentinel.as_deref() == Some("") {
            return Err(ConfigError::EmptySentinel);
        }
        Ok(())
    }

    #[must_use]
    pub const fn with_rate_hz(mut self, rate_hz: f64) -> Self {
        self.rate_hz = rate_hz;
        self
    }

    #[must_use]
    pub const fn with_tolerance_fraction(mut self, fraction: f64) -> Self {
        self.tolerance_fraction = fraction;
        self
    }

    #[must_use]
    pub const fn with_wait(mut self, wait: WaitStrategy) -> Self {
        self.wait = wait;
        self
    }

    #[must_use]
    pub fn with_sentinel(mut self, sentinel: Option<impl Into<String>>) -> Self {
        self.sentinel = sentinel.map(Into::into);
        self
    }

    #[must_use]
    pub const fn with_cpu(mut self, cpu: CpuConfig) -> Self {
        self.cpu = cpu;
        self
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            rate_hz: 1000.0,
            tolerance_fraction: 0.5,
            wait: WaitStrategy::Spin,
            sentinel: Some(DEFAULT_SENTINEL.to_owned()),
            cpu: CpuConfig::Disabled,
        }
    }
}

/// Full configuration of a replay session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Receiver host name or address.
    pub host: String,
    pub port: u16,

    /// Record layout shared with the receiver.
    ///
    /// **Default**: `<7d`
    pub format: FormatDescriptor,

    /// Number of datasets to send. When larger than the number of matching
    /// datasets, selection wraps around and sends them again in order.
    ///
    /// **Default**: 3
    pub files_to_send: usize,

    /// Only datasets whose name starts with this prefix are sent.
    pub filename_prefix: String,

    /// Pause between packing and connecting, giving the receiver time to
    /// come up.
    pub settle_delay: Duration,

    /// **Default**: 5s
    pub connect_timeout: Duration,

    /// Ready handshake awaited before streaming. `None` disables it.
    pub handshake: Option<HandshakeConfig>,

    pub pacing: PacingConfig,
}

impl ReplayConfig {
    /// Checks every field, including the pacing parameters.
    ///
    /// # Errors
    ///
    /// Returns the first invalid field found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.files_to_send == 0 {
            return Err(ConfigError::NoFiles);
        }
        self.pacing.validate()
    }

    #[must_use]
    pub fn with_endpoint(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: FormatDescriptor) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub const fn with_files_to_send(mut self, count: usize) -> Self {
        self.files_to_send = count;
        self
    }

    #[must_use]
    pub fn with_filename_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.filename_prefix = prefix.into();
        self
    }

    #[must_use]
    pub const fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    #[must_use]
    pub fn with_handshake(mut self, handshake: Option<HandshakeConfig>) -> Self {
        self.handshake = handshake;
        self
    }

    #[must_use]
    pub fn with_pacing(mut self, pacing: PacingConfig) -> Self {
        self.pacing = pacing;
        self
    }
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8080,
            format: FormatDescriptor::default(),
            files_to_send: 3,
            filename_prefix: String::new(),
            settle_delay: Duration::ZERO,
            connect_timeout: Duration::from_secs(5),
            handshake: None,
            pacing: PacingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_reference_receiver() {
        let config = ReplayConfig::default();
        assert_eq!(config.format.to_string(), "<7d");
        assert_eq!(config.format.record_len(), 56);
        assert_eq!(config.port, 8080);
        assert_eq!(config.pacing.rate_hz, 1000.0);
        assert_eq!(config.pacing.sentinel.as_deref(), Some(DEFAULT_SENTINEL));
        assert!(config.handshake.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn presets_differ_only_in_tolerance() {
        let strict = PacingConfig::strict();
        let relaxed = PacingConfig::relaxed();
        assert_eq!(strict.tolerance_fraction, 0.5);
        assert_eq!(relaxed.tolerance_fraction, 0.7);
        assert_eq!(strict.with_tolerance_fraction(0.7), relaxed);
    }

    #[test]
    fn interval_is_inverse_of_rate() {
        assert_eq!(PacingConfig::default().interval(), Duration::from_millis(1));
        assert_eq!(
            PacingConfig::default().with_rate_hz(10.0).interval(),
            Duration::from_millis(100)
        );
    }

    #[test]
    fn interval_saturates_for_vanishing_rates() {
        let config = PacingConfig::default().with_rate_hz(1e-20);
        assert!(config.validate().is_ok());
        assert_eq!(config.interval(), Duration::MAX);
    }

    #[test]
    fn rejects_bad_rates() {
        for rate in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            let err = PacingConfig::default().with_rate_hz(rate).validate().unwrap_err();
            assert!(matches!(err, ConfigError::Rate(_)), "{rate}");
        }
    }

    #[test]
    fn rejects_bad_tolerance() {
        for fraction in [-0.1, 1.5, f64::NAN] {
            let err = PacingConfig::default()
                .with_tolerance_fraction(fraction)
                .validate()
                .unwrap_err();
            assert!(matches!(err, ConfigError::Tolerance(_)), "{fraction}");
        }
    }

    #[test]
    fn rejects_zero_files_and_empty_sentinel() {
        assert_eq!(
            ReplayConfig::default().with_files_to_send(0).validate(),
            Err(ConfigError::NoFiles)
        );
        assert_eq!(
            PacingConfig::default().with_sentinel(Some("")).validate(),
            Err(ConfigError::EmptySentinel)
        );
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let config: ReplayConfig = serde_json::from_str(
            r#"{ "port": 9000, "format": "<iidddddddd", "pacing": { "rate_hz": 500.0 } }"#,
        )
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.format.record_len(), 72);
        assert_eq!(config.pacing.rate_hz, 500.0);
        assert_eq!(config.pacing.tolerance_fraction, 0.5);
        assert_eq!(config.files_to_send, 3);
    }

    #[test]
    fn malformed_format_fails_deserialization() {
        let result = serde_json::from_str::<ReplayConfig>(r#"{ "format": "<7x" }"#);
        assert!(result.is_err());
    }
}
