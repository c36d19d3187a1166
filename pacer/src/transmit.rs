//! Paced transmitter: streams encoded records at a fixed rate.
//!
//! # Pacing loop
//!
//! ```text
//! start = now()
//! for k in 0..n:
//!     write_all(record[k])            blocking
//!     wait_until(start + (k+1)·T)     spin or sleep-then-spin
//!     behind > tolerance ?  → warn, count deviation
//! flush
//! write_all(sentinel)                 optional
//! ```
//!
//! The first record goes out immediately; the wait after record `k` holds the
//! next write back until its slot, so `n` records occupy `n` intervals. A
//! late write eats into the slack of its own slot and is only reported when
//! the wait ends more than `tolerance_fraction · T` past the deadline.
//!
//! The first failed write aborts the run. Nothing is retried and records
//! after the failing one are never written.

mod schedule;

pub use schedule::{Schedule, ScheduleDeviation};

use std::io::{self, Write};
use std::time::Duration;

use thiserror::Error;

use crate::clock::{Clock, MonotonicClock, wait_until};
use crate::config::{ConfigError, PacingConfig};
use crate::encode::BinaryRecord;
use crate::trace::{debug, error, info, warn};

/// Fatal failure of a transmission run.
#[derive(Debug, Error)]
pub enum TransmissionError {
    #[error("failed to write record {index}")]
    Write {
        index: usize,
        #[source]
        source: io::Error,
    },
    #[error("failed to flush connection")]
    Flush(#[source] io::Error),
    #[error("failed to send end-of-stream sentinel")]
    Sentinel(#[source] io::Error),
}

impl TransmissionError {
    /// Index of the record whose write failed, if the failure was a record write.
    #[must_use]
    pub const fn record_index(&self) -> Option<usize> {
        match self {
            Self::Write { index, .. } => Some(*index),
            Self::Flush(_) | Self::Sentinel(_) => None,
        }
    }
}

/// Lifecycle of a [`PacedTransmitter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransmitState {
    /// Nothing sent yet.
    #[default]
    Idle,
    /// Records are going out.
    Sending,
    /// Every record and the sentinel were written.
    Completed,
    /// A write or flush failed.
    Failed,
}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransmitSummary {
    pub records_sent: usize,
    /// Record payload bytes, excluding the sentinel.
    pub bytes_sent: usize,
    /// From the start of the run until the sentinel was written.
    pub elapsed: Duration,
    /// Records that missed their deadline by more than the tolerance.
    pub deviations: usize,
    pub worst_deviation: Option<ScheduleDeviation>,
    pub sentinel_sent: bool,
}

/// Sends records over a connection at the configured rate.
#[derive(Debug)]
pub struct PacedTransmitter<C: Clock = MonotonicClock> {
    config: PacingConfig,
    clock: C,
    state: TransmitState,
}

impl PacedTransmitter {
    /// Creates a transmitter on the process monotonic clock.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` fails validation.
    pub fn new(config: PacingConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, MonotonicClock::new())
    }
}

impl<C: Clock> PacedTransmitter<C> {
    /// Creates a transmitter that reads time from `clock`.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` fails validation.
    pub fn with_clock(config: PacingConfig, clock: C) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            clock,
            state: TransmitState::Idle,
        })
    }

    #[must_use]
    pub const fn state(&self) -> TransmitState {
        self.state
    }

    #[must_use]
    pub const fn config(&self) -> &PacingConfig {
        &self.config
    }

    /// Streams `records` in order, then flushes and writes the sentinel.
    ///
    /// Blocks for roughly `records.len()` send intervals. An empty slice
    /// completes immediately, still sending the sentinel.
    ///
    /// # Errors
    ///
    /// Returns the first write, flush or sentinel failure. The transmitter
    /// is left in [`TransmitState::Failed`].
    pub fn transmit<W: Write + ?Sized>(
        &mut self,
        conn: &mut W,
        records: &[BinaryRecord],
    ) -> Result<TransmitSummary, TransmissionError> {
        self.state = TransmitState::Sending;
        let result = self.run(conn, records);
        self.state = match result {
            Ok(_) => TransmitState::Completed,
            Err(_) => TransmitState::Failed,
        };
        result
    }

    fn run<W: Write + ?Sized>(
        &self,
        conn: &mut W,
        records: &[BinaryRecord],
    ) -> Result<TransmitSummary, TransmissionError> {
        let start = self.clock.now();
        let schedule = Schedule::new(start, self.config.rate_hz, self.config.tolerance_fraction);

        info!(
            records = records.len(),
            rate_hz = self.config.rate_hz,
            interval_ns = schedule.interval().as_nanos() as u64,
            "transmission started"
        );

        let mut bytes_sent = 0;
        let mut deviations = 0;
        let mut worst: Option<ScheduleDeviation> = None;

        for (index, record) in records.iter().enumerate() {
            if let Err(source) = conn.write_all(record.as_bytes()) {
                error!(record = index, error = %source, "record write failed, aborting");
                return Err(TransmissionError::Write { index, source });
            }
            bytes_sent += record.len();

            let reached = wait_until(&self.clock, schedule.deadline(index), self.config.wait);
            if let Some(deviation) = schedule.deviation(index, reached) {
                warn!(
                    record = index,
                    behind_ns = deviation.behind.as_nanos() as u64,
                    tolerance_ns = deviation.tolerance.as_nanos() as u64,
                    "behind schedule"
                );
                deviations += 1;
                if worst.is_none_or(|w| deviation.behind > w.behind) {
                    worst = Some(deviation);
                }
            }
        }

        conn.flush().map_err(TransmissionError::Flush)?;

        let sentinel_sent = match self.config.sentinel.as_deref() {
            Some(sentinel) => {
                conn.write_all(sentinel.as_bytes())
                    .and_then(|()| conn.flush())
                    .map_err(TransmissionError::Sentinel)?;
                debug!(sentinel, "sentinel sent");
                true
            }
            None => false,
        };

        let elapsed = self.clock.now() - start;
        info!(
            records = records.len(),
            bytes = bytes_sent,
            elapsed_ms = elapsed.as_millis() as u64,
            deviations,
            "transmission completed"
        );

        Ok(TransmitSummary {
            records_sent: records.len(),
            bytes_sent,
            elapsed,
            deviations,
            worst_deviation: worst,
            sentinel_sent,
        })
    }
}
