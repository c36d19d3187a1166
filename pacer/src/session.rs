//! Replay session: select datasets, pack them, stream them to a receiver.
//!
//! # Flow
//!
//! ```text
//! datasets ──select──> prefix filter, circular reuse up to files_to_send
//!          ──pack────> Vec<BinaryRecord> (bad rows logged and dropped)
//!          ──connect─> TcpConnection (TCP_NODELAY)
//!          ──send────> [BUFFER_READY handshake] → paced records → sentinel
//!                      (on a pinned `pacer-tx` thread when pinning is on)
//!          ──close───> always, also after a failure
//! ```
//!
//! Everything is packed before the connection is opened, so encoding cost
//! never competes with the pacing loop.
//!
//! # Example
//!
//! ```no_run
//! use pacer::{Dataset, Replay, ReplayConfig, Value};
//!
//! let datasets = vec![Dataset::from_values(
//!     "run_01.csv",
//!     vec![vec![Value::Float(0.1); 7], vec![Value::Float(0.2); 7]],
//! )];
//!
//! let replay = Replay::new(ReplayConfig::default().with_filename_prefix("run_"))?;
//! let report = replay.run(&datasets)?;
//! println!("sent {} records", report.transmit.records_sent);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::io::{self, Read, Write};
use std::panic;
use std::thread;

use thiserror::Error;

use crate::config::{ConfigError, ReplayConfig};
use crate::encode::{BinaryRecord, EncodeOutcome, RowConversionError, RowEncoder};
use crate::handshake::{HandshakeError, await_buffer_ready};
use crate::net::{Endpoint, TcpConnection};
use crate::row::Dataset;
use crate::topology::{CpuConfig, pin_current_thread};
use crate::trace::{info, warn};
use crate::transmit::{PacedTransmitter, TransmissionError, TransmitSummary};

/// Name of the thread the pacing loop runs on when CPU pinning is enabled.
pub const PACING_THREAD_NAME: &str = "pacer-tx";

/// Error running a replay.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// The configuration failed validation.
    #[error("invalid configuration")]
    Config(#[from] ConfigError),
    /// No dataset matched the filename prefix.
    #[error("no dataset name starts with {prefix:?}")]
    NoInput { prefix: String },
    /// The receiver host did not resolve.
    #[error("failed to resolve {host}:{port}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },
    /// The TCP connection could not be established.
    #[error("failed to connect to {endpoint}")]
    Connect {
        endpoint: Endpoint,
        #[source]
        source: io::Error,
    },
    /// The receiver never announced it was ready.
    #[error("receiver handshake failed")]
    Handshake(#[from] HandshakeError),
    /// The pacing loop aborted.
    #[error("transmission failed")]
    Transmission(#[from] TransmissionError),
    /// The pinned pacing thread could not be started.
    #[error("failed to spawn the pacing thread")]
    Spawn(#[source] io::Error),
}

/// Records packed from the selected datasets, ready to stream.
#[derive(Debug, Default)]
pub struct Packed {
    /// Names of the datasets in the order they were packed. A dataset
    /// appears more than once when selection wrapped around.
    pub files: Vec<String>,
    pub records: Vec<BinaryRecord>,
    pub failures: Vec<RowConversionError>,
    /// Blank rows dropped without error.
    pub skipped: usize,
}

impl Packed {
    /// Total bytes the records will put on the wire, sentinel excluded.
    #[must_use]
    pub fn payload_len(&self) -> usize {
        self.records.iter().map(BinaryRecord::len).sum()
    }
}

/// Outcome of a successful [`Replay::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayReport {
    pub files: Vec<String>,
    pub packed_records: usize,
    pub conversion_failures: usize,
    pub skipped_rows: usize,
    pub transmit: TransmitSummary,
}

/// A configured replay. Cheap to keep around and run repeatedly.
#[derive(Debug, Clone)]
pub struct Replay {
    config: ReplayConfig,
    encoder: RowEncoder,
}

impl Replay {
    /// Validates `config` and prepares the row encoder.
    ///
    /// # Errors
    ///
    /// Returns the first invalid configuration field.
    pub fn new(config: ReplayConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let encoder = RowEncoder::new(config.format.clone());
        Ok(Self { config, encoder })
    }

    /// Returns the validated configuration.
    #[must_use]
    pub const fn config(&self) -> &ReplayConfig {
        &self.config
    }

    /// Picks `files_to_send` datasets whose name starts with the configured
    /// prefix, wrapping around when fewer match.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::NoInput`] if no dataset matches.
    pub fn select<'a>(&self, datasets: &'a [Dataset]) -> Result<Vec<&'a Dataset>, ReplayError> {
        let prefix = self.config.filename_prefix.as_str();
        let matching: Vec<&Dataset> = datasets.iter().filter(|d| d.name.starts_with(prefix)).collect();
        if matching.is_empty() {
            return Err(ReplayError::NoInput {
                prefix: prefix.to_owned(),
            });
        }

        Ok(matching
            .iter()
            .cycle()
            .take(self.config.files_to_send)
            .copied()
            .collect())
    }

    /// Selects and encodes datasets, concatenating their records in order.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::NoInput`] if no dataset matches.
    pub fn pack(&self, datasets: &[Dataset]) -> Result<Packed, ReplayError> {
        let selected = self.select(datasets)?;
        info!(
            files = selected.len(),
            format = %self.config.format,
            "packing datasets"
        );

        let mut files = Vec::with_capacity(selected.len());
        let mut outcome = EncodeOutcome::default();
        for dataset in selected {
            files.push(dataset.name.clone());
            outcome.extend(self.encoder.encode_dataset(dataset));
        }
        let packed = Packed {
            files,
            records: outcome.records,
            failures: outcome.failures,
            skipped: outcome.skipped,
        };

        info!(
            records = packed.records.len(),
            bytes = packed.payload_len(),
            failures = packed.failures.len(),
            skipped = packed.skipped,
            "packing complete"
        );
        Ok(packed)
    }

    /// Streams packed records over an established connection.
    ///
    /// Waits for the receiver's ready message first when a handshake is
    /// configured.
    ///
    /// Without CPU pinning the records are paced on the calling thread. With
    /// pinning they are paced on a scoped [`PACING_THREAD_NAME`] thread that
    /// is pinned and joined before returning, so the caller's affinity is
    /// left untouched.
    ///
    /// # Errors
    ///
    /// Returns a handshake, spawn or transmission failure.
    pub fn send<W: Read + Write + Send + ?Sized>(
        &self,
        conn: &mut W,
        packed: &Packed,
    ) -> Result<TransmitSummary, ReplayError> {
        if let Some(handshake) = &self.config.handshake {
            info!(label = %handshake.label, "waiting for receiver");
            await_buffer_ready(conn, &handshake.label)?;
        }

        let mut transmitter = PacedTransmitter::new(self.config.pacing.clone())?;
        let cpu = self.config.pacing.cpu;
        if cpu == CpuConfig::Disabled {
            return Ok(transmitter.transmit(conn, &packed.records)?);
        }

        thread::scope(|s| -> Result<TransmitSummary, ReplayError> {
            let handle = thread::Builder::new()
                .name(PACING_THREAD_NAME.into())
                .spawn_scoped(s, || {
                    pin_current_thread(&cpu);
                    transmitter.transmit(conn, &packed.records)
                })
                .map_err(ReplayError::Spawn)?;
            match handle.join() {
                Ok(summary) => Ok(summary?),
                Err(payload) => panic::resume_unwind(payload),
            }
        })
    }

    /// Packs, connects, sends and closes.
    ///
    /// The connection is shut down whether or not sending succeeded.
    ///
    /// # Errors
    ///
    /// Returns the first failure. Row conversion failures are not errors;
    /// they are counted in the report.
    pub fn run(&self, datasets: &[Dataset]) -> Result<ReplayReport, ReplayError> {
        let packed = self.pack(datasets)?;

        if !self.config.settle_delay.is_zero() {
            std::thread::sleep(self.config.settle_delay);
        }

        let mut conn = self.connect()?;
        let result = self.prepare(&conn).and_then(|()| self.send(&mut conn, &packed));
        if let Err(e) = conn.shutdown() {
            warn!(peer = %conn.peer(), error = %e, "failed to close connection");
        }
        let transmit = result?;

        Ok(ReplayReport {
            files: packed.files,
            packed_records: packed.records.len(),
            conversion_failures: packed.failures.len(),
            skipped_rows: packed.skipped,
            transmit,
        })
    }

    fn connect(&self) -> Result<TcpConnection, ReplayError> {
        let ReplayConfig { host, port, .. } = &self.config;
        let endpoint = Endpoint::resolve(host, *port).map_err(|source| ReplayError::Resolve {
            host: host.clone(),
            port: *port,
            source,
        })?;
        TcpConnection::connect(endpoint, self.config.connect_timeout)
            .map_err(|source| ReplayError::Connect { endpoint, source })
    }

    fn prepare(&self, conn: &TcpConnection) -> Result<(), ReplayError> {
        if let Some(handshake) = &self.config.handshake {
            let timeout = (!handshake.timeout.is_zero()).then_some(handshake.timeout);
            conn.set_read_timeout(timeout).map_err(HandshakeError::Io)?;
        }
        Ok(())
    }
}
