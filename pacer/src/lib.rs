//! Rate-paced replay of tabular samples as fixed-layout binary records.
//!
//! Rows handed over by a tabular reader are cast to a declared record layout
//! (see [`FormatDescriptor`]), packed into [`BinaryRecord`]s and streamed
//! over TCP at a fixed rate, one record per interval, followed by a plain-text
//! end-of-stream sentinel. The receiver is typically a motion controller
//! sampling the stream at the same rate.
//!
//! - [`format`] / [`encode`]: layout parsing and row encoding.
//! - [`transmit`]: the pacing loop, independent of the transport.
//! - [`session`]: the end-to-end replay ([`Replay::run`]).

pub mod clock;
pub mod config;
pub mod encode;
pub mod format;
pub mod handshake;
pub mod net;
pub mod row;
pub mod session;
pub mod topology;
pub mod transmit;

mod trace;

pub use trace::{DEFAULT_DIRECTIVE, init_tracing, init_tracing_with};

pub use clock::{Clock, MonotonicClock, WaitStrategy};
pub use config::{ConfigError, DEFAULT_SENTINEL, PacingConfig, ReplayConfig};
pub use encode::{BinaryRecord, EncodeOutcome, RowConversionError, RowEncoder};
pub use format::{ByteOrder, FieldType, FormatDescriptor, FormatError};
pub use handshake::{HandshakeConfig, HandshakeError};
pub use net::{Endpoint, TcpConnection};
pub use row::{Dataset, Row, Value};
pub use session::{PACING_THREAD_NAME, Packed, Replay, ReplayError, ReplayReport};
pub use topology::CpuConfig;
pub use transmit::{
    PacedTransmitter, ScheduleDeviation, TransmissionError, TransmitState, TransmitSummary,
};
