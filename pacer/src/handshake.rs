//! Receiver ready acknowledgment.
//!
//! Some receivers announce that their input buffer is ready with a plain-text
//! `BUFFER_READY:<label>` message before they can take data. When a session
//! has a [`HandshakeConfig`], it waits for that message once, right after
//! connecting and before the first record. Sessions have no handshake by
//! default.
//!
//! Messages may arrive split across reads. A newline-terminated line is
//! judged as soon as it is complete. Text without a newline is only accepted
//! once nothing more can follow it: the peer closed its side, or the read
//! timed out with exactly the expected message buffered. Any other complete
//! line, or buffered text that can no longer become the expected message, is
//! rejected.

use std::io::{self, ErrorKind, Read};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::trace::debug;

pub const BUFFER_READY_PREFIX: &str = "BUFFER_READY:";

/// Upper bound on buffered handshake text before giving up on the peer.
const MAX_MESSAGE_LEN: usize = 1024;

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("handshake read failed")]
    Io(#[source] io::Error),
    #[error("connection closed before the receiver was ready")]
    Closed,
    #[error("unexpected handshake message {0:?}")]
    Unexpected(String),
    #[error("timed out waiting for the receiver to become ready")]
    Timeout,
}

impl From<io::Error> for HandshakeError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            ErrorKind::WouldBlock | ErrorKind::TimedOut => Self::Timeout,
            _ => Self::Io(e),
        }
    }
}

/// Ready handshake parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandshakeConfig {
    /// Label the receiver names in its ready message.
    pub label: String,

    /// How long to wait for the message.
    ///
    /// **Default**: 5s
    pub timeout: Duration,
}

impl HandshakeConfig {
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            label: String::new(),
            timeout: Duration::from_secs(5),
        }
    }
}

/// The message a receiver sends once `label` is ready.
#[must_use]
pub fn buffer_ready_message(label: &str) -> String {
    format!("{BUFFER_READY_PREFIX}{label}")
}

/// Blocks until `reader` yields `BUFFER_READY:<label>`.
///
/// Read timeouts configured on the underlying socket surface as
/// [`HandshakeError::Timeout`].
///
/// # Errors
///
/// Returns an error if the peer closes the connection, sends anything else,
/// or the read fails or times out.
pub fn await_buffer_ready<R: Read + ?Sized>(reader: &mut R, label: &str) -> Result<(), HandshakeError> {
    let expected = buffer_ready_message(label);
    let limit = MAX_MESSAGE_LEN.max(expected.len() + 2);
    let mut pending = String::new();
    let mut chunk = [0u8; 256];

    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) if pending.trim() == expected => {
                debug!(label, "receiver ready at end of stream");
                return Ok(());
            }
            Ok(0) => return Err(HandshakeError::Closed),
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                let err = HandshakeError::from(e);
                if matches!(err, HandshakeError::Timeout) && pending.trim() == expected {
                    debug!(label, "receiver ready, no terminator");
                    return Ok(());
                }
                return Err(err);
            }
        };
        pending.push_str(&String::from_utf8_lossy(&chunk[..n]));

        while let Some(end) = pending.find('\n') {
            let line: String = pending.drain(..=end).collect();
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line == expected {
                debug!(label, "receiver ready");
                return Ok(());
            }
            return Err(HandshakeError::Unexpected(line.to_owned()));
        }

        // A complete message may still grow into a longer label, so it waits
        // for its terminator like any other prefix.
        let partial = pending.trim_start();
        let viable = expected.starts_with(partial)
            || partial
                .strip_prefix(expected.as_str())
                .is_some_and(|rest| rest.trim().is_empty());
        if !viable || pending.len() > limit {
            return Err(HandshakeError::Unexpected(partial.to_owned()));
        }
    }
}
