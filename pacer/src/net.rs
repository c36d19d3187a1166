//! Network transport for the replay stream.
//!
//! A single blocking TCP connection per session. Records go out one
//! `write_all` at a time with Nagle disabled, so each record leaves the host
//! as soon as it is written rather than being coalesced with the next one.

pub mod connection;
pub mod endpoint;

pub use connection::TcpConnection;
pub use endpoint::Endpoint;
