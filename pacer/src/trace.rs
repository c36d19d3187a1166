//! Logging facade for the replay engine.
//!
//! Events go through `tracing` when the `tracing` feature is enabled (the
//! default). With the feature off every macro expands to nothing, so the
//! pacing loop carries no logging cost at all.
//!
//! Only `pacer=...` targets are enabled unless `RUST_LOG` says otherwise.
//! The pacing thread is named (see [`PACING_THREAD_NAME`]) and the subscriber
//! prints thread names, so records paced off the caller's thread stay
//! attributable.
//!
//! [`PACING_THREAD_NAME`]: crate::session::PACING_THREAD_NAME

/// Filter used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_DIRECTIVE: &str = "pacer=info";

/// Installs the replay subscriber with the [`DEFAULT_DIRECTIVE`] fallback.
#[cfg(feature = "tracing")]
pub fn init_tracing() {
    init_tracing_with(DEFAULT_DIRECTIVE);
}

/// Installs a fmt subscriber printing replay events with uptime stamps.
///
/// `RUST_LOG` wins over `directive`. An unparsable `directive` falls back to
/// [`DEFAULT_DIRECTIVE`].
///
/// Returns `false` when a global subscriber was already installed, in which
/// case nothing changes.
#[cfg(feature = "tracing")]
pub fn init_tracing_with(directive: &str) -> bool {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directive))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    let layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(fmt::time::uptime());

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()
        .is_ok()
}

#[cfg(not(feature = "tracing"))]
pub const fn init_tracing() {}

#[cfg(not(feature = "tracing"))]
pub const fn init_tracing_with(_directive: &str) -> bool {
    false
}

#[cfg(feature = "tracing")]
pub(crate) use tracing::{debug, error, info, warn};

#[cfg(not(feature = "tracing"))]
macro_rules! noop {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
pub(crate) use noop as debug;
#[cfg(not(feature = "tracing"))]
pub(crate) use noop as error;
#[cfg(not(feature = "tracing"))]
pub(crate) use noop as info;
#[cfg(not(feature = "tracing"))]
pub(crate) use noop as warn;
