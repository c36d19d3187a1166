//! CPU placement for the pacing thread.
//!
//! The pacing loop spins on the clock between sends. Pinning that thread to
//! a core keeps it from migrating mid-interval, which otherwise shows up as
//! sporadic schedule deviations. Pinning is opt-in.
//!
//! `Auto` picks the highest-numbered available core: core 0 usually carries
//! interrupt and housekeeping load. On single-core machines nothing is
//! pinned.

use core_affinity::CoreId;
use serde::{Deserialize, Serialize};

use crate::trace::{debug, warn};

/// CPU topology detected at runtime.
#[derive(Debug, Clone)]
pub struct CpuTopology {
    /// Total logical cores (including SMT siblings).
    pub logical_cores: usize,
    pub physical_cores: usize,
    pub has_smt: bool,
    /// Core IDs the process may be pinned to.
    pub available_cores: Vec<usize>,
}

impl CpuTopology {
    #[must_use]
    pub fn detect() -> Self {
        let logical_cores = num_cpus::get();
        let physical_cores = num_cpus::get_physical();
        let available_cores = core_affinity::get_core_ids()
            .map(|ids| ids.into_iter().map(|id| id.id).collect())
            .unwrap_or_else(|| (0..logical_cores).collect());

        Self {
            logical_cores,
            physical_cores,
            has_smt: logical_cores > physical_cores,
            available_cores,
        }
    }

    /// Core chosen by [`CpuConfig::Auto`], if pinning makes sense here.
    #[must_use]
    pub fn select_core(&self) -> Option<usize> {
        if self.available_cores.len() < 2 {
            return None;
        }
        self.available_cores.iter().copied().max()
    }
}

/// Pinning policy for the pacing thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CpuConfig {
    /// Leave placement to the OS.
    #[default]
    Disabled,
    /// Detect the topology and choose a core.
    Auto,
    /// Pin to this core ID.
    Manual(usize),
}

impl CpuConfig {
    /// Resolves the policy to a concrete core, `None` meaning unpinned.
    #[must_use]
    pub fn resolve(&self) -> Option<usize> {
        match *self {
            Self::Disabled => None,
            Self::Auto => CpuTopology::detect().select_core(),
            Self::Manual(core) => Some(core),
        }
    }
}

/// Pins the calling thread according to `config`.
///
/// Returns the core the thread ended up on, or `None` when pinning was
/// disabled or refused by the OS (logged, never fatal).
pub fn pin_current_thread(config: &CpuConfig) -> Option<usize> {
    let core_id = config.resolve()?;
    if pin_to_core(core_id) {
        debug!(core = core_id, "pacing thread pinned");
        Some(core_id)
    } else {
        warn!(core = core_id, "could not pin pacing thread, continuing unpinned");
        None
    }
}

/// Pins the current thread to `core_id`. Returns `false` if the OS refused.
pub fn pin_to_core(core_id: usize) -> bool {
    core_affinity::set_for_current(CoreId { id: core_id })
}
