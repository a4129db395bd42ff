//! Live counters an operator CLI would read (`original_source/UMTSCLI.cpp`);
//! the CLI itself is out of scope (§1(e)) but the counters are ambient
//! observability this core still owns.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct RncStats {
    pub ues_idle: AtomicU64,
    pub ues_cell_fach: AtomicU64,
    pub ues_cell_dch: AtomicU64,
    pub rabs_allocated: AtomicU64,
    pub rlc_resets: AtomicU64,
    pub rlc_stopped: AtomicU64,
    pub mac_tfc_selection_failures: AtomicU64,
    pub rrc_connection_setups: AtomicU64,
    pub rrc_connection_releases: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StatsSnapshot {
    pub ues_idle: u64,
    pub ues_cell_fach: u64,
    pub ues_cell_dch: u64,
    pub rabs_allocated: u64,
    pub rlc_resets: u64,
    pub rlc_stopped: u64,
    pub mac_tfc_selection_failures: u64,
    pub rrc_connection_setups: u64,
    pub rrc_connection_releases: u64,
}

impl RncStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            ues_idle: self.ues_idle.load(Ordering::Relaxed),
            ues_cell_fach: self.ues_cell_fach.load(Ordering::Relaxed),
            ues_cell_dch: self.ues_cell_dch.load(Ordering::Relaxed),
            rabs_allocated: self.rabs_allocated.load(Ordering::Relaxed),
            rlc_resets: self.rlc_resets.load(Ordering::Relaxed),
            rlc_stopped: self.rlc_stopped.load(Ordering::Relaxed),
            mac_tfc_selection_failures: self.mac_tfc_selection_failures.load(Ordering::Relaxed),
            rrc_connection_setups: self.rrc_connection_setups.load(Ordering::Relaxed),
            rrc_connection_releases: self.rrc_connection_releases.load(Ordering::Relaxed),
        }
    }

    pub fn record_rlc_reset(&self) {
        self.rlc_resets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rlc_stopped(&self) {
        self.rlc_stopped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tfc_selection_failure(&self) {
        self.mac_tfc_selection_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_setup(&self) {
        self.rrc_connection_setups.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_release(&self) {
        self.rrc_connection_releases.fetch_add(1, Ordering::Relaxed);
    }
}
