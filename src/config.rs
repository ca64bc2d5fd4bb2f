// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Tunables for hardware polling, job timeouts and core topology.

/// Driver configuration, supplied by the host at bring-up.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Config {
    /// Number of iterations for polls which are expected to finish quickly: core resets, bus
    /// stops, MMU stall and reset.
    pub poll_count_fast: u32,
    /// Number of iterations for polls which may take a while, i.e. PMU commands.
    pub poll_count_slow: u32,
    /// Number of iterations to wait for the L2 cache command handler to become idle.
    pub l2_busy_poll_count: u32,
    /// Limit of outstanding L2 cache read requests.
    pub l2_max_reads: u32,
    /// Watchdog for a single job, in milliseconds.
    pub max_job_runtime_ms: u32,
    /// Maximum number of PP cores to use from the first PP core group (PP0-PP3).
    pub max_pp_cores_group_1: u32,
    /// Maximum number of PP cores to use from the second PP core group (PP4-PP7).
    pub max_pp_cores_group_2: u32,
    /// Delay the PMU inserts between switching successive power domains.
    pub pmu_switch_delay: u32,
    /// PMU domain mask. Zero means detect it from the number of cores found.
    pub pmu_mask: u32,
}

impl Config {
    /// The default configuration.
    pub const DEFAULT: Self = Self {
        poll_count_fast: 1000,
        poll_count_slow: 1_000_000,
        l2_busy_poll_count: 100_000,
        l2_max_reads: 0x1C,
        max_job_runtime_ms: 4000,
        max_pp_cores_group_1: 0xFF,
        max_pp_cores_group_2: 0xFF,
        pmu_switch_delay: 0xFF,
        pmu_mask: 0,
    };
}

impl Default for Config {
    fn default() -> Self {
        Self::DEFAULT
    }
}
