// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! State shared by every unit of one GPU instance.

use crate::{
    config::Config,
    platform::DeferredWork,
    scheduler::{JobIdAllocator, Scheduler},
};
use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use mali_regs::NO_COUNTER;

/// Performance counter sources used for jobs which don't select their own.
#[derive(Debug)]
pub struct DefaultCounters {
    src0: AtomicU32,
    src1: AtomicU32,
}

impl DefaultCounters {
    /// Creates a selection with both counters disabled.
    pub const fn new() -> Self {
        Self {
            src0: AtomicU32::new(NO_COUNTER),
            src1: AtomicU32::new(NO_COUNTER),
        }
    }

    /// Returns the sources of counters 0 and 1.
    pub fn get(&self) -> (u32, u32) {
        (
            self.src0.load(Ordering::Relaxed),
            self.src1.load(Ordering::Relaxed),
        )
    }

    /// Selects the source of counter 0, or disables it with [`NO_COUNTER`].
    pub fn set_src0(&self, source: u32) {
        self.src0.store(source, Ordering::Relaxed);
    }

    /// Selects the source of counter 1, or disables it with [`NO_COUNTER`].
    pub fn set_src1(&self, source: u32) {
        self.src1.store(source, Ordering::Relaxed);
    }
}

impl Default for DefaultCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Driver-wide context, created once by the host and shared by all groups.
pub struct DriverContext {
    /// Tunables.
    pub config: Config,
    /// Job ID counter.
    pub job_ids: JobIdAllocator,
    /// The job schedulers.
    pub scheduler: Arc<dyn Scheduler>,
    /// Queue for interrupt bottom halves.
    pub work: Arc<dyn DeferredWork>,
    /// Counters for GP jobs which don't select their own.
    pub gp_counters: DefaultCounters,
    /// Counters for PP jobs which don't select their own.
    pub pp_counters: DefaultCounters,
    power_on: AtomicBool,
}

impl DriverContext {
    /// Creates a context. The GPU is initially considered powered off.
    pub fn new(config: Config, scheduler: Arc<dyn Scheduler>, work: Arc<dyn DeferredWork>) -> Self {
        Self::with_job_ids(config, scheduler, work, JobIdAllocator::new())
    }

    /// Creates a context with a specific job ID counter.
    pub fn with_job_ids(
        config: Config,
        scheduler: Arc<dyn Scheduler>,
        work: Arc<dyn DeferredWork>,
        job_ids: JobIdAllocator,
    ) -> Self {
        Self {
            config,
            job_ids,
            scheduler,
            work,
            gp_counters: DefaultCounters::new(),
            pp_counters: DefaultCounters::new(),
            power_on: AtomicBool::new(false),
        }
    }

    /// Whether the GPU as a whole is powered.
    pub fn is_power_on(&self) -> bool {
        self.power_on.load(Ordering::Acquire)
    }

    /// Records whether the GPU as a whole is powered.
    pub fn set_power_on(&self, on: bool) {
        self.power_on.store(on, Ordering::Release);
    }
}
