// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Interface to the GP and PP job schedulers, and the global job ID counter.

use crate::{
    gp_job::GpJob,
    group::{Group, LockedGroup},
    pp_job::PpJob,
};
use alloc::sync::Arc;
use core::sync::atomic::{AtomicU32, Ordering};

/// Issues job IDs in submission order.
///
/// The same counter also stamps L2 cache invalidations, so that a cache knows whether it has
/// already been invalidated after a given job was submitted.
#[derive(Debug, Default)]
pub struct JobIdAllocator {
    last: AtomicU32,
}

impl JobIdAllocator {
    /// Creates an allocator whose first ID is 1.
    pub const fn new() -> Self {
        Self::starting_after(0)
    }

    /// Creates an allocator whose first ID is `last + 1`.
    pub const fn starting_after(last: u32) -> Self {
        Self {
            last: AtomicU32::new(last),
        }
    }

    /// Returns a new ID, greater (modulo wrapping) than every ID returned before.
    pub fn new_id(&self) -> u32 {
        self.last.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
    }
}

/// The GP and PP schedulers, which decide which job runs on which group.
///
/// Lock order: the scheduler's own locks must be taken before any group lock, and never while a
/// group lock is held. The `*_job_done` callbacks are therefore invoked with the group lock held
/// and must not take scheduler locks which are also held around calls into groups; they may
/// however start the next job directly on the locked group.
pub trait Scheduler: Send + Sync {
    /// A GP job has finished, successfully or not. The group is idle again.
    fn gp_job_done(&self, group: &mut LockedGroup, job: Arc<GpJob>, success: bool);

    /// A PP (sub) job has finished, successfully or not. The group is idle again.
    fn pp_job_done(&self, group: &mut LockedGroup, job: Arc<PpJob>, sub_job: u32, success: bool);

    /// A GP job ran out of heap memory and is waiting for
    /// [`LockedGroup::resume_gp_with_new_heap`]. The group lock is not held.
    fn gp_oom(&self, group: &Group, job: Arc<GpJob>);

    /// The group has been enabled and may be used for jobs again.
    fn enable_group(&self, _group: &Group) {}

    /// The group must not be given new jobs.
    fn disable_group(&self, _group: &Group) {}

    /// Stop dispatching jobs and wait for running ones, before the GPU is suspended.
    fn suspend(&self) {}

    /// Resume dispatching after [`Scheduler::suspend`].
    fn resume(&self) {}
}
