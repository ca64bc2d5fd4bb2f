// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! PP jobs, which are split into sub jobs rendered by separate PP cores, or broadcast to all
//! cores of a virtual group as a single sub job.

use crate::{
    Error, Result,
    context::DriverContext,
    gp_job::{PERF_COUNTER_SRC0_ENABLE, PERF_COUNTER_SRC1_ENABLE},
    session::{Notification, Session},
};
use alloc::sync::Arc;
use core::sync::atomic::{AtomicU32, Ordering};
use mali_regs::{
    dlbu,
    pp::{NUM_FRAME_REGISTERS, NUM_WB_REGISTERS, STACK_INDEX},
};
use spin::mutex::SpinMutex;
use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};

/// Maximum number of sub jobs of one PP job.
pub const MAX_SUB_JOBS: usize = 8;

/// A PP job as submitted by a client.
#[derive(Clone, Debug, Eq, FromBytes, Immutable, IntoBytes, KnownLayout, PartialEq)]
#[repr(C)]
pub struct PpJobArgs {
    /// Client cookie identifying the job.
    pub user_job_ptr: u64,
    /// Scheduling priority.
    pub priority: u32,
    /// Frame registers. The render list and stack addresses are those of sub job 0.
    pub frame_registers: [u32; NUM_FRAME_REGISTERS],
    /// Render list addresses of sub jobs 1 and up.
    pub frame_registers_addr_frame: [u32; MAX_SUB_JOBS - 1],
    /// Stack addresses of sub jobs 1 and up, or of cores 1 and up for a virtual job.
    pub frame_registers_addr_stack: [u32; MAX_SUB_JOBS - 1],
    /// Write back unit 0 registers. Unit is unused if the first register is 0.
    pub wb0_registers: [u32; NUM_WB_REGISTERS],
    /// Write back unit 1 registers.
    pub wb1_registers: [u32; NUM_WB_REGISTERS],
    /// Write back unit 2 registers.
    pub wb2_registers: [u32; NUM_WB_REGISTERS],
    /// DLBU registers for virtual jobs.
    pub dlbu_registers: [u32; dlbu::NUM_JOB_REGISTERS],
    /// Number of sub jobs.
    pub num_cores: u32,
    /// Which of the counter sources below are requested.
    pub perf_counter_flag: u32,
    /// Source of performance counter 0.
    pub perf_counter_src0: u32,
    /// Source of performance counter 1.
    pub perf_counter_src1: u32,
    /// Frame the job belongs to.
    pub frame_builder_id: u32,
    /// Flush the job belongs to.
    pub flush_id: u32,
    /// Reserved, must be zero.
    pub flags: u32,
    /// Reserved, must be zero.
    pub reserved: u32,
}

impl Default for PpJobArgs {
    fn default() -> Self {
        Self::new_zeroed()
    }
}

impl PpJobArgs {
    /// Parses job arguments from a client buffer.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::read_from_bytes(bytes).map_err(|_| Error::InvalidArgs)
    }
}

#[derive(Debug, Default)]
struct Progress {
    started: u32,
    completed: u32,
    failed: bool,
}

/// A PP job.
pub struct PpJob {
    id: u32,
    session: Arc<Session>,
    args: PpJobArgs,
    is_virtual: bool,
    sub_jobs: u32,
    progress: SpinMutex<Progress>,
    perf_counter_value0: [AtomicU32; MAX_SUB_JOBS],
    perf_counter_value1: [AtomicU32; MAX_SUB_JOBS],
}

impl PpJob {
    /// Creates a job with a fresh ID. A virtual job is rendered by a virtual group as one sub job;
    /// otherwise the job has `num_cores` sub jobs.
    pub fn new(
        ctx: &DriverContext,
        session: Arc<Session>,
        mut args: PpJobArgs,
        is_virtual: bool,
    ) -> Result<Self> {
        if args.num_cores as usize > MAX_SUB_JOBS || (!is_virtual && args.num_cores == 0) {
            return Err(Error::InvalidArgs);
        }
        if args.perf_counter_flag & (PERF_COUNTER_SRC0_ENABLE | PERF_COUNTER_SRC1_ENABLE) == 0 {
            (args.perf_counter_src0, args.perf_counter_src1) = ctx.pp_counters.get();
        }
        let sub_jobs = if is_virtual { 1 } else { args.num_cores };
        Ok(Self {
            id: ctx.job_ids.new_id(),
            session,
            args,
            is_virtual,
            sub_jobs,
            progress: SpinMutex::new(Progress::default()),
            perf_counter_value0: [const { AtomicU32::new(0) }; MAX_SUB_JOBS],
            perf_counter_value1: [const { AtomicU32::new(0) }; MAX_SUB_JOBS],
        })
    }

    /// The job's ID.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The session which submitted the job.
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Whether the job is broadcast to a virtual group.
    pub fn is_virtual(&self) -> bool {
        self.is_virtual
    }

    /// Number of sub jobs.
    pub fn sub_job_count(&self) -> u32 {
        self.sub_jobs
    }

    /// Frame registers to program.
    pub fn frame_registers(&self) -> &[u32; NUM_FRAME_REGISTERS] {
        &self.args.frame_registers
    }

    /// Write back unit registers.
    pub fn wb_registers(&self, unit: usize) -> &[u32; NUM_WB_REGISTERS] {
        match unit {
            0 => &self.args.wb0_registers,
            1 => &self.args.wb1_registers,
            _ => &self.args.wb2_registers,
        }
    }

    /// DLBU registers.
    pub fn dlbu_registers(&self) -> &[u32; dlbu::NUM_JOB_REGISTERS] {
        &self.args.dlbu_registers
    }

    /// Render list address of a sub job.
    pub fn addr_frame(&self, sub_job: u32) -> u32 {
        match sub_job {
            0 => self.args.frame_registers[0],
            n => self.args.frame_registers_addr_frame[n as usize - 1],
        }
    }

    /// Stack address for a sub job, or for a PP core of a virtual job.
    pub fn addr_stack(&self, index: u32) -> u32 {
        match index {
            0 => self.args.frame_registers[STACK_INDEX],
            n => self.args.frame_registers_addr_stack[n as usize - 1],
        }
    }

    /// Source of performance counter 0.
    pub fn perf_counter_src0(&self) -> u32 {
        self.args.perf_counter_src0
    }

    /// Source of performance counter 1.
    pub fn perf_counter_src1(&self) -> u32 {
        self.args.perf_counter_src1
    }

    /// Value of performance counter 0 for a sub job.
    pub fn perf_counter_value0(&self, sub_job: u32) -> u32 {
        self.perf_counter_value0[sub_job as usize].load(Ordering::Relaxed)
    }

    /// Value of performance counter 1 for a sub job.
    pub fn perf_counter_value1(&self, sub_job: u32) -> u32 {
        self.perf_counter_value1[sub_job as usize].load(Ordering::Relaxed)
    }

    /// Stores the value of performance counter 0 for a sub job.
    pub fn set_perf_counter_value0(&self, sub_job: u32, value: u32) {
        self.perf_counter_value0[sub_job as usize].store(value, Ordering::Relaxed);
    }

    /// Stores the value of performance counter 1 for a sub job.
    pub fn set_perf_counter_value1(&self, sub_job: u32, value: u32) {
        self.perf_counter_value1[sub_job as usize].store(value, Ordering::Relaxed);
    }

    /// Marks the next sub job as started and returns it, or `None` if all have been started.
    pub fn start_next_sub_job(&self) -> Option<u32> {
        let mut progress = self.progress.lock();
        if progress.started == self.sub_jobs {
            return None;
        }
        progress.started += 1;
        Some(progress.started - 1)
    }

    /// Whether every sub job has been started.
    pub fn all_sub_jobs_started(&self) -> bool {
        self.progress.lock().started == self.sub_jobs
    }

    /// Records a finished sub job. Returns whether the whole job is now complete.
    pub fn mark_sub_job_completed(&self, success: bool) -> bool {
        let mut progress = self.progress.lock();
        debug_assert!(progress.completed < progress.started);
        progress.completed += 1;
        progress.failed |= !success;
        progress.completed == self.sub_jobs
    }

    /// Whether every sub job has finished.
    pub fn is_complete(&self) -> bool {
        self.progress.lock().completed == self.sub_jobs
    }

    /// Whether every finished sub job succeeded.
    pub fn was_success(&self) -> bool {
        !self.progress.lock().failed
    }

    /// The notification telling the client the job finished.
    pub fn finished_notification(&self) -> Notification {
        Notification::PpFinished {
            job_id: self.id,
            success: self.was_success(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::test::{TestEnv, TestPlatform};

    fn args(num_cores: u32) -> PpJobArgs {
        let mut args = PpJobArgs {
            num_cores,
            ..Default::default()
        };
        args.frame_registers[0] = 0x1000;
        args.frame_registers[STACK_INDEX] = 0x8000;
        args.frame_registers_addr_frame[0] = 0x1100;
        args.frame_registers_addr_stack[0] = 0x8100;
        args
    }

    #[test]
    fn sub_job_addresses() {
        let env = TestEnv::new(TestPlatform::new());
        let session = Arc::new(Session::new(env.pages.clone()).unwrap());
        let job = PpJob::new(&env.ctx, session, args(2), false).unwrap();
        assert_eq!(job.sub_job_count(), 2);
        assert_eq!(job.addr_frame(0), 0x1000);
        assert_eq!(job.addr_frame(1), 0x1100);
        assert_eq!(job.addr_stack(0), 0x8000);
        assert_eq!(job.addr_stack(1), 0x8100);
    }

    #[test]
    fn completes_after_every_sub_job() {
        let env = TestEnv::new(TestPlatform::new());
        let session = Arc::new(Session::new(env.pages.clone()).unwrap());
        let job = PpJob::new(&env.ctx, session, args(2), false).unwrap();

        assert_eq!(job.start_next_sub_job(), Some(0));
        assert_eq!(job.start_next_sub_job(), Some(1));
        assert_eq!(job.start_next_sub_job(), None);
        assert!(job.all_sub_jobs_started());

        assert!(!job.mark_sub_job_completed(true));
        assert!(job.mark_sub_job_completed(false));
        assert!(job.is_complete());
        assert_eq!(
            job.finished_notification(),
            Notification::PpFinished {
                job_id: job.id(),
                success: false
            }
        );
    }

    #[test]
    fn rejects_bad_core_counts() {
        let env = TestEnv::new(TestPlatform::new());
        let session = Arc::new(Session::new(env.pages.clone()).unwrap());
        assert!(PpJob::new(&env.ctx, session.clone(), args(0), false).is_err());
        assert!(PpJob::new(&env.ctx, session.clone(), args(9), false).is_err());
        let job = PpJob::new(&env.ctx, session, args(0), true).unwrap();
        assert_eq!(job.sub_job_count(), 1);
        assert!(job.is_virtual());
    }

    #[test]
    fn parses_client_buffer() {
        let args = args(3);
        let bytes = args.as_bytes().to_vec();
        assert_eq!(PpJobArgs::from_bytes(&bytes), Ok(args));
    }
}
