// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! GP jobs.

use crate::{
    Error, Result,
    context::DriverContext,
    session::{Notification, Session},
};
use alloc::sync::Arc;
use core::sync::atomic::{AtomicU32, Ordering};
use mali_regs::gp::NUM_FRAME_REGISTERS;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Flag in `perf_counter_flag` enabling counter 0.
pub const PERF_COUNTER_SRC0_ENABLE: u32 = 1 << 0;
/// Flag in `perf_counter_flag` enabling counter 1.
pub const PERF_COUNTER_SRC1_ENABLE: u32 = 1 << 1;

/// Index of the PLBU heap start address among the frame registers.
const HEAP_START_INDEX: usize = 4;

/// A GP job as submitted by a client.
#[derive(Clone, Debug, Default, Eq, FromBytes, Immutable, IntoBytes, KnownLayout, PartialEq)]
#[repr(C)]
pub struct GpJobArgs {
    /// Client cookie identifying the job.
    pub user_job_ptr: u64,
    /// Scheduling priority.
    pub priority: u32,
    /// VS and PLBU command list and heap addresses.
    pub frame_registers: [u32; NUM_FRAME_REGISTERS],
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

impl GpJobArgs {
    /// Parses job arguments from a client buffer.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::read_from_bytes(bytes).map_err(|_| Error::InvalidArgs)
    }
}

/// A GP job.
pub struct GpJob {
    id: u32,
    session: Arc<Session>,
    args: GpJobArgs,
    heap_current_addr: AtomicU32,
    perf_counter_value0: AtomicU32,
    perf_counter_value1: AtomicU32,
    pid: u32,
    tid: u32,
}

impl GpJob {
    /// Creates a job with a fresh ID. Jobs which don't request counters use the driver wide GP
    /// counter sources.
    pub fn new(ctx: &DriverContext, session: Arc<Session>, mut args: GpJobArgs) -> Self {
        if args.perf_counter_flag & (PERF_COUNTER_SRC0_ENABLE | PERF_COUNTER_SRC1_ENABLE) == 0 {
            (args.perf_counter_src0, args.perf_counter_src1) = ctx.gp_counters.get();
        }
        Self {
            id: ctx.job_ids.new_id(),
            session,
            heap_current_addr: AtomicU32::new(args.frame_registers[HEAP_START_INDEX]),
            args,
            perf_counter_value0: AtomicU32::new(0),
            perf_counter_value1: AtomicU32::new(0),
            pid: 0,
            tid: 0,
        }
    }

    /// Records the process and thread which submitted the job.
    pub fn with_owner(mut self, pid: u32, tid: u32) -> Self {
        self.pid = pid;
        self.tid = tid;
        self
    }

    /// The job's ID.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The session which submitted the job.
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Client cookie.
    pub fn user_job_ptr(&self) -> u64 {
        self.args.user_job_ptr
    }

    /// Submitting process and thread.
    pub fn owner(&self) -> (u32, u32) {
        (self.pid, self.tid)
    }

    /// Frame registers to program.
    pub fn frame_registers(&self) -> &[u32; NUM_FRAME_REGISTERS] {
        &self.args.frame_registers
    }

    /// Whether the job has vertex shader work.
    pub fn has_vs_job(&self) -> bool {
        self.args.frame_registers[0] != self.args.frame_registers[1]
    }

    /// Whether the job has polygon list builder work.
    pub fn has_plbu_job(&self) -> bool {
        self.args.frame_registers[2] != self.args.frame_registers[3]
    }

    /// Heap address the PLBU had reached when last stopped.
    pub fn heap_current_addr(&self) -> u32 {
        self.heap_current_addr.load(Ordering::Relaxed)
    }

    /// Records where the PLBU stopped in its heap.
    pub fn set_heap_current_addr(&self, address: u32) {
        self.heap_current_addr.store(address, Ordering::Relaxed);
    }

    /// Source of performance counter 0.
    pub fn perf_counter_src0(&self) -> u32 {
        self.args.perf_counter_src0
    }

    /// Source of performance counter 1.
    pub fn perf_counter_src1(&self) -> u32 {
        self.args.perf_counter_src1
    }

    /// Value of performance counter 0.
    pub fn perf_counter_value0(&self) -> u32 {
        self.perf_counter_value0.load(Ordering::Relaxed)
    }

    /// Value of performance counter 1.
    pub fn perf_counter_value1(&self) -> u32 {
        self.perf_counter_value1.load(Ordering::Relaxed)
    }

    /// Stores the value of performance counter 0.
    pub fn set_perf_counter_value0(&self, value: u32) {
        self.perf_counter_value0.store(value, Ordering::Relaxed);
    }

    /// Stores the value of performance counter 1.
    pub fn set_perf_counter_value1(&self, value: u32) {
        self.perf_counter_value1.store(value, Ordering::Relaxed);
    }

    /// The notification telling the client the job finished.
    pub fn finished_notification(&self, success: bool) -> Notification {
        Notification::GpFinished {
            job_id: self.id,
            success,
            heap_current_addr: self.heap_current_addr(),
        }
    }

    /// The notification telling the client the job needs more heap.
    pub fn oom_notification(&self) -> Notification {
        Notification::GpStalled { job_id: self.id }
    }
}
