// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Geometry processor: job start, soft and hard reset, heap growth and performance counters.

use crate::{
    Error, Result,
    config::Config,
    gp_job::GpJob,
    hw_core::{HwCore, Resource},
    platform::{IrqProbe, Platform},
};
use core::sync::atomic::{AtomicU32, Ordering};
use log::{debug, error, trace};
use mali_regs::{
    NO_COUNTER,
    gp::{self, Command, Interrupt, Status},
};

/// Written to the write bound register before a hard reset.
const RESET_INVALID_VALUE: u32 = 0xC0FF_E000;
/// Written to the write bound register until it sticks, which it only does once the hard reset
/// has finished.
const RESET_CHECK_VALUE: u32 = 0xC01A_0000;

/// The GP core.
pub struct GpCore {
    hw: HwCore,
    irq: Option<u32>,
    poll_count: u32,
    counter_src0_used: AtomicU32,
    counter_src1_used: AtomicU32,
}

impl GpCore {
    /// Maps and resets the GP core described by `resource`, and sets up its interrupt.
    pub fn create(platform: &dyn Platform, resource: &Resource, config: &Config) -> Result<Self> {
        debug!("Mali GP: Creating Mali GP core: {}", resource.description);
        let core = Self {
            hw: HwCore::create(platform, resource, gp::REGISTERS_SIZE)?,
            irq: resource.irq,
            poll_count: config.poll_count_fast,
            counter_src0_used: AtomicU32::new(NO_COUNTER),
            counter_src1_used: AtomicU32::new(NO_COUNTER),
        };
        core.reset()?;
        platform.irq_init(resource, &core).inspect_err(|_| {
            error!(
                "Mali GP: Failed to setup interrupt handlers for GP core {}",
                core.hw.description()
            )
        })?;
        Ok(core)
    }

    /// Name of the unit.
    pub fn description(&self) -> &'static str {
        self.hw.description()
    }

    /// Interrupt line.
    pub fn irq(&self) -> Option<u32> {
        self.irq
    }

    fn command(&self, command: Command) {
        self.hw.write(gp::CMD, command.bits());
    }

    /// Asks the core to stop its bus, without waiting.
    pub fn stop_bus(&self) {
        self.command(Command::STOP_BUS);
    }

    /// Stops the core's bus and waits for it to stop.
    pub fn stop_bus_wait(&self) -> Result<()> {
        self.stop_bus();
        self.hw
            .poll(gp::STATUS, self.poll_count, |status| {
                Status::from_bits_retain(status).contains(Status::BUS_STOPPED)
            })
            .map(|_| ())
            .ok_or_else(|| {
                error!("Mali GP: Failed to stop bus on {}", self.hw.description());
                Error::Fault
            })
    }

    /// Resets the core the hard way, used when a job failed or the soft reset didn't work.
    pub fn hard_reset(&self) {
        debug!("Mali GP: Hard reset of core {}", self.hw.description());
        self.hw.write(gp::WRITE_BOUND_LOW, RESET_INVALID_VALUE);
        self.command(Command::RESET);

        let mut done = false;
        for _ in 0..self.poll_count {
            self.hw.write(gp::WRITE_BOUND_LOW, RESET_CHECK_VALUE);
            if self.hw.read(gp::WRITE_BOUND_LOW) == RESET_CHECK_VALUE {
                done = true;
                break;
            }
        }
        if !done {
            error!("Mali GP: The hard reset loop didn't work, unable to recover");
        }

        self.hw.write(gp::WRITE_BOUND_LOW, 0);
        self.hw.write(gp::INT_CLEAR, Interrupt::MASK_ALL.bits());
        self.hw.write(gp::INT_MASK, Interrupt::MASK_USED.bits());
    }

    /// Starts a soft reset. Interrupts stay disabled until [`GpCore::reset_wait`] succeeds.
    pub fn reset_async(&self) {
        debug!("Mali GP: Reset of core {}", self.hw.description());
        self.hw.write(gp::INT_MASK, 0);
        self.hw
            .write(gp::INT_CLEAR, Interrupt::RESET_COMPLETED.bits());
        self.command(Command::SOFT_RESET);
    }

    /// Waits for a soft reset to finish and re-enables interrupts.
    pub fn reset_wait(&self) -> Result<()> {
        let completed = self.hw.poll(gp::INT_RAWSTAT, self.poll_count, |rawstat| {
            Interrupt::from_bits_retain(rawstat).contains(Interrupt::RESET_COMPLETED)
        });
        if completed.is_none() {
            error!(
                "Mali GP: Failed to reset core {}, rawstat: {:#010x}",
                self.hw.description(),
                self.hw.read(gp::INT_RAWSTAT)
            );
            return Err(Error::Fault);
        }
        self.hw.write(gp::INT_CLEAR, Interrupt::MASK_ALL.bits());
        self.hw.write(gp::INT_MASK, Interrupt::MASK_USED.bits());
        Ok(())
    }

    /// Soft resets the core.
    pub fn reset(&self) -> Result<()> {
        self.reset_async();
        self.reset_wait()
    }

    /// Programs and starts a job.
    pub fn job_start(&self, job: &GpJob) {
        let src0 = job.perf_counter_src0();
        let src1 = job.perf_counter_src1();
        self.counter_src0_used.store(src0, Ordering::Relaxed);
        self.counter_src1_used.store(src1, Ordering::Relaxed);

        let mut command = Command::empty();
        if job.has_vs_job() {
            command |= Command::START_VS;
        }
        if job.has_plbu_job() {
            command |= Command::START_PLBU;
        }
        debug_assert!(!command.is_empty());

        self.hw
            .write_array_relaxed(gp::VSCL_START_ADDR, job.frame_registers());
        if src0 != NO_COUNTER {
            self.hw.write(gp::PERF_CNT_0_SRC, src0);
            self.hw.write(gp::PERF_CNT_0_ENABLE, gp::PERF_CNT_ENABLE);
        }
        if src1 != NO_COUNTER {
            self.hw.write(gp::PERF_CNT_1_SRC, src1);
            self.hw.write(gp::PERF_CNT_1_ENABLE, gp::PERF_CNT_ENABLE);
        }

        debug!(
            "Mali GP: Starting job {} on core {} with command {:#010x}",
            job.id(),
            self.hw.description(),
            command.bits()
        );
        self.hw.write_barrier();
        self.hw.write_relaxed(gp::CMD, command.bits());
        self.hw.write_barrier();
    }

    /// Gives a job which ran out of heap memory a new heap and lets it continue.
    ///
    /// Does nothing if the core is no longer waiting for memory, as happens when it was reset
    /// in between, e.g. after a timeout.
    pub fn resume_with_new_heap(&self, start_addr: u32, end_addr: u32) {
        let rawstat = Interrupt::from_bits_retain(self.hw.read(gp::INT_RAWSTAT));
        if !rawstat.contains(Interrupt::PLBU_OUT_OF_MEM) {
            return;
        }
        self.hw.write(
            gp::INT_CLEAR,
            (Interrupt::PLBU_OUT_OF_MEM | Interrupt::HANG).bits(),
        );
        self.hw.write(gp::INT_MASK, Interrupt::MASK_USED.bits());
        self.hw.write_relaxed(gp::PLBU_ALLOC_START_ADDR, start_addr);
        self.hw.write_relaxed(gp::PLBU_ALLOC_END_ADDR, end_addr);
        debug!("Mali GP: Resuming job");
        self.command(Command::UPDATE_PLBU_ALLOC);
        self.hw.write_barrier();
    }

    /// Copies the performance counter values of the finished job into it.
    pub fn update_performance_counters(&self, job: &GpJob) {
        if self.counter_src0_used.load(Ordering::Relaxed) != NO_COUNTER {
            job.set_perf_counter_value0(self.hw.read(gp::PERF_CNT_0_VALUE));
        }
        if self.counter_src1_used.load(Ordering::Relaxed) != NO_COUNTER {
            job.set_perf_counter_value1(self.hw.read(gp::PERF_CNT_1_VALUE));
        }
    }

    /// Raw interrupt status, limited to the interrupts the driver handles.
    pub fn read_rawstat(&self) -> Interrupt {
        Interrupt::from_bits_truncate(self.hw.read(gp::INT_RAWSTAT)) & Interrupt::MASK_USED
    }

    /// Pending unmasked interrupts.
    pub fn read_int_stat(&self) -> Interrupt {
        Interrupt::from_bits_truncate(self.hw.read(gp::INT_STAT))
    }

    /// Masks all interrupts.
    pub fn mask_all_interrupts(&self) {
        self.hw.write(gp::INT_MASK, 0);
    }

    /// Unmasks all handled interrupts except `exceptions`.
    pub fn enable_interrupts(&self, exceptions: Interrupt) {
        trace!("Mali GP: enable interrupts except {:?}", exceptions);
        self.hw
            .write(gp::INT_MASK, (Interrupt::MASK_USED - exceptions).bits());
    }

    /// Contents of the status register.
    pub fn read_status(&self) -> Status {
        Status::from_bits_retain(self.hw.read(gp::STATUS))
    }

    /// Current PLBU heap position.
    pub fn read_plbu_alloc_start_addr(&self) -> u32 {
        self.hw.read(gp::PLBU_ALLOC_START_ADDR)
    }

    /// Version register.
    pub fn version(&self) -> u32 {
        self.hw.read(gp::VERSION)
    }
}

impl IrqProbe for GpCore {
    fn probe_trigger(&self) {
        self.hw.write(gp::INT_MASK, Interrupt::MASK_USED.bits());
        self.hw.write(gp::INT_RAWSTAT, Command::FORCE_HANG.bits());
        self.hw.write_barrier();
    }

    fn probe_ack(&self) -> Result<()> {
        if self.read_int_stat().contains(Interrupt::FORCE_HANG) {
            self.hw.write(gp::INT_CLEAR, Interrupt::FORCE_HANG.bits());
            self.hw.write_barrier();
            Ok(())
        } else {
            Err(Error::Fault)
        }
    }
}
