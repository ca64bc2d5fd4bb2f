// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Pixel processor: physical PP cores, and the broadcast PP core through which a virtual group
//! programs all its members at once.

use crate::{
    Error, Result,
    config::Config,
    hw_core::{HwCore, Resource},
    platform::{IrqProbe, Platform},
    pp_job::PpJob,
};
use core::sync::atomic::{AtomicU32, Ordering};
use log::{debug, error};
use mali_regs::{
    NO_COUNTER,
    pp::{self, Control, Interrupt, STACK_INDEX, Status},
};

/// Maximum number of PP cores, counting the broadcast PP core.
pub const MAX_PP_CORES: usize = 9;

const RESET_INVALID_VALUE: u32 = 0xC0FF_E000;
const RESET_CHECK_VALUE: u32 = 0xC01A_0000;

/// A PP core.
pub struct PpCore {
    hw: HwCore,
    irq: Option<u32>,
    core_id: u32,
    bcast_id: u32,
    is_virtual: bool,
    poll_count: u32,
    counter_src0_used: AtomicU32,
    counter_src1_used: AtomicU32,
}

impl PpCore {
    /// Maps and resets the PP core described by `resource`, and sets up its interrupt.
    ///
    /// `bcast_id` is the core's bit in the broadcast and DLBU masks. The broadcast PP core of a
    /// virtual group must be given its interrupt line, as it can't be probed.
    pub fn create(
        platform: &dyn Platform,
        resource: &Resource,
        config: &Config,
        core_id: u32,
        is_virtual: bool,
        bcast_id: u32,
    ) -> Result<Self> {
        debug!("Mali PP: Creating Mali PP core: {}", resource.description);
        if core_id as usize >= MAX_PP_CORES {
            error!("Mali PP: Too many PP core objects created");
            return Err(Error::NoMemory);
        }
        if is_virtual && resource.irq.is_none() {
            error!(
                "Mali PP: Broadcast PP core {} has no interrupt line",
                resource.description
            );
            return Err(Error::NotFound);
        }
        let core = Self {
            hw: HwCore::create(platform, resource, pp::REGISTERS_SIZE)?,
            irq: resource.irq,
            core_id,
            bcast_id,
            is_virtual,
            poll_count: config.poll_count_fast,
            counter_src0_used: AtomicU32::new(NO_COUNTER),
            counter_src1_used: AtomicU32::new(NO_COUNTER),
        };
        core.reset()?;
        platform.irq_init(resource, &core).inspect_err(|_| {
            error!(
                "Mali PP: Failed to setup interrupt handlers for PP core {}",
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

    /// Index of the core among all PP cores.
    pub fn core_id(&self) -> u32 {
        self.core_id
    }

    /// The core's bit in the broadcast and DLBU masks.
    pub fn bcast_id(&self) -> u32 {
        self.bcast_id
    }

    /// Whether this is the broadcast PP core of a virtual group.
    pub fn is_virtual(&self) -> bool {
        self.is_virtual
    }

    fn control(&self, control: Control) {
        self.hw.write(pp::CTRL_MGMT, control.bits());
    }

    /// Asks the core to stop its bus, without waiting.
    pub fn stop_bus(&self) {
        self.control(Control::STOP_BUS);
    }

    /// Stops the core's bus and waits for it to stop.
    pub fn stop_bus_wait(&self) -> Result<()> {
        self.stop_bus();
        self.hw
            .poll(pp::STATUS, self.poll_count, |status| {
                Status::from_bits_retain(status).contains(Status::BUS_STOPPED)
            })
            .map(|_| ())
            .ok_or_else(|| {
                error!("Mali PP: Failed to stop bus on {}", self.hw.description());
                Error::Fault
            })
    }

    /// Resets the core the hard way. The bus must have been stopped.
    pub fn hard_reset(&self) {
        debug!("Mali PP: Hard reset of core {}", self.hw.description());
        self.hw
            .write_relaxed(pp::WRITE_BOUNDARY_LOW, RESET_INVALID_VALUE);
        self.hw.write_relaxed(pp::INT_MASK, 0);
        self.control(Control::FORCE_RESET);

        let done = (0..self.poll_count).any(|_| {
            self.hw.write(pp::WRITE_BOUNDARY_LOW, RESET_CHECK_VALUE);
            self.hw.read(pp::WRITE_BOUNDARY_LOW) == RESET_CHECK_VALUE
        });
        if !done {
            error!("Mali PP: The hard reset loop didn't work, unable to recover");
        }

        self.hw.write(pp::WRITE_BOUNDARY_LOW, 0);
        self.hw.write(pp::INT_CLEAR, Interrupt::MASK_ALL.bits());
        self.hw.write(pp::INT_MASK, Interrupt::MASK_USED.bits());
    }

    /// Starts a soft reset. Interrupts stay disabled until [`PpCore::reset_wait`] succeeds.
    pub fn reset_async(&self) {
        debug!("Mali PP: Reset of core {}", self.hw.description());
        self.hw.write(pp::INT_MASK, 0);
        self.hw
            .write(pp::INT_CLEAR, Interrupt::RESET_COMPLETED.bits());
        self.control(Control::SOFT_RESET);
    }

    /// Waits for a soft reset to finish and re-enables interrupts.
    pub fn reset_wait(&self) -> Result<()> {
        let completed = self.hw.poll(pp::INT_RAWSTAT, self.poll_count, |rawstat| {
            Interrupt::from_bits_retain(rawstat).contains(Interrupt::RESET_COMPLETED)
        });
        if completed.is_none() {
            error!(
                "Mali PP: Failed to reset core {}, rawstat: {:#010x}",
                self.hw.description(),
                self.hw.read(pp::INT_RAWSTAT)
            );
            return Err(Error::Fault);
        }
        self.hw.write(pp::INT_CLEAR, Interrupt::MASK_ALL.bits());
        self.hw.write(pp::INT_MASK, Interrupt::MASK_USED.bits());
        Ok(())
    }

    /// Soft resets the core.
    pub fn reset(&self) -> Result<()> {
        self.reset_async();
        self.reset_wait()
    }

    /// Programs and starts a sub job.
    ///
    /// The stack address of a virtual job is per core, so it is not broadcast. It is written
    /// separately to each member with [`PpCore::write_addr_stack`], except when
    /// `restart_virtual` starts a running virtual job on a core joining the virtual group, in
    /// which case this core's stack address is written here.
    pub fn job_start(&self, job: &PpJob, sub_job: u32, restart_virtual: bool) {
        let src0 = job.perf_counter_src0();
        let src1 = job.perf_counter_src1();
        self.counter_src0_used.store(src0, Ordering::Relaxed);
        self.counter_src1_used.store(src1, Ordering::Relaxed);

        let frame = job.frame_registers();
        self.hw.write_relaxed(pp::FRAME, job.addr_frame(sub_job));
        if restart_virtual {
            self.write_addr_stack(job);
        } else if !job.is_virtual() {
            self.hw.write_relaxed(pp::STACK, job.addr_stack(sub_job));
        }
        self.hw
            .write_array_relaxed(pp::FRAME + 4, &frame[1..STACK_INDEX]);
        self.hw
            .write_array_relaxed(pp::STACK + 4, &frame[STACK_INDEX + 1..]);

        for (unit, offset) in [pp::WB0, pp::WB1, pp::WB2].into_iter().enumerate() {
            let registers = job.wb_registers(unit);
            // The first register selects the source; zero means the unit is unused.
            if registers[0] != 0 {
                self.hw.write_array_relaxed(offset, registers);
            }
        }

        if src0 != NO_COUNTER {
            self.hw.write_relaxed(pp::PERF_CNT_0_SRC, src0);
            self.hw
                .write_relaxed(pp::PERF_CNT_0_ENABLE, pp::PERF_CNT_ENABLE);
        }
        if src1 != NO_COUNTER {
            self.hw.write_relaxed(pp::PERF_CNT_1_SRC, src1);
            self.hw
                .write_relaxed(pp::PERF_CNT_1_ENABLE, pp::PERF_CNT_ENABLE);
        }

        debug!(
            "Mali PP: Starting job {} part {}/{} on core {}",
            job.id(),
            sub_job + 1,
            job.sub_job_count(),
            self.hw.description()
        );
        self.hw.write_barrier();
        self.hw
            .write_relaxed(pp::CTRL_MGMT, Control::START_RENDERING.bits());
        self.hw.write_barrier();
    }

    /// Writes this core's stack address for a virtual job.
    pub fn write_addr_stack(&self, job: &PpJob) {
        self.hw
            .write_relaxed(pp::STACK, job.addr_stack(self.core_id));
    }

    /// Copies the performance counters of `child` into the job's values for `sub_job`. The
    /// counter selection is that of `self`, which is the broadcast core for a virtual job and
    /// the core itself otherwise.
    pub fn update_performance_counters(&self, child: &PpCore, job: &PpJob, sub_job: u32) {
        if self.counter_src0_used.load(Ordering::Relaxed) != NO_COUNTER {
            job.set_perf_counter_value0(sub_job, child.hw.read(pp::PERF_CNT_0_VALUE));
        }
        if self.counter_src1_used.load(Ordering::Relaxed) != NO_COUNTER {
            job.set_perf_counter_value1(sub_job, child.hw.read(pp::PERF_CNT_1_VALUE));
        }
    }

    /// Raw interrupt status, limited to the interrupts the driver handles.
    pub fn read_rawstat(&self) -> Interrupt {
        Interrupt::from_bits_truncate(self.hw.read(pp::INT_RAWSTAT)) & Interrupt::MASK_USED
    }

    /// Pending unmasked interrupts.
    pub fn read_int_stat(&self) -> Interrupt {
        Interrupt::from_bits_truncate(self.hw.read(pp::INT_STATUS))
    }

    /// Contents of the status register.
    pub fn read_status(&self) -> Status {
        Status::from_bits_retain(self.hw.read(pp::STATUS))
    }

    /// Masks all interrupts.
    pub fn mask_all_interrupts(&self) {
        self.hw.write(pp::INT_MASK, 0);
    }

    /// Unmasks all handled interrupts.
    pub fn enable_interrupts(&self) {
        self.hw.write(pp::INT_MASK, Interrupt::MASK_USED.bits());
    }

    /// Clears a pending hang interrupt.
    pub fn clear_hang_interrupt(&self) {
        self.hw.write(pp::INT_CLEAR, Interrupt::HANG.bits());
    }

    /// Version register.
    pub fn version(&self) -> u32 {
        self.hw.read(pp::VERSION)
    }
}

impl IrqProbe for PpCore {
    fn probe_trigger(&self) {
        self.hw.write(pp::INT_MASK, Interrupt::MASK_USED.bits());
        self.hw
            .write(pp::INT_RAWSTAT, Interrupt::FORCE_HANG.bits());
        self.hw.write_barrier();
    }

    fn probe_ack(&self) -> Result<()> {
        if self.read_int_stat().contains(Interrupt::FORCE_HANG) {
            self.hw.write(pp::INT_CLEAR, Interrupt::FORCE_HANG.bits());
            self.hw.write_barrier();
            Ok(())
        } else {
            Err(Error::Fault)
        }
    }
}
