// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Interrupt handling for groups.
//!
//! Upper halves run in interrupt context without the group lock. They mask the unit's
//! interrupts and schedule a bottom half through [`DeferredWork`](crate::platform::DeferredWork),
//! which takes the lock and decides what happened.

use super::{BottomHalf, Group, GroupCores, GroupState};
use crate::pm_domain::PowerStateGuard;
use core::sync::atomic::Ordering;
use log::{debug, error, info, warn};
use mali_regs::{gp, mmu, pp};

impl Group {
    /// With shared interrupt lines the handler may run while the group's domain is off, so the
    /// power state is held for the duration. Returns `None` if the domain is off.
    fn shared_irq_guard(&self) -> Option<PowerStateGuard<'_>> {
        let power = if cfg!(feature = "shared_interrupts") {
            self.lock_power_state()
        } else {
            PowerStateGuard::always_on()
        };
        power.is_on().then_some(power)
    }

    /// Upper half of the MMU interrupt. Returns whether the MMU raised the interrupt.
    ///
    /// Faults of a virtual group member are handled by the virtual group.
    pub fn upper_half_mmu(&self) -> bool {
        let Some(_power) = self.shared_irq_guard() else {
            return false;
        };
        if self.mmu.read_int_status().is_empty() {
            return false;
        }
        self.mmu.mask_all_interrupts();
        let target = self.parent_hint().unwrap_or(self.id);
        self.ctx.work.schedule(target, BottomHalf::Mmu);
        true
    }

    /// Upper half of the GP interrupt. Returns whether the GP core raised the interrupt.
    pub fn upper_half_gp(&self) -> bool {
        let Some(gp) = self.gp_core() else {
            return false;
        };
        let Some(_power) = self.shared_irq_guard() else {
            return false;
        };
        if gp.read_int_stat().is_empty() {
            return false;
        }
        gp.mask_all_interrupts();
        self.ctx.work.schedule(self.id, BottomHalf::Gp);
        true
    }

    /// Upper half of the PP interrupt. Returns whether the interrupt was handled.
    ///
    /// With the `upper_half_scheduling` feature a cleanly finished job is completed right here,
    /// instead of in the bottom half.
    pub fn upper_half_pp(&self) -> bool {
        let Some(pp) = self.pp_core() else {
            return false;
        };
        let Some(_power) = self.shared_irq_guard() else {
            return false;
        };
        if !cfg!(feature = "upper_half_scheduling") && self.is_in_virtual() {
            // Rechecked with the lock held by the bottom half of the virtual group.
            return true;
        }

        let int_stat = pp.read_int_stat();
        if int_stat.is_empty() {
            return false;
        }
        pp.mask_all_interrupts();

        if cfg!(feature = "upper_half_scheduling") && int_stat == pp::Interrupt::END_OF_FRAME {
            return self.complete_pp_in_upper_half();
        }
        self.ctx.work.schedule(self.id, BottomHalf::Pp);
        true
    }

    fn complete_pp_in_upper_half(&self) -> bool {
        let Some(pp) = self.pp_core() else {
            return false;
        };
        let mut group = self.lock();
        if pp.read_rawstat() != pp::Interrupt::END_OF_FRAME {
            pp.enable_interrupts();
            return true;
        }
        if self.is_virtual()
            && pp
                .read_status()
                .contains(pp::Status::RENDERING_ACTIVE)
        {
            debug!("Mali group: Not all cores in broadcast completed");
            pp.enable_interrupts();
            return true;
        }
        if group.state().is_in_virtual() {
            // The virtual group handles it.
            pp.enable_interrupts();
            return false;
        }
        debug!("Mali group: PP job completed, calling group handler from upper half");
        self.core_timed_out.store(false, Ordering::Release);
        group.complete(true);
        true
    }

    /// Bottom half of the MMU interrupt: fails the running job after a page fault or a bus error
    /// while walking the page tables.
    pub fn bottom_half_mmu(&self) {
        let mut group = self.lock();
        debug_assert!(group.parent().is_none());
        if !group.power_is_on() {
            error!(
                "Mali group: Interrupt bottom half of {} when core is off",
                self.mmu.description()
            );
            return;
        }

        let rawstat = self.mmu.read_rawstat();
        if rawstat.intersects(mmu::Interrupt::PAGE_FAULT | mmu::Interrupt::READ_BUS_ERROR) {
            let status = self.mmu.read_status();
            warn!(
                "Mali MMU: Page fault detected at {:#x} from bus id {} of type {} on {}",
                self.mmu.read_page_fault_addr(),
                (status.bits() >> mmu::Status::PAGE_FAULT_BUS_ID_SHIFT)
                    & mmu::Status::PAGE_FAULT_BUS_ID_MASK,
                if status.contains(mmu::Status::PAGE_FAULT_IS_WRITE) {
                    "write"
                } else {
                    "read"
                },
                self.mmu.description()
            );
            group.mmu_page_fault();
        }
    }

    /// Bottom half of the GP interrupt.
    pub fn bottom_half_gp(&self) {
        let Some(gp) = self.gp_core() else {
            return;
        };
        let mut group = self.lock();
        if !group.power_is_on() {
            error!(
                "Mali group: Interrupt bottom half of {} when core is off",
                gp.description()
            );
            return;
        }

        let rawstat = gp.read_rawstat();
        debug!(
            "Mali group: GP bottom half IRQ {:#010x} from core {}",
            rawstat.bits(),
            gp.description()
        );

        if rawstat.intersects(gp::Interrupt::END_BITS)
            && !gp
                .read_status()
                .intersects(gp::Status::VS_ACTIVE | gp::Status::PLBU_ACTIVE)
        {
            debug!("Mali group: GP job completed, calling group handler");
            self.core_timed_out.store(false, Ordering::Release);
            group.complete(true);
            return;
        }

        // A hang or running out of heap is not an error.
        let errors = rawstat
            - (gp::Interrupt::END_BITS | gp::Interrupt::HANG | gp::Interrupt::PLBU_OUT_OF_MEM);
        if !errors.is_empty() {
            error!(
                "Mali group: Unknown interrupt {:#010x} from core {}, aborting job",
                rawstat.bits(),
                gp.description()
            );
            self.core_timed_out.store(false, Ordering::Release);
            group.complete(false);
            return;
        } else if self.core_timed_out.swap(false, Ordering::AcqRel) {
            if !self.timer.is_pending()
                && let Some(job) = group.gp_running_job()
            {
                info!("Mali group: Job {} timed out", job.id());
                group.complete(false);
                return;
            }
        } else if rawstat.contains(gp::Interrupt::PLBU_OUT_OF_MEM) {
            debug!("Mali group: PLBU needs more heap memory");
            group.set_state(GroupState::Oom);
            let job = group.gp_running_job().cloned();
            // The scheduler may resume the job from the callback, which takes the lock again.
            drop(group);
            if let Some(job) = job {
                self.ctx.scheduler.gp_oom(self, job);
            }
            return;
        }

        // Only one of the two end of command list interrupts came in. Keep waiting for the other.
        gp.enable_interrupts(rawstat & gp::Interrupt::END_BITS);
    }

    /// Bottom half of the PP interrupt.
    pub fn bottom_half_pp(&self) {
        let Some(pp) = self.pp_core() else {
            return;
        };
        let mut group = self.lock();
        if group.state().is_in_virtual() {
            // The virtual group handles it.
            pp.enable_interrupts();
            return;
        }
        if !group.power_is_on() {
            error!(
                "Mali group: Interrupt bottom half of {} when core is off",
                pp.description()
            );
            return;
        }

        let rawstat = pp.read_rawstat();
        debug!(
            "Mali group: PP bottom half IRQ {:#010x} from core {}",
            rawstat.bits(),
            pp.description()
        );

        if rawstat == pp::Interrupt::END_OF_FRAME {
            if self.is_virtual()
                && pp
                    .read_status()
                    .contains(pp::Status::RENDERING_ACTIVE)
            {
                debug!("Mali group: Not all cores in broadcast completed");
                pp.enable_interrupts();
                return;
            }
            debug!("Mali group: PP job completed, calling group handler");
            self.core_timed_out.store(false, Ordering::Release);
            group.complete(true);
            return;
        }

        let errors = rawstat - (pp::Interrupt::END_OF_FRAME | pp::Interrupt::HANG);
        if !errors.is_empty() {
            error!(
                "Mali group: Unknown interrupt {:#010x} from core {}, aborting job",
                rawstat.bits(),
                pp.description()
            );
            self.core_timed_out.store(false, Ordering::Release);
            group.complete(false);
            return;
        } else if self.core_timed_out.swap(false, Ordering::AcqRel) {
            if !self.timer.is_pending()
                && let Some((job, _)) = group.pp_running_job()
            {
                info!("Mali group: Job {} timed out", job.id());
                group.complete(false);
            }
            return;
        }

        if rawstat.is_empty() {
            debug!(
                "Mali group: No interrupt found on core {}",
                pp.description()
            );
        } else {
            error!(
                "Mali group: Unhandled interrupt {:#010x} on core {}",
                rawstat.bits(),
                pp.description()
            );
        }
        pp.enable_interrupts();
    }

    /// Called when the group's watchdog expires. The job is failed from the bottom half, once it
    /// has seen that the watchdog wasn't re-armed meanwhile.
    pub fn timeout(&self) {
        debug!("Mali group: Timeout on {}", self.id);
        self.core_timed_out.store(true, Ordering::Release);
        let bottom_half = match self.cores {
            GroupCores::Gp(_) => BottomHalf::Gp,
            GroupCores::Pp(_) | GroupCores::VirtualPp { .. } => BottomHalf::Pp,
        };
        self.ctx.work.schedule(self.id, bottom_half);
    }

    /// Runs a bottom half scheduled by an upper half or [`Group::timeout`].
    pub fn run_bottom_half(&self, bottom_half: BottomHalf) {
        match bottom_half {
            BottomHalf::Mmu => self.bottom_half_mmu(),
            BottomHalf::Gp => self.bottom_half_gp(),
            BottomHalf::Pp => self.bottom_half_pp(),
        }
    }
}
