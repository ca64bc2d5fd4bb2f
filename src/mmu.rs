// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Per-group MMU: stall handshake, TLB maintenance, page directory switching and page fault
//! acknowledgement.
//!
//! The MMU has no explicit state in software. Whether it is paging, stalled or handling a page
//! fault is read back from the status register every time.

use crate::{
    Error, Result,
    config::Config,
    hw_core::{HwCore, Resource},
    page_directory::{MmuTables, pde_index},
    platform::{IrqProbe, Platform},
};
use log::{debug, error, trace};
use mali_regs::mmu::{self, Command, Interrupt, Status};

/// Value written to the DTE register before a hard reset. The hardware only keeps the page
/// aligned bits, and clears the register once the reset has finished.
const RESET_SENTINEL: u32 = 0xCAFE_BABE;

/// An MMU unit.
pub struct MmuCore {
    hw: HwCore,
    irq: Option<u32>,
    poll_count: u32,
    empty_page_directory: u32,
    fault_flush_page_directory: u32,
}

impl MmuCore {
    /// Maps and resets the MMU described by `resource`, and sets up its interrupt.
    ///
    /// The broadcast MMU of a virtual group is neither reset nor given an interrupt of its own;
    /// it is reset through the physical MMUs behind it.
    pub fn create(
        platform: &dyn Platform,
        resource: &Resource,
        tables: &MmuTables,
        config: &Config,
        is_virtual: bool,
    ) -> Result<Self> {
        debug!("Mali MMU: Creating Mali MMU: {}", resource.description);
        let mmu = Self {
            hw: HwCore::create(platform, resource, mmu::REGISTERS_SIZE)?,
            irq: resource.irq,
            poll_count: config.poll_count_fast,
            empty_page_directory: tables.empty_page_directory(),
            fault_flush_page_directory: tables.fault_flush_page_directory(),
        };
        if is_virtual {
            return Ok(mmu);
        }
        mmu.reset()?;
        platform.irq_init(resource, &mmu).inspect_err(|_| {
            error!(
                "Mali MMU: Failed to setup interrupt handlers for MMU {}",
                mmu.description()
            )
        })?;
        Ok(mmu)
    }

    /// Name of the unit.
    pub fn description(&self) -> &'static str {
        self.hw.description()
    }

    /// Interrupt line, if known.
    pub fn irq(&self) -> Option<u32> {
        self.irq
    }

    fn status(&self) -> Status {
        Status::from_bits_retain(self.hw.read(mmu::STATUS))
    }

    fn command(&self, command: Command) {
        self.hw.write(mmu::COMMAND, command as u32);
    }

    fn enable_paging(&self) {
        self.command(Command::EnablePaging);
        if self
            .hw
            .poll(mmu::STATUS, self.poll_count, |status| {
                Status::from_bits_retain(status).contains(Status::PAGING_ENABLED)
            })
            .is_none()
        {
            error!(
                "Enable paging request failed, MMU status is {:#010x}",
                self.status().bits()
            );
        }
    }

    /// Stalls the MMU so that no new translations start.
    ///
    /// Returns true if the MMU is stalled afterwards, or doesn't need to be because paging is
    /// disabled. Returns false if the MMU is handling a page fault, in which case it can't be
    /// stalled and the caller must not rely on it being quiescent.
    pub fn enable_stall(&self) -> bool {
        let status = self.status();
        if !status.contains(Status::PAGING_ENABLED) {
            trace!("MMU stall is implicit when paging is not enabled");
            return true;
        }
        if status.contains(Status::PAGE_FAULT_ACTIVE) {
            debug!("Aborting MMU stall request since it is in pagefault state");
            return false;
        }

        self.command(Command::EnableStall);

        let Some(status) = self.hw.poll(mmu::STATUS, self.poll_count, |status| {
            let status = Status::from_bits_retain(status);
            status.contains(Status::PAGE_FAULT_ACTIVE)
                || (status.contains(Status::STALL_ACTIVE)
                    && !status.contains(Status::STALL_NOT_ACTIVE))
                || !status.contains(Status::PAGING_ENABLED)
        }) else {
            debug!(
                "Enable stall request failed, MMU status is {:#010x}",
                self.status().bits()
            );
            return false;
        };

        if Status::from_bits_retain(status).contains(Status::PAGE_FAULT_ACTIVE) {
            debug!("Aborting MMU stall request since it has a pagefault");
            return false;
        }
        true
    }

    /// Lets the MMU resume translations after [`MmuCore::enable_stall`].
    pub fn disable_stall(&self) {
        let status = self.status();
        if !status.contains(Status::PAGING_ENABLED) {
            trace!("MMU disable stall skipped since paging is not enabled");
            return;
        }
        if status.contains(Status::PAGE_FAULT_ACTIVE) {
            debug!("Aborting MMU disable stall request since it is in pagefault state");
            return;
        }

        self.command(Command::DisableStall);

        if self
            .hw
            .poll(mmu::STATUS, self.poll_count, |status| {
                let status = Status::from_bits_retain(status);
                !status.contains(Status::STALL_ACTIVE) || status.contains(Status::PAGE_FAULT_ACTIVE)
            })
            .is_none()
        {
            debug!(
                "Disable stall request failed, MMU status is {:#010x}",
                self.status().bits()
            );
        }
    }

    /// Leaves page fault mode.
    pub fn page_fault_done(&self) {
        trace!("Mali MMU: {}: Leaving page fault mode", self.description());
        self.command(Command::PageFaultDone);
    }

    fn raw_reset(&self) -> Result<()> {
        self.hw.write(mmu::DTE_ADDR, RESET_SENTINEL);
        debug_assert_eq!(self.hw.read(mmu::DTE_ADDR), RESET_SENTINEL & !0xFFF);
        self.command(Command::HardReset);

        if self
            .hw
            .poll(mmu::DTE_ADDR, self.poll_count, |dte| dte == 0)
            .is_none()
        {
            error!(
                "Reset request failed, MMU status is {:#010x}",
                self.status().bits()
            );
            return Err(Error::Fault);
        }
        Ok(())
    }

    /// Hard resets the MMU and leaves it paging with the empty page directory.
    ///
    /// Returns `Error::Busy` if the MMU could not be stalled first and the reset then failed.
    pub fn reset(&self) -> Result<()> {
        let stalled = self.enable_stall();
        debug!("Mali MMU: reset: {}", self.description());

        let result = match self.raw_reset() {
            Ok(()) => {
                self.hw.write(
                    mmu::INT_MASK,
                    (Interrupt::PAGE_FAULT | Interrupt::READ_BUS_ERROR).bits(),
                );
                // No session is active, so just activate the empty page directory.
                self.hw.write(mmu::DTE_ADDR, self.empty_page_directory);
                self.enable_paging();
                Ok(())
            }
            Err(_) if !stalled => Err(Error::Busy),
            Err(e) => Err(e),
        };
        self.disable_stall();
        result
    }

    /// Stalls the MMU and invalidates the whole TLB.
    ///
    /// Returns false if the MMU was in page fault mode. The TLB is invalidated regardless.
    pub fn zap_tlb(&self) -> bool {
        let stalled = self.enable_stall();
        self.command(Command::ZapCache);
        if !stalled {
            // Stall could only fail because of a page fault, so it can't be disabled either.
            return false;
        }
        self.disable_stall();
        true
    }

    /// Invalidates the whole TLB without stalling. Only valid when no job is using the MMU.
    pub fn zap_tlb_without_stall(&self) {
        self.command(Command::ZapCache);
    }

    /// Invalidates the TLB entry for the page table covering the given GPU virtual address.
    pub fn invalidate_page(&self, address: u32) {
        self.hw.write(mmu::ZAP_ONE_LINE, pde_index(address) as u32);
    }

    fn activate_address_space(&self, page_directory: u32) {
        let status = self.status();
        debug_assert!(
            status.intersects(Status::STALL_ACTIVE | Status::PAGE_FAULT_ACTIVE)
                || !status.contains(Status::PAGING_ENABLED)
        );
        self.hw.write(mmu::DTE_ADDR, page_directory);
        self.command(Command::ZapCache);
    }

    /// Switches to the page directory at the given physical address.
    ///
    /// Returns false without switching if the MMU could not be stalled.
    pub fn activate_page_directory(&self, page_directory: u32) -> bool {
        trace!(
            "Asked to activate page directory {:#x} on MMU {}",
            page_directory,
            self.description()
        );
        if !self.enable_stall() {
            return false;
        }
        self.activate_address_space(page_directory);
        self.disable_stall();
        true
    }

    /// Switches to the page directory with no valid mappings. The MMU must not be in use.
    pub fn activate_empty_page_directory(&self) {
        debug!(
            "Activating the empty page directory on MMU {}",
            self.description()
        );
        let stalled = self.enable_stall();
        debug_assert!(stalled);
        self.activate_address_space(self.empty_page_directory);
        self.disable_stall();
    }

    /// Switches to the fault flush page directory, in which every address is valid, so that any
    /// outstanding faulting accesses can drain. Works in page fault mode.
    pub fn activate_fault_flush_page_directory(&self) {
        debug!(
            "Activating the page fault flush page directory on MMU {}",
            self.description()
        );
        // Expected to fail if in page fault mode.
        let stalled = self.enable_stall();
        self.activate_address_space(self.fault_flush_page_directory);
        if stalled {
            self.disable_stall();
        }
    }

    /// Reads the raw interrupt status.
    pub fn read_rawstat(&self) -> Interrupt {
        Interrupt::from_bits_retain(self.hw.read(mmu::INT_RAWSTAT))
    }

    /// Reads the masked interrupt status.
    pub fn read_int_status(&self) -> Interrupt {
        Interrupt::from_bits_retain(self.hw.read(mmu::INT_STATUS))
    }

    /// Masks all interrupts.
    pub fn mask_all_interrupts(&self) {
        self.hw.write(mmu::INT_MASK, 0);
    }

    /// Reads the status register.
    pub fn read_status(&self) -> Status {
        self.status()
    }

    /// Reads the address of the last page fault.
    pub fn read_page_fault_addr(&self) -> u32 {
        self.hw.read(mmu::PAGE_FAULT_ADDR)
    }
}

impl IrqProbe for MmuCore {
    fn probe_trigger(&self) {
        self.hw.write(
            mmu::INT_RAWSTAT,
            (Interrupt::PAGE_FAULT | Interrupt::READ_BUS_ERROR).bits(),
        );
    }

    fn probe_ack(&self) -> Result<()> {
        let int_stat = self.read_int_status();
        debug!("MMU probe: interrupt status {:#x}", int_stat.bits());
        for bit in [Interrupt::PAGE_FAULT, Interrupt::READ_BUS_ERROR] {
            if int_stat.contains(bit) {
                self.hw.write(mmu::INT_CLEAR, bit.bits());
            } else {
                debug!("MMU probe: {:?} not detected", bit);
            }
        }
        if int_stat.contains(Interrupt::PAGE_FAULT | Interrupt::READ_BUS_ERROR) {
            Ok(())
        } else {
            Err(Error::Fault)
        }
    }
}
