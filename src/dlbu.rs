// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Mali-450 dynamic load balancing unit, which hands out the tiles of a virtual job to the PP
//! cores of a virtual group.

use crate::{
    Result,
    hw_core::{HwCore, Resource},
    page_directory::{CacheSettings, PAGE_SIZE, PageDirectory},
    platform::{PageAllocator, Platform, TablePage},
    pp::PpCore,
    pp_job::PpJob,
};
use alloc::boxed::Box;
use core::sync::atomic::{AtomicU32, Ordering};
use log::{debug, error};
use mali_regs::dlbu;

/// The master tile list page which the DLBU uses for every session, mapped at
/// [`dlbu::VIRT_ADDR`] in each session's address space.
pub struct MasterTileList {
    page: Box<dyn TablePage>,
}

impl MasterTileList {
    /// Allocates the page.
    pub fn new(allocator: &dyn PageAllocator) -> Result<Self> {
        let page = allocator
            .alloc_page()
            .inspect_err(|_| error!("Mali DLBU: Failed to allocate master tile list page"))?;
        Ok(Self { page })
    }

    /// Physical address of the page.
    pub fn phys_addr(&self) -> u32 {
        self.page.phys_addr()
    }

    /// Maps the page into a session's address space.
    pub fn map_into(&self, page_directory: &mut PageDirectory) -> Result<()> {
        page_directory.map(dlbu::VIRT_ADDR, PAGE_SIZE)?;
        page_directory.update(
            dlbu::VIRT_ADDR,
            self.phys_addr(),
            PAGE_SIZE,
            CacheSettings::Standard,
        );
        Ok(())
    }
}

/// The DLBU.
pub struct Dlbu {
    hw: HwCore,
    master_tllist_phys: u32,
    /// Changed only with the virtual group's lock held.
    pp_cores_mask: AtomicU32,
}

impl Dlbu {
    /// Maps the unit and resets it to use the given master tile list page.
    pub fn create(
        platform: &dyn Platform,
        resource: &Resource,
        tiles: &MasterTileList,
    ) -> Result<Self> {
        debug!(
            "Mali DLBU: Creating Mali dynamic load balancing unit: {}",
            resource.description
        );
        let dlbu = Self {
            hw: HwCore::create(platform, resource, dlbu::REGISTERS_SIZE)?,
            master_tllist_phys: tiles.phys_addr(),
            pp_cores_mask: AtomicU32::new(0),
        };
        dlbu.reset();
        Ok(dlbu)
    }

    /// Programs the master tile list and the stored PP core mask, and clears the job registers.
    pub fn reset(&self) {
        let registers = [
            self.master_tllist_phys | dlbu::PHYS_ADDR_ENABLE,
            dlbu::VIRT_ADDR,
            0,
            0,
            0,
            0,
            self.mask(),
        ];
        debug!("Mali DLBU: mask is {:#x}", registers[6]);
        self.hw
            .write_array_relaxed(dlbu::MASTER_TLLIST_PHYS_ADDR, &registers);
    }

    /// Adds a PP core to the stored mask. Call [`Dlbu::update_mask`] or [`Dlbu::reset`] to apply
    /// it.
    pub fn add_core(&self, pp: &PpCore) {
        self.pp_cores_mask.fetch_or(pp.bcast_id(), Ordering::Relaxed);
    }

    /// Removes a PP core from the stored mask.
    pub fn remove_core(&self, pp: &PpCore) {
        self.pp_cores_mask.fetch_and(!pp.bcast_id(), Ordering::Relaxed);
    }

    /// The stored PP core mask.
    pub fn mask(&self) -> u32 {
        self.pp_cores_mask.load(Ordering::Relaxed)
    }

    /// Writes the stored PP core mask.
    pub fn update_mask(&self) {
        self.hw.write(dlbu::PP_ENABLE_MASK, self.mask());
    }

    /// Writes a virtual job's tile list configuration.
    pub fn config_job(&self, job: &PpJob) {
        debug_assert!(job.is_virtual());
        self.hw
            .write_array_relaxed(dlbu::TLLIST_VBASEADDR, job.dlbu_registers());
    }
}
