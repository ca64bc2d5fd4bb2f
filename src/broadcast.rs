// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Mali-450 broadcast unit, which forwards register writes to the broadcast PP and MMU to every
//! member of a virtual group, and merges the members' interrupts.

use crate::{
    Result,
    hw_core::{HwCore, Resource},
    platform::Platform,
    pp::PpCore,
};
use core::sync::atomic::{AtomicU32, Ordering};
use log::{debug, error};
use mali_regs::bcast;

/// The broadcast unit.
pub struct BroadcastUnit {
    hw: HwCore,
    /// Mask to program on reset. Changed only with the virtual group's lock held.
    current_mask: AtomicU32,
}

impl BroadcastUnit {
    /// Maps the unit and programs an empty mask.
    pub fn create(platform: &dyn Platform, resource: &Resource) -> Result<Self> {
        debug!(
            "Mali Broadcast unit: Creating Mali Broadcast unit: {}",
            resource.description
        );
        let hw = HwCore::create(platform, resource, bcast::REGISTERS_SIZE)
            .inspect_err(|_| error!("Mali Broadcast unit: Failed map broadcast unit"))?;
        let unit = Self {
            hw,
            current_mask: AtomicU32::new(0),
        };
        unit.reset();
        Ok(unit)
    }

    /// Adds a PP core and its MMU to the stored mask. Takes effect on the next
    /// [`BroadcastUnit::reset`].
    pub fn add_core(&self, pp: &PpCore) {
        let bcast_id = pp.bcast_id();
        self.current_mask
            .fetch_or(bcast_id | (bcast_id << bcast::MMU_MASK_SHIFT), Ordering::Relaxed);
    }

    /// Removes a PP core and its MMU from the stored mask.
    pub fn remove_core(&self, pp: &PpCore) {
        let bcast_id = pp.bcast_id();
        self.current_mask.fetch_and(
            !(bcast_id | (bcast_id << bcast::MMU_MASK_SHIFT)),
            Ordering::Relaxed,
        );
    }

    /// The stored mask.
    pub fn mask(&self) -> u32 {
        self.current_mask.load(Ordering::Relaxed)
    }

    /// Programs the stored mask.
    pub fn reset(&self) {
        let mask = self.mask();
        self.hw.write(bcast::BROADCAST_MASK, mask);
        self.hw.write(bcast::IRQ_OVERRIDE_MASK, mask & bcast::PP_MASK);
    }

    /// Stops broadcasting, so that members can be addressed individually. The stored mask is
    /// kept for the next [`BroadcastUnit::reset`].
    pub fn disable(&self) {
        self.hw.write(bcast::BROADCAST_MASK, 0);
        self.hw.write(bcast::IRQ_OVERRIDE_MASK, 0);
    }
}
