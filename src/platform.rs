// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Hooks which the host environment implements for the driver core.

#[cfg(test)]
pub(crate) mod test;

use crate::{
    Error, Result,
    group::{BottomHalf, GroupId},
    hw_core::{RegisterIo, Resource},
};
use alloc::boxed::Box;

/// The hooks implemented by every host.
pub trait Platform: Send + Sync {
    /// Returns the physical base address of the GPU register space, if known.
    fn gpu_base_address(&self) -> Option<u64>;

    /// Looks up the resource whose register window starts at the given physical address.
    ///
    /// Returns `None` if the hardware doesn't have a unit at that address.
    fn find_resource(&self, base: u64) -> Option<Resource>;

    /// Maps `size` bytes of registers starting at the resource's base address.
    fn map_registers(&self, resource: &Resource, size: usize) -> Result<Box<dyn RegisterIo>>;

    /// Creates the watchdog timer for a group. When the timer fires the host must call
    /// [`Group::timeout`](crate::group::Group::timeout) on that group.
    fn create_timer(&self, group: GroupId) -> Result<Box<dyn TimeoutTimer>>;

    /// Whether interrupt lines are shared between units which may be powered independently.
    fn shared_interrupts(&self) -> bool {
        false
    }

    /// Connects the unit described by `resource` to its interrupt line.
    ///
    /// If the resource doesn't specify an interrupt line, the host may find it by raising a test
    /// interrupt with [`IrqProbe::probe_trigger`] and checking it with [`IrqProbe::probe_ack`].
    fn irq_init(&self, resource: &Resource, _probe: &dyn IrqProbe) -> Result<()> {
        match resource.irq {
            Some(_) => Ok(()),
            None => Err(Error::NotFound),
        }
    }
}

/// A one-shot job watchdog.
pub trait TimeoutTimer: Send + Sync {
    /// Arms the timer to fire after `ms` milliseconds, replacing any previous deadline.
    fn arm(&self, ms: u32);

    /// Disarms the timer without waiting for a concurrently running expiry to finish.
    fn cancel_async(&self);

    /// Whether the timer is armed and has not fired yet.
    fn is_pending(&self) -> bool;
}

/// Queue for deferred interrupt handling.
///
/// The host must later call [`Group::run_bottom_half`](crate::group::Group::run_bottom_half) for
/// each scheduled item, from a context which may block.
pub trait DeferredWork: Send + Sync {
    /// Schedules the given bottom half of the given group.
    fn schedule(&self, group: GroupId, bottom_half: BottomHalf);
}

/// Callbacks used to identify a unit's interrupt line.
pub trait IrqProbe {
    /// Makes the unit raise an interrupt.
    fn probe_trigger(&self);

    /// Checks whether the interrupt raised by `probe_trigger` is pending, and clears it.
    fn probe_ack(&self) -> Result<()>;
}

/// A 4 KiB page used for MMU tables, viewed as 1024 words.
///
/// The page is returned to its allocator when dropped.
pub trait TablePage: Send + Sync {
    /// Physical address of the page, as seen by the GPU.
    fn phys_addr(&self) -> u32;

    /// Reads the word at `index`.
    fn read(&self, index: usize) -> u32;

    /// Writes the word at `index`.
    fn write(&self, index: usize, value: u32);
}

/// Source of MMU table pages.
pub trait PageAllocator: Send + Sync {
    /// Allocates a page. Its contents are undefined.
    fn alloc_page(&self) -> Result<Box<dyn TablePage>>;
}
