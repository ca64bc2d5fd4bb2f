// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Power management unit, which switches the power domains of the GPU.

use crate::{
    Error, Result,
    context::DriverContext,
    hw_core::{HwCore, Resource},
    platform::Platform,
};
use alloc::sync::Arc;
use log::{debug, error, trace};
use mali_regs::pmu;
use spin::mutex::SpinMutex;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Command {
    PowerUp,
    PowerDown,
}

impl Command {
    const fn offset(self) -> u32 {
        match self {
            Self::PowerUp => pmu::POWER_UP,
            Self::PowerDown => pmu::POWER_DOWN,
        }
    }
}

#[derive(Debug)]
struct Masks {
    /// Domains which exist.
    registered: u32,
    /// Domains which should be powered.
    active: u32,
}

/// The PMU.
pub struct Pmu {
    hw: HwCore,
    ctx: Arc<DriverContext>,
    masks: SpinMutex<Masks>,
    switch_delay: u32,
    poll_count: u32,
}

impl Pmu {
    /// Maps the PMU. The domains are taken from the configured PMU mask, or else derived from the
    /// number of PP cores and L2 caches found.
    pub fn create(
        platform: &dyn Platform,
        resource: &Resource,
        ctx: Arc<DriverContext>,
        pp_count: u32,
        l2_count: u32,
    ) -> Result<Self> {
        debug!("Mali PMU: Creating Mali PMU core");
        let registered = match ctx.config.pmu_mask {
            0 => detect_mask(pp_count, l2_count),
            mask => mask,
        };
        Ok(Self {
            hw: HwCore::create(platform, resource, pmu::REGISTERS_SIZE)?,
            switch_delay: ctx.config.pmu_switch_delay,
            poll_count: ctx.config.poll_count_slow,
            ctx,
            masks: SpinMutex::new(Masks {
                registered,
                active: registered,
            }),
        })
    }

    /// Domains which exist.
    pub fn registered_mask(&self) -> u32 {
        self.masks.lock().registered
    }

    /// Domains which should be powered.
    pub fn active_mask(&self) -> u32 {
        self.masks.lock().active
    }

    fn set_defaults(&self) {
        self.hw.write_relaxed(pmu::INT_MASK, 0);
        self.hw.write_relaxed(pmu::SW_DELAY, self.switch_delay);
    }

    fn send_command_internal(&self, command: Command, mask: u32) -> Result<()> {
        debug_assert_eq!(
            self.hw.read(pmu::INT_RAWSTAT) & pmu::IRQ_COMMAND_COMPLETE,
            0
        );
        self.hw.write(command.offset(), mask);
        if self
            .hw
            .poll(pmu::INT_RAWSTAT, self.poll_count, |rawstat| {
                rawstat & pmu::IRQ_COMMAND_COMPLETE != 0
            })
            .is_none()
        {
            error!("Mali PMU: {:?} of {:#010x} timed out", command, mask);
            return Err(Error::Timeout);
        }
        self.hw.write(pmu::INT_CLEAR, pmu::IRQ_COMMAND_COMPLETE);
        Ok(())
    }

    /// Sends a command unless the domains are already in the requested state.
    fn send_command(&self, masks: &Masks, command: Command, mask: u32) -> Result<()> {
        if mask == 0 {
            return Ok(());
        }
        // Status bits are set for powered down domains.
        let stat = self.hw.read(pmu::STATUS) & masks.registered;
        let already_done = match command {
            Command::PowerDown => mask == stat,
            Command::PowerUp => stat & mask == 0,
        };
        if already_done {
            return Ok(());
        }
        self.send_command_internal(command, mask)
    }

    /// Brings the hardware in line with the active mask.
    pub fn reset(&self) -> Result<()> {
        let masks = self.masks.lock();
        self.set_defaults();

        let stat = self.hw.read(pmu::STATUS);
        let off_mask = masks.registered & !(stat | masks.active);
        let on_mask = masks.registered & (stat & masks.active);
        if off_mask != 0 {
            self.send_command_internal(Command::PowerDown, off_mask)?;
        }
        if on_mask != 0 {
            self.send_command_internal(Command::PowerUp, on_mask)?;
        }
        debug_assert_eq!(
            self.hw.read(pmu::STATUS) & masks.registered,
            masks.registered & !masks.active
        );
        Ok(())
    }

    /// Powers down the domains in `mask`.
    ///
    /// Returns [`Error::Busy`] without touching the hardware if the whole GPU is off; the domains
    /// are still recorded as inactive, so the next [`Pmu::reset`] leaves them off.
    pub fn power_down(&self, mask: u32) -> Result<()> {
        let mut masks = self.masks.lock();
        debug_assert_ne!(masks.registered, 0);
        if mask > masks.registered {
            return Err(Error::InvalidArgs);
        }
        trace!("Mali PMU: Power down ({:#010x})", mask);
        masks.active &= !mask;
        if !self.ctx.is_power_on() {
            trace!(
                "Mali PMU: Skipping power down ({:#010x}) since Mali is off",
                mask
            );
            return Err(Error::Busy);
        }
        self.send_command(&masks, Command::PowerDown, mask)
    }

    /// Powers up the domains in `mask`.
    ///
    /// Returns [`Error::Busy`] without touching the hardware if the whole GPU is off; the domains
    /// are still recorded as active.
    pub fn power_up(&self, mask: u32) -> Result<()> {
        let mut masks = self.masks.lock();
        debug_assert_ne!(masks.registered, 0);
        if mask & !masks.registered != 0 {
            return Err(Error::InvalidArgs);
        }
        trace!("Mali PMU: Power up ({:#010x})", mask);
        masks.active |= mask;
        if !self.ctx.is_power_on() {
            trace!(
                "Mali PMU: Skipping power up ({:#010x}) since Mali is off",
                mask
            );
            return Err(Error::Busy);
        }
        self.send_command(&masks, Command::PowerUp, mask)
    }

    /// Powers down every domain, leaving the active mask alone.
    pub fn power_down_all(&self) -> Result<()> {
        let masks = self.masks.lock();
        self.set_defaults();
        self.send_command(&masks, Command::PowerDown, masks.registered)
    }

    /// Powers up every active domain.
    pub fn power_up_all(&self) -> Result<()> {
        let masks = self.masks.lock();
        self.set_defaults();
        self.send_command(&masks, Command::PowerUp, masks.active)
    }
}

/// Derives the power domains from the GPU configuration: Mali-300/400 have a domain per core,
/// Mali-450 groups PP cores by L2 cache.
fn detect_mask(pp_count: u32, l2_count: u32) -> u32 {
    let mask = match l2_count {
        0 => 0,
        1 => (0..pp_count.min(30)).fold(pmu::DOMAIN_GP | pmu::DOMAIN_1, |mask, i| {
            mask | 1 << (i + 2)
        }),
        _ => {
            let mut mask = pmu::DOMAIN_GP | pmu::DOMAIN_1;
            if pp_count >= 2 {
                mask |= pmu::DOMAIN_2;
            }
            if pp_count >= 5 {
                mask |= pmu::DOMAIN_3;
            }
            mask
        }
    };
    debug!(
        "Mali PMU: Power mask is {:#010x} ({} + {})",
        mask, pp_count, l2_count
    );
    mask
}
