// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Power management entry points, called by the host around turning the GPU's power off and on.
//!
//! Runtime suspend happens when the GPU is idle, so the scheduler is left alone. System suspend
//! additionally stops the scheduler first and restarts it on resume.

use crate::{group, registry::Registry};
use log::{debug, error};

/// The GPU is idle and about to lose power.
pub fn runtime_suspend(registry: &Registry) {
    debug!("Mali PM: Runtime suspend");
    group::power_off(registry.groups());
    registry.context().set_power_on(false);
}

/// The GPU has been powered up again after [`runtime_suspend`].
pub fn runtime_resume(registry: &Registry) {
    debug!("Mali PM: Runtime resume");
    power_up(registry);
}

/// The system is suspending. Stops the scheduler and powers the groups off.
pub fn os_suspend(registry: &Registry) {
    debug!("Mali PM: OS suspend");
    registry.context().scheduler.suspend();
    group::power_off(registry.groups());
    registry.context().set_power_on(false);
}

/// The system has resumed. Restores the hardware state, then restarts the scheduler.
pub fn os_resume(registry: &Registry) {
    debug!("Mali PM: OS resume");
    power_up(registry);
    registry.context().scheduler.resume();
}

/// Whether the GPU is currently powered.
pub fn is_power_on(registry: &Registry) -> bool {
    registry.context().is_power_on()
}

/// Restores the PMU's domains, and if the GPU really was off resets every unit, which lost its
/// state.
fn power_up(registry: &Registry) {
    let ctx = registry.context();
    let was_off = !ctx.is_power_on();
    if let Some(pmu) = registry.pmu()
        && let Err(e) = pmu.reset()
    {
        error!("Mali PM: Failed to reset the PMU: {}", e);
    }
    ctx.set_power_on(true);
    if was_off {
        registry.reset_gpu();
        group::power_on(registry.groups());
    }
}
