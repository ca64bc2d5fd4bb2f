// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Power management unit (PMU) registers.

/// Size of the PMU register window.
pub const REGISTERS_SIZE: usize = 0x28;

/// Power up the domains in the written mask.
pub const POWER_UP: u32 = 0x00;
/// Power down the domains in the written mask.
pub const POWER_DOWN: u32 = 0x04;
/// Domains currently powered down.
pub const STATUS: u32 = 0x08;
/// Interrupt mask.
pub const INT_MASK: u32 = 0x0C;
/// Raw interrupt status.
pub const INT_RAWSTAT: u32 = 0x10;
/// Interrupt clear.
pub const INT_CLEAR: u32 = 0x18;
/// Delay between switching successive domains.
pub const SW_DELAY: u32 = 0x1C;

/// Command completion interrupt bit.
pub const IRQ_COMMAND_COMPLETE: u32 = 1;

/// Power domain bit for the GP (Mali-400) or GP and its L2 cache (Mali-450).
pub const DOMAIN_GP: u32 = 1 << 0;
/// Power domain bit for the L2 cache (Mali-400) or PP0 and its L2 cache (Mali-450).
pub const DOMAIN_1: u32 = 1 << 1;
/// Power domain bit for PP0 (Mali-400) or PP1-3 (Mali-450).
pub const DOMAIN_2: u32 = 1 << 2;
/// Power domain bit for PP1 (Mali-400) or PP4-7 and their L2 cache (Mali-450).
pub const DOMAIN_3: u32 = 1 << 3;
