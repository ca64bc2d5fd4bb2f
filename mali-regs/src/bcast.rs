// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Mali-450 broadcast unit registers.

/// Size of the broadcast unit register window.
pub const REGISTERS_SIZE: usize = 0x1000;

/// Which PP and MMU units receive broadcast register writes.
pub const BROADCAST_MASK: u32 = 0x0;
/// Which PP units' interrupts are merged into the broadcast interrupt.
pub const IRQ_OVERRIDE_MASK: u32 = 0x4;

/// Shift of the MMU bits within [`BROADCAST_MASK`], relative to the PP bits.
pub const MMU_MASK_SHIFT: u32 = 16;
/// Mask of the PP bits, used for [`IRQ_OVERRIDE_MASK`].
pub const PP_MASK: u32 = 0xFF;
