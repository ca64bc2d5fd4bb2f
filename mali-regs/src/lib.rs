// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Register offsets, command values and status bits for the units of the Arm Mali-300, Mali-400
//! and Mali-450 GPUs.
//!
//! Offsets are byte offsets from the start of each unit's register window.

#![no_std]

pub mod bcast;
pub mod dlbu;
pub mod gp;
pub mod l2;
pub mod mmu;
pub mod pmu;
pub mod pp;

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Value used in performance counter source registers to indicate that no counter is selected.
pub const NO_COUNTER: u32 = 0xFFFF_FFFF;

/// Product ID, as found in the upper 16 bits of a PP core's (or GP core's) version register.
#[derive(Clone, Copy, Debug, Eq, IntoPrimitive, PartialEq, TryFromPrimitive)]
#[repr(u32)]
pub enum ProductId {
    /// Mali-200.
    Mali200 = 0xC807,
    /// Mali-300.
    Mali300 = 0xCE07,
    /// Mali-400 MP.
    Mali400 = 0xCD07,
    /// Mali-450 MP.
    Mali450 = 0xCF07,
}

impl ProductId {
    /// Extracts the product ID from a core version register value.
    pub fn from_version(version: u32) -> Option<Self> {
        Self::try_from(version >> 16).ok()
    }
}

/// Extracts the major revision from a core version register value.
pub const fn version_major(version: u32) -> u8 {
    ((version >> 8) & 0xFF) as u8
}

/// Extracts the minor revision from a core version register value.
pub const fn version_minor(version: u32) -> u8 {
    (version & 0xFF) as u8
}
