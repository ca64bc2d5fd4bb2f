// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! L2 cache registers.

use bitflags::bitflags;

/// Size of the L2 cache register window.
pub const REGISTERS_SIZE: usize = 0x30;

/// Status.
pub const STATUS: u32 = 0x0008;
/// Cache command.
pub const COMMAND: u32 = 0x0010;
/// Clear a single page, by physical address.
pub const CLEAR_PAGE: u32 = 0x0014;
/// Limit of outstanding read requests.
pub const MAX_READS: u32 = 0x0018;
/// Cache feature enables.
pub const ENABLE: u32 = 0x001C;
/// Performance counter 0 source.
pub const PERFCNT_SRC0: u32 = 0x0020;
/// Performance counter 0 value.
pub const PERFCNT_VAL0: u32 = 0x0024;
/// Performance counter 1 source.
pub const PERFCNT_SRC1: u32 = 0x0028;
/// Performance counter 1 value.
pub const PERFCNT_VAL1: u32 = 0x002C;

/// Clears the entire cache. Value for the [`COMMAND`] register.
pub const COMMAND_CLEAR_ALL: u32 = 0x01;

bitflags! {
    /// L2 cache status register value.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    #[repr(transparent)]
    pub struct Status: u32 {
        /// The command handler is busy and will ignore new commands.
        const COMMAND_BUSY = 1 << 0;
        /// The cache is busy handling data requests.
        const DATA_BUSY = 1 << 1;
    }
}

bitflags! {
    /// L2 cache enable register value.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    #[repr(transparent)]
    pub struct Enable: u32 {
        /// Permit cacheable accesses.
        const ACCESS = 1 << 0;
        /// Permit cache read allocate.
        const READ_ALLOCATE = 1 << 1;
    }
}
