// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! MMU registers.

use bitflags::bitflags;

/// Size of the MMU register window.
pub const REGISTERS_SIZE: usize = 0x24;

/// Current page directory (DTE) address.
pub const DTE_ADDR: u32 = 0x0000;
/// Status.
pub const STATUS: u32 = 0x0004;
/// Command.
pub const COMMAND: u32 = 0x0008;
/// Address of the last page fault.
pub const PAGE_FAULT_ADDR: u32 = 0x000C;
/// Invalidates the TLB line covering the written address.
pub const ZAP_ONE_LINE: u32 = 0x0010;
/// Raw interrupt status.
pub const INT_RAWSTAT: u32 = 0x0014;
/// Interrupt clear.
pub const INT_CLEAR: u32 = 0x0018;
/// Interrupt mask.
pub const INT_MASK: u32 = 0x001C;
/// Masked interrupt status.
pub const INT_STATUS: u32 = 0x0020;

/// Values for the [`COMMAND`] register.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum Command {
    /// Enable paging (memory translation).
    EnablePaging = 0x00,
    /// Disable paging.
    DisablePaging = 0x01,
    /// Stall the MMU so no new translations are started.
    EnableStall = 0x02,
    /// Resume translations.
    DisableStall = 0x03,
    /// Invalidate the whole TLB.
    ZapCache = 0x04,
    /// Signal that the page fault has been handled.
    PageFaultDone = 0x05,
    /// Hard reset of the MMU.
    HardReset = 0x06,
}

bitflags! {
    /// MMU status register value.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    #[repr(transparent)]
    pub struct Status: u32 {
        /// Paging is enabled.
        const PAGING_ENABLED = 1 << 0;
        /// A page fault is being handled.
        const PAGE_FAULT_ACTIVE = 1 << 1;
        /// The MMU is stalled.
        const STALL_ACTIVE = 1 << 2;
        /// The MMU is idle.
        const IDLE = 1 << 3;
        /// The replay buffer is empty.
        const REPLAY_BUFFER_EMPTY = 1 << 4;
        /// The faulting access was a write.
        const PAGE_FAULT_IS_WRITE = 1 << 5;
        /// Stall is not active. Set by some revisions while the MMU is powered down.
        const STALL_NOT_ACTIVE = 1 << 31;
    }
}

impl Status {
    /// Shift of the bus ID field of a page fault.
    pub const PAGE_FAULT_BUS_ID_SHIFT: u32 = 6;
    /// Mask of the bus ID field of a page fault, after shifting.
    pub const PAGE_FAULT_BUS_ID_MASK: u32 = 0x1F;
}

bitflags! {
    /// MMU interrupt bits.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    #[repr(transparent)]
    pub struct Interrupt: u32 {
        /// Page fault.
        const PAGE_FAULT = 1 << 0;
        /// Bus error while reading page tables.
        const READ_BUS_ERROR = 1 << 1;
    }
}
