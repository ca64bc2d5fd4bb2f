// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Pixel processor (PP) registers, in the Mali-200 compatible layout used by Mali-300, Mali-400
//! and Mali-450.

use bitflags::bitflags;

/// Size of the PP register window.
pub const REGISTERS_SIZE: usize = 0x10F0;

/// Number of frame registers on Mali-400 class cores.
pub const NUM_FRAME_REGISTERS: usize = 23;
/// Number of registers in each write-back unit block.
pub const NUM_WB_REGISTERS: usize = 12;
/// Number of write-back units.
pub const NUM_WB_UNITS: usize = 3;

/// First frame register (render list address).
pub const FRAME: u32 = 0x0000;
/// Fragment shader stack address. Frame register index 12.
pub const STACK: u32 = 0x0030;
/// Index of [`STACK`] within the frame register block.
pub const STACK_INDEX: usize = (STACK / 4) as usize;
/// First register of write-back unit 0.
pub const WB0: u32 = 0x0100;
/// First register of write-back unit 1.
pub const WB1: u32 = 0x0200;
/// First register of write-back unit 2.
pub const WB2: u32 = 0x0300;

/// Version.
pub const VERSION: u32 = 0x1000;
/// Address of the render list currently being processed.
pub const CURRENT_REND_LIST_ADDR: u32 = 0x1004;
/// Status.
pub const STATUS: u32 = 0x1008;
/// Management control.
pub const CTRL_MGMT: u32 = 0x100C;
/// Raw interrupt status.
pub const INT_RAWSTAT: u32 = 0x1020;
/// Interrupt clear.
pub const INT_CLEAR: u32 = 0x1024;
/// Interrupt mask.
pub const INT_MASK: u32 = 0x1028;
/// Masked interrupt status.
pub const INT_STATUS: u32 = 0x102C;
/// Write boundary low. Used as a scratch register during hard reset.
pub const WRITE_BOUNDARY_LOW: u32 = 0x1044;
/// Bus error status.
pub const BUS_ERROR_STATUS: u32 = 0x1050;
/// Performance counter 0 enable.
pub const PERF_CNT_0_ENABLE: u32 = 0x1080;
/// Performance counter 0 source.
pub const PERF_CNT_0_SRC: u32 = 0x1084;
/// Performance counter 0 value.
pub const PERF_CNT_0_VALUE: u32 = 0x108C;
/// Performance counter 1 enable.
pub const PERF_CNT_1_ENABLE: u32 = 0x10A0;
/// Performance counter 1 source.
pub const PERF_CNT_1_SRC: u32 = 0x10A4;
/// Performance counter 1 value.
pub const PERF_CNT_1_VALUE: u32 = 0x10AC;

/// Value to enable a performance counter.
pub const PERF_CNT_ENABLE: u32 = 1;

bitflags! {
    /// PP management control register value.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    #[repr(transparent)]
    pub struct Control: u32 {
        /// Stop the AXI bus.
        const STOP_BUS = 1 << 0;
        /// Flush caches.
        const FLUSH_CACHES = 1 << 3;
        /// Hard reset.
        const FORCE_RESET = 1 << 5;
        /// Start rendering the programmed frame.
        const START_RENDERING = 1 << 6;
        /// Soft reset.
        const SOFT_RESET = 1 << 7;
    }
}

bitflags! {
    /// PP interrupt bits.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    #[repr(transparent)]
    pub struct Interrupt: u32 {
        /// Frame finished.
        const END_OF_FRAME = 1 << 0;
        /// Tile finished.
        const END_OF_TILE = 1 << 1;
        /// Hang detected.
        const HANG = 1 << 2;
        /// Hang forced by software.
        const FORCE_HANG = 1 << 3;
        /// Bus error.
        const BUS_ERROR = 1 << 4;
        /// Bus stopped.
        const BUS_STOP = 1 << 5;
        /// Performance counter 0 reached its limit.
        const CNT_0_LIMIT = 1 << 6;
        /// Performance counter 1 reached its limit.
        const CNT_1_LIMIT = 1 << 7;
        /// Write outside the write boundary.
        const WRITE_BOUNDARY_ERROR = 1 << 8;
        /// Invalid polygon list command.
        const INVALID_PLIST_COMMAND = 1 << 9;
        /// Call stack underflow.
        const CALL_STACK_UNDERFLOW = 1 << 10;
        /// Call stack overflow.
        const CALL_STACK_OVERFLOW = 1 << 11;
        /// Soft reset completed.
        const RESET_COMPLETED = 1 << 12;
    }
}

impl Interrupt {
    /// Interrupts the driver handles.
    pub const MASK_USED: Self = Self::END_OF_FRAME
        .union(Self::FORCE_HANG)
        .union(Self::BUS_ERROR)
        .union(Self::WRITE_BOUNDARY_ERROR)
        .union(Self::INVALID_PLIST_COMMAND)
        .union(Self::CALL_STACK_UNDERFLOW)
        .union(Self::CALL_STACK_OVERFLOW);

    /// Every interrupt the PP can raise.
    pub const MASK_ALL: Self = Self::all();
}

bitflags! {
    /// PP status register value.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    #[repr(transparent)]
    pub struct Status: u32 {
        /// Rendering is in progress. On a broadcast PP this is the OR over all members.
        const RENDERING_ACTIVE = 1 << 0;
        /// The bus has been stopped.
        const BUS_STOPPED = 1 << 4;
    }
}
