// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Geometry processor (GP) registers.

use bitflags::bitflags;

/// Size of the GP register window.
pub const REGISTERS_SIZE: usize = 0x98;

/// Number of frame registers written at job start, starting at [`VSCL_START_ADDR`].
pub const NUM_FRAME_REGISTERS: usize = 6;

/// Vertex shader command list start address. First frame register.
pub const VSCL_START_ADDR: u32 = 0x00;
/// Vertex shader command list end address.
pub const VSCL_END_ADDR: u32 = 0x04;
/// PLBU command list start address.
pub const PLBUCL_START_ADDR: u32 = 0x08;
/// PLBU command list end address.
pub const PLBUCL_END_ADDR: u32 = 0x0C;
/// Start of the PLBU heap.
pub const PLBU_ALLOC_START_ADDR: u32 = 0x10;
/// End of the PLBU heap.
pub const PLBU_ALLOC_END_ADDR: u32 = 0x14;
/// Command.
pub const CMD: u32 = 0x20;
/// Raw interrupt status.
pub const INT_RAWSTAT: u32 = 0x24;
/// Interrupt clear.
pub const INT_CLEAR: u32 = 0x28;
/// Interrupt mask.
pub const INT_MASK: u32 = 0x2C;
/// Masked interrupt status.
pub const INT_STAT: u32 = 0x30;
/// Write bound low. Used as a scratch register during hard reset.
pub const WRITE_BOUND_LOW: u32 = 0x34;
/// Performance counter 0 enable.
pub const PERF_CNT_0_ENABLE: u32 = 0x3C;
/// Performance counter 1 enable.
pub const PERF_CNT_1_ENABLE: u32 = 0x40;
/// Performance counter 0 source.
pub const PERF_CNT_0_SRC: u32 = 0x44;
/// Performance counter 1 source.
pub const PERF_CNT_1_SRC: u32 = 0x48;
/// Performance counter 0 value.
pub const PERF_CNT_0_VALUE: u32 = 0x4C;
/// Performance counter 1 value.
pub const PERF_CNT_1_VALUE: u32 = 0x50;
/// Status.
pub const STATUS: u32 = 0x68;
/// Version.
pub const VERSION: u32 = 0x6C;

/// Value to enable a performance counter.
pub const PERF_CNT_ENABLE: u32 = 1;

bitflags! {
    /// GP command register value.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    #[repr(transparent)]
    pub struct Command: u32 {
        /// Start the vertex shader.
        const START_VS = 1 << 0;
        /// Start the polygon list builder.
        const START_PLBU = 1 << 1;
        /// Pick up a new PLBU heap after running out of memory.
        const UPDATE_PLBU_ALLOC = 1 << 4;
        /// Hard reset.
        const RESET = 1 << 5;
        /// Force a hang interrupt.
        const FORCE_HANG = 1 << 6;
        /// Stop the AXI bus.
        const STOP_BUS = 1 << 9;
        /// Soft reset.
        const SOFT_RESET = 1 << 10;
    }
}

bitflags! {
    /// GP interrupt bits.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    #[repr(transparent)]
    pub struct Interrupt: u32 {
        /// Vertex shader command list finished.
        const VS_END_CMD_LST = 1 << 0;
        /// PLBU command list finished.
        const PLBU_END_CMD_LST = 1 << 1;
        /// PLBU heap exhausted.
        const PLBU_OUT_OF_MEM = 1 << 2;
        /// Vertex shader semaphore.
        const VS_SEM_IRQ = 1 << 3;
        /// PLBU semaphore.
        const PLBU_SEM_IRQ = 1 << 4;
        /// Hang detected.
        const HANG = 1 << 5;
        /// Hang forced by command.
        const FORCE_HANG = 1 << 6;
        /// Performance counter 0 reached its limit.
        const PERF_CNT_0_LIMIT = 1 << 7;
        /// Performance counter 1 reached its limit.
        const PERF_CNT_1_LIMIT = 1 << 8;
        /// Write outside the write bound.
        const WRITE_BOUND_ERR = 1 << 9;
        /// Synchronisation error.
        const SYNC_ERROR = 1 << 10;
        /// AXI bus error.
        const AXI_BUS_ERROR = 1 << 11;
        /// AXI bus stopped.
        const AXI_BUS_STOPPED = 1 << 12;
        /// Invalid vertex shader command.
        const VS_INVALID_CMD = 1 << 13;
        /// Invalid PLBU command.
        const PLB_INVALID_CMD = 1 << 14;
        /// Soft reset completed.
        const RESET_COMPLETED = 1 << 19;
        /// Semaphore underflow.
        const SEMAPHORE_UNDERFLOW = 1 << 20;
        /// Semaphore overflow.
        const SEMAPHORE_OVERFLOW = 1 << 21;
        /// Pointer array out of bounds.
        const PTR_ARRAY_OUT_OF_BOUNDS = 1 << 22;
    }
}

impl Interrupt {
    /// Interrupts the driver handles.
    pub const MASK_USED: Self = Self::VS_END_CMD_LST
        .union(Self::PLBU_END_CMD_LST)
        .union(Self::PLBU_OUT_OF_MEM)
        .union(Self::FORCE_HANG)
        .union(Self::WRITE_BOUND_ERR)
        .union(Self::SYNC_ERROR)
        .union(Self::AXI_BUS_ERROR)
        .union(Self::VS_INVALID_CMD)
        .union(Self::PLB_INVALID_CMD)
        .union(Self::SEMAPHORE_UNDERFLOW)
        .union(Self::SEMAPHORE_OVERFLOW)
        .union(Self::PTR_ARRAY_OUT_OF_BOUNDS);

    /// Every interrupt the GP can raise.
    pub const MASK_ALL: Self = Self::all();

    /// Both halves of the job have finished.
    pub const END_BITS: Self = Self::VS_END_CMD_LST.union(Self::PLBU_END_CMD_LST);
}

bitflags! {
    /// GP status register value.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    #[repr(transparent)]
    pub struct Status: u32 {
        /// Vertex shader is running.
        const VS_ACTIVE = 1 << 1;
        /// The bus has been stopped.
        const BUS_STOPPED = 1 << 2;
        /// PLBU is running.
        const PLBU_ACTIVE = 1 << 3;
        /// Bus error.
        const BUS_ERROR = 1 << 6;
        /// Write bound error.
        const WRITE_BOUND_ERR = 1 << 8;
    }
}
