// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Mali-450 dynamic load balancing unit (DLBU) registers.

/// Size of the DLBU register window.
pub const REGISTERS_SIZE: usize = 0x400;

/// Physical address of the master tile list page, plus enable bit 0.
pub const MASTER_TLLIST_PHYS_ADDR: u32 = 0x0000;
/// GPU virtual address of the master tile list page.
pub const MASTER_TLLIST_VADDR: u32 = 0x0004;
/// Tile list virtual base address.
pub const TLLIST_VBASEADDR: u32 = 0x0008;
/// Framebuffer dimensions.
pub const FB_DIM: u32 = 0x000C;
/// Tile list configuration.
pub const TLLIST_CONF: u32 = 0x0010;
/// Start tile position.
pub const START_TILE_POS: u32 = 0x0014;
/// PP enable mask.
pub const PP_ENABLE_MASK: u32 = 0x0018;

/// Number of per-job DLBU registers, starting at [`TLLIST_VBASEADDR`].
pub const NUM_JOB_REGISTERS: usize = 4;

/// GPU virtual address at which the master tile list page is mapped in every session.
pub const VIRT_ADDR: u32 = 0xFFF0_0000;

/// Enable bit in [`MASTER_TLLIST_PHYS_ADDR`].
pub const PHYS_ADDR_ENABLE: u32 = 1;
