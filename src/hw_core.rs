// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Register-mapped I/O shared by every hardware unit.

use crate::{Result, platform::Platform};
use alloc::boxed::Box;
use core::{
    ptr::NonNull,
    sync::atomic::{Ordering, fence},
};
use log::{debug, error};

/// A physical register range described by the host, together with its interrupt line if known.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Resource {
    /// Physical base address of the register window.
    pub base: u64,
    /// Human readable name, e.g. "Mali_PP0".
    pub description: &'static str,
    /// Interrupt line, if one is assigned.
    pub irq: Option<u32>,
}

/// 32-bit register access to one mapped register window.
///
/// Offsets are byte offsets and must be 4-byte aligned and within the mapped window.
pub trait RegisterIo: Send + Sync {
    /// Reads the register at the given offset.
    fn read(&self, offset: u32) -> u32;

    /// Writes the register at the given offset, ordered with respect to all other accesses.
    fn write(&self, offset: u32, value: u32);

    /// Writes the register at the given offset without ordering guarantees. Callers must issue
    /// [`RegisterIo::write_barrier`] before any write which depends on this one having landed.
    fn write_relaxed(&self, offset: u32, value: u32) {
        self.write(offset, value);
    }

    /// Waits until all previous writes are visible to the device.
    fn write_barrier(&self) {
        fence(Ordering::SeqCst);
    }
}

/// Register access through a volatile MMIO mapping.
#[derive(Debug)]
pub struct MmioRegisters {
    base: NonNull<u32>,
    size: usize,
}

impl MmioRegisters {
    /// Creates a register accessor for the mapped window starting at `base`.
    ///
    /// # Safety
    ///
    /// `base` must be the virtual address of a device register window of at least `size` bytes,
    /// mapped as device memory for the lifetime of the returned value, and nothing else may
    /// construct references to that memory.
    pub unsafe fn new(base: NonNull<u32>, size: usize) -> Self {
        Self { base, size }
    }

    fn register(&self, offset: u32) -> *mut u32 {
        let offset = offset as usize;
        debug_assert!(offset % 4 == 0 && offset < self.size);
        // SAFETY: The caller of `new` guaranteed that the window is `size` bytes long, and the
        // offset was checked above.
        unsafe { self.base.as_ptr().add(offset / 4) }
    }
}

// SAFETY: The register window is device memory which may be accessed from any CPU; every access
// is a single volatile 32-bit load or store.
unsafe impl Send for MmioRegisters {}

// SAFETY: As above, concurrent volatile accesses to device registers are fine.
unsafe impl Sync for MmioRegisters {}

impl RegisterIo for MmioRegisters {
    fn read(&self, offset: u32) -> u32 {
        // SAFETY: `register` returns a valid, aligned pointer into the mapped window.
        unsafe { self.register(offset).read_volatile() }
    }

    fn write(&self, offset: u32, value: u32) {
        fence(Ordering::SeqCst);
        // SAFETY: `register` returns a valid, aligned pointer into the mapped window.
        unsafe { self.register(offset).write_volatile(value) }
    }

    fn write_relaxed(&self, offset: u32, value: u32) {
        // SAFETY: `register` returns a valid, aligned pointer into the mapped window.
        unsafe { self.register(offset).write_volatile(value) }
    }
}

/// A mapped hardware unit.
pub struct HwCore {
    phys_addr: u64,
    size: usize,
    description: &'static str,
    regs: Box<dyn RegisterIo>,
}

impl HwCore {
    /// Maps the register window of `resource`.
    pub fn create(platform: &dyn Platform, resource: &Resource, size: usize) -> Result<Self> {
        let regs = platform.map_registers(resource, size).inspect_err(|e| {
            error!(
                "Failed to map {} registers at {:#x}: {}",
                resource.description, resource.base, e
            )
        })?;
        debug!(
            "Mapped {} at {:#x}, {:#x} bytes",
            resource.description, resource.base, size
        );
        Ok(Self {
            phys_addr: resource.base,
            size,
            description: resource.description,
            regs,
        })
    }

    /// Physical base address of the register window.
    pub fn phys_addr(&self) -> u64 {
        self.phys_addr
    }

    /// Size of the register window.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Name of the unit, for logging.
    pub fn description(&self) -> &'static str {
        self.description
    }

    /// Reads a register.
    pub fn read(&self, offset: u32) -> u32 {
        self.regs.read(offset)
    }

    /// Writes a register.
    pub fn write(&self, offset: u32, value: u32) {
        self.regs.write(offset, value);
    }

    /// Writes a register without ordering.
    pub fn write_relaxed(&self, offset: u32, value: u32) {
        self.regs.write_relaxed(offset, value);
    }

    /// Writes consecutive registers starting at `offset`, without ordering.
    pub fn write_array_relaxed(&self, offset: u32, values: &[u32]) {
        for (offset, value) in (offset..).step_by(4).zip(values) {
            self.regs.write_relaxed(offset, *value);
        }
    }

    /// Waits for all previous writes to reach the device.
    pub fn write_barrier(&self) {
        self.regs.write_barrier();
    }

    /// Polls `offset` until `done` returns true for its value, at most `count` times. Returns the
    /// last value read on success.
    pub fn poll(&self, offset: u32, count: u32, done: impl Fn(u32) -> bool) -> Option<u32> {
        (0..count).map(|_| self.read(offset)).find(|value| done(*value))
    }
}
