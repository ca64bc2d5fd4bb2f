// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Two-level GPU page tables.
//!
//! A page directory has 1024 entries, each covering 4 MiB through a second-level table of 1024
//! 4 KiB pages. Second-level tables are allocated when first mapped and freed when the last
//! mapping through them is removed.

use crate::{Error, Result, platform::PageAllocator, platform::TablePage};
use alloc::{boxed::Box, sync::Arc, vec::Vec};
use arrayvec::ArrayVec;
use bitflags::bitflags;
use log::{error, trace};

/// Size of a GPU page, and of each table.
pub const PAGE_SIZE: u32 = 0x1000;
/// Address range covered by one page directory entry.
pub const VIRTUAL_PAGE_SIZE: u32 = 0x40_0000;
/// Number of entries in a directory or table.
pub const ENTRIES: usize = 1024;

bitflags! {
    /// Flags in page directory and page table entries.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    #[repr(transparent)]
    pub struct PageFlags: u32 {
        /// The entry is valid.
        const PRESENT = 0x01;
        /// Reads are permitted.
        const READ_PERMISSION = 0x02;
        /// Writes are permitted.
        const WRITE_PERMISSION = 0x04;
        /// Use the cache settings below instead of the defaults.
        const OVERRIDE_CACHE = 0x08;
        /// Writes are cacheable.
        const WRITE_CACHEABLE = 0x10;
        /// Writes allocate in the cache.
        const WRITE_ALLOCATE = 0x20;
        /// Writes are bufferable.
        const WRITE_BUFFERABLE = 0x40;
        /// Reads are cacheable.
        const READ_CACHEABLE = 0x80;
        /// Reads allocate in the cache.
        const READ_ALLOCATE = 0x100;
    }
}

impl PageFlags {
    /// Bits of an entry which are flags rather than address.
    pub const MASK: u32 = 0x1FF;

    /// Read-write mapping with default caching.
    pub const STANDARD: Self = Self::PRESENT
        .union(Self::READ_PERMISSION)
        .union(Self::WRITE_PERMISSION);

    /// Read-write mapping forcing read allocation in the L2 cache, for GP heaps.
    pub const FORCE_GP_READ_ALLOCATE: Self = Self::STANDARD
        .union(Self::OVERRIDE_CACHE)
        .union(Self::WRITE_CACHEABLE)
        .union(Self::WRITE_BUFFERABLE)
        .union(Self::READ_CACHEABLE)
        .union(Self::READ_ALLOCATE);
}

/// Cache policy for a mapping.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum CacheSettings {
    /// Default caching.
    #[default]
    Standard,
    /// Force read allocation, for memory the GP reads heavily.
    GpReadAllocate,
}

impl CacheSettings {
    fn flags(self) -> PageFlags {
        match self {
            Self::Standard => PageFlags::STANDARD,
            Self::GpReadAllocate => PageFlags::FORCE_GP_READ_ALLOCATE,
        }
    }
}

/// Index of the page directory entry covering `address`.
pub const fn pde_index(address: u32) -> usize {
    ((address >> 22) & 0x3FF) as usize
}

/// Index of the page table entry covering `address`, within its table.
pub const fn pte_index(address: u32) -> usize {
    ((address >> 12) & 0x3FF) as usize
}

/// Physical address in a directory or table entry.
pub const fn entry_address(value: u32) -> u32 {
    value & 0xFFFF_FC00
}

fn fill_page(page: &dyn TablePage, value: u32) {
    for i in 0..ENTRIES {
        page.write(i, value);
    }
}

fn alloc_filled_page(allocator: &dyn PageAllocator, value: u32) -> Result<Box<dyn TablePage>> {
    let page = allocator.alloc_page()?;
    fill_page(page.as_ref(), value);
    Ok(page)
}

/// L2 cache maintenance needed after unmapping.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum L2Invalidation {
    /// Invalidate these table pages.
    Pages(ArrayVec<u32, 3>),
    /// Too many pages changed; invalidate the whole cache.
    All,
}

/// The page tables of one address space.
pub struct PageDirectory {
    allocator: Arc<dyn PageAllocator>,
    directory: Box<dyn TablePage>,
    tables: Vec<Option<Box<dyn TablePage>>>,
    usage_count: Vec<u32>,
}

impl PageDirectory {
    /// Allocates an empty page directory.
    pub fn new(allocator: Arc<dyn PageAllocator>) -> Result<Self> {
        let directory = alloc_filled_page(allocator.as_ref(), 0)?;
        let mut tables = Vec::with_capacity(ENTRIES);
        tables.resize_with(ENTRIES, || None);
        Ok(Self {
            allocator,
            directory,
            tables,
            usage_count: alloc::vec![0; ENTRIES],
        })
    }

    /// Physical address of the directory, for the MMU's DTE register.
    pub fn phys_addr(&self) -> u32 {
        self.directory.phys_addr()
    }

    /// Physical address of the table behind directory entry `index`, or 0.
    pub fn get_phys_address(&self, index: usize) -> u32 {
        self.directory.read(index) & !PageFlags::MASK
    }

    /// Makes sure page tables exist for `size` bytes starting at `address`, and takes a reference
    /// on each of them.
    pub fn map(&mut self, address: u32, size: u32) -> Result<()> {
        let first = pde_index(address);
        let last = pde_index(last_address(address, size).ok_or(Error::InvalidArgs)?);
        for i in first..=last {
            if self.directory.read(i) & PageFlags::PRESENT.bits() == 0 {
                debug_assert_eq!(self.usage_count[i], 0);
                let table = alloc_filled_page(self.allocator.as_ref(), 0).inspect_err(|_| {
                    error!("Failed to allocate page table page");
                })?;
                self.directory
                    .write(i, table.phys_addr() | PageFlags::PRESENT.bits());
                self.tables[i] = Some(table);
                self.usage_count[i] = 1;
            } else {
                self.usage_count[i] += 1;
            }
        }
        Ok(())
    }

    /// Removes the mappings for `size` bytes starting at `address`, releasing the references
    /// taken by [`PageDirectory::map`]. Returns the L2 cache maintenance the caller must do.
    pub fn unmap(&mut self, mut address: u32, size: u32) -> L2Invalidation {
        let Some(end) = last_address(address, size) else {
            return L2Invalidation::Pages(ArrayVec::new());
        };
        let first = pde_index(address);
        let last = pde_index(end);
        let mut left = size;
        let mut pd_changed = false;
        let mut pages = ArrayVec::<u32, 3>::new();
        let mut invalidate_all = false;

        for i in first..=last {
            debug_assert!(self.tables[i].is_some());
            debug_assert_ne!(self.usage_count[i], 0);

            let offset = address & (VIRTUAL_PAGE_SIZE - 1);
            let size_in_pde = left.min(VIRTUAL_PAGE_SIZE - offset);

            self.usage_count[i] = self.usage_count[i].saturating_sub(1);
            if self.usage_count[i] == 0 {
                trace!("Releasing page table as this is the last reference");
                // Last reference, so the table's entries don't need zeroing.
                self.directory.write(i, 0);
                self.tables[i] = None;
                pd_changed = true;
            } else {
                if pages.len() < 2 {
                    pages.push(self.get_phys_address(i));
                } else {
                    invalidate_all = true;
                }
                if let Some(table) = &self.tables[i] {
                    for pte in pte_index(address)..=pte_index(address + (size_in_pde - 1)) {
                        table.write(pte, 0);
                    }
                }
            }

            left -= size_in_pde;
            address = address.wrapping_add(size_in_pde);
        }

        if pd_changed {
            if pages.is_full() {
                invalidate_all = true;
            } else {
                pages.push(self.phys_addr());
            }
        }

        if invalidate_all {
            L2Invalidation::All
        } else {
            L2Invalidation::Pages(pages)
        }
    }

    /// Points the page table entries for `size` bytes starting at `address` at consecutive
    /// physical pages starting at `phys`. The range must have been [`map`](Self::map)ped.
    pub fn update(&mut self, address: u32, phys: u32, size: u32, cache: CacheSettings) {
        let flags = cache.flags().bits();
        for page in 0..size.div_ceil(PAGE_SIZE) {
            let address = address.wrapping_add(page * PAGE_SIZE);
            let phys = phys.wrapping_add(page * PAGE_SIZE);
            match &self.tables[pde_index(address)] {
                Some(table) => table.write(pte_index(address), phys | flags),
                None => error!("Updating unmapped address {:#x}", address),
            }
        }
    }

    /// Reads the page table entry for `address`, or `None` if no table covers it.
    pub fn lookup(&self, address: u32) -> Option<u32> {
        self.tables[pde_index(address)]
            .as_ref()
            .map(|table| table.read(pte_index(address)))
    }
}

/// Last byte of a non-empty range which doesn't wrap around the address space.
fn last_address(address: u32, size: u32) -> Option<u32> {
    let extent = size.checked_sub(1)?;
    address.checked_add(extent)
}

/// The page directories which every MMU needs, independent of sessions.
pub struct MmuTables {
    empty: Box<dyn TablePage>,
    fault_flush_directory: Box<dyn TablePage>,
    _fault_flush_table: Box<dyn TablePage>,
    _fault_flush_data: Box<dyn TablePage>,
}

impl MmuTables {
    /// Allocates the empty page directory, and the fault flush directory whose every entry maps
    /// the same zeroed data page so that draining accesses after a page fault can't fault again.
    pub fn new(allocator: &dyn PageAllocator) -> Result<Self> {
        let empty = alloc_filled_page(allocator, 0)?;
        let data = alloc_filled_page(allocator, 0)?;
        let table = alloc_filled_page(allocator, data.phys_addr() | PageFlags::STANDARD.bits())?;
        let directory =
            alloc_filled_page(allocator, table.phys_addr() | PageFlags::PRESENT.bits())?;
        Ok(Self {
            empty,
            fault_flush_directory: directory,
            _fault_flush_table: table,
            _fault_flush_data: data,
        })
    }

    /// Physical address of the directory with no valid mappings.
    pub fn empty_page_directory(&self) -> u32 {
        self.empty.phys_addr()
    }

    /// Physical address of the fault flush directory.
    pub fn fault_flush_page_directory(&self) -> u32 {
        self.fault_flush_directory.phys_addr()
    }
}
