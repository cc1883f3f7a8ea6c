// Copyright 2022 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Two-level device-virtual to physical translation for the GNA.
//!
//! The page directory lives in the configuration descriptor and points at
//! the tables built here. Each table maps 4 MiB of device-virtual space.

use crate::MmuError;
use gna_shared::*;
use log::trace;

#[derive(Debug, Eq, PartialEq)]
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [u32; PAGE_TABLE_ENTRIES],
}
static_assertions::const_assert_eq!(core::mem::size_of::<PageTable>(), PAGE_SIZE);

impl PageTable {
    pub const fn new() -> Self {
        Self {
            entries: [ABSENT_ENTRY; PAGE_TABLE_ENTRIES],
        }
    }

    pub fn entry(&self, index: usize) -> u32 { self.entries[index] }

    fn mapped_pages(&self) -> usize { self.entries.iter().filter(|&&e| e != ABSENT_ENTRY).count() }
}

#[derive(Debug, Eq, PartialEq)]
#[repr(C)]
pub struct PageTables {
    tables: [PageTable; NUM_PAGE_TABLES],
}

impl PageTables {
    const EMPTY: PageTable = PageTable::new();

    pub const fn new() -> Self {
        Self {
            tables: [Self::EMPTY; NUM_PAGE_TABLES],
        }
    }

    /// Verifies |physical_base..physical_base + size| can be mapped at
    /// |virtual_base| without touching the tables. Returns the number of
    /// pages a map would write.
    pub fn check_range(
        window: &SramWindow,
        physical_base: usize,
        size: usize,
        virtual_base: u32,
    ) -> Result<usize, MmuError> {
        if !window.contains(physical_base, size) {
            trace!(
                "phys {:#x}+{:#x} outside window {:#x}+{:#x}",
                physical_base,
                size,
                window.base,
                window.size
            );
            return Err(MmuError::OutOfRange);
        }
        let pages = num_pages((physical_base % PAGE_SIZE) + size);
        let va_start = (virtual_base as usize) & !(PAGE_SIZE - 1);
        let va_end = va_start
            .checked_add(pages * PAGE_SIZE)
            .ok_or(MmuError::OutOfRange)?;
        if va_start >= GNA_MAPPABLE_SIZE || va_end > GNA_MAPPABLE_SIZE {
            trace!(
                "va {:#x}..{:#x} needs more than {} page tables",
                va_start,
                va_end,
                NUM_PAGE_TABLES
            );
            return Err(MmuError::OutOfRange);
        }
        Ok(pages)
    }

    /// Maps |size| bytes at |physical_base| to device-virtual
    /// |virtual_base|. Whole pages are mapped so a range that does not
    /// start on a page boundary is mapped from its containing page.
    /// Nothing is written unless the entire range is valid.
    pub fn map(
        &mut self,
        window: &SramWindow,
        physical_base: usize,
        size: usize,
        virtual_base: u32,
    ) -> Result<(), MmuError> {
        let pages = Self::check_range(window, physical_base, size, virtual_base)?;
        let first_page = phys_to_page(physical_base);
        let mut va = virtual_base & !(PAGE_SIZE as u32 - 1);
        for page in 0..pages {
            let dva = DevVirtAddr(va);
            self.tables[dva.dir_index()].entries[dva.table_index()] = first_page + page as u32;
            va += PAGE_SIZE as u32;
        }
        trace!(
            "MAP {} pages phys {:#x} -> va {:#x}",
            pages,
            physical_base,
            virtual_base
        );
        Ok(())
    }

    /// Returns the physical page index |va| resolves to.
    pub fn lookup(&self, va: u32) -> Option<u32> {
        if va as usize >= GNA_MAPPABLE_SIZE {
            return None;
        }
        let dva = DevVirtAddr(va);
        match self.tables[dva.dir_index()].entry(dva.table_index()) {
            ABSENT_ENTRY => None,
            page => Some(page),
        }
    }

    /// Walks the tables. Returns the physical address |va| resolves to.
    pub fn translate(&self, va: u32) -> Option<usize> {
        self.lookup(va)
            .map(|page| ((page as usize) << PAGE_SHIFT) | DevVirtAddr(va).page_offset())
    }

    /// Marks every entry absent.
    pub fn clear(&mut self) {
        for table in self.tables.iter_mut() {
            table.entries.fill(ABSENT_ENTRY);
        }
    }

    pub fn mapped_pages(&self) -> usize { self.tables.iter().map(|t| t.mapped_pages()).sum() }

    /// Physical page of table |index|, as written into the page directory.
    pub fn table_phys_page(&self, index: usize) -> u32 {
        phys_to_page(&self.tables[index] as *const PageTable as usize)
    }

    /// The memory the hardware walks; flushed after every update.
    pub fn region(&self) -> DmaRegion {
        DmaRegion::new(
            self.tables.as_ptr() as usize,
            core::mem::size_of::<[PageTable; NUM_PAGE_TABLES]>(),
        )
    }
}

impl Default for PageTables {
    fn default() -> Self { Self::new() }
}
