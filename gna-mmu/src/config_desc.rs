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

//! The GNA configuration descriptor: a page the hardware reads at the
//! start of every job. It carries the layer array for the job and the
//! page directory.

use crate::page_table::PageTables;
use core::mem::{offset_of, size_of};
use gna_shared::*;
use log::info;
use static_assertions::const_assert_eq;

#[derive(Debug)]
#[repr(C, align(4096))]
pub struct ConfigDescriptor {
    reserved1: [u32; 64],
    labase: u32, // Device-virtual address of the first layer descriptor
    lacnt: u16,  // Number of layers
    reserved2: u16,
    reserved3: [u32; 62],
    vamaxaddr: u32, // Highest device-virtual address
    reserved4: [u32; 3],
    pagedir: [u32; PAGE_DIR_ENTRIES],
}
const_assert_eq!(offset_of!(ConfigDescriptor, labase), 0x100);
const_assert_eq!(offset_of!(ConfigDescriptor, lacnt), 0x104);
const_assert_eq!(offset_of!(ConfigDescriptor, vamaxaddr), 0x200);
const_assert_eq!(offset_of!(ConfigDescriptor, pagedir), 0x210);
const_assert_eq!(size_of::<ConfigDescriptor>(), PAGE_SIZE);

impl ConfigDescriptor {
    /// A zeroed descriptor whose directory references |tables|. Slots past
    /// the allocated tables are absent.
    pub fn new(tables: &PageTables) -> Self {
        let mut pagedir = [ABSENT_ENTRY; PAGE_DIR_ENTRIES];
        for (i, slot) in pagedir.iter_mut().enumerate().take(NUM_PAGE_TABLES) {
            *slot = tables.table_phys_page(i);
        }
        Self {
            reserved1: [0; 64],
            labase: 0,
            lacnt: 0,
            reserved2: 0,
            reserved3: [0; 62],
            vamaxaddr: GNA_ADDRESSABLE_MEM_SIZE as u32,
            reserved4: [0; 3],
            pagedir,
        }
    }

    /// Points the next job at |lacnt| layers starting at device-virtual
    /// |labase|.
    pub fn link_job(&mut self, labase: u32, lacnt: u16) {
        self.labase = labase;
        self.lacnt = lacnt;
    }

    pub fn labase(&self) -> u32 { self.labase }
    pub fn lacnt(&self) -> u16 { self.lacnt }
    pub fn vamaxaddr(&self) -> u32 { self.vamaxaddr }
    pub fn pagedir(&self, index: usize) -> u32 { self.pagedir[index] }

    /// Physical page handed to GNADESBASE.
    pub fn phys_page(&self) -> u32 { phys_to_page(self as *const Self as usize) }

    pub fn region(&self) -> DmaRegion {
        DmaRegion::new(self as *const Self as usize, size_of::<Self>())
    }

    pub fn debug_state(&self) {
        info!(target: "", "GNA config descriptor @ page {:#x}", self.phys_page());
        info!(
            target: "",
            "  labase {:#010x} lacnt {} vamaxaddr {:#x}",
            self.labase,
            self.lacnt,
            self.vamaxaddr
        );
        for (i, entry) in self.pagedir.iter().enumerate() {
            if *entry != ABSENT_ENTRY {
                info!(target: "", "  pagedir[{}] = {:#x}", i, entry);
            }
        }
    }
}
