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

//! Address translation for the GNA: page tables plus the configuration
//! descriptor that holds the page directory.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod config_desc;
pub mod page_table;

use alloc::boxed::Box;
use config_desc::ConfigDescriptor;
use gna_shared::{DmaRegion, SramWindow};
use log::info;
use page_table::PageTables;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MmuError {
    /// The physical range is outside the SRAM window or the device-virtual
    /// range needs more page tables than were allocated.
    OutOfRange,
}

/// The translation state the hardware reads: page tables and descriptor,
/// bound to the SRAM window mappings must fall in.
pub struct GnaMmu {
    window: SramWindow,
    tables: Box<PageTables>,
    desc: Box<ConfigDescriptor>,
}

impl GnaMmu {
    /// Empty tables and a fresh descriptor pointing at them.
    pub fn new(window: SramWindow) -> Self {
        let tables = Box::new(PageTables::new());
        let desc = Box::new(ConfigDescriptor::new(&tables));
        Self {
            window,
            tables,
            desc,
        }
    }

    pub fn window(&self) -> &SramWindow { &self.window }

    /// Checks a mapping without applying it.
    pub fn check(
        &self,
        physical_base: usize,
        size: usize,
        virtual_base: u32,
    ) -> Result<(), MmuError> {
        PageTables::check_range(&self.window, physical_base, size, virtual_base).map(|_| ())
    }

    pub fn map(
        &mut self,
        physical_base: usize,
        size: usize,
        virtual_base: u32,
    ) -> Result<(), MmuError> {
        self.tables.map(&self.window, physical_base, size, virtual_base)
    }

    pub fn lookup(&self, va: u32) -> Option<u32> { self.tables.lookup(va) }

    pub fn translate(&self, va: u32) -> Option<usize> { self.tables.translate(va) }

    pub fn clear(&mut self) { self.tables.clear(); }

    pub fn link_job(&mut self, labase: u32, lacnt: u16) { self.desc.link_job(labase, lacnt); }

    pub fn descriptor(&self) -> &ConfigDescriptor { &self.desc }

    pub fn tables(&self) -> &PageTables { &self.tables }

    pub fn descriptor_region(&self) -> DmaRegion { self.desc.region() }

    pub fn tables_region(&self) -> DmaRegion { self.tables.region() }

    pub fn debug_state(&self) {
        info!(
            target: "",
            "GNA MMU window {:#x}+{:#x}, {} pages mapped",
            self.window.base,
            self.window.size,
            self.tables.mapped_pages()
        );
        self.desc.debug_state();
    }
}
