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

#![cfg_attr(not(test), no_std)]

// Constants and data structures used throughout the GNA driver that do not
// depend on the register file or on driver state.

use core::fmt;
use static_assertions::{const_assert, const_assert_eq};

/// Size of a GNA page; the unit of device-virtual translation.
pub const PAGE_SIZE: usize = 4096;
pub const PAGE_SHIFT: usize = 12;

/// Entries per page table and slots in the page directory.
pub const PAGE_TABLE_ENTRIES: usize = 1024;
pub const PAGE_DIR_ENTRIES: usize = 64;

/// Bytes of device-virtual space covered by one page table (4 MiB).
pub const PAGE_TABLE_SPAN: usize = PAGE_TABLE_ENTRIES * PAGE_SIZE;

/// Marks a directory slot or table entry that references nothing.
pub const ABSENT_ENTRY: u32 = 0xFFFF_FFFF;

/// The L2 SRAM window the accelerator may address. Every page handed to
/// the GNA page tables must fall inside this window.
pub const L2_SRAM_BASE: usize = 0xBE00_0000;
pub const L2_SRAM_SIZE: usize = 0x0080_0000;

/// Largest device-virtual address space the driver builds tables for.
pub const GNA_ADDRESSABLE_MEM_SIZE: usize = L2_SRAM_SIZE;

/// Page tables allocated at build time; one per 4 MiB of addressable space.
pub const NUM_PAGE_TABLES: usize =
    round_up(GNA_ADDRESSABLE_MEM_SIZE, PAGE_TABLE_SPAN) / PAGE_TABLE_SPAN;
const_assert!(NUM_PAGE_TABLES > 0);
const_assert!(NUM_PAGE_TABLES <= PAGE_DIR_ENTRIES);

/// Device-virtual bytes reachable through the allocated tables.
pub const GNA_MAPPABLE_SIZE: usize = NUM_PAGE_TABLES * PAGE_TABLE_SPAN;

/// Maximum number of concurrently registered models.
pub const MAX_MODELS: usize = 4;

/// Depth of the pending request queue (and of the response queue).
pub const MAX_PENDING_REQUESTS: usize = 4;

/// Required alignment of a model header and its read-write region.
pub const MODEL_ALIGN: usize = 64;

/// Size of one hardware layer descriptor.
pub const LAYER_DESC_SIZE: usize = 128;

/// Device-virtual address every model's read-write region is mapped at.
pub const GNA_VIRTUAL_BASE: u32 = 0;

/// GNA base clock, reported with every inference's cycle counts.
pub const GNA_BASE_CLOCK_FREQUENCY: u32 = 200_000_000;

pub const fn round_up(a: usize, b: usize) -> usize {
    if (a % b) == 0 {
        a
    } else {
        a + (b - (a % b))
    }
}

/// Number of whole pages needed to hold |size| bytes.
pub const fn num_pages(size: usize) -> usize { round_up(size, PAGE_SIZE) / PAGE_SIZE }

/// Page index of a physical address as the hardware sees it. Physical
/// addresses are 32 bits on the target; on a 64-bit host the upper bits
/// are dropped, so host code must compare pages (or addresses rebuilt
/// from them) rather than raw pointers.
pub const fn phys_to_page(addr: usize) -> u32 { (addr >> PAGE_SHIFT) as u32 }

/// An address in the accelerator's private address space:
///   bits 27:22  page directory index
///   bits 21:12  page table index
///   bits 11:0   offset in page
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DevVirtAddr(pub u32);
impl DevVirtAddr {
    pub const fn dir_index(&self) -> usize { ((self.0 >> 22) & 0x3F) as usize }
    pub const fn table_index(&self) -> usize { ((self.0 >> 12) & 0x3FF) as usize }
    pub const fn page_offset(&self) -> usize { (self.0 & 0xFFF) as usize }
}
impl fmt::Display for DevVirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:#010x} (pd {} pt {} off {:#x})",
            self.0,
            self.dir_index(),
            self.table_index(),
            self.page_offset()
        )
    }
}

/// A physical memory range the accelerator can reach.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SramWindow {
    pub base: usize,
    pub size: usize,
}
impl SramWindow {
    pub const L2: SramWindow = SramWindow::new(L2_SRAM_BASE, L2_SRAM_SIZE);

    pub const fn new(base: usize, size: usize) -> Self { Self { base, size } }

    /// Returns true if |start..start + len| lies entirely in the window.
    pub fn contains(&self, start: usize, len: usize) -> bool {
        if start < self.base {
            return false;
        }
        match start.checked_add(len) {
            Some(end) => end - self.base <= self.size,
            None => false,
        }
    }
}

/// A span of memory shared with the accelerator. The driver only keeps the
/// address and length; ownership stays with whoever handed the memory in.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DmaRegion {
    pub addr: usize,
    pub len: usize,
}
impl DmaRegion {
    pub const fn new(addr: usize, len: usize) -> Self { Self { addr, len } }

    pub fn from_slice(slice: &[u8]) -> Self { Self::new(slice.as_ptr() as usize, slice.len()) }

    pub fn is_empty(&self) -> bool { self.len == 0 }

    /// The first |len| bytes of the region (clamped to the region).
    pub fn prefix(&self, len: usize) -> Self { Self::new(self.addr, core::cmp::min(len, self.len)) }

    /// Copies |src| to the start of the region.
    ///
    /// # Safety
    /// The region must still be valid writable memory.
    pub unsafe fn write(&self, src: &[u8]) {
        assert!(src.len() <= self.len);
        core::ptr::copy_nonoverlapping(src.as_ptr(), self.addr as *mut u8, src.len());
    }

    /// Fills |dest| from the start of the region.
    ///
    /// # Safety
    /// The region must still be valid readable memory.
    pub unsafe fn read(&self, dest: &mut [u8]) {
        assert!(dest.len() <= self.len);
        core::ptr::copy_nonoverlapping(self.addr as *const u8, dest.as_mut_ptr(), dest.len());
    }
}

/// Header at the front of every GNA model image. The driver only reads
/// this; the image itself is produced offline.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[repr(C)]
pub struct GnaModelHeader {
    /// Offset of the layer array from the start of the read-write region.
    pub labase_offset: u32,
    /// Total size of the model (read-write + read-only), in bytes.
    pub model_size: u32,
    pub gna_mode: u32,
    pub layer_count: u32,
    pub bytes_per_input: u32,
    pub bytes_per_output: u32,
    pub num_input_nodes: u32,
    pub num_output_nodes: u32,
    /// Position in the read-write region of the 32-bit offset to the input
    /// buffer.
    pub input_ptr_offset: u32,
    /// Position in the read-write region of the 32-bit offset to the output
    /// buffer.
    pub output_ptr_offset: u32,
    /// Read-write payload that follows the layer descriptors.
    pub rw_region_size: u32,
    pub input_checksum: u32,
    pub output_checksum: u32,
}
const_assert_eq!(core::mem::size_of::<GnaModelHeader>(), 52);

impl GnaModelHeader {
    /// Size of the input buffer. None if it does not fit in a usize.
    pub fn input_size(&self) -> Option<usize> {
        (self.bytes_per_input as usize).checked_mul(self.num_input_nodes as usize)
    }

    pub fn output_size(&self) -> Option<usize> {
        (self.bytes_per_output as usize).checked_mul(self.num_output_nodes as usize)
    }

    /// Layer descriptors (padded to a page) plus the read-write payload.
    pub fn rw_size(&self) -> Option<usize> {
        let layers = (self.layer_count as usize).checked_mul(LAYER_DESC_SIZE)?;
        let padded = layers.checked_add(PAGE_SIZE - 1)? & !(PAGE_SIZE - 1);
        padded.checked_add(self.rw_region_size as usize)
    }

    /// Whatever the read-write part does not cover. None if the header
    /// claims a model smaller than its read-write part.
    pub fn ro_size(&self) -> Option<usize> {
        (self.model_size as usize).checked_sub(self.rw_size()?)
    }
}
