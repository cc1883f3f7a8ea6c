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

// Model images for driver tests. Each model gets a 16 KiB chunk of a
// page-aligned arena that doubles as the SRAM window:
//   0x0000  rw part: a page of layer descriptors, then a page of payload
//           holding the input/output offsets and buffers
//   0x2000  ro part: one page
//   0x3c00  header
//
// A packed image instead keeps only 0x100 bytes of payload, so the ro part
// follows at 0x1100 and shares a page with the rw part.

use gna_interface::GnaModelInfo;
use gna_shared::*;
use std::alloc::{alloc_zeroed, Layout};

pub const MODEL_CHUNK: usize = 0x4000;
pub const RW_SIZE: usize = 0x2000;
pub const RO_SIZE: usize = 0x1000;
pub const HEADER_OFFSET: usize = 0x3c00;
pub const INPUT_PTR_OFFSET: usize = 0x1000;
pub const OUTPUT_PTR_OFFSET: usize = 0x1004;
pub const INPUT_OFFSET: usize = 0x1040;
pub const OUTPUT_OFFSET: usize = 0x1080;
pub const IO_SIZE: usize = 4;
pub const PACKED_RW_SIZE: usize = PAGE_SIZE + 0x100;

pub fn model_header() -> GnaModelHeader {
    GnaModelHeader {
        labase_offset: 0,
        model_size: (RW_SIZE + RO_SIZE) as u32,
        layer_count: 1,
        bytes_per_input: 1,
        num_input_nodes: IO_SIZE as u32,
        bytes_per_output: 1,
        num_output_nodes: IO_SIZE as u32,
        input_ptr_offset: INPUT_PTR_OFFSET as u32,
        output_ptr_offset: OUTPUT_PTR_OFFSET as u32,
        rw_region_size: PAGE_SIZE as u32,
        ..Default::default()
    }
}

/// One layer and a 256-byte payload.
pub fn packed_header() -> GnaModelHeader {
    GnaModelHeader {
        model_size: (PACKED_RW_SIZE + RO_SIZE) as u32,
        rw_region_size: 0x100,
        ..model_header()
    }
}

/// |addr| as the accelerator sees it: page index plus offset.
pub fn device_addr(addr: usize) -> usize {
    ((phys_to_page(addr) as usize) << PAGE_SHIFT) | (addr % PAGE_SIZE)
}

pub struct Arena {
    base: usize,
    models: usize,
}

impl Arena {
    /// Room for |models| images; never freed since registered models
    /// borrow it for 'static.
    pub fn new(models: usize) -> Self {
        let layout = Layout::from_size_align(models * MODEL_CHUNK, PAGE_SIZE).unwrap();
        let base = unsafe { alloc_zeroed(layout) } as usize;
        assert_ne!(base, 0);
        let arena = Self { base, models };
        for i in 0..models {
            arena.set_header(i, model_header());
            arena.write_u32(arena.chunk(i) + INPUT_PTR_OFFSET, INPUT_OFFSET as u32);
            arena.write_u32(arena.chunk(i) + OUTPUT_PTR_OFFSET, OUTPUT_OFFSET as u32);
        }
        arena
    }

    pub fn window(&self) -> SramWindow { SramWindow::new(self.base, self.models * MODEL_CHUNK) }

    pub fn chunk(&self, i: usize) -> usize {
        assert!(i < self.models);
        self.base + i * MODEL_CHUNK
    }

    pub fn set_header(&self, i: usize, header: GnaModelHeader) {
        unsafe { ((self.chunk(i) + HEADER_OFFSET) as *mut GnaModelHeader).write(header) };
    }

    pub fn model(&self, i: usize) -> GnaModelInfo { self.model_at(i, 0) }

    /// Model |i| with its image starting |shift| bytes into the chunk.
    pub fn model_at(&self, i: usize, shift: usize) -> GnaModelInfo {
        self.model_parts(i, (shift, RW_SIZE), (shift + RW_SIZE, RO_SIZE))
    }

    /// Model |i| laid out for packed_header().
    pub fn packed(&self, i: usize) -> GnaModelInfo {
        self.model_parts(i, (0, PACKED_RW_SIZE), (PACKED_RW_SIZE, RO_SIZE))
    }

    /// Model |i| with rw and ro given as (offset, len) in the chunk.
    pub fn model_parts(&self, i: usize, rw: (usize, usize), ro: (usize, usize)) -> GnaModelInfo {
        let chunk = self.chunk(i);
        assert!(rw.0 + rw.1 <= HEADER_OFFSET && ro.0 + ro.1 <= HEADER_OFFSET);
        unsafe {
            GnaModelInfo {
                header: &*((chunk + HEADER_OFFSET) as *const GnaModelHeader),
                rw_region: core::slice::from_raw_parts_mut((chunk + rw.0) as *mut u8, rw.1),
                ro_region: core::slice::from_raw_parts((chunk + ro.0) as *const u8, ro.1),
            }
        }
    }

    pub fn input(&self, i: usize) -> usize { self.chunk(i) + INPUT_OFFSET }

    pub fn output(&self, i: usize) -> usize { self.chunk(i) + OUTPUT_OFFSET }

    pub fn read(&self, addr: usize, len: usize) -> Vec<u8> {
        assert!(self.window().contains(addr, len));
        unsafe { core::slice::from_raw_parts(addr as *const u8, len) }.to_vec()
    }

    /// Stands in for the hardware writing model memory.
    pub fn write(&self, addr: usize, data: &[u8]) {
        assert!(self.window().contains(addr, data.len()));
        unsafe { core::ptr::copy_nonoverlapping(data.as_ptr(), addr as *mut u8, data.len()) };
    }

    pub fn write_u32(&self, addr: usize, val: u32) { self.write(addr, &val.to_le_bytes()); }
}
