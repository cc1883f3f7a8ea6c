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

//! Registered models. A fixed slab of MAX_MODELS records; the model memory
//! itself stays where the caller put it.

use gna_interface::{GnaError, GnaModelInfo, ModelHandle};
use gna_mmu::{GnaMmu, MmuError};
use gna_shared::*;
use log::{info, warn};

/// What the driver remembers about a registered model.
#[derive(Clone, Copy, Debug)]
pub struct ModelRecord {
    pub header: GnaModelHeader,
    /// Read-write part (layer descriptors + payload), mapped at |vabase|.
    pub rw: DmaRegion,
    /// Read-only part (weights), mapped right after the read-write part.
    pub ro: DmaRegion,
    /// Device-virtual address of the first rw byte.
    pub vabase: u32,
    /// Input and output buffers inside the read-write part.
    pub input: DmaRegion,
    pub output: DmaRegion,
    generation: u32,
}

fn read_le_u32(region: &[u8], offset: usize) -> Option<u32> {
    let bytes = region.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

// Resolves the buffer whose offset is stored at |ptr_offset| in |rw|.
fn resolve_buffer(rw: &[u8], rw_size: usize, ptr_offset: u32, len: usize) -> Option<DmaRegion> {
    let offset = read_le_u32(&rw[..rw_size], ptr_offset as usize)? as usize;
    if offset.checked_add(len)? > rw_size {
        return None;
    }
    Some(DmaRegion::new(rw.as_ptr() as usize + offset, len))
}

impl ModelRecord {
    /// Checks |model| against its header and the translation limits of
    /// |mmu|. Nothing is mapped.
    ///
    /// The rw part is mapped from its containing page, so |vabase| keeps
    /// its offset in that page. The ro part follows at vabase + rw size
    /// and must sit at the same offset in its own page; if the two parts
    /// share a device-virtual page they must also be physically adjacent.
    pub fn from_model(model: &GnaModelInfo, mmu: &GnaMmu) -> Result<Self, GnaError> {
        let header = *model.header;
        let header_addr = model.header as *const GnaModelHeader as usize;
        let rw_addr = model.rw_region.as_ptr() as usize;
        if header_addr % MODEL_ALIGN != 0 || rw_addr % MODEL_ALIGN != 0 {
            warn!(
                "Model not {}-byte aligned: header {:#x} rw {:#x}",
                MODEL_ALIGN, header_addr, rw_addr
            );
            return Err(GnaError::InvalidArgument);
        }
        if model.rw_region.is_empty() || header.layer_count == 0 {
            warn!("Model has no read-write region or no layers");
            return Err(GnaError::InvalidArgument);
        }
        if header.layer_count > u16::MAX as u32 {
            warn!("Model has too many layers: {}", header.layer_count);
            return Err(GnaError::InvalidArgument);
        }

        let sizes = header
            .rw_size()
            .zip(header.ro_size())
            .zip(header.input_size().zip(header.output_size()));
        let Some(((rw_size, ro_size), (input_size, output_size))) = sizes else {
            warn!(
                "Model header sizes inconsistent: model {:#x} layers {} rw payload {:#x}",
                header.model_size, header.layer_count, header.rw_region_size
            );
            return Err(GnaError::InvalidArgument);
        };
        if model.rw_region.len() < rw_size || model.ro_region.len() < ro_size {
            warn!(
                "Model regions too small: rw {} < {} or ro {} < {}",
                model.rw_region.len(),
                rw_size,
                model.ro_region.len(),
                ro_size
            );
            return Err(GnaError::InvalidArgument);
        }
        if header.labase_offset as usize >= rw_size {
            warn!("Layer array offset {:#x} outside rw part", header.labase_offset);
            return Err(GnaError::InvalidArgument);
        }

        let rw = &model.rw_region[..];
        let input = resolve_buffer(rw, rw_size, header.input_ptr_offset, input_size);
        let output = resolve_buffer(rw, rw_size, header.output_ptr_offset, output_size);
        let (Some(input), Some(output)) = (input, output) else {
            warn!("Model input/output buffers do not resolve inside the rw part");
            return Err(GnaError::InvalidArgument);
        };

        let vabase = GNA_VIRTUAL_BASE + (rw_addr % PAGE_SIZE) as u32;
        let ro_addr = model.ro_region.as_ptr() as usize;
        mmu.check(rw_addr, rw_size, vabase).map_err(|_| {
            warn!("Model rw part cannot be mapped: {:#x}+{:#x}", rw_addr, rw_size);
            GnaError::InvalidArgument
        })?;
        if ro_size > 0 {
            let ro_va = vabase as usize + rw_size;
            let placed = match ro_va % PAGE_SIZE {
                0 => ro_addr % PAGE_SIZE == 0,
                _ => ro_addr == rw_addr + rw_size,
            };
            if !placed || mmu.check(ro_addr, ro_size, ro_va as u32).is_err() {
                warn!(
                    "Model ro part cannot be mapped at va {:#x}: {:#x}+{:#x}",
                    ro_va, ro_addr, ro_size
                );
                return Err(GnaError::InvalidArgument);
            }
        }

        Ok(Self {
            header,
            rw: DmaRegion::new(rw_addr, rw_size),
            ro: DmaRegion::new(ro_addr, ro_size),
            vabase,
            input,
            output,
            generation: 0,
        })
    }

    /// Device-virtual address of the first layer descriptor.
    pub fn labase(&self) -> u32 { self.vabase + self.header.labase_offset }

    pub fn lacnt(&self) -> u16 { self.header.layer_count as u16 }

    /// Device-virtual address of |addr|, counted from the rw base.
    pub fn rw_va(&self, addr: usize) -> u32 { self.vabase + (addr - self.rw.addr) as u32 }

    /// Replaces whatever the tables hold with this model's regions.
    pub fn map_into(&self, mmu: &mut GnaMmu) -> Result<(), MmuError> {
        mmu.clear();
        mmu.map(self.rw.addr, self.rw.len, self.vabase)?;
        if !self.ro.is_empty() {
            mmu.map(self.ro.addr, self.ro.len, self.rw_va(self.rw.addr + self.rw.len))?;
        }
        Ok(())
    }
}

pub struct ModelRegistry {
    models: [Option<ModelRecord>; MAX_MODELS],
    generation: u32,
}

impl ModelRegistry {
    const NONE: Option<ModelRecord> = None;

    pub const fn new() -> Self {
        Self {
            models: [Self::NONE; MAX_MODELS],
            generation: 0,
        }
    }

    /// Stores |record| in a free slot.
    pub fn insert(&mut self, mut record: ModelRecord) -> Result<ModelHandle, GnaError> {
        let index = self
            .models
            .iter()
            .position(|m| m.is_none())
            .ok_or(GnaError::OutOfMemory)?;
        self.generation = self.generation.wrapping_add(1);
        record.generation = self.generation;
        self.models[index] = Some(record);
        Ok(ModelHandle {
            index,
            generation: self.generation,
        })
    }

    pub fn get(&self, handle: ModelHandle) -> Option<&ModelRecord> {
        self.models
            .get(handle.index)?
            .as_ref()
            .filter(|m| m.generation == handle.generation)
    }

    pub fn remove(&mut self, handle: ModelHandle) -> Option<ModelRecord> {
        self.get(handle)?;
        self.models[handle.index].take()
    }

    pub fn len(&self) -> usize { self.models.iter().filter(|m| m.is_some()).count() }

    pub fn debug_state(&self) {
        info!(target: "", "{} of {} model slots used", self.len(), MAX_MODELS);
        for (index, model) in self.models.iter().enumerate() {
            if let Some(model) = model {
                info!(
                    target: "",
                    "  [{}] rw {:#x}+{:#x} ro {:#x}+{:#x} layers {} in {} out {}",
                    index,
                    model.rw.addr,
                    model.rw.len,
                    model.ro.addr,
                    model.ro.len,
                    model.header.layer_count,
                    model.input.len,
                    model.output.len
                );
            }
        }
    }
}

impl Default for ModelRegistry {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
    use crate::testing::*;
    use crate::GnaDriver;
    use assert_hex::assert_eq_hex;
    use fake_gna_core::FakeGna;
    use gna_interface::*;
    use gna_shared::*;

    fn driver(arena: &Arena) -> GnaDriver<FakeGna> {
        let driver = GnaDriver::new(FakeGna::new(), arena.window());
        assert!(driver.init().is_ok());
        assert!(driver.configure(GnaConfig::default()).is_ok());
        driver
    }

    fn slots_used(driver: &GnaDriver<FakeGna>) -> usize { driver.core.lock().registry.len() }

    #[test]
    fn register_maps_and_flushes() {
        let arena = Arena::new(1);
        let driver = driver(&arena);
        let handle = driver.register_model(arena.model(0)).unwrap();
        assert_eq!(handle.index, 0);

        let core = driver.core.lock();
        let record = core.registry.get(handle).unwrap();
        assert_eq_hex!(record.rw, DmaRegion::new(arena.chunk(0), RW_SIZE));
        assert_eq_hex!(record.ro, DmaRegion::new(arena.chunk(0) + RW_SIZE, RO_SIZE));
        assert_eq_hex!(record.input, DmaRegion::new(arena.input(0), IO_SIZE));
        assert_eq_hex!(record.output, DmaRegion::new(arena.output(0), IO_SIZE));
        assert_eq!(record.vabase, GNA_VIRTUAL_BASE);
        assert_eq!(core.mapped, Some(handle));

        let mmu = core.mmu.as_ref().unwrap();
        assert_eq!(mmu.tables().mapped_pages(), (RW_SIZE + RO_SIZE) / PAGE_SIZE);
        assert_eq_hex!(mmu.lookup(0), Some(phys_to_page(arena.chunk(0))));
        assert_eq_hex!(mmu.lookup(0x1000), Some(phys_to_page(arena.chunk(0) + 0x1000)));
        assert_eq_hex!(mmu.lookup(RW_SIZE as u32), Some(phys_to_page(arena.chunk(0) + RW_SIZE)));
        assert_eq!(mmu.lookup((RW_SIZE + RO_SIZE) as u32), None);

        let hw = driver.hardware();
        let tables = mmu.tables_region();
        assert!(hw.was_flushed(arena.chunk(0), RW_SIZE));
        assert!(hw.was_flushed(arena.chunk(0) + RW_SIZE, RO_SIZE));
        assert!(hw.was_flushed(tables.addr, tables.len));
    }

    #[test]
    fn capacity_is_bounded() {
        let arena = Arena::new(MAX_MODELS + 1);
        let driver = driver(&arena);
        let handles: Vec<ModelHandle> = (0..MAX_MODELS)
            .map(|i| driver.register_model(arena.model(i)).unwrap())
            .collect();
        assert!(matches!(
            driver.register_model(arena.model(MAX_MODELS)),
            Err(GnaError::OutOfMemory)
        ));
        assert_eq!(slots_used(&driver), MAX_MODELS);

        assert!(driver.deregister_model(handles[1]).is_ok());
        let handle = driver.register_model(arena.model(MAX_MODELS)).unwrap();
        assert_eq!(handle.index, 1);
        assert_ne!(handle, handles[1]);
        assert_eq!(slots_used(&driver), MAX_MODELS);
    }

    #[test]
    fn misaligned_model_rejected() {
        let arena = Arena::new(1);
        let driver = driver(&arena);
        assert!(matches!(
            driver.register_model(arena.model_at(0, 8)),
            Err(GnaError::InvalidArgument)
        ));
        assert_eq!(slots_used(&driver), 0);
        assert_eq!(driver.core.lock().mmu.as_ref().unwrap().tables().mapped_pages(), 0);

        // 64-byte alignment is enough; device-virtual addresses keep the
        // offset into the first page.
        let handle = driver.register_model(arena.model_at(0, MODEL_ALIGN)).unwrap();
        let core = driver.core.lock();
        let record = core.registry.get(handle).unwrap();
        let mmu = core.mmu.as_ref().unwrap();
        assert_eq_hex!(record.vabase, GNA_VIRTUAL_BASE + MODEL_ALIGN as u32);
        assert_eq_hex!(
            mmu.translate(record.labase()),
            Some(device_addr(arena.chunk(0) + MODEL_ALIGN))
        );
        assert_eq_hex!(
            mmu.translate(record.rw_va(record.input.addr)),
            Some(device_addr(record.input.addr))
        );
        assert_eq_hex!(
            mmu.translate(record.vabase + RW_SIZE as u32),
            Some(device_addr(record.ro.addr))
        );
    }

    #[test]
    fn packed_model_translates() {
        let arena = Arena::new(1);
        let driver = driver(&arena);
        arena.set_header(0, packed_header());
        let handle = driver.register_model(arena.packed(0)).unwrap();

        let core = driver.core.lock();
        let record = core.registry.get(handle).unwrap();
        let mmu = core.mmu.as_ref().unwrap();
        assert_eq!(record.rw.len, PACKED_RW_SIZE);
        assert_eq!(record.ro.len, RO_SIZE);
        assert_eq!(mmu.tables().mapped_pages(), 3);
        // The payload page is shared by the tail of the rw part and the
        // head of the ro part.
        let last = record.ro.addr + RO_SIZE - 1;
        for addr in [record.input.addr, record.output.addr, record.ro.addr, last] {
            assert_eq_hex!(mmu.translate(record.rw_va(addr)), Some(device_addr(addr)));
        }
    }

    #[test]
    fn misplaced_ro_rejected() {
        let arena = Arena::new(1);
        let driver = driver(&arena);
        arena.set_header(0, packed_header());
        // rw ends mid-page: ro on a page of its own, then at the right
        // offset but not adjacent.
        for ro in [(0x2000, RO_SIZE), (0x2100, RO_SIZE)] {
            let model = arena.model_parts(0, (0, PACKED_RW_SIZE), ro);
            assert!(matches!(
                driver.register_model(model),
                Err(GnaError::InvalidArgument)
            ));
        }
        // rw ends on a page boundary, so ro must start on one.
        arena.set_header(0, model_header());
        let model = arena.model_parts(0, (0, RW_SIZE), (RW_SIZE + MODEL_ALIGN, RO_SIZE));
        assert!(matches!(
            driver.register_model(model),
            Err(GnaError::InvalidArgument)
        ));
        assert_eq!(slots_used(&driver), 0);
        assert_eq!(driver.core.lock().mmu.as_ref().unwrap().tables().mapped_pages(), 0);
    }

    #[test]
    fn inconsistent_header_rejected() {
        let arena = Arena::new(1);
        let driver = driver(&arena);
        let bad_headers = [
            // No layers.
            GnaModelHeader {
                layer_count: 0,
                ..model_header()
            },
            // Model smaller than its rw part.
            GnaModelHeader {
                model_size: 0x100,
                ..model_header()
            },
            // ro part larger than the region handed in.
            GnaModelHeader {
                model_size: (RW_SIZE + RO_SIZE + PAGE_SIZE) as u32,
                ..model_header()
            },
            // rw part larger than the region handed in.
            GnaModelHeader {
                rw_region_size: (2 * PAGE_SIZE) as u32,
                model_size: (RW_SIZE + PAGE_SIZE + RO_SIZE) as u32,
                ..model_header()
            },
            // Input offset stored past the rw part.
            GnaModelHeader {
                input_ptr_offset: RW_SIZE as u32,
                ..model_header()
            },
            // Output buffer runs off the rw part.
            GnaModelHeader {
                num_output_nodes: RW_SIZE as u32,
                ..model_header()
            },
            // Layer array outside the rw part.
            GnaModelHeader {
                labase_offset: RW_SIZE as u32,
                ..model_header()
            },
            // Sizes that wrap a 32-bit usize.
            GnaModelHeader {
                bytes_per_input: 0x10000,
                num_input_nodes: 0x10000,
                ..model_header()
            },
            GnaModelHeader {
                rw_region_size: 0xFFFF_F000,
                ..model_header()
            },
        ];
        for header in bad_headers {
            arena.set_header(0, header);
            assert!(matches!(
                driver.register_model(arena.model(0)),
                Err(GnaError::InvalidArgument)
            ));
        }
        assert_eq!(slots_used(&driver), 0);
    }

    #[test]
    fn model_outside_window_rejected() {
        let arena = Arena::new(2);
        // Only the first chunk is reachable by the accelerator.
        let window = SramWindow::new(arena.chunk(0), MODEL_CHUNK);
        let driver = GnaDriver::new(FakeGna::new(), window);
        assert!(driver.init().is_ok());
        assert!(driver.configure(GnaConfig::default()).is_ok());
        assert!(matches!(
            driver.register_model(arena.model(1)),
            Err(GnaError::InvalidArgument)
        ));
        assert_eq!(slots_used(&driver), 0);
        assert!(driver.register_model(arena.model(0)).is_ok());
    }

    #[test]
    fn stale_handles_rejected() {
        let arena = Arena::new(1);
        let driver = driver(&arena);
        let handle = driver.register_model(arena.model(0)).unwrap();
        assert!(driver.deregister_model(handle).is_ok());
        assert_eq!(driver.deregister_model(handle), Err(GnaError::InvalidArgument));
        assert_eq!(driver.core.lock().mapped, None);

        let callback: GnaCallback = Box::new(|_: &InferenceResponse| {});
        assert_eq!(
            driver.infer(handle, &[1], vec![0; 1], callback),
            Err(GnaError::InvalidArgument)
        );

        // The slot is reused under a new generation.
        let again = driver.register_model(arena.model(0)).unwrap();
        assert_eq!(again.index, handle.index);
        let callback: GnaCallback = Box::new(|_: &InferenceResponse| {});
        assert_eq!(
            driver.infer(handle, &[1], vec![0; 1], callback),
            Err(GnaError::InvalidArgument)
        );
    }

    #[test]
    fn register_while_active_defers_mapping() {
        let arena = Arena::new(2);
        let driver = driver(&arena);
        let first = driver.register_model(arena.model(0)).unwrap();
        let callback: GnaCallback = Box::new(|_: &InferenceResponse| {});
        assert_eq!(
            driver.infer(first, &[1], vec![0; 1], callback),
            Ok(InferStatus::Accepted)
        );
        assert_eq!(driver.state(), DriverState::Active);

        let second = driver.register_model(arena.model(1)).unwrap();
        let core = driver.core.lock();
        assert_eq!(core.mapped, Some(first));
        assert_eq_hex!(
            core.mmu.as_ref().unwrap().lookup(0),
            Some(phys_to_page(arena.chunk(0)))
        );
        assert!(core.registry.get(second).is_some());
    }
}
