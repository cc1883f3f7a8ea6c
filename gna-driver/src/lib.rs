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

//! The GNA driver: model registry, inference queueing, interrupt handling
//! and completion dispatch on top of a GnaHardware backend.
//!
//! Threads call the GnaInterface methods. The platform calls
//! handle_interrupt from its GNA interrupt context and runs
//! dispatch_completions from a thread woken by
//! GnaHardware::signal_completion. Callbacks only ever run from
//! dispatch_completions.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod job;
pub mod registry;

#[cfg(test)]
mod testing;

use alloc::vec::Vec;
use circular_queue::Queue;
use gna_interface::*;
use gna_mmu::GnaMmu;
use gna_shared::{SramWindow, MAX_PENDING_REQUESTS};
use job::{CompletedResponse, PendingRequest};
use log::{info, warn};
use registry::{ModelRecord, ModelRegistry};
use spin::Mutex;

#[derive(Debug, Default)]
struct Statistics {
    models_registered: usize,
    requests: usize,
    deferred: usize,
    rejected: usize,
    jobs_started: usize,
    completed: usize,
    failed: usize,
    spurious_interrupts: usize,
}

// State shared by every entry point. Lock order is core, then pending,
// then responses.
struct DriverCore {
    state: DriverState,
    config: Option<GnaConfig>,
    mmu: Option<GnaMmu>,
    registry: ModelRegistry,
    // Model whose regions are currently in the page tables.
    mapped: Option<ModelHandle>,
    statistics: Statistics,
}

impl DriverCore {
    fn mmu_mut(&mut self) -> Result<&mut GnaMmu, GnaError> {
        self.mmu.as_mut().ok_or(GnaError::InvalidState)
    }
}

pub struct GnaDriver<H: GnaHardware> {
    hw: H,
    window: SramWindow,
    core: Mutex<DriverCore>,
    pending: Mutex<Queue<PendingRequest, MAX_PENDING_REQUESTS>>,
    responses: Mutex<Queue<CompletedResponse, MAX_PENDING_REQUESTS>>,
}

impl<H: GnaHardware> GnaDriver<H> {
    /// A driver for |hw| whose models must live in |window|. Nothing is
    /// touched until init.
    pub const fn new(hw: H, window: SramWindow) -> Self {
        Self {
            hw,
            window,
            core: Mutex::new(DriverCore {
                state: DriverState::Uninitialized,
                config: None,
                mmu: None,
                registry: ModelRegistry::new(),
                mapped: None,
                statistics: Statistics {
                    models_registered: 0,
                    requests: 0,
                    deferred: 0,
                    rejected: 0,
                    jobs_started: 0,
                    completed: 0,
                    failed: 0,
                    spurious_interrupts: 0,
                },
            }),
            pending: Mutex::new(Queue::new()),
            responses: Mutex::new(Queue::new()),
        }
    }

    pub fn hardware(&self) -> &H { &self.hw }

    pub fn state(&self) -> DriverState { self.core.lock().state }

    /// The configuration applied by configure, if any.
    pub fn config(&self) -> Option<GnaConfig> { self.core.lock().config }

    /// Builds empty page tables and the configuration descriptor, then
    /// hooks up the interrupt.
    pub fn init(&self) -> Result<(), GnaError> {
        let mut core = self.core.lock();
        if core.state != DriverState::Uninitialized {
            warn!("init in state {:?}", core.state);
            return Err(GnaError::InvalidState);
        }
        let mmu = GnaMmu::new(self.window);
        self.hw.flush_dcache(mmu.tables_region());
        self.hw.flush_dcache(mmu.descriptor_region());
        core.mmu = Some(mmu);
        self.hw.enable_interrupt();
        core.state = DriverState::Initialized;
        info!(
            "GNA initialized, SRAM window {:#x}+{:#x}",
            self.window.base, self.window.size
        );
        Ok(())
    }

    pub fn debug_state(&self) {
        let core = self.core.lock();
        info!(target: "", "GNA state {:?} config {:?}", core.state, core.config);
        info!(target: "", "{:?}", core.statistics);
        {
            let pending = self.pending.lock();
            let responses = self.responses.lock();
            info!(
                target: "",
                "{} of {} pending, {} of {} undelivered",
                pending.len(),
                pending.capacity(),
                responses.len(),
                responses.capacity()
            );
            for request in pending.iter() {
                info!(target: "", "  {:?}", request);
            }
        }
        core.registry.debug_state();
        if let Some(mmu) = core.mmu.as_ref() {
            mmu.debug_state();
        }
    }
}

impl<H: GnaHardware> GnaInterface for GnaDriver<H> {
    fn configure(&self, config: GnaConfig) -> Result<(), GnaError> {
        let mut core = self.core.lock();
        if core.state != DriverState::Initialized {
            warn!("configure in state {:?}", core.state);
            return Err(GnaError::InvalidState);
        }
        if config.operation_mode != OperationMode::Xnn {
            warn!("Unsupported operation mode {:?}", config.operation_mode);
            return Err(GnaError::InvalidArgument);
        }
        let desc_page = core.mmu_mut()?.descriptor().phys_page();
        self.hw.configure(config.power_mode);
        self.hw.set_descriptor_base(desc_page);
        info!("GNA version {} configured {:?}", self.hw.version(), config);
        core.config = Some(config);
        core.state = DriverState::Idle;
        Ok(())
    }

    fn register_model(&self, model: GnaModelInfo) -> Result<ModelHandle, GnaError> {
        let mut guard = self.core.lock();
        let core = &mut *guard;
        if !matches!(core.state, DriverState::Idle | DriverState::Active) {
            warn!("register_model in state {:?}", core.state);
            return Err(GnaError::InvalidState);
        }
        let record = ModelRecord::from_model(&model, core.mmu_mut()?)?;
        let handle = core.registry.insert(record).map_err(|e| {
            warn!("No model slots left");
            e
        })?;

        // The running job owns the tables; the new model is mapped when a
        // job for it starts.
        if core.state == DriverState::Idle {
            core.mapped = None;
            let mmu = core.mmu_mut()?;
            if record.map_into(mmu).is_err() {
                core.registry.remove(handle);
                return Err(GnaError::InvalidArgument);
            }
            core.mapped = Some(handle);
        }
        let mmu = core.mmu_mut()?;
        self.hw.flush_dcache(record.rw);
        self.hw.flush_dcache(record.ro);
        self.hw.flush_dcache(mmu.tables_region());
        core.statistics.models_registered += 1;
        info!(
            "Registered model {:?}: {} layers, rw {:#x}+{:#x}, ro {:#x}+{:#x}",
            handle,
            record.header.layer_count,
            record.rw.addr,
            record.rw.len,
            record.ro.addr,
            record.ro.len
        );
        Ok(handle)
    }

    fn deregister_model(&self, handle: ModelHandle) -> Result<(), GnaError> {
        let mut core = self.core.lock();
        if core.registry.remove(handle).is_none() {
            warn!("deregister of unknown model {:?}", handle);
            return Err(GnaError::InvalidArgument);
        }
        // Entries stay in the tables; the next job remaps for its model.
        if core.mapped == Some(handle) {
            core.mapped = None;
        }
        info!("Deregistered model {:?}", handle);
        Ok(())
    }

    fn infer(
        &self,
        handle: ModelHandle,
        input: &[u8],
        output: Vec<u8>,
        callback: GnaCallback,
    ) -> Result<InferStatus, GnaError> {
        self.submit(handle, input, output, callback)
    }
}
