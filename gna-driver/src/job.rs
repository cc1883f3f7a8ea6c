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

//! Inference requests: queued by infer, run one at a time on the hardware,
//! completed by the interrupt handler and delivered by the dispatcher.

use crate::registry::ModelRecord;
use crate::{DriverCore, GnaDriver};
use alloc::vec::Vec;
use core::{cmp, fmt};
use gna_interface::*;
use gna_shared::{DmaRegion, MAX_PENDING_REQUESTS};
use log::{error, trace, warn};

/// A request waiting for (or running on) the hardware.
pub struct PendingRequest {
    handle: ModelHandle,
    input: Vec<u8>,
    output: Vec<u8>,
    // The model's output buffer, resolved when the request was accepted.
    model_output: DmaRegion,
    callback: GnaCallback,
}

impl fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PendingRequest")
            .field("handle", &self.handle)
            .field("input", &self.input.len())
            .field("output", &self.output.len())
            .finish_non_exhaustive()
    }
}

/// A finished request waiting for the dispatcher.
pub struct CompletedResponse {
    response: InferenceResponse,
    callback: GnaCallback,
}

impl<H: GnaHardware> GnaDriver<H> {
    pub(crate) fn submit(
        &self,
        handle: ModelHandle,
        input: &[u8],
        output: Vec<u8>,
        callback: GnaCallback,
    ) -> Result<InferStatus, GnaError> {
        let mut guard = self.core.lock();
        let core = &mut *guard;
        let Some(record) = core.registry.get(handle).copied() else {
            warn!("infer on unknown model {:?}", handle);
            core.statistics.rejected += 1;
            return Err(GnaError::InvalidArgument);
        };
        if input.is_empty() || output.is_empty() || input.len() > record.input.len {
            warn!(
                "infer with input {} (model takes {}) output {}",
                input.len(),
                record.input.len,
                output.len()
            );
            core.statistics.rejected += 1;
            return Err(GnaError::InvalidArgument);
        }

        {
            // Every accepted request must find room in the response queue
            // when it completes.
            let mut pending = self.pending.lock();
            let outstanding = pending.len() + self.responses.lock().len();
            if outstanding >= MAX_PENDING_REQUESTS {
                trace!("infer rejected, {} requests outstanding", outstanding);
                core.statistics.rejected += 1;
                return Err(GnaError::QueueFull);
            }
            let request = PendingRequest {
                handle,
                input: input.to_vec(),
                output,
                model_output: record.output,
                callback,
            };
            if pending.push(request).is_err() {
                core.statistics.rejected += 1;
                return Err(GnaError::QueueFull);
            }
        }
        core.statistics.requests += 1;

        if core.state != DriverState::Idle {
            core.statistics.deferred += 1;
            return Ok(InferStatus::AcceptedDeferred);
        }
        self.start_next(core);
        Ok(InferStatus::Accepted)
    }

    /// Starts the request at the head of the pending queue. Requests whose
    /// model has gone away are completed with GenericError.
    fn start_next(&self, core: &mut DriverCore) {
        loop {
            let pending = self.pending.lock();
            let Some(handle) = pending.peek().map(|r| r.handle) else {
                return;
            };
            let started = match core.registry.get(handle).copied() {
                Some(record) => {
                    if let Some(request) = pending.peek() {
                        // Sized at submit.
                        unsafe { record.input.write(&request.input) };
                    }
                    drop(pending);
                    self.launch(core, handle, &record)
                }
                None => {
                    warn!("Model {:?} deregistered while its request was queued", handle);
                    drop(pending);
                    Err(GnaError::InvalidArgument)
                }
            };
            if started.is_ok() {
                return;
            }
            let failed = self.pending.lock().pop();
            if let Some(request) = failed {
                self.complete(core, request, GnaResult::GenericError, InferenceStats::invalid(), 0);
            }
        }
    }

    // Makes |record| visible to the hardware and starts it.
    fn launch(
        &self,
        core: &mut DriverCore,
        handle: ModelHandle,
        record: &ModelRecord,
    ) -> Result<(), GnaError> {
        self.hw.flush_dcache(record.input);
        let remap = core.mapped != Some(handle);
        if remap {
            core.mapped = None;
            let mmu = core.mmu_mut()?;
            record.map_into(mmu).map_err(|_| {
                error!("Model {:?} no longer maps", handle);
                GnaError::InvalidArgument
            })?;
            self.hw.flush_dcache(mmu.tables_region());
        }
        let mmu = core.mmu_mut()?;
        mmu.link_job(record.labase(), record.lacnt());
        self.hw.flush_dcache(mmu.descriptor_region());
        if remap {
            core.mapped = Some(handle);
        }
        core.state = DriverState::Active;
        core.statistics.jobs_started += 1;
        trace!(
            "Job start model {:?} labase {:#x} lacnt {}",
            handle,
            record.labase(),
            record.lacnt()
        );
        self.hw.start();
        Ok(())
    }

    // Hands |request| to the dispatcher with its first |output_len| bytes
    // filled in.
    fn complete(
        &self,
        core: &mut DriverCore,
        request: PendingRequest,
        result: GnaResult,
        stats: InferenceStats,
        output_len: usize,
    ) {
        let PendingRequest {
            mut output,
            model_output,
            callback,
            ..
        } = request;
        if output_len > 0 {
            self.hw.invalidate_dcache(model_output);
            unsafe { model_output.read(&mut output[..output_len]) };
        }
        match result {
            GnaResult::Complete => core.statistics.completed += 1,
            _ => core.statistics.failed += 1,
        }
        let response = CompletedResponse {
            response: InferenceResponse {
                result,
                output,
                output_len,
                stats,
            },
            callback,
        };
        if self.responses.lock().push(response).is_err() {
            // Unreachable while submit bounds outstanding requests.
            error!("Response queue overflow, completion dropped");
            return;
        }
        self.hw.signal_completion();
    }

    /// Services the GNA interrupt: completes the running job, returns the
    /// hardware to idle and starts the next queued request. Never blocks
    /// on anything but the driver's own short critical sections.
    pub fn handle_interrupt(&self) {
        let mut guard = self.core.lock();
        let core = &mut *guard;
        let status = self.hw.status();
        let request = self.pending.lock().pop();
        match request {
            Some(request) => {
                let result = status.result();
                if result != GnaResult::Complete {
                    error!("GNA job failed: {:?}, status {:#x}", result, status.bits());
                }
                let stats = if status.contains(StatusFlags::STATS_VALID) {
                    let (total_cycles, stall_cycles) = self.hw.perf_counters();
                    InferenceStats::new(total_cycles, stall_cycles)
                } else {
                    InferenceStats::invalid()
                };
                let output_len = cmp::min(request.model_output.len, request.output.len());
                self.complete(core, request, result, stats, output_len);
            }
            None => {
                error!("Spurious GNA interrupt, status {:#x}", status.bits());
                core.statistics.spurious_interrupts += 1;
            }
        }

        self.hw.clear_and_disable();
        if core.state == DriverState::Active {
            core.state = DriverState::Idle;
            self.start_next(core);
        }
    }

    /// Runs the callbacks of every completed request, oldest first. Must
    /// not be called from interrupt context. Returns the number of
    /// callbacks run.
    pub fn dispatch_completions(&self) -> usize {
        let mut count = 0;
        loop {
            let next = self.responses.lock().pop();
            let Some(CompletedResponse { response, callback }) = next else {
                break;
            };
            callback(&response);
            count += 1;
        }
        count
    }
}
