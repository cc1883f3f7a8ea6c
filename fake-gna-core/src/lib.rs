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

//! A GnaHardware that touches no hardware. It records what the driver
//! asked for and reports whatever status the test sets up, so driver logic
//! can be exercised on the host.

#![cfg_attr(not(test), no_std)]

extern crate alloc;
use alloc::vec::Vec;
use gna_interface::{GnaHardware, GnaVersion, PowerMode, StatusFlags};
use gna_shared::DmaRegion;
use spin::Mutex;

#[derive(Clone, Debug, Default)]
pub struct FakeGnaState {
    pub irq_enabled: bool,
    pub power_mode: Option<PowerMode>,
    pub descriptor_base: Option<u32>,
    pub running: bool,
    pub starts: usize,
    pub clears: usize,
    pub signals: usize,
    pub status: u32,
    pub total_cycles: u32,
    pub stall_cycles: u32,
    pub version: u32,
    pub flushed: Vec<DmaRegion>,
    pub invalidated: Vec<DmaRegion>,
}

#[derive(Default)]
pub struct FakeGna {
    state: Mutex<FakeGnaState>,
}

impl FakeGna {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(FakeGnaState {
                irq_enabled: false,
                power_mode: None,
                descriptor_base: None,
                running: false,
                starts: 0,
                clears: 0,
                signals: 0,
                status: 0,
                total_cycles: 0,
                stall_cycles: 0,
                version: 0,
                flushed: Vec::new(),
                invalidated: Vec::new(),
            }),
        }
    }

    /// A copy of everything recorded so far.
    pub fn snapshot(&self) -> FakeGnaState { self.state.lock().clone() }

    /// Status and version the next reads will see.
    pub fn set_status(&self, status: StatusFlags) { self.state.lock().status = status.bits(); }

    pub fn set_version(&self, version: u32) { self.state.lock().version = version; }

    /// Finishes the running job with |status|, as the hardware would
    /// before raising its interrupt.
    pub fn complete(&self, status: StatusFlags, total_cycles: u32, stall_cycles: u32) {
        let mut state = self.state.lock();
        state.running = false;
        state.status = status.bits();
        state.total_cycles = total_cycles;
        state.stall_cycles = stall_cycles;
    }

    /// True if |region| was flushed and fully covers |addr..addr + len|.
    pub fn was_flushed(&self, addr: usize, len: usize) -> bool {
        Self::covered(&self.state.lock().flushed, addr, len)
    }

    pub fn was_invalidated(&self, addr: usize, len: usize) -> bool {
        Self::covered(&self.state.lock().invalidated, addr, len)
    }

    pub fn clear_cache_log(&self) {
        let mut state = self.state.lock();
        state.flushed.clear();
        state.invalidated.clear();
    }

    fn covered(log: &[DmaRegion], addr: usize, len: usize) -> bool {
        log.iter()
            .any(|r| r.addr <= addr && addr + len <= r.addr + r.len)
    }
}

impl GnaHardware for FakeGna {
    fn enable_interrupt(&self) { self.state.lock().irq_enabled = true; }

    fn configure(&self, power_mode: PowerMode) { self.state.lock().power_mode = Some(power_mode); }

    fn set_descriptor_base(&self, page: u32) { self.state.lock().descriptor_base = Some(page); }

    fn version(&self) -> GnaVersion { GnaVersion::from_register(self.state.lock().version) }

    fn start(&self) {
        let mut state = self.state.lock();
        state.running = true;
        state.starts += 1;
        state.status = 0;
    }

    fn status(&self) -> StatusFlags { StatusFlags::from_bits_truncate(self.state.lock().status) }

    fn perf_counters(&self) -> (u32, u32) {
        let state = self.state.lock();
        (state.total_cycles, state.stall_cycles)
    }

    fn clear_and_disable(&self) {
        let mut state = self.state.lock();
        state.running = false;
        state.clears += 1;
    }

    fn flush_dcache(&self, region: DmaRegion) { self.state.lock().flushed.push(region); }

    fn invalidate_dcache(&self, region: DmaRegion) { self.state.lock().invalidated.push(region); }

    fn signal_completion(&self) { self.state.lock().signals += 1; }
}
