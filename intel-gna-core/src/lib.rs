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

//! intel-gna-core drives the Intel GNA through its memory-mapped register
//! file and satisfies the GnaHardware interface.
//!
//! The platform supplies the register window (get_csr/get_csr_mut), data
//! cache maintenance, and the interrupt and dispatcher hooks declared
//! below.

#![no_std]

#[allow(dead_code)]
mod gna_regs;

use gna_interface::{GnaHardware, GnaVersion, PowerMode, StatusFlags};
use gna_shared::DmaRegion;
use log::trace;

extern "C" {
    fn soc_dcache_flush(addr: *mut u8, len: usize);
    fn soc_dcache_invalidate(addr: *mut u8, len: usize);
    fn gna_irq_enable();
    fn gna_signal_completion();
}

pub struct IntelGna;

impl GnaHardware for IntelGna {
    fn enable_interrupt(&self) {
        trace!("IRQ enable");
        unsafe { gna_irq_enable() };
    }

    fn configure(&self, power_mode: PowerMode) {
        let ctrl = gna_regs::Ctrl::new()
            .with_oper_model_xnn(true)
            .with_err_intr_enable(true)
            .with_compl_intr_enable(true);
        let ctrl = match power_mode {
            PowerMode::AlwaysOn => ctrl
                .with_pm_ovride_pwr_on(true)
                .with_pm_ovride_clk_on(true)
                .with_pm_idle_disable(true),
            PowerMode::ClockGated => ctrl.with_pm_ovride_pwr_on(true).with_pm_idle_disable(true),
            PowerMode::PowerGated => ctrl.with_pm_idle_disable(true),
            PowerMode::AlwaysOff => ctrl,
        };
        trace!("CTRL {:?}", power_mode);
        gna_regs::set_ctrl(ctrl);
    }

    fn set_descriptor_base(&self, page: u32) {
        trace!("DESBASE {:#x}", page);
        gna_regs::set_desbase(page);
    }

    fn version(&self) -> GnaVersion { GnaVersion::from_register(gna_regs::get_version()) }

    fn start(&self) {
        trace!("START");
        let ctrl = gna_regs::get_ctrl()
            .with_intr_disable(false)
            .with_start(true)
            .with_stats(gna_regs::GNA_STATS_PROFILE_STALL);
        gna_regs::set_ctrl(ctrl);
    }

    fn status(&self) -> StatusFlags { StatusFlags::from_bits_truncate(gna_regs::get_status_bits()) }

    fn perf_counters(&self) -> (u32, u32) { (gna_regs::get_ptc(), gna_regs::get_sc()) }

    fn clear_and_disable(&self) {
        let ctrl = gna_regs::get_ctrl()
            .with_start(false)
            .with_abort_clear(true)
            .with_intr_disable(true);
        gna_regs::set_ctrl(ctrl);
    }

    fn flush_dcache(&self, region: DmaRegion) {
        trace!("FLUSH {:#x}+{:#x}", region.addr, region.len);
        unsafe { soc_dcache_flush(region.addr as *mut u8, region.len) };
    }

    fn invalidate_dcache(&self, region: DmaRegion) {
        trace!("INVALIDATE {:#x}+{:#x}", region.addr, region.len);
        unsafe { soc_dcache_invalidate(region.addr as *mut u8, region.len) };
    }

    fn signal_completion(&self) { unsafe { gna_signal_completion() } }
}
