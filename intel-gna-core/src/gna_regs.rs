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

// Setters and getters for the GNA CSRs.

use modular_bitfield::prelude::*;

pub const GNA_STS_REG_OFFSET: usize = 0x00;
pub const GNA_CTRL_REG_OFFSET: usize = 0x04;
pub const GNA_MCTL_REG_OFFSET: usize = 0x08;
pub const GNA_PTC_REG_OFFSET: usize = 0x0C;
pub const GNA_SC_REG_OFFSET: usize = 0x10;
pub const GNA_ISI_REG_OFFSET: usize = 0x14;
pub const GNA_IS_LOW_REG_OFFSET: usize = 0x18;
pub const GNA_IS_HIGH_REG_OFFSET: usize = 0x1C;
pub const GNA_BP_LOW_REG_OFFSET: usize = 0x20;
pub const GNA_BP_HIGH_REG_OFFSET: usize = 0x24;
pub const GNA_DESBASE_REG_OFFSET: usize = 0x30;
pub const GNA_IBUFFS_REG_OFFSET: usize = 0x34;
pub const GNA_OVRCFGCTL_REG_OFFSET: usize = 0x40;
pub const GNA_VERSION_REG_OFFSET: usize = 0x50;

/// GNACTRL.stats selector for stall-cycle profiling.
pub const GNA_STATS_PROFILE_STALL: u8 = 1;

#[inline]
unsafe fn get_gna(offset: usize) -> *const u32 {
    extern "Rust" {
        fn get_csr() -> &'static [u8];
    }
    get_csr().as_ptr().add(offset).cast::<u32>()
}
#[inline]
unsafe fn get_gna_mut(offset: usize) -> *mut u32 {
    extern "Rust" {
        fn get_csr_mut() -> &'static mut [u8];
    }
    get_csr_mut().as_mut_ptr().add(offset).cast::<u32>()
}

fn get_u32(offset: usize) -> u32 { unsafe { get_gna(offset).read_volatile() } }

fn set_u32(offset: usize, val: u32) {
    unsafe {
        get_gna_mut(offset).write_volatile(val);
    }
}

#[bitfield]
pub struct Status {
    pub score_complete: bool,
    pub susp_breakpoint: bool,
    pub susp_pause: bool,
    pub stats_valid: bool,
    #[skip]
    _unused0: B3,
    pub virt_addr_oor: bool,
    pub param_oor: bool,
    #[skip]
    _unused1: B6,
    pub error: bool,
    pub buffer_full: bool,
    pub saturation: bool,
    #[skip]
    _unused2: B13,
    pub intr_pending: bool,
}
pub fn get_status() -> Status { Status::from_bytes(get_u32(GNA_STS_REG_OFFSET).to_ne_bytes()) }
pub fn set_status(status: Status) {
    set_u32(GNA_STS_REG_OFFSET, u32::from_ne_bytes(status.into_bytes()));
}
pub fn get_status_bits() -> u32 { get_u32(GNA_STS_REG_OFFSET) }

#[bitfield]
pub struct Ctrl {
    pub start: bool,
    #[skip]
    _unused0: B1,
    pub abort_clear: bool,
    #[skip]
    _unused1: B2,
    pub oper_model_xnn: bool,
    #[skip]
    _unused2: B2,
    pub compl_intr_enable: bool,
    #[skip]
    _unused3: B1,
    pub err_intr_enable: bool,
    #[skip]
    _unused4: B1,
    pub stats: B4,
    pub pm_ovride_pwr_on: bool,
    pub pm_ovride_clk_on: bool,
    pub pm_idle_disable: bool,
    #[skip]
    _unused5: B12,
    pub intr_disable: bool,
}
pub fn get_ctrl() -> Ctrl { Ctrl::from_bytes(get_u32(GNA_CTRL_REG_OFFSET).to_ne_bytes()) }
pub fn set_ctrl(ctrl: Ctrl) { set_u32(GNA_CTRL_REG_OFFSET, u32::from_ne_bytes(ctrl.into_bytes())); }

pub fn get_mctl() -> u32 { get_u32(GNA_MCTL_REG_OFFSET) }
pub fn set_mctl(val: u32) { set_u32(GNA_MCTL_REG_OFFSET, val); }

// Performance counters, valid when GNASTS.stats_valid is set.
pub fn get_ptc() -> u32 { get_u32(GNA_PTC_REG_OFFSET) }
pub fn get_sc() -> u32 { get_u32(GNA_SC_REG_OFFSET) }

pub fn get_isi() -> u32 { get_u32(GNA_ISI_REG_OFFSET) }

pub fn get_is() -> u64 {
    let low = get_u32(GNA_IS_LOW_REG_OFFSET);
    let high = get_u32(GNA_IS_HIGH_REG_OFFSET);
    ((high as u64) << 32) | low as u64
}

pub fn set_bp(val: u64) {
    set_u32(GNA_BP_LOW_REG_OFFSET, (val & 0xffffffff) as u32);
    set_u32(GNA_BP_HIGH_REG_OFFSET, (val >> 32) as u32);
}

// Physical page of the configuration descriptor.
pub fn get_desbase() -> u32 { get_u32(GNA_DESBASE_REG_OFFSET) }
pub fn set_desbase(page: u32) { set_u32(GNA_DESBASE_REG_OFFSET, page); }

pub fn get_ibuffs() -> u32 { get_u32(GNA_IBUFFS_REG_OFFSET) }

pub fn get_ovrcfgctl() -> u32 { get_u32(GNA_OVRCFGCTL_REG_OFFSET) }
pub fn set_ovrcfgctl(val: u32) { set_u32(GNA_OVRCFGCTL_REG_OFFSET, val); }

pub fn get_version() -> u32 { get_u32(GNA_VERSION_REG_OFFSET) }
