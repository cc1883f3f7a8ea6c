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

#![allow(non_camel_case_types)]
#![allow(dead_code)]

const CSR_SIZE: usize = 4096;
#[repr(C, align(4096))]
struct CSR {
    pub data: [u8; CSR_SIZE],
}
static mut CSR: CSR = CSR {
    data: [0u8; CSR_SIZE],
};
#[no_mangle]
pub fn get_csr_mut() -> &'static mut [u8] { unsafe { &mut *core::ptr::addr_of_mut!(CSR.data) } }
#[no_mangle]
pub fn get_csr() -> &'static [u8] { unsafe { &*core::ptr::addr_of!(CSR.data) } }

include!("../intel-gna-core/src/gna_regs.rs");

#[cfg(test)]
mod tests {
    use super::*;

    // The register window is shared by every test.
    static LOCK: spin::Mutex<()> = spin::Mutex::new(());

    fn poke(offset: usize, val: u32) {
        get_csr_mut()[offset..offset + 4].copy_from_slice(&val.to_ne_bytes());
    }

    fn peek(offset: usize) -> u32 {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&get_csr()[offset..offset + 4]);
        u32::from_ne_bytes(bytes)
    }

    #[test]
    fn status_bits() {
        let _guard = LOCK.lock();
        poke(GNA_STS_REG_OFFSET, 1 << 15);
        let status = get_status();
        assert!(status.error());
        assert!(!status.score_complete());
        assert!(!status.buffer_full());

        poke(GNA_STS_REG_OFFSET, (1 << 0) | (1 << 3) | (1 << 7) | (1 << 8));
        let status = get_status();
        assert!(status.score_complete());
        assert!(status.stats_valid());
        assert!(status.virt_addr_oor());
        assert!(status.param_oor());
        assert!(!status.error());

        poke(GNA_STS_REG_OFFSET, (1 << 16) | (1 << 17) | (1 << 31));
        let status = get_status();
        assert!(status.buffer_full());
        assert!(status.saturation());
        assert!(status.intr_pending());
        assert_eq!(get_status_bits(), (1 << 16) | (1 << 17) | (1 << 31));
    }

    #[test]
    fn ctrl_start() {
        let _guard = LOCK.lock();
        poke(GNA_CTRL_REG_OFFSET, 0);
        set_ctrl(
            Ctrl::new()
                .with_start(true)
                .with_stats(GNA_STATS_PROFILE_STALL)
                .with_intr_disable(false),
        );
        assert_eq!(peek(GNA_CTRL_REG_OFFSET), (1 << 0) | (1 << 12));
        set_ctrl(get_ctrl().with_start(false).with_abort_clear(true).with_intr_disable(true));
        assert_eq!(peek(GNA_CTRL_REG_OFFSET), (1 << 2) | (1 << 12) | (1 << 31));
    }

    #[test]
    fn ctrl_configure() {
        let _guard = LOCK.lock();
        set_ctrl(
            Ctrl::new()
                .with_oper_model_xnn(true)
                .with_compl_intr_enable(true)
                .with_err_intr_enable(true)
                .with_pm_ovride_pwr_on(true)
                .with_pm_ovride_clk_on(true)
                .with_pm_idle_disable(true),
        );
        assert_eq!(
            peek(GNA_CTRL_REG_OFFSET),
            (1 << 5) | (1 << 8) | (1 << 10) | (1 << 16) | (1 << 17) | (1 << 18)
        );
    }

    #[test]
    fn word_registers() {
        let _guard = LOCK.lock();
        set_desbase(0xbe012);
        assert_eq!(peek(0x30), 0xbe012);
        assert_eq!(get_desbase(), 0xbe012);

        poke(0x0C, 1000);
        poke(0x10, 100);
        assert_eq!(get_ptc(), 1000);
        assert_eq!(get_sc(), 100);

        poke(0x50, 0x5);
        assert_eq!(get_version(), 0x5);

        set_bp(0x1_0000_0002);
        assert_eq!(peek(GNA_BP_LOW_REG_OFFSET), 2);
        assert_eq!(peek(GNA_BP_HIGH_REG_OFFSET), 1);
    }
}
