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

//! Types shared between the GNA driver, its clients and the hardware
//! backends.

#![cfg_attr(not(test), no_std)]

extern crate alloc;
use alloc::boxed::Box;
use alloc::vec::Vec;
use bitflags::bitflags;
use cfg_if::cfg_if;
use core::fmt;
use gna_shared::{DmaRegion, GnaModelHeader, GNA_BASE_CLOCK_FREQUENCY};
use num_enum::{FromPrimitive, IntoPrimitive};
use static_assertions::assert_cfg;

assert_cfg!(
    not(any(
        all(
            feature = "CONFIG_GNA_POWER_MODE_ALWAYS_ON",
            feature = "CONFIG_GNA_POWER_MODE_CLOCK_GATED"
        ),
        all(
            feature = "CONFIG_GNA_POWER_MODE_ALWAYS_ON",
            feature = "CONFIG_GNA_POWER_MODE_POWER_GATED"
        ),
        all(
            feature = "CONFIG_GNA_POWER_MODE_ALWAYS_ON",
            feature = "CONFIG_GNA_POWER_MODE_ALWAYS_OFF"
        ),
        all(
            feature = "CONFIG_GNA_POWER_MODE_CLOCK_GATED",
            feature = "CONFIG_GNA_POWER_MODE_POWER_GATED"
        ),
        all(
            feature = "CONFIG_GNA_POWER_MODE_CLOCK_GATED",
            feature = "CONFIG_GNA_POWER_MODE_ALWAYS_OFF"
        ),
        all(
            feature = "CONFIG_GNA_POWER_MODE_POWER_GATED",
            feature = "CONFIG_GNA_POWER_MODE_ALWAYS_OFF"
        ),
    )),
    "Only one GNA power mode may be specified"
);

/// Return codes from GNA driver api's.
#[repr(usize)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, FromPrimitive, IntoPrimitive)]
pub enum GnaError {
    Success = 0,
    InvalidState,    // Driver is not in a state that allows the request
    InvalidArgument, // Bad handle, buffer, alignment or unmappable memory
    OutOfMemory,     // No model slots left
    QueueFull,       // Too many inference requests outstanding
    #[default]
    UnknownError,
}
impl From<GnaError> for Result<(), GnaError> {
    fn from(err: GnaError) -> Result<(), GnaError> {
        if err == GnaError::Success {
            Ok(())
        } else {
            Err(err)
        }
    }
}

/// Outcome of an accepted infer request. A rejected request is the Err
/// side of the Result.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InferStatus {
    /// The job was handed to the hardware.
    Accepted,
    /// Another job is running; this one starts when it completes.
    AcceptedDeferred,
}

/// Hardware verdict for a completed job, delivered through the callback.
#[repr(u32)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GnaResult {
    Complete,
    OutputBufferFull,
    ParamOutOfRange,
    GenericError,
}

/// Cycle counters captured at completion. Zero when the hardware did not
/// report valid statistics.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct InferenceStats {
    pub total_cycles: u32,
    pub stall_cycles: u32,
    pub cycles_per_sec: u32,
}
impl InferenceStats {
    pub fn new(total_cycles: u32, stall_cycles: u32) -> Self {
        Self {
            total_cycles,
            stall_cycles,
            cycles_per_sec: GNA_BASE_CLOCK_FREQUENCY,
        }
    }

    /// Statistics for a job whose counters are not trustworthy.
    pub fn invalid() -> Self { Self::new(0, 0) }
}

#[derive(Debug)]
pub struct InferenceResponse {
    pub result: GnaResult,
    /// The caller's output buffer, handed back. Only the first
    /// |output_len| bytes were written.
    pub output: Vec<u8>,
    pub output_len: usize,
    pub stats: InferenceStats,
}
impl InferenceResponse {
    pub fn output_data(&self) -> &[u8] { &self.output[..self.output_len] }
}

/// Completion callback; runs once, in the dispatcher's context.
pub type GnaCallback = Box<dyn FnOnce(&InferenceResponse) + Send>;

/// Operation modes the hardware supports. Only XNN is implemented by the
/// driver.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum OperationMode {
    Gmm,
    #[default]
    Xnn,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PowerMode {
    AlwaysOn,
    ClockGated,
    PowerGated,
    AlwaysOff,
}
impl Default for PowerMode {
    fn default() -> Self {
        cfg_if! {
            if #[cfg(feature = "CONFIG_GNA_POWER_MODE_CLOCK_GATED")] {
                PowerMode::ClockGated
            } else if #[cfg(feature = "CONFIG_GNA_POWER_MODE_POWER_GATED")] {
                PowerMode::PowerGated
            } else if #[cfg(feature = "CONFIG_GNA_POWER_MODE_ALWAYS_OFF")] {
                PowerMode::AlwaysOff
            } else {
                PowerMode::AlwaysOn
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct GnaConfig {
    pub operation_mode: OperationMode,
    pub power_mode: PowerMode,
}

/// Names a registered model. The generation guards against a handle
/// outliving its model when the slot is reused.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ModelHandle {
    pub index: usize,
    pub generation: u32,
}

/// A model handed to the driver. The memory is owned by the caller for
/// the life of the program and must sit in the accelerator's SRAM window;
/// the driver maps it in place and never copies it.
pub struct GnaModelInfo {
    pub header: &'static GnaModelHeader,
    pub rw_region: &'static mut [u8],
    pub ro_region: &'static [u8],
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DriverState {
    Uninitialized,
    Initialized,
    Idle,
    Active,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct GnaVersion {
    pub major: u32,
    pub minor: u32,
}
impl GnaVersion {
    /// Decodes the GNAVERSION register.
    pub fn from_register(val: u32) -> Self {
        Self {
            major: val >> 1,
            minor: val & 1,
        }
    }
}
impl fmt::Display for GnaVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

bitflags! {
    /// GNASTS as seen by the interrupt handler.
    pub struct StatusFlags: u32 {
        const SCORE_COMPLETE = 1 << 0;
        const SUSP_BREAKPOINT = 1 << 1;
        const SUSP_PAUSE = 1 << 2;
        const STATS_VALID = 1 << 3;
        const VIRT_ADDR_OOR = 1 << 7;
        const PARAM_OOR = 1 << 8;
        const ERROR = 1 << 15;
        const BUFFER_FULL = 1 << 16;
        const SATURATION = 1 << 17;
        const INTR_PENDING = 1 << 31;
    }
}
impl StatusFlags {
    /// Maps a completion status to the result reported to the caller.
    /// Checks run in increasing precedence so a completed job wins over
    /// any fault bits; an empty status is treated as a fault.
    pub fn result(&self) -> GnaResult {
        let mut result = GnaResult::GenericError;
        if self.intersects(StatusFlags::ERROR | StatusFlags::VIRT_ADDR_OOR) {
            result = GnaResult::GenericError;
        }
        if self.contains(StatusFlags::PARAM_OOR) {
            result = GnaResult::ParamOutOfRange;
        }
        if self.contains(StatusFlags::BUFFER_FULL) {
            result = GnaResult::OutputBufferFull;
        }
        if self.contains(StatusFlags::SCORE_COMPLETE) {
            result = GnaResult::Complete;
        }
        result
    }
}

/// The accelerator as the driver sees it. Implementations talk to the
/// register file and the platform's cache and interrupt plumbing.
pub trait GnaHardware {
    /// Attaches and unmasks the accelerator's interrupt line.
    fn enable_interrupt(&self);
    /// Programs XNN mode, interrupt enables and the power-mode overrides.
    fn configure(&self, power_mode: PowerMode);
    /// Publishes the configuration descriptor's physical page.
    fn set_descriptor_base(&self, page: u32);
    fn version(&self) -> GnaVersion;
    /// Kicks off the job linked in the descriptor, with stall statistics.
    fn start(&self);
    fn status(&self) -> StatusFlags;
    /// Returns (total cycles, stall cycles) for the last job.
    fn perf_counters(&self) -> (u32, u32);
    /// Clears operation/abort state and masks the completion interrupt.
    fn clear_and_disable(&self);
    /// Writes back CPU caches so the hardware sees |region|.
    fn flush_dcache(&self, region: DmaRegion);
    /// Discards CPU cache lines so the CPU sees what hardware wrote.
    fn invalidate_dcache(&self, region: DmaRegion);
    /// Wakes the completion dispatcher.
    fn signal_completion(&self);
}

pub trait GnaInterface {
    fn configure(&self, config: GnaConfig) -> Result<(), GnaError>;
    fn register_model(&self, model: GnaModelInfo) -> Result<ModelHandle, GnaError>;
    fn deregister_model(&self, handle: ModelHandle) -> Result<(), GnaError>;
    fn infer(
        &self,
        handle: ModelHandle,
        input: &[u8],
        output: Vec<u8>,
        callback: GnaCallback,
    ) -> Result<InferStatus, GnaError>;
}
