//! Compute device selection.
//!
//! The selector runs once at process start and picks the most capable
//! inference target it can find, in this order: a CUDA accelerator, a Metal
//! accelerator, then the general-purpose processor. A missing accelerator is
//! not an error, it is the fallback.
//!
//! The result is advisory. Each model in the
//! [`ModelRegistry`](crate::models::ModelRegistry) is placed on the selected
//! device only if it supports it, and the registry records where every model
//! actually runs (see [`crate::models::Placement`]).
//!
//! Probing goes through candle: accelerator support must be compiled in
//! (`cuda` / `metal` crate features) *and* a device must initialise.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

/// Hardware execution target for model inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "ordinal")]
pub enum ComputeDevice {
    /// NVIDIA accelerator with the given ordinal.
    Cuda(usize),
    /// Apple GPU via Metal.
    Metal,
    /// General-purpose processor.
    Cpu,
}

impl ComputeDevice {
    pub fn is_accelerator(&self) -> bool {
        !matches!(self, ComputeDevice::Cpu)
    }
}

impl fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComputeDevice::Cuda(ordinal) => write!(f, "cuda:{ordinal}"),
            ComputeDevice::Metal => f.write_str("metal"),
            ComputeDevice::Cpu => f.write_str("cpu"),
        }
    }
}

/// Source of accelerator availability facts.
///
/// The production probe asks candle; tests inject a fixed answer.
pub trait AcceleratorProbe {
    /// True when CUDA device `ordinal` can be initialised.
    fn cuda(&self, ordinal: usize) -> bool;
    /// True when a Metal device can be initialised.
    fn metal(&self) -> bool;
}

/// Probe backed by `candle-core`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CandleProbe;

impl AcceleratorProbe for CandleProbe {
    fn cuda(&self, ordinal: usize) -> bool {
        if !candle_core::utils::cuda_is_available() {
            return false;
        }
        match candle_core::Device::new_cuda(ordinal) {
            Ok(_) => true,
            Err(e) => {
                debug!("CUDA compiled in but device {} failed: {}", ordinal, e);
                false
            }
        }
    }

    fn metal(&self) -> bool {
        if !candle_core::utils::metal_is_available() {
            return false;
        }
        match candle_core::Device::new_metal(0) {
            Ok(_) => true,
            Err(e) => {
                debug!("Metal compiled in but device init failed: {}", e);
                false
            }
        }
    }
}

/// Pick the inference device for this process by probing real hardware.
pub fn select_device() -> ComputeDevice {
    select_device_with(&CandleProbe)
}

/// Pick the inference device using `probe`.
///
/// Deterministic: the same probe answers always give the same device.
pub fn select_device_with(probe: &dyn AcceleratorProbe) -> ComputeDevice {
    let device = if probe.cuda(0) {
        ComputeDevice::Cuda(0)
    } else if probe.metal() {
        ComputeDevice::Metal
    } else {
        ComputeDevice::Cpu
    };
    info!("Running on: {}", device.to_string().to_uppercase());
    device
}
