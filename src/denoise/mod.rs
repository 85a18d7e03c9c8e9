//! The denoising core: frame processors and the adapter that owns them.

pub mod adapter;
pub mod processor;

pub use adapter::{AdapterStatus, DenoiseAdapter, GateLoader, ModelLoader, RnnoiseLoader};
pub use processor::{FrameOutput, FrameProcessor, NoiseGateProcessor, RnnoiseProcessor};

#[cfg(test)]
pub use processor::MockFrameProcessor;
