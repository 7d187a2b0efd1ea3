//! # Statistics pipeline
//!
//! Composition layer over the engines:
//!
//! - [`Registry`]: caller-owned map from algorithm name to engine
//!   constructor, used to rebuild an engine from its descriptor text
//! - [`StatisticsPipeline`]: runs the enabled phases of one engine in order,
//!   with training-fraction sampling and chunked learning
//! - [`combinations`]: expansion of oversized requests to the engine arity

pub mod combinations;
pub mod pipeline;
pub mod registry;
pub mod sampling;

pub use pipeline::{PhaseFlags, PipelineOutput, StatisticsPipeline};
pub use registry::{EngineConstructor, Registry};
pub use sampling::observations_for_training;
