// core/src/pipeline/mod.rs

//! A small asynchronous step engine.
//!
//! A `Pipeline<TData, Err>` is an ordered list of named steps. Each step owns
//! one or more async handlers that receive the shared `ContextData<TData>` and
//! answer with a `PipelineControl`. The `Registry` keys pipelines by their
//! context type so callers only need to build a context and hand it over.

pub mod context_data;
pub mod control;
pub mod definition;
pub mod execution;
pub mod registry;
pub mod step;

pub use context_data::ContextData;
pub use control::{PipelineControl, PipelineResult};
pub use definition::{Handler, Pipeline};
pub use registry::Registry;
pub use step::{skip_when, SkipCondition, StepDef};
