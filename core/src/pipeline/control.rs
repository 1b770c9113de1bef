// core/src/pipeline/control.rs

//! Signals for controlling flow execution and the outcome of a run.

/// Returned by a step handler to say whether the flow goes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineControl {
  Continue,
  /// Halt the flow. Remaining handlers and steps are not executed and the
  /// run reports `PipelineResult::Stopped`.
  Stop,
}

/// Outcome of a full pipeline run that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineResult {
  Completed,
  Stopped,
}
