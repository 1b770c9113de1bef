// core/src/pipeline/step.rs

use super::ContextData;
use std::sync::Arc;

/// Evaluated right before a step runs; `true` skips the step.
pub type SkipCondition<TData> = Arc<dyn Fn(ContextData<TData>) -> bool + Send + Sync + 'static>;

/// Builds a skip condition from a predicate over the context data.
///
/// The read guard is released before the step runs.
pub fn skip_when<TData, F>(predicate: F) -> Option<SkipCondition<TData>>
where
  TData: Send + Sync + 'static,
  F: Fn(&TData) -> bool + Send + Sync + 'static,
{
  let condition: SkipCondition<TData> = Arc::new(move |ctx_data: ContextData<TData>| {
    let guard = ctx_data.read();
    predicate(&guard)
  });
  Some(condition)
}

/// A named step of a pipeline.
///
/// An `optional` step may have no handlers, and a failure inside it is logged
/// and swallowed instead of aborting the run. Work that must not unwind what
/// earlier steps committed (organizer payouts) is declared optional.
#[derive(Clone)]
pub struct StepDef<T: 'static + Send + Sync> {
  pub name: String,
  pub optional: bool,
  pub skip_if: Option<SkipCondition<T>>,
}

impl<T: 'static + Send + Sync> std::fmt::Debug for StepDef<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("StepDef")
      .field("name", &self.name)
      .field("optional", &self.optional)
      .field("skip_if_present", &self.skip_if.is_some())
      .finish()
  }
}
