// core/src/pipeline/execution.rs

//! `Pipeline::run()`: walks the steps in order against one shared context.

use super::context_data::ContextData;
use super::control::{PipelineControl, PipelineResult};
use super::definition::Pipeline;
use super::step::StepDef;
use crate::error::PipelineError;
use tracing::{event, info_span, Instrument, Level};

enum StepOutcome {
  Continue,
  Stop,
}

impl<TData, Err> Pipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<PipelineError> + Send + Sync + 'static,
{
  /// Executes every step against `ctx_data`.
  ///
  /// A non-optional step without handlers fails the run with
  /// `PipelineError::HandlerMissing`. A failing optional step is logged and the
  /// run moves on to the next step.
  pub async fn run(&self, ctx_data: ContextData<TData>) -> Result<PipelineResult, Err> {
    event!(Level::DEBUG, pipeline = self.name, num_steps = self.steps.len(), "Pipeline execution starting.");

    for (step_index, step_def) in self.steps.iter().enumerate() {
      let step_span = info_span!(
        "pipeline_step_execution",
        pipeline = self.name,
        step_name = step_def.name.as_str(),
        step_index,
        optional = step_def.optional
      );

      match self.run_step(step_def, ctx_data.clone()).instrument(step_span).await? {
        StepOutcome::Continue => {}
        StepOutcome::Stop => {
          event!(Level::INFO, pipeline = self.name, step_name = %step_def.name, "Pipeline stopped by a handler.");
          return Ok(PipelineResult::Stopped);
        }
      }
    }

    event!(Level::DEBUG, pipeline = self.name, "Pipeline execution completed.");
    Ok(PipelineResult::Completed)
  }

  async fn run_step(&self, step_def: &StepDef<TData>, ctx_data: ContextData<TData>) -> Result<StepOutcome, Err> {
    if let Some(skip_if) = &step_def.skip_if {
      if skip_if(ctx_data.clone()) {
        event!(Level::DEBUG, "Step skipped by its skip condition.");
        return Ok(StepOutcome::Continue);
      }
    }

    let handlers = match self.handlers.get(&step_def.name) {
      Some(handlers) if !handlers.is_empty() => handlers,
      _ if step_def.optional => {
        event!(Level::DEBUG, "Optional step has no handlers, skipping.");
        return Ok(StepOutcome::Continue);
      }
      _ => {
        event!(Level::ERROR, "Non-optional step has no handlers.");
        return Err(Err::from(PipelineError::HandlerMissing {
          step_name: step_def.name.clone(),
        }));
      }
    };

    for handler_fn in handlers {
      match handler_fn(ctx_data.clone()).await {
        Ok(PipelineControl::Continue) => {}
        Ok(PipelineControl::Stop) => return Ok(StepOutcome::Stop),
        Err(e) if step_def.optional => {
          event!(Level::WARN, error = %e, "Optional step failed; continuing.");
          return Ok(StepOutcome::Continue);
        }
        Err(e) => {
          event!(Level::ERROR, error = %e, "Step handler failed.");
          return Err(e);
        }
      }
    }
    Ok(StepOutcome::Continue)
  }
}
