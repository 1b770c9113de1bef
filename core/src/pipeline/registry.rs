// core/src/pipeline/registry.rs

//! `Registry<E>`: pipelines keyed by the type of context they run on.

use super::context_data::ContextData;
use super::control::PipelineResult;
use super::definition::Pipeline;
use crate::error::PipelineError;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{event, Level};

#[async_trait]
trait ErasedPipeline<E>: Send + Sync
where
  E: std::error::Error + Send + Sync + 'static,
{
  /// `ctx_obj` holds a `ContextData<TData>` for the wrapped pipeline's `TData`.
  async fn run_erased(&self, ctx_obj: Box<dyn Any + Send>) -> Result<PipelineResult, E>;
}

struct RegisteredPipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<PipelineError> + Send + Sync + 'static,
{
  pipeline: Arc<Pipeline<TData, Err>>,
}

#[async_trait]
impl<TData, Err, E> ErasedPipeline<E> for RegisteredPipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<PipelineError> + Send + Sync + 'static,
  E: std::error::Error + From<Err> + From<PipelineError> + Send + Sync + 'static,
{
  async fn run_erased(&self, ctx_obj: Box<dyn Any + Send>) -> Result<PipelineResult, E> {
    let ctx_data = match ctx_obj.downcast::<ContextData<TData>>() {
      Ok(boxed) => *boxed,
      Err(_) => {
        let expected_type = std::any::type_name::<ContextData<TData>>();
        event!(Level::ERROR, expected_type, "Context object type mismatch.");
        return Err(E::from(PipelineError::TypeMismatch {
          expected_type: expected_type.to_string(),
        }));
      }
    };
    self.pipeline.run(ctx_data).await.map_err(E::from)
  }
}

/// Holds at most one pipeline per context type and runs the matching one on demand.
pub struct Registry<E = PipelineError>
where
  E: std::error::Error + From<PipelineError> + Send + Sync + 'static,
{
  pipelines: RwLock<HashMap<TypeId, Arc<dyn ErasedPipeline<E>>>>,
  _phantom_err: PhantomData<E>,
}

impl<E> Registry<E>
where
  E: std::error::Error + From<PipelineError> + Send + Sync + 'static,
{
  pub fn new() -> Self {
    Self {
      pipelines: RwLock::new(HashMap::new()),
      _phantom_err: PhantomData,
    }
  }

  /// Registers `pipeline` for its context type, replacing any earlier registration.
  pub fn register_pipeline<TData, Err>(&self, pipeline: Pipeline<TData, Err>)
  where
    TData: 'static + Send + Sync,
    Err: std::error::Error + From<PipelineError> + Send + Sync + 'static,
    E: From<Err>,
  {
    event!(Level::DEBUG, pipeline = pipeline.name(), tdata_type = %std::any::type_name::<TData>(), "Registering pipeline.");
    let registered = RegisteredPipeline {
      pipeline: Arc::new(pipeline),
    };
    self.pipelines.write().insert(TypeId::of::<TData>(), Arc::new(registered));
  }

  pub fn is_registered<TData: 'static + Send + Sync>(&self) -> bool {
    self.pipelines.read().contains_key(&TypeId::of::<TData>())
  }

  /// Runs the pipeline registered for `TData` against `ctx_data`.
  pub async fn run<TData>(&self, ctx_data: ContextData<TData>) -> Result<PipelineResult, E>
  where
    TData: 'static + Send + Sync,
  {
    let runner = self.pipelines.read().get(&TypeId::of::<TData>()).cloned();
    let runner = runner.ok_or_else(|| {
      let context_type = std::any::type_name::<TData>();
      event!(Level::ERROR, context_type, "No pipeline registered.");
      E::from(PipelineError::NotRegistered {
        context_type: context_type.to_string(),
      })
    })?;

    runner.run_erased(Box::new(ctx_data)).await
  }
}

impl<E> Default for Registry<E>
where
  E: std::error::Error + From<PipelineError> + Send + Sync + 'static,
{
  fn default() -> Self {
    Self::new()
  }
}
