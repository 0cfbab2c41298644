//! Step functions run by journey workers.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::errors::StepError;

/// One unit of work against the platform, run on a worker's context.
#[async_trait]
pub trait Step<C: Send>: Send + Sync {
    /// Stable metric name of the step.
    fn name(&self) -> &str;

    /// Runs the step. An error ends the owning worker's journey.
    async fn run(&self, ctx: &mut C) -> Result<(), StepError>;
}

/// Shared handle to a step.
pub type StepRef<C> = Arc<dyn Step<C>>;

/// Step backed by a closure returning a boxed future.
pub struct FnStep<C, F> {
    name: String,
    func: F,
    _ctx: PhantomData<fn(&mut C)>,
}

impl<C, F> FnStep<C, F>
where
    C: Send,
    F: for<'a> Fn(&'a mut C) -> BoxFuture<'a, Result<(), StepError>> + Send + Sync,
{
    /// Creates a named step from a closure.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
            _ctx: PhantomData,
        }
    }
}

#[async_trait]
impl<C, F> Step<C> for FnStep<C, F>
where
    C: Send,
    F: for<'a> Fn(&'a mut C) -> BoxFuture<'a, Result<(), StepError>> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &mut C) -> Result<(), StepError> {
        (self.func)(ctx).await
    }
}

/// Wraps a closure as a shared step.
///
/// ```ignore
/// let create = step_fn("create-application", |ctx: &mut ApplicationContext| {
///     Box::pin(async move {
///         client.create_application(&ctx.application_name).await
///     })
/// });
/// ```
pub fn step_fn<C, F>(name: impl Into<String>, func: F) -> StepRef<C>
where
    C: Send + 'static,
    F: for<'a> Fn(&'a mut C) -> BoxFuture<'a, Result<(), StepError>> + Send + Sync + 'static,
{
    Arc::new(FnStep::new(name, func))
}
