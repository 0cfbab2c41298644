//! The three fan-out levels.

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info};

use super::context::{username_for, ApplicationContext, ComponentContext, ExecutionContext, UserContext};
use super::reuse::SharedName;
use super::stagger::StartupStagger;
use super::task_group::TaskGroup;
use crate::config::LoadTestConfig;
use crate::errors::codes;
use crate::telemetry::Instrumentation;

/// Spawns user, application and component workers and joins them.
///
/// Cheap to clone, so worker closures can capture their own handle for the
/// next level down.
#[derive(Debug, Clone)]
pub struct Scheduler {
    config: Arc<LoadTestConfig>,
    instrumentation: Instrumentation,
    stagger: StartupStagger,
}

impl Scheduler {
    /// Creates a scheduler that records into `instrumentation`.
    #[must_use]
    pub fn new(config: LoadTestConfig, instrumentation: Instrumentation) -> Self {
        let stagger = StartupStagger::new(config.startup_delay(), config.startup_jitter());
        Self {
            config: Arc::new(config),
            instrumentation,
            stagger,
        }
    }

    /// Replaces the startup stagger.
    #[must_use]
    pub fn with_stagger(mut self, stagger: StartupStagger) -> Self {
        self.stagger = stagger;
        self
    }

    /// Returns the run configuration.
    #[must_use]
    pub fn config(&self) -> &LoadTestConfig {
        &self.config
    }

    /// Returns the instrumentation every step is measured through.
    #[must_use]
    pub fn instrumentation(&self) -> &Instrumentation {
        &self.instrumentation
    }

    /// Runs `journey` for `concurrency` fresh users and waits for all of them.
    ///
    /// Returns the finished user contexts ordered by index.
    pub async fn run_users<F, Fut>(&self, journey: F, concurrency: usize) -> Vec<UserContext>
    where
        F: Fn(UserContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = UserContext> + Send + 'static,
    {
        let contexts = (0..concurrency)
            .map(|index| {
                UserContext::new(
                    index,
                    self.stagger.sample(index),
                    username_for(&self.config.username_prefix, index),
                )
            })
            .collect();
        self.fan_out("users", contexts, journey, true).await
    }

    /// Runs `journey` again over users that already went through
    /// [`run_users`](Self::run_users), without a second startup stagger.
    pub async fn resume_users<F, Fut>(&self, journey: F, users: Vec<UserContext>) -> Vec<UserContext>
    where
        F: Fn(UserContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = UserContext> + Send + 'static,
    {
        self.fan_out("users", users, journey, false).await
    }

    /// Runs `journey` for `count` applications of `user` and waits for all.
    ///
    /// The whole fan-out is measured as `per-application-setup`.
    pub async fn run_per_application<F, Fut>(&self, journey: F, user: &UserContext, count: usize) -> Vec<ApplicationContext>
    where
        F: Fn(ApplicationContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApplicationContext> + Send + 'static,
    {
        let parent = user.snapshot();
        let shared = SharedName::new();
        let contexts = (0..count)
            .map(|index| ApplicationContext::new(index, self.stagger.sample(index), parent.clone(), shared.clone()))
            .collect();
        let measured = self
            .instrumentation
            .measure("per-application-setup", user.params(), async {
                Ok::<_, Infallible>(self.fan_out("applications", contexts, journey, true).await)
            })
            .await;
        match measured {
            Ok(applications) => applications,
            Err(never) => match never {},
        }
    }

    /// Runs `journey` for `count` components of `application` and waits for all.
    ///
    /// The whole fan-out is measured as `per-component-setup`.
    pub async fn run_per_component<F, Fut>(
        &self,
        journey: F,
        application: &ApplicationContext,
        count: usize,
    ) -> Vec<ComponentContext>
    where
        F: Fn(ComponentContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ComponentContext> + Send + 'static,
    {
        let parent = application.snapshot();
        let shared = SharedName::new();
        let contexts = (0..count)
            .map(|index| ComponentContext::new(index, self.stagger.sample(index), parent.clone(), shared.clone()))
            .collect();
        let measured = self
            .instrumentation
            .measure("per-component-setup", application.params(), async {
                Ok::<_, Infallible>(self.fan_out("components", contexts, journey, true).await)
            })
            .await;
        match measured {
            Ok(components) => components,
            Err(never) => match never {},
        }
    }

    async fn fan_out<C, F, Fut>(&self, group_name: &str, contexts: Vec<C>, journey: F, staggered: bool) -> Vec<C>
    where
        C: ExecutionContext,
        F: Fn(C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = C> + Send + 'static,
    {
        let journey = Arc::new(journey);
        let mut labels = Vec::with_capacity(contexts.len());
        let mut group = TaskGroup::new(group_name);

        for ctx in contexts {
            let index = ctx.index();
            labels.push(ctx.label());
            let journey = journey.clone();
            group.spawn(index, async move {
                let delay = ctx.startup_delay();
                if staggered && !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                info!(level = C::LEVEL, worker = %ctx.label(), "Starting worker");
                journey(ctx).await
            });
        }
        debug!(group = group.name(), workers = group.len(), "Waiting for workers");

        let outcome = group.wait().await;
        for lost in &outcome.lost {
            let label = labels.get(lost.index).map_or("?", String::as_str);
            error!(level = C::LEVEL, worker = %label, reason = %lost.reason, "Worker panicked");
            self.instrumentation
                .fail(
                    codes::WORKER_PANICKED,
                    format!("{} worker {label} panicked: {}", C::LEVEL, lost.reason),
                )
                .await;
        }
        outcome.completed
    }
}
