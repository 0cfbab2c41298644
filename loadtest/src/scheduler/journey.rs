//! Journey plan: ordered steps per level, repeats, reuse and purge.

use std::fmt;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::context::{ApplicationContext, ComponentContext, ExecutionContext, UserContext};
use super::reuse::SharedName;
use super::runner::Scheduler;
use super::step::StepRef;
use crate::errors::{codes, StepError};
use crate::telemetry::Instrumentation;

/// Context whose resource can be created once and shared with siblings.
trait Reusable: ExecutionContext {
    fn resource_name_mut(&mut self) -> &mut String;
    fn slot(&self) -> &SharedName;
}

impl Reusable for ApplicationContext {
    fn resource_name_mut(&mut self) -> &mut String {
        &mut self.application_name
    }

    fn slot(&self) -> &SharedName {
        self.sibling_slot()
    }
}

impl Reusable for ComponentContext {
    fn resource_name_mut(&mut self) -> &mut String {
        &mut self.component_name
    }

    fn slot(&self) -> &SharedName {
        self.sibling_slot()
    }
}

/// The steps every simulated user walks through.
///
/// All users run their user steps concurrently. Once every user is
/// provisioned, the user setup steps run one user at a time in index order.
/// Then, per user, `journey_repeats` rounds of the application fan-out
/// followed by the user finally steps. Each application runs its create and
/// regular steps, then fans out to its components. Each component runs
/// create and regular steps, then its finally steps whatever the outcome.
/// Purge steps run per provisioned user after all users are done.
#[derive(Clone, Default)]
pub struct Journey {
    user_steps: Vec<StepRef<UserContext>>,
    user_setup_steps: Vec<StepRef<UserContext>>,
    user_finally_steps: Vec<StepRef<UserContext>>,
    application_create_steps: Vec<StepRef<ApplicationContext>>,
    application_steps: Vec<StepRef<ApplicationContext>>,
    component_create_steps: Vec<StepRef<ComponentContext>>,
    component_steps: Vec<StepRef<ComponentContext>>,
    component_finally_steps: Vec<StepRef<ComponentContext>>,
    purge_steps: Vec<StepRef<UserContext>>,
}

impl Journey {
    /// Creates an empty journey.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a step run once per user before the repeats.
    #[must_use]
    pub fn user_step(mut self, step: StepRef<UserContext>) -> Self {
        self.user_steps.push(step);
        self
    }

    /// Adds a step run once per provisioned user, one user at a time, after
    /// all users are provisioned and before any journey starts.
    #[must_use]
    pub fn user_setup_step(mut self, step: StepRef<UserContext>) -> Self {
        self.user_setup_steps.push(step);
        self
    }

    /// Adds a step run once per user after its last repeat.
    #[must_use]
    pub fn user_finally_step(mut self, step: StepRef<UserContext>) -> Self {
        self.user_finally_steps.push(step);
        self
    }

    /// Adds an application creation step, skipped by reusing siblings.
    #[must_use]
    pub fn application_create_step(mut self, step: StepRef<ApplicationContext>) -> Self {
        self.application_create_steps.push(step);
        self
    }

    /// Adds a step run by every application before its components.
    #[must_use]
    pub fn application_step(mut self, step: StepRef<ApplicationContext>) -> Self {
        self.application_steps.push(step);
        self
    }

    /// Adds a component creation step, skipped by reusing siblings.
    #[must_use]
    pub fn component_create_step(mut self, step: StepRef<ComponentContext>) -> Self {
        self.component_create_steps.push(step);
        self
    }

    /// Adds a step run by every component.
    #[must_use]
    pub fn component_step(mut self, step: StepRef<ComponentContext>) -> Self {
        self.component_steps.push(step);
        self
    }

    /// Adds a step run after every component journey, even a failed one.
    #[must_use]
    pub fn component_finally_step(mut self, step: StepRef<ComponentContext>) -> Self {
        self.component_finally_steps.push(step);
        self
    }

    /// Adds a cleanup step run per provisioned user after the run.
    #[must_use]
    pub fn purge_step(mut self, step: StepRef<UserContext>) -> Self {
        self.purge_steps.push(step);
        self
    }

    /// Runs the journey for every user, then purges if configured.
    pub async fn run(&self, scheduler: &Scheduler) -> Vec<UserContext> {
        let mut users = self.execute(scheduler).await;
        let config = scheduler.config();
        if config.purge || config.purge_only {
            self.purge(scheduler, &mut users).await;
        }
        users
    }

    /// Runs the journey for `concurrency` users and waits for all of them.
    pub async fn execute(&self, scheduler: &Scheduler) -> Vec<UserContext> {
        let config = scheduler.config();
        let journey = Arc::new(self.clone());
        // No deadline when the duration overflows the clock.
        let deadline = Instant::now().checked_add(config.journey_duration());

        let provision = {
            let journey = journey.clone();
            let scheduler = scheduler.clone();
            move |user: UserContext| journey.clone().provision_user(scheduler.clone(), user)
        };
        let mut users = scheduler.run_users(provision, config.concurrency).await;

        if config.purge_only {
            debug!(users = users.len(), "Purge only, skipping journey");
            return users;
        }

        self.setup_users(scheduler, &mut users).await;

        let worker = {
            let scheduler = scheduler.clone();
            move |user: UserContext| journey.clone().user_journey(scheduler.clone(), user, deadline)
        };
        scheduler.resume_users(worker, users).await
    }

    /// Runs the purge steps for every provisioned user, one user at a time.
    pub async fn purge(&self, scheduler: &Scheduler, users: &mut [UserContext]) {
        let instr = scheduler.instrumentation();
        for user in users.iter_mut().filter(|u| u.provisioned) {
            if let Err(err) = run_steps(instr, &self.purge_steps, user).await {
                warn!(username = %user.username, code = err.code, "Purge failed");
                if user.failure.is_none() {
                    user.set_failure(err);
                }
            }
        }
    }

    async fn provision_user(self: Arc<Self>, scheduler: Scheduler, mut user: UserContext) -> UserContext {
        match run_steps(scheduler.instrumentation(), &self.user_steps, &mut user).await {
            Ok(()) => user.provisioned = true,
            Err(err) => user.set_failure(err),
        }
        user
    }

    async fn setup_users(&self, scheduler: &Scheduler, users: &mut [UserContext]) {
        let instr = scheduler.instrumentation();
        for user in users.iter_mut().filter(|u| u.provisioned && u.failure.is_none()) {
            if let Err(err) = run_steps(instr, &self.user_setup_steps, user).await {
                user.set_failure(err);
            }
        }
    }

    async fn user_journey(self: Arc<Self>, scheduler: Scheduler, mut user: UserContext, deadline: Option<Instant>) -> UserContext {
        let instr = scheduler.instrumentation();
        let config = scheduler.config();

        if !user.provisioned || user.failure.is_some() {
            return user;
        }

        for repeat in 1..=config.journey_repeats {
            user.journey_repeats_counter = repeat;
            let worker = {
                let journey = self.clone();
                let scheduler = scheduler.clone();
                move |app: ApplicationContext| journey.clone().application_journey(scheduler.clone(), app)
            };
            let applications = scheduler
                .run_per_application(worker, &user, config.applications_count)
                .await;
            user.applications.extend(applications);

            if repeat < config.journey_repeats && deadline.is_some_and(|d| Instant::now() >= d) {
                info!(username = %user.username, repeat, "Journey duration reached, stopping repeats");
                break;
            }
        }

        if let Err(err) = run_steps(instr, &self.user_finally_steps, &mut user).await {
            if user.failure.is_none() {
                user.set_failure(err);
            }
        }
        user
    }

    async fn application_journey(self: Arc<Self>, scheduler: Scheduler, mut app: ApplicationContext) -> ApplicationContext {
        let instr = scheduler.instrumentation();
        let config = scheduler.config();

        let prepared = match create_or_reuse(&scheduler, &self.application_create_steps, config.reuse_applications, &mut app).await {
            Ok(()) => run_steps(instr, &self.application_steps, &mut app).await,
            Err(err) => Err(err),
        };
        if let Err(err) = prepared {
            app.set_failure(err);
            return app;
        }

        let worker = {
            let journey = self.clone();
            let scheduler = scheduler.clone();
            move |comp: ComponentContext| journey.clone().component_journey(scheduler.clone(), comp)
        };
        app.components = scheduler
            .run_per_component(worker, &app, config.components_count)
            .await;
        app
    }

    async fn component_journey(self: Arc<Self>, scheduler: Scheduler, mut comp: ComponentContext) -> ComponentContext {
        let instr = scheduler.instrumentation();
        let config = scheduler.config();

        let outcome = match create_or_reuse(&scheduler, &self.component_create_steps, config.reuse_components, &mut comp).await {
            Ok(()) => run_steps(instr, &self.component_steps, &mut comp).await,
            Err(err) => Err(err),
        };
        if let Err(err) = outcome {
            comp.set_failure(err);
        }

        for step in &self.component_finally_steps {
            let params = comp.params();
            if let Err(err) = instr.measure(step.name(), params, step.run(&mut comp)).await {
                instr.record_failure(&err).await;
                if comp.failure.is_none() {
                    comp.set_failure(err);
                }
            }
        }
        comp
    }
}

impl fmt::Debug for Journey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn names<C: Send>(steps: &[StepRef<C>]) -> Vec<&str> {
            steps.iter().map(|s| s.name()).collect()
        }
        f.debug_struct("Journey")
            .field("user_steps", &names(&self.user_steps))
            .field("user_setup_steps", &names(&self.user_setup_steps))
            .field("user_finally_steps", &names(&self.user_finally_steps))
            .field("application_create_steps", &names(&self.application_create_steps))
            .field("application_steps", &names(&self.application_steps))
            .field("component_create_steps", &names(&self.component_create_steps))
            .field("component_steps", &names(&self.component_steps))
            .field("component_finally_steps", &names(&self.component_finally_steps))
            .field("purge_steps", &names(&self.purge_steps))
            .finish()
    }
}

/// Runs `steps` in order, measuring each, and stops at the first failure.
async fn run_steps<C: ExecutionContext>(
    instr: &Instrumentation,
    steps: &[StepRef<C>],
    ctx: &mut C,
) -> Result<(), StepError> {
    for step in steps {
        let params = ctx.params();
        if let Err(err) = instr.measure(step.name(), params, step.run(ctx)).await {
            instr.record_failure(&err).await;
            error!(
                level = C::LEVEL,
                worker = %ctx.label(),
                step = step.name(),
                code = err.code,
                "Journey stopped"
            );
            return Err(err);
        }
    }
    Ok(())
}

/// Creates the resource, or waits for sibling 0 to create it when reusing.
async fn create_or_reuse<C: Reusable>(
    scheduler: &Scheduler,
    create_steps: &[StepRef<C>],
    reuse: bool,
    ctx: &mut C,
) -> Result<(), StepError> {
    let instr = scheduler.instrumentation();
    if !reuse {
        return run_steps(instr, create_steps, ctx).await;
    }

    if ctx.index() == 0 {
        run_steps(instr, create_steps, ctx).await?;
        let name = ctx.resource_name_mut().clone();
        if !ctx.slot().publish(name) {
            warn!(level = C::LEVEL, worker = %ctx.label(), "No name to share with siblings");
        }
        return Ok(());
    }

    let config = scheduler.config();
    let (interval, timeout) = (config.reuse_poll_interval(), config.reuse_timeout());
    let slot = ctx.slot().clone();
    let metric = format!("reuse-{}", C::LEVEL);
    let waited = instr
        .measure(&metric, ctx.params(), async {
            slot.wait(interval, timeout).await.ok_or_else(|| {
                StepError::new(
                    codes::REUSE_TIMEOUT,
                    format!("Timed out after {timeout:?} waiting for the shared {}", C::LEVEL),
                )
            })
        })
        .await;

    match waited {
        Ok(name) => {
            debug!(level = C::LEVEL, worker = %ctx.label(), name = %name, "Reusing sibling resource");
            *ctx.resource_name_mut() = name;
            Ok(())
        }
        Err(err) => {
            instr.record_failure(&err).await;
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoadTestConfig;
    use crate::scheduler::step_fn;
    use crate::telemetry::{SinkSummary, TelemetrySink};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    async fn scheduler(config: LoadTestConfig) -> (tempfile::TempDir, Scheduler) {
        let dir = tempfile::tempdir().unwrap();
        let sink = TelemetrySink::start(dir.path(), &config.telemetry).await.unwrap();
        (dir, Scheduler::new(config, Instrumentation::new(sink)))
    }

    async fn finish(scheduler: &Scheduler) -> (SinkSummary, String) {
        let summary = scheduler.instrumentation().sink().stop().await.unwrap();
        let timings = std::fs::read_to_string(scheduler.instrumentation().sink().timings_path()).unwrap();
        (summary, timings)
    }

    fn counting<C: Send + 'static>(name: &str, counter: &Arc<AtomicUsize>) -> StepRef<C> {
        let counter = counter.clone();
        step_fn(name, move |_ctx: &mut C| {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
    }

    fn failing<C: Send + 'static>(name: &str, code: u16) -> StepRef<C> {
        step_fn(name, move |_ctx: &mut C| {
            Box::pin(async move { Err(StepError::new(code, "Unable to create the resource")) })
        })
    }

    #[tokio::test]
    async fn test_every_component_runs_once_per_repeat() {
        let config = LoadTestConfig::default()
            .with_concurrency(2)
            .with_applications(3)
            .with_components(2)
            .with_journey_repeats(2);
        let (_dir, scheduler) = scheduler(config).await;

        let components = Arc::new(AtomicUsize::new(0));
        let users = Journey::new()
            .component_step(counting("build-component", &components))
            .run(&scheduler)
            .await;

        assert_eq!(components.load(Ordering::SeqCst), 2 * 3 * 2 * 2);
        assert!(users.iter().all(|u| u.applications.len() == 6 && u.failure.is_none()));

        // 24 component steps, 2 users x 2 repeats application fan-outs,
        // 12 applications each with one component fan-out.
        let (summary, timings) = finish(&scheduler).await;
        assert_eq!(summary.measurements_written, 24 + 4 + 12);
        assert_eq!(summary.total_errors(), 0);
        assert_eq!(timings.matches(",per-application-setup,").count(), 4);
        assert_eq!(timings.matches(",per-component-setup,").count(), 12);
    }

    #[tokio::test]
    async fn test_failure_stops_only_owning_worker() {
        let config = LoadTestConfig::default().with_applications(3).with_components(2);
        let (_dir, scheduler) = scheduler(config).await;

        let after = Arc::new(AtomicUsize::new(0));
        let flaky = step_fn("create-application", |app: &mut ApplicationContext| {
            let index = app.index;
            Box::pin(async move {
                if index == 1 {
                    Err(StepError::new(30, "Unable to create the Application"))
                } else {
                    Ok(())
                }
            })
        });
        let users = Journey::new()
            .application_create_step(flaky)
            .component_step(counting("create-component", &after))
            .run(&scheduler)
            .await;

        let apps = &users[0].applications;
        assert_eq!(apps[1].failure.as_ref().map(|e| e.code), Some(30));
        assert!(apps[1].components.is_empty());
        assert_eq!(after.load(Ordering::SeqCst), 4);
        assert!(users[0].failure.is_none());

        let (summary, timings) = finish(&scheduler).await;
        assert_eq!(summary.error_codes.get(&30), Some(&1));
        assert_eq!(timings.matches("[30] Unable to create the Application").count(), 1);
    }

    #[tokio::test]
    async fn test_user_step_failure_skips_journey() {
        let (_dir, scheduler) = scheduler(LoadTestConfig::default().with_concurrency(2)).await;

        let components = Arc::new(AtomicUsize::new(0));
        let users = Journey::new()
            .user_step(failing("provision-user", 10))
            .component_step(counting("create-component", &components))
            .run(&scheduler)
            .await;

        assert_eq!(components.load(Ordering::SeqCst), 0);
        assert!(users.iter().all(|u| !u.provisioned && u.applications.is_empty()));
        let (summary, _) = finish(&scheduler).await;
        assert_eq!(summary.error_codes.get(&10), Some(&2));
    }

    #[tokio::test]
    async fn test_finally_steps_run_after_failure() {
        let config = LoadTestConfig::default().with_components(3);
        let (_dir, scheduler) = scheduler(config).await;

        let collected = Arc::new(AtomicUsize::new(0));
        let users = Journey::new()
            .component_step(failing("wait-build", 61))
            .component_finally_step(counting("collect-logs", &collected))
            .run(&scheduler)
            .await;

        assert_eq!(collected.load(Ordering::SeqCst), 3);
        let comps = &users[0].applications[0].components;
        assert!(comps.iter().all(|c| c.failure.as_ref().map(|e| e.code) == Some(61)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_applications_reuse_sibling_zero() {
        let config = LoadTestConfig::default()
            .with_applications(4)
            .with_reuse(true, false)
            .with_reuse_timing(Duration::from_millis(100), Duration::from_secs(30));
        let (_dir, scheduler) = scheduler(config).await;

        let created = Arc::new(Mutex::new(Vec::new()));
        let record = created.clone();
        let create = step_fn("create-application", move |app: &mut ApplicationContext| {
            let record = record.clone();
            Box::pin(async move {
                tokio::time::sleep(Duration::from_secs(2)).await;
                record.lock().push(app.application_name.clone());
                Ok(())
            })
        });
        let users = Journey::new().application_create_step(create).run(&scheduler).await;

        let created = created.lock().clone();
        assert_eq!(created.len(), 1);
        let names: Vec<&str> = users[0]
            .applications
            .iter()
            .map(|a| a.application_name.as_str())
            .collect();
        assert_eq!(names, vec![created[0].as_str(); 4]);
        assert!(users[0].applications.iter().all(|a| a.failure.is_none()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reuse_times_out_when_sibling_zero_fails() {
        let config = LoadTestConfig::default()
            .with_components(3)
            .with_reuse(false, true)
            .with_reuse_timing(Duration::from_secs(1), Duration::from_secs(5));
        let (_dir, scheduler) = scheduler(config).await;

        let users = Journey::new()
            .component_create_step(failing("create-component", 40))
            .run(&scheduler)
            .await;

        let codes_seen: Vec<Option<u16>> = users[0].applications[0]
            .components
            .iter()
            .map(|c| c.failure.as_ref().map(|e| e.code))
            .collect();
        assert_eq!(
            codes_seen,
            vec![Some(40), Some(codes::REUSE_TIMEOUT), Some(codes::REUSE_TIMEOUT)]
        );

        let (summary, timings) = finish(&scheduler).await;
        assert_eq!(summary.error_codes.get(&codes::REUSE_TIMEOUT), Some(&2));
        assert_eq!(timings.matches("reuse-component").count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_checked_between_repeats() {
        let config = LoadTestConfig::default()
            .with_journey_repeats(10)
            .with_journey_duration(Duration::from_secs(5));
        let (_dir, scheduler) = scheduler(config).await;

        let slow = step_fn("create-component", |_comp: &mut ComponentContext| {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Ok(())
            })
        });
        let users = Journey::new().component_step(slow).run(&scheduler).await;

        // Rounds end at 2s, 4s and 6s; the check after round 3 stops the loop.
        assert_eq!(users[0].journey_repeats_counter, 3);
        assert_eq!(users[0].applications.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_setup_steps_run_in_order_between_provisioning_and_journey() {
        let config = LoadTestConfig::default().with_concurrency(3);
        let (_dir, scheduler) = scheduler(config).await;

        let events = Arc::new(Mutex::new(Vec::new()));
        let log = events.clone();
        let provision = step_fn("provision-user", move |user: &mut UserContext| {
            let log = log.clone();
            let index = user.index;
            Box::pin(async move {
                log.lock().push(format!("provision-{index}"));
                Ok(())
            })
        });
        let log = events.clone();
        let setup = step_fn("fork-repository", move |user: &mut UserContext| {
            let log = log.clone();
            let index = user.index;
            Box::pin(async move {
                // Slower for lower indices, so concurrent runs would reorder.
                tokio::time::sleep(Duration::from_secs(3 - index as u64)).await;
                log.lock().push(format!("setup-{index}"));
                Ok(())
            })
        });
        let log = events.clone();
        let application = step_fn("create-application", move |app: &mut ApplicationContext| {
            let log = log.clone();
            let user = app.parent.index;
            Box::pin(async move {
                log.lock().push(format!("application-{user}"));
                Ok(())
            })
        });
        Journey::new()
            .user_step(provision)
            .user_setup_step(setup)
            .application_create_step(application)
            .run(&scheduler)
            .await;

        let events = events.lock().clone();
        let position = |prefix: &str| -> Vec<usize> {
            events
                .iter()
                .enumerate()
                .filter(|(_, e)| e.starts_with(prefix))
                .map(|(i, _)| i)
                .collect()
        };
        let (provisions, setups, applications) =
            (position("provision-"), position("setup-"), position("application-"));
        assert_eq!(provisions.len(), 3);
        assert_eq!(applications.len(), 3);
        assert!(provisions.iter().max() < setups.iter().min());
        assert!(setups.iter().max() < applications.iter().min());

        let setup_order: Vec<&str> = events
            .iter()
            .filter(|e| e.starts_with("setup-"))
            .map(String::as_str)
            .collect();
        assert_eq!(setup_order, vec!["setup-0", "setup-1", "setup-2"]);
    }

    #[tokio::test]
    async fn test_finally_steps_run_after_all_repeats() {
        let config = LoadTestConfig::default().with_concurrency(2).with_journey_repeats(3);
        let (_dir, scheduler) = scheduler(config).await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = seen.clone();
        let claim = step_fn("persistent-volume-claim", move |user: &mut UserContext| {
            let record = record.clone();
            let observed = (user.index, user.journey_repeats_counter, user.applications.len());
            Box::pin(async move {
                record.lock().push(observed);
                Ok(())
            })
        });
        let users = Journey::new().user_finally_step(claim).run(&scheduler).await;

        let mut seen = seen.lock().clone();
        seen.sort_unstable();
        assert_eq!(seen, vec![(0, 3, 3), (1, 3, 3)]);
        assert!(users.iter().all(|u| u.failure.is_none()));
    }

    #[tokio::test]
    async fn test_setup_failure_skips_only_that_user() {
        let config = LoadTestConfig::default().with_concurrency(2).with_purge(true, false);
        let (_dir, scheduler) = scheduler(config).await;

        let fork = step_fn("fork-repository", |user: &mut UserContext| {
            let index = user.index;
            Box::pin(async move {
                if index == 0 {
                    Err(StepError::new(12, "Unable to fork the repository"))
                } else {
                    Ok(())
                }
            })
        });
        let components = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));
        let purged = Arc::new(AtomicUsize::new(0));
        let users = Journey::new()
            .user_setup_step(fork)
            .component_step(counting("create-component", &components))
            .user_finally_step(counting("persistent-volume-claim", &finished))
            .purge_step(counting("purge-user", &purged))
            .run(&scheduler)
            .await;

        assert_eq!(users[0].failure.as_ref().map(|e| e.code), Some(12));
        assert!(users[0].provisioned && users[0].applications.is_empty());
        assert!(users[1].failure.is_none());
        assert_eq!(users[1].applications.len(), 1);
        assert_eq!(components.load(Ordering::SeqCst), 1);
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert_eq!(purged.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_duration_means_no_deadline() {
        let mut config = LoadTestConfig::default().with_journey_repeats(3);
        config.journey_duration_seconds = 1e20;
        let (_dir, scheduler) = scheduler(config).await;

        let users = Journey::new().run(&scheduler).await;

        assert_eq!(users[0].journey_repeats_counter, 3);
        assert_eq!(users[0].applications.len(), 3);
    }

    #[tokio::test]
    async fn test_purge_runs_for_provisioned_users() {
        let config = LoadTestConfig::default().with_concurrency(3).with_purge(true, false);
        let (_dir, scheduler) = scheduler(config).await;

        let purged = Arc::new(Mutex::new(Vec::new()));
        let record = purged.clone();
        let provision = step_fn("provision-user", |user: &mut UserContext| {
            let index = user.index;
            Box::pin(async move {
                if index == 2 {
                    Err(StepError::new(11, "Unable to provision user"))
                } else {
                    Ok(())
                }
            })
        });
        let purge = step_fn("purge-user", move |user: &mut UserContext| {
            let record = record.clone();
            Box::pin(async move {
                record.lock().push(user.username.clone());
                Ok(())
            })
        });
        Journey::new()
            .user_step(provision)
            .purge_step(purge)
            .run(&scheduler)
            .await;

        assert_eq!(
            purged.lock().clone(),
            vec!["testuser-0000".to_string(), "testuser-0001".to_string()]
        );
    }

    #[tokio::test]
    async fn test_purge_only_skips_journey() {
        let config = LoadTestConfig::default().with_concurrency(2).with_purge(false, true);
        let (_dir, scheduler) = scheduler(config).await;

        let components = Arc::new(AtomicUsize::new(0));
        let purged = Arc::new(AtomicUsize::new(0));
        let users = Journey::new()
            .component_step(counting("create-component", &components))
            .purge_step(counting("purge-user", &purged))
            .run(&scheduler)
            .await;

        assert_eq!(components.load(Ordering::SeqCst), 0);
        assert_eq!(purged.load(Ordering::SeqCst), 2);
        assert!(users.iter().all(|u| u.provisioned && u.applications.is_empty()));
    }

    #[test]
    fn test_debug_lists_step_names() {
        let journey = Journey::new().purge_step(failing("purge-user", 1));
        let rendered = format!("{journey:?}");
        assert!(rendered.contains("purge_steps: [\"purge-user\"]"));
    }
}
