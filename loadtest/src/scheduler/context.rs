//! Execution contexts for the three fan-out levels.
//!
//! A context is owned by the worker running it. Children hold an `Arc`
//! snapshot of their parent taken when the fan-out starts; the parent is
//! blocked on the fan-out for as long as the snapshot is in use.

use rand::Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use super::reuse::SharedName;
use crate::errors::StepError;
use crate::telemetry::Params;

const NAME_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Returns `len` random lowercase alphanumerics, safe for resource names.
#[must_use]
pub fn random_suffix(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| NAME_CHARSET[rng.gen_range(0..NAME_CHARSET.len())] as char)
        .collect()
}

/// Username of the user worker at `index`.
#[must_use]
pub fn username_for(prefix: &str, index: usize) -> String {
    format!("{prefix}-{index:04}")
}

/// Common view over user, application and component contexts.
pub trait ExecutionContext: Send + 'static {
    /// Fan-out level name used in logs.
    const LEVEL: &'static str;

    /// Index among the siblings of one fan-out.
    fn index(&self) -> usize;

    /// Delay the worker sleeps before starting.
    fn startup_delay(&self) -> Duration;

    /// Dash separated path of indices from the root, e.g. `3-1-0`.
    fn label(&self) -> String;

    /// Snapshot of the identifying fields, attached to measurements.
    fn params(&self) -> Params;

    /// The failure that ended this worker's journey, if any.
    fn failure(&self) -> Option<&StepError>;

    /// Marks this worker's journey as failed.
    fn set_failure(&mut self, err: StepError);
}

/// State of one simulated user.
#[derive(Debug, Clone)]
pub struct UserContext {
    /// Index among all users.
    pub index: usize,
    /// Startup stagger applied before the worker began.
    pub startup_delay: Duration,
    /// Platform username.
    pub username: String,
    /// Namespace the user's resources live in.
    pub namespace: String,
    /// 1-based number of the journey repeat in progress.
    pub journey_repeats_counter: usize,
    /// Whether the user steps completed.
    pub provisioned: bool,
    /// Free-form data shared between this user's steps.
    pub attributes: BTreeMap<String, String>,
    /// Finished application contexts, across all repeats.
    pub applications: Vec<ApplicationContext>,
    /// Terminal failure of this user's journey.
    pub failure: Option<StepError>,
}

impl UserContext {
    /// Creates a fresh user context.
    #[must_use]
    pub fn new(index: usize, startup_delay: Duration, username: impl Into<String>) -> Self {
        Self {
            index,
            startup_delay,
            username: username.into(),
            namespace: String::new(),
            journey_repeats_counter: 0,
            provisioned: false,
            attributes: BTreeMap::new(),
            applications: Vec::new(),
            failure: None,
        }
    }

    /// Shared read-only copy handed to child workers, without the children.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Self> {
        Arc::new(Self {
            index: self.index,
            startup_delay: self.startup_delay,
            username: self.username.clone(),
            namespace: self.namespace.clone(),
            journey_repeats_counter: self.journey_repeats_counter,
            provisioned: self.provisioned,
            attributes: self.attributes.clone(),
            applications: Vec::new(),
            failure: self.failure.clone(),
        })
    }
}

impl ExecutionContext for UserContext {
    const LEVEL: &'static str = "user";

    fn index(&self) -> usize {
        self.index
    }

    fn startup_delay(&self) -> Duration {
        self.startup_delay
    }

    fn label(&self) -> String {
        self.index.to_string()
    }

    fn params(&self) -> Params {
        Params::new()
            .with("user", self.label())
            .with("username", &self.username)
            .with("namespace", &self.namespace)
            .with("repeat", self.journey_repeats_counter)
    }

    fn failure(&self) -> Option<&StepError> {
        self.failure.as_ref()
    }

    fn set_failure(&mut self, err: StepError) {
        self.failure = Some(err);
    }
}

/// State of one application within a user's journey.
#[derive(Debug, Clone)]
pub struct ApplicationContext {
    /// Index among the user's applications.
    pub index: usize,
    /// Startup stagger applied before the worker began.
    pub startup_delay: Duration,
    /// Snapshot of the owning user.
    pub parent: Arc<UserContext>,
    /// Application resource name.
    pub application_name: String,
    /// Integration test scenario attached to the application.
    pub integration_test_scenario_name: String,
    /// Free-form data shared between this application's steps.
    pub attributes: BTreeMap<String, String>,
    /// Finished component contexts.
    pub components: Vec<ComponentContext>,
    /// Terminal failure of this application's journey.
    pub failure: Option<StepError>,
    shared: SharedName,
}

impl ApplicationContext {
    /// Creates a fresh application context with a generated name.
    #[must_use]
    pub fn new(index: usize, startup_delay: Duration, parent: Arc<UserContext>, shared: SharedName) -> Self {
        let application_name = format!("{}-app-{}", parent.username, random_suffix(5));
        Self {
            index,
            startup_delay,
            parent,
            application_name,
            integration_test_scenario_name: String::new(),
            attributes: BTreeMap::new(),
            components: Vec::new(),
            failure: None,
            shared,
        }
    }

    /// Slot through which sibling 0 shares its application with the others.
    #[must_use]
    pub fn sibling_slot(&self) -> &SharedName {
        &self.shared
    }

    /// Shared read-only copy handed to child workers, without the children.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Self> {
        Arc::new(Self {
            index: self.index,
            startup_delay: self.startup_delay,
            parent: self.parent.clone(),
            application_name: self.application_name.clone(),
            integration_test_scenario_name: self.integration_test_scenario_name.clone(),
            attributes: self.attributes.clone(),
            components: Vec::new(),
            failure: self.failure.clone(),
            shared: self.shared.clone(),
        })
    }
}

impl ExecutionContext for ApplicationContext {
    const LEVEL: &'static str = "application";

    fn index(&self) -> usize {
        self.index
    }

    fn startup_delay(&self) -> Duration {
        self.startup_delay
    }

    fn label(&self) -> String {
        format!("{}-{}", self.parent.label(), self.index)
    }

    fn params(&self) -> Params {
        let mut params = self.parent.params();
        params.insert("application", &self.application_name);
        params.insert("worker", self.label());
        if !self.integration_test_scenario_name.is_empty() {
            params.insert("scenario", &self.integration_test_scenario_name);
        }
        params
    }

    fn failure(&self) -> Option<&StepError> {
        self.failure.as_ref()
    }

    fn set_failure(&mut self, err: StepError) {
        self.failure = Some(err);
    }
}

/// State of one component within an application.
#[derive(Debug, Clone)]
pub struct ComponentContext {
    /// Index among the application's components.
    pub index: usize,
    /// Startup stagger applied before the worker began.
    pub startup_delay: Duration,
    /// Snapshot of the owning application.
    pub parent: Arc<ApplicationContext>,
    /// Component resource name.
    pub component_name: String,
    /// Snapshot produced by the component's build.
    pub snapshot_name: String,
    /// Merge request opened for the component, if any.
    pub merge_request_number: Option<u64>,
    /// Release created for the component's snapshot.
    pub release_name: String,
    /// Free-form data shared between this component's steps.
    pub attributes: BTreeMap<String, String>,
    /// Terminal failure of this component's journey.
    pub failure: Option<StepError>,
    shared: SharedName,
}

impl ComponentContext {
    /// Creates a fresh component context named after its application.
    #[must_use]
    pub fn new(index: usize, startup_delay: Duration, parent: Arc<ApplicationContext>, shared: SharedName) -> Self {
        let component_name = format!("{}-comp-{}", parent.application_name, index);
        Self {
            index,
            startup_delay,
            parent,
            component_name,
            snapshot_name: String::new(),
            merge_request_number: None,
            release_name: String::new(),
            attributes: BTreeMap::new(),
            failure: None,
            shared,
        }
    }

    /// Slot through which sibling 0 shares its component with the others.
    #[must_use]
    pub fn sibling_slot(&self) -> &SharedName {
        &self.shared
    }

    /// The user that owns this component.
    #[must_use]
    pub fn user(&self) -> &UserContext {
        &self.parent.parent
    }
}

impl ExecutionContext for ComponentContext {
    const LEVEL: &'static str = "component";

    fn index(&self) -> usize {
        self.index
    }

    fn startup_delay(&self) -> Duration {
        self.startup_delay
    }

    fn label(&self) -> String {
        format!("{}-{}", self.parent.label(), self.index)
    }

    fn params(&self) -> Params {
        let mut params = self.parent.params();
        params.insert("component", &self.component_name);
        params.insert("worker", self.label());
        if let Some(number) = self.merge_request_number {
            params.insert("merge_request", number);
        }
        params
    }

    fn failure(&self) -> Option<&StepError> {
        self.failure.as_ref()
    }

    fn set_failure(&mut self, err: StepError) {
        self.failure = Some(err);
    }
}
