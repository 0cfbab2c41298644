//! Hierarchical load scheduler.
//!
//! Users fan out to applications, applications fan out to components. Each
//! fan-out is a [`TaskGroup`] joined before the parent continues, so no
//! worker outlives its parent. Workers fail independently.
//!
//! [`Scheduler`] exposes the raw fan-out levels; [`Journey`] layers ordered
//! steps, repeats, resource reuse and purge on top.

mod context;
mod journey;
mod reuse;
mod runner;
mod stagger;
mod step;
mod task_group;

pub use context::{
    random_suffix, username_for, ApplicationContext, ComponentContext, ExecutionContext, UserContext,
};
pub use journey::Journey;
pub use reuse::SharedName;
pub use runner::Scheduler;
pub use stagger::StartupStagger;
pub use step::{step_fn, FnStep, Step, StepRef};
pub use task_group::{GroupOutcome, LostWorker, TaskGroup};
