//! Fan-out task group.

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tokio::task::JoinSet;

/// A worker that did not return a context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LostWorker {
    /// Sibling index of the worker.
    pub index: usize,
    /// Panic message, or the join error if the task was aborted.
    pub reason: String,
}

/// Results of a finished fan-out.
#[derive(Debug)]
pub struct GroupOutcome<T> {
    /// Values of the workers that returned, ordered by index.
    pub completed: Vec<T>,
    /// Workers that panicked or were aborted.
    pub lost: Vec<LostWorker>,
}

/// A group of sibling workers joined as a unit.
///
/// Workers fail independently: a panic in one worker is caught and reported
/// in the outcome, the others keep running. Dropping the group aborts any
/// worker still running, so no worker outlives it.
pub struct TaskGroup<T> {
    name: String,
    tasks: JoinSet<(usize, Result<T, String>)>,
    spawned: usize,
}

impl<T: Send + 'static> TaskGroup<T> {
    /// Creates an empty group.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tasks: JoinSet::new(),
            spawned: 0,
        }
    }

    /// Returns the group name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of workers spawned so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.spawned
    }

    /// Returns `true` if nothing was spawned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spawned == 0
    }

    /// Spawns the worker for sibling `index`.
    pub fn spawn<Fut>(&mut self, index: usize, worker: Fut)
    where
        Fut: Future<Output = T> + Send + 'static,
    {
        self.spawned += 1;
        self.tasks.spawn(async move {
            let result = AssertUnwindSafe(worker)
                .catch_unwind()
                .await
                .map_err(panic_message);
            (index, result)
        });
    }

    /// Waits for every worker to finish.
    pub async fn wait(mut self) -> GroupOutcome<T> {
        let mut completed = Vec::with_capacity(self.spawned);
        let mut lost = Vec::new();

        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok((index, Ok(value))) => completed.push((index, value)),
                Ok((index, Err(reason))) => lost.push(LostWorker { index, reason }),
                Err(join_error) => lost.push(LostWorker {
                    index: usize::MAX,
                    reason: format!("Task join error: {join_error}"),
                }),
            }
        }

        completed.sort_by_key(|(index, _)| *index);
        lost.sort_by_key(|worker| worker.index);
        GroupOutcome {
            completed: completed.into_iter().map(|(_, value)| value).collect(),
            lost,
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_returns_values_in_index_order() {
        let mut group = TaskGroup::new("apps");
        for index in 0..5usize {
            group.spawn(index, async move {
                // Later indices finish first.
                tokio::time::sleep(Duration::from_millis((5 - index as u64) * 5)).await;
                index * 10
            });
        }
        assert_eq!(group.len(), 5);

        let outcome = group.wait().await;
        assert_eq!(outcome.completed, vec![0, 10, 20, 30, 40]);
        assert!(outcome.lost.is_empty());
    }

    #[tokio::test]
    async fn test_panic_does_not_affect_siblings() {
        let mut group = TaskGroup::new("components");
        for index in 0..4usize {
            group.spawn(index, async move {
                if index == 2 {
                    panic!("component {index} exploded");
                }
                index
            });
        }

        let outcome = group.wait().await;
        assert_eq!(outcome.completed, vec![0, 1, 3]);
        assert_eq!(
            outcome.lost,
            vec![LostWorker {
                index: 2,
                reason: "component 2 exploded".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_empty_group() {
        let group: TaskGroup<()> = TaskGroup::new("empty");
        assert!(group.is_empty());
        let outcome = group.wait().await;
        assert!(outcome.completed.is_empty());
    }

    #[test]
    fn test_panic_message_payloads() {
        assert_eq!(panic_message(Box::new("static")), "static");
        assert_eq!(panic_message(Box::new(String::from("owned"))), "owned");
        assert_eq!(panic_message(Box::new(7u8)), "worker panicked");
    }
}
