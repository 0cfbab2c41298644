//! Write-once name slot shared between siblings of one fan-out.

use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::time::Instant;

/// Name of a resource created by sibling 0 and reused by the others.
///
/// The first non-empty [`publish`](Self::publish) wins; the value is never
/// overwritten afterwards.
#[derive(Debug, Clone, Default)]
pub struct SharedName {
    slot: Arc<OnceLock<String>>,
}

impl SharedName {
    /// Creates an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `name` if the slot is still empty.
    ///
    /// Returns `false` for an empty name or when a name is already set.
    pub fn publish(&self, name: impl Into<String>) -> bool {
        let name = name.into();
        if name.is_empty() {
            return false;
        }
        self.slot.set(name).is_ok()
    }

    /// Returns the published name, if any.
    #[must_use]
    pub fn get(&self) -> Option<&str> {
        self.slot.get().map(String::as_str)
    }

    /// Polls every `interval` until a name is published or `timeout` elapses.
    ///
    /// A timeout too large to represent as an instant waits indefinitely.
    pub async fn wait(&self, interval: Duration, timeout: Duration) -> Option<String> {
        let deadline = Instant::now().checked_add(timeout);
        loop {
            if let Some(name) = self.get() {
                return Some(name.to_string());
            }
            let pause = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    interval.min(deadline - now)
                }
                None => interval,
            };
            tokio::time::sleep(pause).await;
        }
    }
}
