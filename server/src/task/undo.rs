use super::Task;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

struct Slot {
    task: Task,
    expires_at: DateTime<Utc>,
    generation: u64,
}

/// In-memory holding area for the most recently completed task of each user.
///
/// Completing a task deletes its row; the snapshot parked here is the only
/// way back. Each user has a single slot, so completing a second task while
/// the window is open replaces the first snapshot. Slots expire after the
/// configured window and a background timer purges them, with an expiry
/// check on `take` as well since the timer can lag.
pub struct UndoStash {
    window_secs: u64,
    generation: AtomicU64,
    slots: Mutex<HashMap<i32, Slot>>,
}

impl UndoStash {
    pub fn new(window_secs: u64) -> Self {
        Self {
            window_secs,
            generation: AtomicU64::new(0),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Parks a completed task snapshot for its owner and schedules the purge.
    ///
    /// # Returns
    ///
    /// The instant the undo window closes.
    pub async fn stash(self: Arc<Self>, owner_id: i32, task: Task) -> DateTime<Utc> {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let expires_at = Utc::now() + chrono::Duration::seconds(self.window_secs as i64);
        {
            let mut slots = self.slots.lock().await;
            slots.insert(
                owner_id,
                Slot {
                    task,
                    expires_at,
                    generation,
                },
            );
        }

        let stash = self;
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(stash.window_secs)).await;
            stash.purge(owner_id, generation).await;
        });

        expires_at
    }

    /// Removes and returns the parked snapshot for a user, if the window is
    /// still open. A second call for the same completion returns `None`.
    pub async fn take(&self, owner_id: i32) -> Option<Task> {
        let mut slots = self.slots.lock().await;
        let slot = slots.remove(&owner_id)?;
        if slot.expires_at > Utc::now() {
            Some(slot.task)
        } else {
            None
        }
    }

    /// Returns the title and expiry of the parked snapshot without consuming
    /// it. Used to render the undo banner.
    pub async fn peek(&self, owner_id: i32) -> Option<(String, DateTime<Utc>)> {
        let slots = self.slots.lock().await;
        let slot = slots.get(&owner_id)?;
        if slot.expires_at > Utc::now() {
            Some((slot.task.title().to_string(), slot.expires_at))
        } else {
            None
        }
    }

    /// Drops the slot for a user only if it still holds the snapshot the
    /// timer was armed for. A newer completion bumps the generation and the
    /// stale timer becomes a no-op.
    async fn purge(&self, owner_id: i32, generation: u64) {
        let mut slots = self.slots.lock().await;
        if slots
            .get(&owner_id)
            .is_some_and(|slot| slot.generation == generation)
        {
            slots.remove(&owner_id);
            tracing::debug!(owner_id, "undo window closed, snapshot dropped");
        }
    }
}
