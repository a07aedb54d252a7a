use std::collections::HashMap;
use std::collections::hash_map::{DefaultHasher, Entry};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::Mutex;

use super::task::{ScheduledTask, TaskState};
use crate::types::{CheckConfiguration, CheckId};

const SHARD_COUNT: usize = 16;

/// Lock-striped map of scheduled tasks
///
/// Every operation locks only the shard owning the key, so insert, replace
/// and remove are atomic per check id without a global lock.
pub(crate) struct TaskMap {
    shards: Box<[Mutex<HashMap<CheckId, ScheduledTask>>]>,
}

impl TaskMap {
    pub(crate) fn new() -> Self {
        Self { shards: (0..SHARD_COUNT).map(|_| Mutex::new(HashMap::new())).collect() }
    }

    fn shard(&self, id: &CheckId) -> &Mutex<HashMap<CheckId, ScheduledTask>> {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }

    /// Cancel any existing task for `id`, then store the one built by `spawn`,
    /// which receives the running guard of the cancelled task.
    /// Returns whether a task was replaced.
    pub(crate) fn replace_with(
        &self,
        id: CheckId,
        spawn: impl FnOnce(Option<Arc<TaskState>>) -> ScheduledTask,
    ) -> bool {
        let mut shard = self.shard(&id).lock();
        let previous = shard.remove(&id).map(|previous| {
            previous.cancel();
            Arc::clone(previous.state())
        });
        let replaced = previous.is_some();
        shard.insert(id, spawn(previous));
        replaced
    }

    /// Store the task built by `spawn` only when `id` is not tracked yet.
    /// Otherwise returns the configuration of the tracked task.
    pub(crate) fn insert_if_absent(
        &self,
        id: CheckId,
        spawn: impl FnOnce() -> ScheduledTask,
    ) -> Result<(), Arc<CheckConfiguration>> {
        let mut shard = self.shard(&id).lock();
        match shard.entry(id) {
            Entry::Occupied(entry) => Err(Arc::clone(entry.get().config())),
            Entry::Vacant(entry) => {
                entry.insert(spawn());
                Ok(())
            }
        }
    }

    pub(crate) fn remove(&self, id: &CheckId) -> Option<ScheduledTask> {
        self.shard(id).lock().remove(id)
    }

    pub(crate) fn contains(&self, id: &CheckId) -> bool {
        self.shard(id).lock().contains_key(id)
    }

    pub(crate) fn with_task<R>(&self, id: &CheckId, f: impl FnOnce(&ScheduledTask) -> R) -> Option<R> {
        self.shard(id).lock().get(id).map(f)
    }

    pub(crate) fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().len()).sum()
    }

    pub(crate) fn ids(&self) -> Vec<CheckId> {
        let mut ids: Vec<CheckId> =
            self.shards.iter().flat_map(|shard| shard.lock().keys().cloned().collect::<Vec<_>>()).collect();
        ids.sort();
        ids
    }

    /// Remove every task, shard by shard
    pub(crate) fn drain(&self) -> Vec<ScheduledTask> {
        self.shards.iter().flat_map(|shard| shard.lock().drain().map(|(_, task)| task).collect::<Vec<_>>()).collect()
    }
}
