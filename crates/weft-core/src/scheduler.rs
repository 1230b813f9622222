//! The pending-render set.
//!
//! Signal writes only enqueue; a single flush task is spawned when the set
//! goes from empty to non-empty, so any number of writes in one synchronous
//! run collapse into one render per instance.

use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;

use futures::task::{LocalSpawn, LocalSpawnExt};
use indexmap::IndexSet;

use crate::instance::InstanceId;

pub(crate) struct Scheduler {
    pending: RefCell<IndexSet<InstanceId>>,
    spawner: Rc<dyn LocalSpawn>,
}

impl Scheduler {
    pub fn new(spawner: Rc<dyn LocalSpawn>) -> Self {
        Self {
            pending: RefCell::new(IndexSet::new()),
            spawner,
        }
    }

    /// Returns true when this call made the set non-empty, i.e. a flush
    /// needs to be spawned.
    pub fn enqueue(&self, id: InstanceId) -> bool {
        let mut pending = self.pending.borrow_mut();
        let was_empty = pending.is_empty();
        pending.insert(id);
        was_empty
    }

    /// Takes the whole set. Writes made while the batch renders land in a
    /// fresh set.
    pub fn drain(&self) -> Vec<InstanceId> {
        std::mem::take(&mut *self.pending.borrow_mut())
            .into_iter()
            .collect()
    }

    pub fn is_pending(&self, id: InstanceId) -> bool {
        self.pending.borrow().contains(&id)
    }

    pub fn len(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn spawn(&self, task: impl Future<Output = ()> + 'static) {
        if let Err(e) = self.spawner.spawn_local(task) {
            log::error!("failed to spawn render flush: {e}");
        }
    }
}
