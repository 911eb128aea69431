use crate::lock::{Condvar, Mutex};

/// Counts submitted-but-unfinished work items and lets callers block until
/// the count drains to zero.
#[derive(Default)]
pub(crate) struct Pending {
    count: Mutex<usize>,
    drained: Condvar,
}

impl Pending {
    pub(crate) fn add(&self) {
        *self.count.lock() += 1;
    }

    pub(crate) fn done(&self) {
        let mut count = self.count.lock();
        debug_assert!(*count > 0, "more completions than submissions");
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.drained.notify_all();
        }
    }

    pub(crate) fn wait(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.drained.wait(&mut count);
        }
    }

    pub(crate) fn get(&self) -> usize {
        *self.count.lock()
    }
}
