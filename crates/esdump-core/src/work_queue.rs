//! Work queue handing slice tasks to pool workers: an atomic claim cursor
//! over mutex-guarded slots

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Queue of owned work items.
///
/// Each item is claimed exactly once: [`take`](WorkQueue::take) moves the
/// item out, so the claiming worker owns it exclusively.
pub struct WorkQueue<T> {
    items: Vec<Mutex<Option<T>>>,
    cursor: AtomicUsize,
}

impl<T> WorkQueue<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items: items.into_iter().map(|i| Mutex::new(Some(i))).collect(),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Claim the next unclaimed item
    pub fn take(&self) -> Option<T> {
        let i = self.cursor.fetch_add(1, Ordering::Relaxed);
        let slot = self.items.get(i)?;
        slot.lock().ok()?.take()
    }

    /// Total items in queue
    pub fn total(&self) -> usize {
        self.items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_in_order() {
        let q = WorkQueue::new(vec![1, 2, 3]);
        assert_eq!(q.total(), 3);
        assert_eq!(q.take(), Some(1));
        assert_eq!(q.take(), Some(2));
        assert_eq!(q.take(), Some(3));
        assert_eq!(q.take(), None);
        assert_eq!(q.take(), None);
    }

    #[test]
    fn empty_queue() {
        let q: WorkQueue<i32> = WorkQueue::new(vec![]);
        assert_eq!(q.total(), 0);
        assert_eq!(q.take(), None);
    }

    #[test]
    fn concurrent_claims_unique() {
        let q = WorkQueue::new((0..1000).collect::<Vec<_>>());
        let claimed = Mutex::new(Vec::new());
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    while let Some(v) = q.take() {
                        claimed.lock().unwrap().push(v);
                    }
                });
            }
        });
        let mut claimed = claimed.into_inner().unwrap();
        claimed.sort_unstable();
        assert_eq!(claimed, (0..1000).collect::<Vec<_>>());
    }
}
