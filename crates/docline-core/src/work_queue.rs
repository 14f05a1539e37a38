//! Lock-free job queue shared by batch workers

use std::sync::atomic::{AtomicUsize, Ordering};

/// Jobs handed out in order, each to exactly one worker.
///
/// Workers call [`next()`](WorkQueue::next) until it returns `None`.
pub struct WorkQueue<J> {
    jobs: Vec<J>,
    cursor: AtomicUsize,
}

impl<J> WorkQueue<J> {
    pub fn new(jobs: Vec<J>) -> Self {
        Self {
            jobs,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Claim the next job (lock-free)
    pub fn next(&self) -> Option<&J> {
        let i = self.cursor.fetch_add(1, Ordering::Relaxed);
        self.jobs.get(i)
    }

    pub fn total(&self) -> usize {
        self.jobs.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn hands_out_in_order() {
        let q = WorkQueue::new(vec!["a", "b"]);
        assert_eq!(q.total(), 2);
        assert_eq!(q.next(), Some(&"a"));
        assert_eq!(q.next(), Some(&"b"));
        assert_eq!(q.next(), None);
        assert_eq!(q.next(), None);
    }

    #[test]
    fn empty_queue() {
        let q: WorkQueue<i32> = WorkQueue::new(vec![]);
        assert_eq!(q.total(), 0);
        assert_eq!(q.next(), None);
    }

    #[test]
    fn each_job_claimed_once_across_threads() {
        let q = WorkQueue::new((0..1000).collect::<Vec<_>>());
        let seen = Mutex::new(Vec::new());
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    while let Some(&j) = q.next() {
                        seen.lock().unwrap().push(j);
                    }
                });
            }
        });
        let mut seen = seen.into_inner().unwrap();
        seen.sort_unstable();
        assert_eq!(seen, (0..1000).collect::<Vec<_>>());
    }
}
