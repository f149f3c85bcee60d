//! Lock-free progress counter shared between a running fit and its observer.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct FitProgress {
    step: AtomicUsize,
    total: AtomicUsize,
    done: AtomicBool,
}

/// A point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub step: usize,
    pub total: usize,
    pub done: bool,
}

impl ProgressSnapshot {
    /// Completed fraction in `[0, 1]`; `1.0` once done.
    pub fn fraction(&self) -> f64 {
        if self.done {
            1.0
        } else if self.total == 0 {
            0.0
        } else {
            (self.step as f64 / self.total as f64).min(1.0)
        }
    }
}

impl FitProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset for a new run with an upper bound of `total` steps.
    pub fn start(&self, total: usize) {
        self.step.store(0, Ordering::Relaxed);
        self.total.store(total, Ordering::Relaxed);
        self.done.store(false, Ordering::Release);
    }

    pub fn advance(&self) {
        self.step.fetch_add(1, Ordering::Relaxed);
    }

    pub fn finish(&self) {
        self.done.store(true, Ordering::Release);
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    pub fn step(&self) -> usize {
        self.step.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            step: self.step.load(Ordering::Relaxed),
            total: self.total.load(Ordering::Relaxed),
            done: self.is_done(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_and_finishes() {
        let p = FitProgress::new();
        p.start(4);
        p.advance();
        p.advance();
        let snap = p.snapshot();
        assert_eq!((snap.step, snap.total, snap.done), (2, 4, false));
        assert_eq!(snap.fraction(), 0.5);
        p.finish();
        assert_eq!(p.snapshot().fraction(), 1.0);
    }
}
