use std::sync::atomic::{AtomicU64, Ordering};

/// Shared iteration budget. Without a budget every acquire succeeds.
#[derive(Debug)]
pub struct IterationGate {
    counter: AtomicU64,
    iterations: Option<u64>,
}

impl IterationGate {
    #[must_use]
    pub fn new(iterations: Option<u64>) -> Self {
        Self {
            counter: AtomicU64::new(0),
            iterations,
        }
    }

    /// Claims one iteration; `false` once the budget is spent.
    pub fn try_acquire(&self) -> bool {
        let Some(total) = self.iterations else {
            self.counter.fetch_add(1, Ordering::Relaxed);
            return true;
        };

        self.counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < total).then_some(n + 1)
            })
            .is_ok()
    }

    /// Iterations claimed so far.
    pub fn started(&self) -> u64 {
        self.counter.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn budget_is_never_exceeded() {
        let gate = Arc::new(IterationGate::new(Some(1000)));
        let granted: u64 = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let gate = gate.clone();
                    scope.spawn(move || {
                        let mut n = 0u64;
                        while gate.try_acquire() {
                            n += 1;
                        }
                        n
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap_or(0)).sum()
        });

        assert_eq!(granted, 1000);
        assert_eq!(gate.started(), 1000);
    }

    #[test]
    fn unbounded_gate_always_grants() {
        let gate = IterationGate::new(None);
        for _ in 0..10 {
            assert!(gate.try_acquire());
        }
        assert_eq!(gate.started(), 10);
    }
}
