//! # Summary
//!
//! Lamport's scalar logical clock: a monotonic counter advanced by local
//! events and folded together with remotely observed timestamps.

use parking_lot::Mutex;

/// Logical clock shared between the node's own request cycle and the
/// concurrently running inbound handlers. Every operation is atomic.
#[derive(Debug, Default)]
pub struct Clock(Mutex<u64>);

impl Clock {
    pub fn new() -> Self {
        Clock::default()
    }

    /// Advance for a local event and return the new value.
    pub fn tick(&self) -> u64 {
        let mut time = self.0.lock();
        *time += 1;
        *time
    }

    /// Fold in a remotely observed timestamp: `max(local, remote) + 1`.
    pub fn merge(&self, remote: u64) -> u64 {
        let mut time = self.0.lock();
        *time = (*time).max(remote) + 1;
        *time
    }

    /// Current value without advancing.
    pub fn read(&self) -> u64 {
        *self.0.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_increments() {
        let clock = Clock::new();
        assert_eq!(clock.tick(), 1);
        assert_eq!(clock.tick(), 2);
        assert_eq!(clock.read(), 2);
    }

    #[test]
    fn merge_dominates_remote() {
        let clock = Clock::new();
        assert_eq!(clock.merge(10), 11);
        assert_eq!(clock.merge(5), 12);
        assert_eq!(clock.read(), 12);
    }

    #[test]
    fn monotonic_under_contention() {
        let clock = std::sync::Arc::new(Clock::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let clock = std::sync::Arc::clone(&clock);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        clock.tick();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(clock.read(), 4000);
    }
}
