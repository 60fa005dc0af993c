use nw_core::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Single-flight lock shared by every path that can start an ingestion run.
///
/// Clones share the same flag. A second acquisition while a run is active is
/// rejected, never queued.
#[derive(Debug, Clone, Default)]
pub struct RunGuard {
    running: Arc<AtomicBool>,
}

impl RunGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> Result<RunPermit> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::AlreadyRunning)?;
        Ok(RunPermit {
            running: Arc::clone(&self.running),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Proof of holding the guard. Dropping it releases the guard.
#[must_use = "the guard is released as soon as the permit is dropped"]
#[derive(Debug)]
pub struct RunPermit {
    running: Arc<AtomicBool>,
}

impl RunPermit {
    pub fn release(self) {}
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn test_second_acquire_fails_until_release() {
        let guard = RunGuard::new();
        let permit = guard.try_acquire().unwrap();
        assert!(guard.is_running());
        assert!(matches!(guard.try_acquire(), Err(Error::AlreadyRunning)));

        permit.release();
        assert!(!guard.is_running());
        let again = guard.try_acquire();
        assert!(again.is_ok());
    }

    #[test]
    fn test_clones_share_state() {
        let guard = RunGuard::new();
        let scheduled = guard.clone();
        let _permit = guard.try_acquire().unwrap();
        assert!(scheduled.is_running());
        assert!(scheduled.try_acquire().is_err());
    }

    #[test]
    fn test_concurrent_acquire_has_one_winner() {
        for _ in 0..50 {
            let guard = RunGuard::new();
            let barrier = Arc::new(Barrier::new(2));

            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let guard = guard.clone();
                    let barrier = Arc::clone(&barrier);
                    thread::spawn(move || {
                        barrier.wait();
                        guard.try_acquire()
                    })
                })
                .collect();

            let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
            let winners = results.iter().filter(|r| r.is_ok()).count();
            let rejected = results
                .iter()
                .filter(|r| matches!(r, Err(Error::AlreadyRunning)))
                .count();
            assert_eq!(winners, 1);
            assert_eq!(rejected, 1);
        }
    }

    #[test]
    fn test_permit_released_on_panic() {
        let guard = RunGuard::new();
        let inner = guard.clone();
        let outcome = thread::spawn(move || {
            let _permit = inner.try_acquire().unwrap();
            panic!("run blew up");
        })
        .join();
        assert!(outcome.is_err());
        assert!(!guard.is_running());
    }
}
