//! Session Gate (SPEC_FULL §4.7).
//!
//! A single-slot immediate-reject gate, not a queuing semaphore: `start`
//! fails with `Busy` right away if a job is already running rather than
//! queuing the caller behind it. This is a deliberate divergence from a
//! `Semaphore(1)`-based lock that lets one waiter queue behind the holder —
//! see the design ledger for the rationale.

use std::sync::atomic::{AtomicBool, Ordering};

use sa_domain::error::{Error, Result};

/// Guards one session's job slot against concurrent runs.
pub struct SessionGate {
    running: AtomicBool,
}

/// RAII guard held for the duration of a running job; releases the slot on drop.
pub struct GateGuard<'a> {
    gate: &'a SessionGate,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.gate.running.store(false, Ordering::SeqCst);
    }
}

impl SessionGate {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
        }
    }

    /// Attempt to start a job. Fails immediately with `Error::Busy` if a job
    /// is already running; never blocks or queues.
    pub fn start(&self) -> Result<GateGuard<'_>> {
        match self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => Ok(GateGuard { gate: self }),
            Err(_) => Err(Error::Busy),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Default for SessionGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_start_fails_busy_while_first_holds_the_slot() {
        let gate = SessionGate::new();
        let guard = gate.start().unwrap();
        let err = gate.start().unwrap_err();
        assert!(matches!(err, Error::Busy));
        drop(guard);
    }

    #[test]
    fn slot_is_released_when_guard_drops() {
        let gate = SessionGate::new();
        {
            let _guard = gate.start().unwrap();
            assert!(gate.is_running());
        }
        assert!(!gate.is_running());
        assert!(gate.start().is_ok());
    }

    #[tokio::test]
    async fn concurrent_starts_only_one_wins() {
        let gate = std::sync::Arc::new(SessionGate::new());
        let g1 = gate.clone();
        let g2 = gate.clone();

        let (r1, r2) = tokio::join!(
            tokio::spawn(async move { g1.start().is_ok() }),
            tokio::spawn(async move { g2.start().is_ok() })
        );
        let outcomes = [r1.unwrap(), r2.unwrap()];
        assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
    }
}
