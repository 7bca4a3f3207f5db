//! Concurrent Login-Attempt Gate — process-wide arbiter that keeps N callers
//! from spawning N login windows.
//!
//! The gate is an explicitly constructed component, not a module-level
//! singleton: the application's composition root owns one instance and hands
//! out references, so tests can instantiate independent gates. Coordination
//! is advisory and in-process only; a distributed deployment would need an
//! external lock, which is out of scope.
//!
//! `try_acquire` is a non-blocking rejection, not a queue: a caller that gets
//! `false` must back off and treat the login window as already being handled.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{info, warn};

/// Minimum spacing between reopen attempts by *any* caller.
pub const REOPEN_COOLDOWN: Duration = Duration::from_secs(10);

/// A reopen older than this with no release is assumed crashed or hung; the
/// next `try_acquire` clears it and proceeds.
pub const STALE_REOPEN_AFTER: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Default, Clone)]
struct GateState {
    reopening: bool,
    owner: Option<String>,
    last_attempt_at: Option<Instant>,
    last_reopen_at: Option<Instant>,
}

#[derive(Debug)]
pub struct LoginGate {
    state: Mutex<GateState>,
    cooldown: Duration,
    stale_after: Duration,
}

impl Default for LoginGate {
    fn default() -> Self {
        Self::new()
    }
}

impl LoginGate {
    pub fn new() -> Self {
        Self::with_windows(REOPEN_COOLDOWN, STALE_REOPEN_AFTER)
    }

    /// Custom cooldown/staleness windows (shortened in tests).
    pub fn with_windows(cooldown: Duration, stale_after: Duration) -> Self {
        Self {
            state: Mutex::new(GateState::default()),
            cooldown,
            stale_after,
        }
    }

    /// Attempt to become the one caller allowed to reopen the login window.
    ///
    /// Succeeds only when no reopen is in flight *and* the cooldown since the
    /// last attempt (by anyone) has elapsed. A stale in-flight reopen is
    /// force-cleared first, with the override logged.
    pub fn try_acquire(&self, caller: &str) -> bool {
        self.try_acquire_at(caller, Instant::now())
    }

    fn try_acquire_at(&self, caller: &str, now: Instant) -> bool {
        let mut state = self.state.lock().unwrap();

        if state.reopening {
            let stale = state
                .last_attempt_at
                .map(|at| now.duration_since(at) >= self.stale_after)
                .unwrap_or(true);
            if stale {
                warn!(
                    "gate: stale reopen by {:?} force-cleared (older than {:?})",
                    state.owner, self.stale_after
                );
                state.reopening = false;
                state.owner = None;
            } else {
                return false;
            }
        }

        if let Some(at) = state.last_attempt_at {
            if now.duration_since(at) < self.cooldown {
                return false;
            }
        }

        state.reopening = true;
        state.owner = Some(caller.to_string());
        state.last_attempt_at = Some(now);
        info!("gate: reopen acquired by '{}'", caller);
        true
    }

    /// Release the gate. Only the recorded owner clears the in-flight flag; a
    /// release by anyone else is a no-op (their attempt never held the gate).
    pub fn release(&self, caller: &str, succeeded: bool) {
        let mut state = self.state.lock().unwrap();
        if state.owner.as_deref() != Some(caller) {
            return;
        }
        state.reopening = false;
        state.owner = None;
        if succeeded {
            state.last_reopen_at = Some(Instant::now());
        }
        info!("gate: released by '{}' (succeeded={})", caller, succeeded);
    }

    /// Administrative escape hatch: clear all gate state unconditionally.
    pub fn force_reset(&self) {
        let mut state = self.state.lock().unwrap();
        *state = GateState::default();
        warn!("gate: force reset");
    }

    pub fn is_reopening(&self) -> bool {
        self.state.lock().unwrap().reopening
    }

    /// Time since the last successful reopen, if any.
    pub fn since_last_reopen(&self) -> Option<Duration> {
        self.state
            .lock()
            .unwrap()
            .last_reopen_at
            .map(|at| at.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};

    #[test]
    fn first_acquire_wins_second_loses() {
        let gate = LoginGate::new();
        assert!(gate.try_acquire("a"));
        assert!(!gate.try_acquire("b"));
        assert!(gate.is_reopening());
    }

    #[test]
    fn concurrent_acquires_grant_exactly_one() {
        let gate = Arc::new(LoginGate::new());
        let barrier = Arc::new(Barrier::new(2));
        let mut handles = Vec::new();
        for id in ["a", "b"] {
            let gate = Arc::clone(&gate);
            let barrier = Arc::clone(&barrier);
            handles.push(std::thread::spawn(move || {
                barrier.wait();
                gate.try_acquire(id)
            }));
        }
        let results: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results.iter().filter(|&&r| r).count(), 1);
    }

    #[test]
    fn release_by_non_owner_is_ignored() {
        let gate = LoginGate::new();
        assert!(gate.try_acquire("owner"));
        gate.release("intruder", true);
        assert!(gate.is_reopening());
        gate.release("owner", true);
        assert!(!gate.is_reopening());
    }

    #[test]
    fn cooldown_blocks_immediate_reacquire() {
        let gate = LoginGate::new();
        assert!(gate.try_acquire("a"));
        gate.release("a", true);
        // Within the cooldown window the gate refuses even though it is free.
        assert!(!gate.try_acquire("a"));
        assert!(!gate.try_acquire("b"));
    }

    #[test]
    fn cooldown_elapses() {
        let gate = LoginGate::with_windows(Duration::from_millis(30), Duration::from_secs(60));
        assert!(gate.try_acquire("a"));
        gate.release("a", false);
        assert!(!gate.try_acquire("b"));
        std::thread::sleep(Duration::from_millis(40));
        assert!(gate.try_acquire("b"));
    }

    #[test]
    fn stale_reopen_is_force_cleared() {
        let gate = LoginGate::with_windows(Duration::from_millis(10), Duration::from_millis(50));
        assert!(gate.try_acquire("crashed-owner"));
        // Owner never releases; once stale, the next caller takes over.
        std::thread::sleep(Duration::from_millis(60));
        assert!(gate.try_acquire("recovery"));
        assert!(gate.is_reopening());
        gate.release("recovery", true);
        assert!(!gate.is_reopening());
    }

    #[test]
    fn force_reset_clears_everything() {
        let gate = LoginGate::new();
        assert!(gate.try_acquire("a"));
        gate.force_reset();
        assert!(!gate.is_reopening());
        // Reset also wipes the attempt timestamp, so reacquire is immediate.
        assert!(gate.try_acquire("b"));
    }

    #[test]
    fn successful_release_records_reopen_time() {
        let gate = LoginGate::new();
        assert!(gate.try_acquire("a"));
        assert!(gate.since_last_reopen().is_none());
        gate.release("a", true);
        assert!(gate.since_last_reopen().is_some());
    }
}
