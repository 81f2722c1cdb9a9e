//! The reset coordinator: the single synchronization point shared by the
//! control task and the bulk worker task (§5). Ground: the original
//! responder's `state_sem` handoff between `handle_control()`'s
//! `reset_interface()`/`stop_io()`/`start_io()` and `bulk_thread()`'s
//! `sem_wait` retry loop, re-expressed as an `Arc<Mutex<_>>`/`Condvar` pair
//! the way the teacher's `AppState` shares state between the Tauri command
//! handlers and its background precache thread.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
struct State {
    io_enabled: bool,
    generation: u64,
}

/// Binary handoff: the control task disables I/O before reconfiguring the
/// interface and re-enables it once the new configuration is live; the bulk
/// worker blocks on `wait_until_enabled` whenever a transfer is interrupted
/// rather than treating an interruption as fatal.
#[derive(Clone)]
pub struct ResetCoordinator {
    inner: Arc<(Mutex<State>, Condvar)>,
}

impl ResetCoordinator {
    pub fn new() -> Self {
        Self {
            inner: Arc::new((Mutex::new(State::default()), Condvar::new())),
        }
    }

    pub fn stop_io(&self) {
        let (lock, cvar) = &*self.inner;
        let mut state = lock.lock().expect("reset coordinator mutex poisoned");
        state.io_enabled = false;
        state.generation += 1;
        cvar.notify_all();
    }

    pub fn start_io(&self) {
        let (lock, cvar) = &*self.inner;
        let mut state = lock.lock().expect("reset coordinator mutex poisoned");
        state.io_enabled = true;
        state.generation += 1;
        cvar.notify_all();
    }

    pub fn is_io_enabled(&self) -> bool {
        let (lock, _) = &*self.inner;
        lock.lock().expect("reset coordinator mutex poisoned").io_enabled
    }

    /// The worker's current reset epoch; a worker that was interrupted can
    /// compare this before and after waiting to tell a fresh reset apart
    /// from a stale wakeup.
    pub fn generation(&self) -> u64 {
        let (lock, _) = &*self.inner;
        lock.lock().expect("reset coordinator mutex poisoned").generation
    }

    /// Blocks until I/O is re-enabled, or until `timeout` elapses (to allow
    /// the worker to periodically check for a shutdown request). Returns
    /// `true` if I/O is enabled when the call returns.
    pub fn wait_until_enabled(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let state = lock.lock().expect("reset coordinator mutex poisoned");
        if state.io_enabled {
            return true;
        }
        let (state, _) = cvar
            .wait_timeout_while(state, timeout, |state| !state.io_enabled)
            .expect("reset coordinator mutex poisoned");
        state.io_enabled
    }
}

impl Default for ResetCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_disabled() {
        let coordinator = ResetCoordinator::new();
        assert!(!coordinator.is_io_enabled());
    }

    #[test]
    fn start_io_wakes_a_waiter() {
        let coordinator = ResetCoordinator::new();
        let waiter = coordinator.clone();
        let handle = std::thread::spawn(move || waiter.wait_until_enabled(Duration::from_secs(5)));

        std::thread::sleep(Duration::from_millis(20));
        coordinator.start_io();

        assert!(handle.join().unwrap());
    }

    #[test]
    fn wait_times_out_while_disabled() {
        let coordinator = ResetCoordinator::new();
        assert!(!coordinator.wait_until_enabled(Duration::from_millis(10)));
    }

    #[test]
    fn stop_then_start_bumps_generation() {
        let coordinator = ResetCoordinator::new();
        let before = coordinator.generation();
        coordinator.stop_io();
        coordinator.start_io();
        assert_eq!(coordinator.generation(), before + 2);
    }
}
