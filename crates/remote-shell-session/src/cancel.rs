//! Interrupting the command that is currently running.
//!
//! The controller tracks at most one running command. Each command gets a
//! fresh generation id and a [`CommandGuard`]; dropping the guard returns the
//! controller to idle, but only if the slot still belongs to that command, so
//! a stale guard or terminator never reaches a later command.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use remote_shell_core::Terminate;

#[derive(Default)]
struct Slot {
    next_generation: u64,
    running: Option<Running>,
}

struct Running {
    generation: u64,
    terminator: Arc<dyn Terminate>,
    interrupted: bool,
}

fn lock(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns the running-command slot of one session.
#[derive(Default)]
pub struct CancellationController {
    slot: Arc<Mutex<Slot>>,
}

impl std::fmt::Debug for CancellationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationController")
            .field("running", &self.interrupter().is_running())
            .finish()
    }
}

impl CancellationController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `terminator` as the running command until the guard drops.
    pub fn on_command_started(&self, terminator: Arc<dyn Terminate>) -> CommandGuard {
        let mut slot = lock(&self.slot);
        slot.next_generation += 1;
        let generation = slot.next_generation;
        slot.running = Some(Running {
            generation,
            terminator,
            interrupted: false,
        });
        CommandGuard {
            slot: Arc::clone(&self.slot),
            generation,
        }
    }

    /// Interrupt the running command; no-op when idle.
    pub fn interrupt(&self) -> bool {
        self.interrupter().interrupt()
    }

    /// Handle that can interrupt from another task.
    #[must_use]
    pub fn interrupter(&self) -> Interrupter {
        Interrupter {
            slot: Arc::clone(&self.slot),
        }
    }
}

/// Cloneable interrupt handle, safe to use from any task or signal handler.
#[derive(Clone)]
pub struct Interrupter {
    slot: Arc<Mutex<Slot>>,
}

impl std::fmt::Debug for Interrupter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interrupter")
            .field("running", &self.is_running())
            .finish()
    }
}

impl Interrupter {
    /// Terminate the running command.
    ///
    /// Returns `false` when nothing was running.
    pub fn interrupt(&self) -> bool {
        let mut slot = lock(&self.slot);
        let Some(running) = slot.running.as_mut() else {
            tracing::debug!("Interrupt requested while idle");
            return false;
        };
        tracing::debug!(generation = running.generation, "Interrupting command");
        running.interrupted = true;
        running.terminator.terminate();
        true
    }

    /// Whether a command is currently tracked.
    #[must_use]
    pub fn is_running(&self) -> bool {
        lock(&self.slot).running.is_some()
    }
}

/// Marks one command as running; dropping it returns the controller to idle.
#[must_use = "dropping the guard immediately marks the command finished"]
pub struct CommandGuard {
    slot: Arc<Mutex<Slot>>,
    generation: u64,
}

impl std::fmt::Debug for CommandGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandGuard")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl CommandGuard {
    /// Whether this command was interrupted.
    #[must_use]
    pub fn was_interrupted(&self) -> bool {
        lock(&self.slot)
            .running
            .as_ref()
            .is_some_and(|r| r.generation == self.generation && r.interrupted)
    }
}

impl Drop for CommandGuard {
    fn drop(&mut self) {
        let mut slot = lock(&self.slot);
        if slot
            .running
            .as_ref()
            .is_some_and(|r| r.generation == self.generation)
        {
            slot.running = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct CountingTerminator(AtomicUsize);

    impl Terminate for CountingTerminator {
        fn terminate(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counting() -> Arc<CountingTerminator> {
        Arc::new(CountingTerminator::default())
    }

    #[test]
    fn test_interrupt_when_idle_is_noop() {
        let controller = CancellationController::new();
        assert!(!controller.interrupt());
        assert!(!controller.interrupter().is_running());
    }

    #[test]
    fn test_interrupt_running_command() {
        let controller = CancellationController::new();
        let terminator = counting();

        let guard = controller.on_command_started(terminator.clone());
        assert!(controller.interrupter().interrupt());

        assert!(guard.was_interrupted());
        assert_eq!(terminator.0.load(Ordering::SeqCst), 1);

        drop(guard);
        assert!(!controller.interrupt());
        assert_eq!(terminator.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stale_guard_does_not_clear_newer_command() {
        let controller = CancellationController::new();
        let first = counting();
        let second = counting();

        let stale = controller.on_command_started(first.clone());
        let current = controller.on_command_started(second.clone());
        drop(stale);

        assert!(controller.interrupt());
        assert_eq!(first.0.load(Ordering::SeqCst), 0);
        assert_eq!(second.0.load(Ordering::SeqCst), 1);
        assert!(current.was_interrupted());
    }

    #[test]
    fn test_fresh_command_starts_uninterrupted() {
        let controller = CancellationController::new();

        let guard = controller.on_command_started(counting());
        controller.interrupt();
        drop(guard);

        let next = controller.on_command_started(counting());
        assert!(!next.was_interrupted());
    }
}
