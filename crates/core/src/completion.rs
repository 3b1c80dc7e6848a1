//! One-shot round completion.
//!
//! A round can finish from several places that race each other in a
//! concurrent runner: the last quorum reply, a fatal error, or the round
//! timer. [`CompletionGate::complete`] may therefore be called more than once
//! and from several threads. Only the first outcome reaches the result
//! channel and the finished hook runs exactly once.

use parking_lot::Mutex;
use std::sync::Once;
use tokio::sync::mpsc;
use tracing::{debug, trace};

type Hook = Box<dyn FnOnce() + Send>;
type TimerCanceller = Box<dyn Fn() + Send + Sync>;

/// Publishes a round's outcome exactly once.
pub struct CompletionGate {
    result_tx: mpsc::Sender<bool>,
    timer_canceller: Mutex<Option<TimerCanceller>>,
    done_hook: Mutex<Option<Hook>>,
    done: Once,
}

impl CompletionGate {
    /// Create a gate and the receiving end of its result channel.
    ///
    /// The channel has capacity one, so it holds exactly the first outcome.
    pub fn new() -> (Self, mpsc::Receiver<bool>) {
        let (result_tx, result_rx) = mpsc::channel(1);
        let gate = Self {
            result_tx,
            timer_canceller: Mutex::new(None),
            done_hook: Mutex::new(None),
            done: Once::new(),
        };
        (gate, result_rx)
    }

    /// Install the hook that runs when the round finishes.
    pub fn with_done_hook(self, hook: impl FnOnce() + Send + 'static) -> Self {
        *self.done_hook.lock() = Some(Box::new(hook));
        self
    }

    /// Register how to stop the round timer once it has been armed.
    pub fn arm_timer(&self, cancel: impl Fn() + Send + Sync + 'static) {
        *self.timer_canceller.lock() = Some(Box::new(cancel));
    }

    /// Finish the round with the given outcome.
    ///
    /// Always stops the round timer. The outcome is offered to the result
    /// channel without blocking; if an earlier outcome is already there (or
    /// the receiver is gone) this one is dropped.
    pub fn complete(&self, success: bool) {
        if let Some(cancel) = self.timer_canceller.lock().as_ref() {
            cancel();
        }

        match self.result_tx.try_send(success) {
            Ok(()) => debug!(success, "Round result published"),
            Err(_) => trace!(success, "Round result already published, dropping"),
        }

        self.done.call_once(|| {
            if let Some(hook) = self.done_hook.lock().take() {
                hook();
            }
        });
    }

    /// Check whether the round has finished.
    pub fn is_finished(&self) -> bool {
        self.done.is_completed()
    }
}

impl std::fmt::Debug for CompletionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionGate")
            .field("finished", &self.is_finished())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn test_first_outcome_wins() {
        let (gate, mut rx) = CompletionGate::new();
        gate.complete(true);
        gate.complete(false);

        assert!(gate.is_finished());
        assert_eq!(rx.try_recv().ok(), Some(true));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_complete_always_cancels_timer() {
        let cancels = Arc::new(AtomicUsize::new(0));
        let (gate, _rx) = CompletionGate::new();
        let counter = cancels.clone();
        gate.arm_timer(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        gate.complete(false);
        gate.complete(false);
        assert_eq!(cancels.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_exactly_once_under_concurrency() {
        let hooks = Arc::new(AtomicUsize::new(0));
        let counter = hooks.clone();
        let (gate, mut rx) = CompletionGate::new();
        let gate = Arc::new(gate.with_done_hook(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let gate = gate.clone();
                std::thread::spawn(move || gate.complete(i % 2 == 0))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(hooks.load(Ordering::SeqCst), 1);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_complete_with_dropped_receiver() {
        let (gate, rx) = CompletionGate::new();
        drop(rx);
        gate.complete(true);
        assert!(gate.is_finished());
    }
}
