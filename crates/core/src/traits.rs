//! Core traits for state machines.

use crate::{Action, Event};
use std::time::Duration;

/// A state machine that processes events.
///
/// Every protocol role is implemented as a state machine that is:
///
/// - **Synchronous**: No async, no `.await`
/// - **Deterministic**: Same state + event = same actions, given the same
///   randomness source
/// - **Pure-ish**: Mutates self, but performs no I/O
///
/// # Example
///
/// ```ignore
/// impl<V: Verifier> StateMachine for RoundState<V> {
///     fn handle(&mut self, event: Event) -> Vec<Action> {
///         match event {
///             Event::EvalCircuitReceived { message, .. } => self.on_eval_circuit(message),
///             Event::RoundTimeout => self.on_round_timeout(),
///             // ... etc
///         }
///     }
///
///     fn set_time(&mut self, now: Duration) {
///         self.now = now;
///     }
/// }
/// ```
pub trait StateMachine {
    /// Process an event, returning actions to perform.
    ///
    /// # Guarantees
    ///
    /// - **Synchronous**: This method never blocks or awaits
    /// - **No I/O**: All I/O is performed by the runner via the returned actions
    ///
    /// The returned actions may send messages, set or cancel timers and
    /// publish the round outcome.
    fn handle(&mut self, event: Event) -> Vec<Action>;

    /// Set the current time.
    ///
    /// Called by the runner before each `handle()` call to provide the
    /// current simulation or wall-clock time.
    fn set_time(&mut self, now: Duration);

    /// Get the current time.
    ///
    /// Returns the time that was last set via `set_time()`.
    fn now(&self) -> Duration;
}
