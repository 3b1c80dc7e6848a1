//! Core types for Tally.
//!
//! Protocol logic is written as synchronous state machines. A runner feeds
//! them [`Event`]s and executes the [`Action`]s they return; the state
//! machines themselves never touch the network, the clock or a channel.
//!
//! The one piece of shared, race-safe state is the [`CompletionGate`], which
//! the runner uses to publish a round's outcome exactly once.

mod action;
mod completion;
mod event;
mod message;
mod traits;

pub use action::{Action, TimerId};
pub use completion::CompletionGate;
pub use event::Event;
pub use message::OutboundMessage;
pub use traits::StateMachine;
