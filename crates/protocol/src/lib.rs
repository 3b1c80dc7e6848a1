//! Round driver for quorum-gated secure aggregation.
//!
//! Each server runs one [`RoundState`] per round. The state machine processes
//! events synchronously:
//!
//! - `Event::EvalCircuitReceived` → Build checkers, broadcast correctness shares
//! - `Event::EvalCircuitReplyReceived` → Collect shares; at threshold, fold and
//!   broadcast validity shares
//! - `Event::FinalEvalCircuitReplyReceived` → Collect shares; at threshold,
//!   decide acceptance and broadcast this server's aggregator
//! - `Event::AggregateReplyReceived` → Collect aggregators; at threshold, the
//!   round succeeds
//! - `Event::UndecodableMessage` → Counted as a malformed reply of its phase
//! - `Event::RoundTimeout` / `Event::TransportFailed` → Round fails
//!
//! All I/O is performed by the runner via returned `Action`s.

mod config;
mod error;
mod phase;
mod quorum;
mod reshape;
mod state;

pub use config::ProtocolConfig;
pub use error::ProtocolError;
pub use phase::Phase;
pub use quorum::FailureTracker;
pub use reshape::{transpose, ReshapeError};
pub use state::RoundState;
