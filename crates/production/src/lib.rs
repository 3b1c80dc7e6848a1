//! Async runner for Tally rounds.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        LocalCluster                          │
//! │                                                              │
//! │  ┌────────────┐   ┌────────────┐         ┌────────────┐      │
//! │  │ NodeRunner │   │ NodeRunner │   ...   │ NodeRunner │      │
//! │  │  (task 0)  │   │  (task 1)  │         │ (task n-1) │      │
//! │  └─────┬──────┘   └─────┬──────┘         └─────┬──────┘      │
//! │        │ encode/decode  │                      │             │
//! │        ▼                ▼                      ▼             │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │          LocalTransport (one inbox per server)         │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each [`NodeRunner`] owns one `RoundState`, turns inbound envelopes into
//! events through the wire codec, and publishes its outcome through a
//! `CompletionGate`.

pub mod network;
mod runner;

pub use network::{
    decode_message, encode_message, CodecError, Envelope, LocalTransport, Transport,
    TransportError,
};
pub use runner::{LocalCluster, NodeRunner, RoundReport, RunnerConfig, RunnerError};
