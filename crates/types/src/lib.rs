//! Core types for Tally.
//!
//! This crate provides the foundational types shared by every other crate:
//!
//! - Field scalars ([`Scalar`]) over `p = 2^61 - 1`
//! - Identifiers ([`ServerIndex`], [`RoundId`])
//! - Share bundles exchanged during a round ([`ClientRequest`],
//!   [`CorrectnessShare`], [`ValidityShare`], [`Aggregator`])
//! - Configuration loaded by reference ([`AggregationConfig`], [`ConfigLoader`])
//! - Roster topology ([`Topology`], [`StaticTopology`])

mod config;
mod data;
mod field;
mod identifiers;
mod shares;
mod topology;

pub use config::{
    AggregationConfig, ConfigError, ConfigLoader, FileConfigLoader, StaticConfigLoader,
    DEFAULT_EVAL_POINT,
};
pub use data::DataPoint;
pub use field::{Scalar, ScalarParseError, MODULUS};
pub use identifiers::{RoundId, ServerIndex};
pub use shares::{
    Aggregator, AggregatorMismatch, ClientRequest, Correctness, CorrectnessShare, PrgKey,
    TripleShare, ValidityShare,
};
pub use topology::{StaticTopology, Topology};
