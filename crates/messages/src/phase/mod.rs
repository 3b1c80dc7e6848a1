//! Per-phase protocol messages.

mod aggregate;
mod correctness;
mod eval_circuit;
mod validity;

pub use aggregate::AggregateReply;
pub use correctness::{CorShareText, EvalCircuitReply};
pub use eval_circuit::EvalCircuit;
pub use validity::FinalEvalCircuitReply;
