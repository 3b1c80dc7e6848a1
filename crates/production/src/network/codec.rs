//! Message encoding and decoding for network transport.
//!
//! # Wire Format
//!
//! All round messages are JSON-encoded then LZ4-compressed:
//!
//! ```text
//! [u32 LE uncompressed length][LZ4 compressed JSON payload]
//! ```
//!
//! # Topic-Based Type Dispatch
//!
//! Message type is determined by the topic the payload travels under, not by
//! a field in the message. The JSON body is the bare message record.

use tally_core::OutboundMessage;
use tally_messages::{
    AggregateReply, EvalCircuit, EvalCircuitReply, FinalEvalCircuitReply, NetworkMessage,
};
use thiserror::Error;

/// Errors that can occur during message encoding/decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Message too short")]
    MessageTooShort,

    #[error("JSON decode error: {0}")]
    JsonDecode(String),

    #[error("JSON encode error: {0}")]
    JsonEncode(String),

    #[error("Decompression error: {0}")]
    Decompress(String),

    #[error("Unknown topic: {0}")]
    UnknownTopic(String),
}

fn compress(payload: &[u8]) -> Vec<u8> {
    lz4_flex::compress_prepend_size(payload)
}

fn decompress(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    lz4_flex::decompress_size_prepended(data).map_err(|e| CodecError::Decompress(e.to_string()))
}

fn to_json<T: serde::Serialize>(message: &T) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(message).map_err(|e| CodecError::JsonEncode(e.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(payload: &[u8]) -> Result<T, CodecError> {
    serde_json::from_slice(payload).map_err(|e| CodecError::JsonDecode(e.to_string()))
}

/// Encode an outbound message to wire format.
///
/// JSON-encodes the message then LZ4-compresses it. The topic to send it
/// under is [`OutboundMessage::topic`].
pub fn encode_message(message: &OutboundMessage) -> Result<Vec<u8>, CodecError> {
    let json = match message {
        OutboundMessage::EvalCircuit(message) => to_json(message)?,
        OutboundMessage::EvalCircuitReply(reply) => to_json(reply)?,
        OutboundMessage::FinalEvalCircuitReply(reply) => to_json(reply)?,
        OutboundMessage::AggregateReply(reply) => to_json(reply)?,
    };
    Ok(compress(&json))
}

/// Decode a message from wire format based on topic.
pub fn decode_message(topic: &str, data: &[u8]) -> Result<OutboundMessage, CodecError> {
    if data.is_empty() {
        return Err(CodecError::MessageTooShort);
    }

    let payload = decompress(data)?;

    match topic {
        t if t == EvalCircuit::message_type_id() => {
            Ok(OutboundMessage::EvalCircuit(from_json(&payload)?))
        }
        t if t == EvalCircuitReply::message_type_id() => {
            Ok(OutboundMessage::EvalCircuitReply(from_json(&payload)?))
        }
        t if t == FinalEvalCircuitReply::message_type_id() => {
            Ok(OutboundMessage::FinalEvalCircuitReply(from_json(&payload)?))
        }
        t if t == AggregateReply::message_type_id() => {
            Ok(OutboundMessage::AggregateReply(from_json(&payload)?))
        }
        _ => Err(CodecError::UnknownTopic(topic.to_string())),
    }
}
