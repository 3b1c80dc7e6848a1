//! Wire codec and transport.

mod codec;
mod transport;

pub use codec::{decode_message, encode_message, CodecError};
pub use transport::{Envelope, LocalTransport, Transport, TransportError};
