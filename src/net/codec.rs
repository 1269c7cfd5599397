use bincode::Options;

use super::message::Message;
use crate::error::{Result, SwimError};

/// Largest payload of a single IPv4 UDP datagram.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

pub fn encode(message: &Message) -> Result<Vec<u8>> {
    let options = bincode::DefaultOptions::new();

    let size = options.serialized_size(message)? as usize;
    if size > MAX_DATAGRAM_SIZE {
        return Err(SwimError::DatagramTooLarge {
            size,
            max: MAX_DATAGRAM_SIZE,
        });
    }

    Ok(options.serialize(message)?)
}

/// Decoding is bounded by [`MAX_DATAGRAM_SIZE`], so a forged length prefix
/// cannot make us allocate more than one datagram's worth.
pub fn decode(bytes: &[u8]) -> Result<Message> {
    let options = bincode::DefaultOptions::new().with_limit(MAX_DATAGRAM_SIZE as u64);
    Ok(options.deserialize(bytes)?)
}
