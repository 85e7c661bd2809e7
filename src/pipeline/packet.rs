//! Wire-ready packets.

use bytes::Bytes;

use crate::error::SerializeError;

/// An immutable, length-bounded byte buffer ready for publishing.
///
/// Cloning is cheap: the payload is reference counted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    payload: Bytes,
}

impl Packet {
    /// Wrap `payload`, rejecting anything longer than `max_len`.
    ///
    /// # Errors
    ///
    /// Returns [`SerializeError::TooLarge`] if the payload exceeds `max_len`.
    pub fn new(payload: impl Into<Bytes>, max_len: usize) -> Result<Self, SerializeError> {
        let payload = payload.into();
        if payload.len() > max_len {
            return Err(SerializeError::TooLarge {
                len: payload.len(),
                max: max_len,
            });
        }
        Ok(Self { payload })
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_bytes(self) -> Bytes {
        self.payload
    }
}
