//! Validated status snapshots
//!
//! A [`StatusBuffer`] only exists once its bytes have passed the variant's
//! sentinel check, so holding one is proof that the data was well-formed when
//! it was received.

use crate::error::{Result, TbanError};
use crate::variant::Variant;

/// Read access to cached status bytes, by variant and absolute index
///
/// Implemented by the hardware status cache; the register table reads
/// through this trait so it never touches I/O.
pub trait StatusSource {
    fn status_byte(&self, variant: Variant, index: usize) -> Result<u8>;
}

/// Fixed-size snapshot of one variant's status vector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusBuffer {
    variant: Variant,
    bytes: Box<[u8]>,
}

impl StatusBuffer {
    /// Build a snapshot from bytes read off the wire
    ///
    /// The wire response may be longer than the stored buffer (the mini
    /// variant keeps only a 128-byte prefix of the 285-byte response).
    pub fn from_wire(variant: Variant, wire: &[u8]) -> Result<Self> {
        let len = variant.buffer_len();
        if wire.len() < len {
            return Err(TbanError::CorruptData(variant));
        }
        let bytes = &wire[..len];
        variant.validate(bytes)?;
        Ok(Self {
            variant,
            bytes: bytes.into(),
        })
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Byte at `index`, failing instead of panicking past the end
    pub fn get(&self, index: usize) -> Result<u8> {
        self.bytes
            .get(index)
            .copied()
            .ok_or(TbanError::IndexOutOfBounds {
                what: "status buffer",
                index,
                count: self.bytes.len(),
            })
    }

    /// Sentinel predicate over the stored bytes
    pub fn is_present(&self) -> bool {
        self.variant.validate(&self.bytes).is_ok()
    }
}

/// Parse a whitespace-separated list of decimal byte values
///
/// This is the capture format used for offline replays of a device: one
/// value per token, in buffer order. Parsing stops at the first non-numeric
/// token.
pub fn parse_capture(text: &str) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    for token in text.split_whitespace() {
        if !token.starts_with(|c: char| c.is_ascii_digit()) {
            break;
        }
        let value = token.parse::<u8>().map_err(|e| {
            TbanError::InvalidInput(format!("Invalid capture byte '{}': {}", token, e))
        })?;
        bytes.push(value);
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(len: usize) -> Vec<u8> {
        let mut buf: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        buf[0] = 100;
        buf
    }

    #[test]
    fn test_from_wire_base() {
        let raw = wire(285);
        let status = StatusBuffer::from_wire(Variant::Base, &raw).unwrap();
        assert_eq!(status.len(), 285);
        assert_eq!(status.get(4).unwrap(), 4);
        assert_eq!(status.as_bytes(), &raw[..]);
        assert!(status.is_present());
    }

    #[test]
    fn test_from_wire_mini_keeps_prefix() {
        let mut raw = wire(285);
        raw[1] = 253;
        raw[62] = 254;
        let status = StatusBuffer::from_wire(Variant::Mini, &raw).unwrap();
        assert_eq!(status.len(), 128);
        assert_eq!(status.as_bytes(), &raw[..128]);
    }

    #[test]
    fn test_from_wire_rejects_bad_sentinel() {
        let mut raw = wire(285);
        raw[0] = 0;
        assert!(matches!(
            StatusBuffer::from_wire(Variant::Big, &raw),
            Err(TbanError::CorruptData(Variant::Big))
        ));
    }

    #[test]
    fn test_from_wire_rejects_short_response() {
        let raw = wire(100);
        assert!(StatusBuffer::from_wire(Variant::Base, &raw).is_err());
    }

    #[test]
    fn test_get_past_end() {
        let status = StatusBuffer::from_wire(Variant::Base, &wire(285)).unwrap();
        match status.get(285) {
            Err(TbanError::IndexOutOfBounds { index, count, .. }) => {
                assert_eq!(index, 285);
                assert_eq!(count, 285);
            }
            other => panic!("Expected IndexOutOfBounds, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_capture() {
        let bytes = parse_capture("100 0 7\n255\t12 end 9").unwrap();
        assert_eq!(bytes, vec![100, 0, 7, 255, 12]);
    }

    #[test]
    fn test_parse_capture_out_of_range() {
        assert!(matches!(
            parse_capture("100 256"),
            Err(TbanError::InvalidInput(_))
        ));
    }
}
