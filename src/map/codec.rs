//! Key and value codecs for big collections.
//!
//! Keys use compact hand-written encodings for the built-in types. Integer
//! encodings are order-preserving (sign-flip plus big-endian) so that ordered
//! collections iterate in numeric order when their encoded keys are compared
//! as bytes. Everything else goes through the generic serde fallback.
//!
//! Values always go through serde via bincode, optionally wrapped in a zstd
//! frame when the engine is configured with compression. A one-byte marker
//! distinguishes raw from compressed values so mixed data reads back
//! correctly.

use std::hash::Hash;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{StoreError, StoreResult};

/// Constant for flipping the sign bit of an `i64`.
const SIGN_FLIP_I64: u64 = 0x8000_0000_0000_0000;

/// Constant for flipping the sign bit of an `i32`.
const SIGN_FLIP_I32: u32 = 0x8000_0000;

/// Frame marker for uncompressed values.
const FRAME_RAW: u8 = 0x00;

/// Frame marker for zstd-compressed values.
const FRAME_ZSTD: u8 = 0x01;

/// zstd compression level used for value frames.
const COMPRESSION_LEVEL: i32 = 3;

/// A key type storable in a big collection.
///
/// Implementations must be injective: two unequal keys must never encode to
/// the same bytes. The built-in implementations are also order-preserving,
/// so ordered collections iterate in the natural order of the key type.
///
/// Custom key types can implement this via the serde fallback:
///
/// ```ignore
/// impl BigKey for MyKey {
///     fn encode_key(&self, buf: &mut Vec<u8>) {
///         buf.extend_from_slice(&encode_fallback(self).expect("infallible"));
///     }
///     fn decode_key(bytes: &[u8]) -> StoreResult<Self> {
///         decode_fallback(bytes)
///     }
/// }
/// ```
pub trait BigKey: Clone + Eq + Hash + Ord + Send + Sync + 'static {
    /// Append the encoded form of `self` to `buf`.
    fn encode_key(&self, buf: &mut Vec<u8>);

    /// Decode a key from its encoded form.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Serialization`] if the bytes are malformed.
    fn decode_key(bytes: &[u8]) -> StoreResult<Self>;
}

/// A value type storable in a big collection.
///
/// Blanket-implemented for every serde-serializable type.
pub trait BigValue: Clone + Send + Sync + 'static {
    /// Encode the value to bytes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Serialization`] on encoding failure.
    fn encode_value(&self) -> StoreResult<Vec<u8>>;

    /// Decode a value from bytes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Serialization`] if the bytes are malformed.
    fn decode_value(bytes: &[u8]) -> StoreResult<Self>;
}

impl<T> BigValue for T
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    fn encode_value(&self) -> StoreResult<Vec<u8>> {
        bincode::serialize(self).map_err(StoreError::codec)
    }

    fn decode_value(bytes: &[u8]) -> StoreResult<Self> {
        bincode::deserialize(bytes).map_err(StoreError::codec)
    }
}

impl BigKey for i64 {
    fn encode_key(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&((*self as u64) ^ SIGN_FLIP_I64).to_be_bytes());
    }

    fn decode_key(bytes: &[u8]) -> StoreResult<Self> {
        let raw: [u8; 8] = bytes
            .try_into()
            .map_err(|_| StoreError::codec("expected 8 bytes for i64 key"))?;
        Ok((u64::from_be_bytes(raw) ^ SIGN_FLIP_I64) as Self)
    }
}

impl BigKey for i32 {
    fn encode_key(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&((*self as u32) ^ SIGN_FLIP_I32).to_be_bytes());
    }

    fn decode_key(bytes: &[u8]) -> StoreResult<Self> {
        let raw: [u8; 4] = bytes
            .try_into()
            .map_err(|_| StoreError::codec("expected 4 bytes for i32 key"))?;
        Ok((u32::from_be_bytes(raw) ^ SIGN_FLIP_I32) as Self)
    }
}

impl BigKey for u64 {
    fn encode_key(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_be_bytes());
    }

    fn decode_key(bytes: &[u8]) -> StoreResult<Self> {
        let raw: [u8; 8] = bytes
            .try_into()
            .map_err(|_| StoreError::codec("expected 8 bytes for u64 key"))?;
        Ok(Self::from_be_bytes(raw))
    }
}

impl BigKey for u32 {
    fn encode_key(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_be_bytes());
    }

    fn decode_key(bytes: &[u8]) -> StoreResult<Self> {
        let raw: [u8; 4] = bytes
            .try_into()
            .map_err(|_| StoreError::codec("expected 4 bytes for u32 key"))?;
        Ok(Self::from_be_bytes(raw))
    }
}

impl BigKey for bool {
    fn encode_key(&self, buf: &mut Vec<u8>) {
        buf.push(u8::from(*self));
    }

    fn decode_key(bytes: &[u8]) -> StoreResult<Self> {
        match bytes {
            [0] => Ok(false),
            [1] => Ok(true),
            _ => Err(StoreError::codec("expected a single 0/1 byte for bool key")),
        }
    }
}

impl BigKey for String {
    fn encode_key(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.as_bytes());
    }

    fn decode_key(bytes: &[u8]) -> StoreResult<Self> {
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(StoreError::codec)
    }
}

impl BigKey for Vec<u8> {
    fn encode_key(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self);
    }

    fn decode_key(bytes: &[u8]) -> StoreResult<Self> {
        Ok(bytes.to_vec())
    }
}

/// Encode an arbitrary serde type for use in a custom [`BigKey`] impl.
///
/// The fallback encoding is compact but not order-preserving; ordered
/// collections keyed this way iterate in encoded-byte order.
///
/// # Errors
///
/// Returns [`StoreError::Serialization`] on encoding failure.
pub fn encode_fallback<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    bincode::serialize(value).map_err(StoreError::codec)
}

/// Decode an arbitrary serde type encoded by [`encode_fallback`].
///
/// # Errors
///
/// Returns [`StoreError::Serialization`] if the bytes are malformed.
pub fn decode_fallback<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    bincode::deserialize(bytes).map_err(StoreError::codec)
}

/// Encode a key to owned bytes.
pub(crate) fn key_bytes<K: BigKey>(key: &K) -> Vec<u8> {
    let mut buf = Vec::new();
    key.encode_key(&mut buf);
    buf
}

/// Frame already-encoded bytes, compressing when requested.
pub(crate) fn frame_bytes(bytes: &[u8], compressed: bool) -> StoreResult<Vec<u8>> {
    if compressed {
        let packed = zstd::encode_all(bytes, COMPRESSION_LEVEL).map_err(StoreError::codec)?;
        let mut framed = Vec::with_capacity(packed.len() + 1);
        framed.push(FRAME_ZSTD);
        framed.extend_from_slice(&packed);
        Ok(framed)
    } else {
        let mut framed = Vec::with_capacity(bytes.len() + 1);
        framed.push(FRAME_RAW);
        framed.extend_from_slice(bytes);
        Ok(framed)
    }
}

/// Unframe bytes produced by [`frame_bytes`].
pub(crate) fn unframe_bytes(framed: &[u8]) -> StoreResult<Vec<u8>> {
    match framed.split_first() {
        Some((&FRAME_RAW, rest)) => Ok(rest.to_vec()),
        Some((&FRAME_ZSTD, rest)) => zstd::decode_all(rest).map_err(StoreError::codec),
        _ => Err(StoreError::codec("missing value frame marker")),
    }
}

/// Encode and frame a value in one step.
pub(crate) fn value_bytes<V: BigValue>(value: &V, compressed: bool) -> StoreResult<Vec<u8>> {
    frame_bytes(&value.encode_value()?, compressed)
}

/// Unframe and decode a value in one step.
pub(crate) fn value_from_bytes<V: BigValue>(framed: &[u8]) -> StoreResult<V> {
    V::decode_value(&unframe_bytes(framed)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded<K: BigKey>(key: &K) -> Vec<u8> {
        key_bytes(key)
    }

    #[test]
    fn test_int_keys_round_trip() {
        for n in [i64::MIN, -1, 0, 1, i64::MAX] {
            assert_eq!(i64::decode_key(&encoded(&n)).unwrap(), n);
        }
        for n in [i32::MIN, -1, 0, 1, i32::MAX] {
            assert_eq!(i32::decode_key(&encoded(&n)).unwrap(), n);
        }
    }

    #[test]
    fn test_int_keys_preserve_order() {
        let values = [i64::MIN, -100, -1, 0, 1, 100, i64::MAX];
        let mut keys: Vec<Vec<u8>> = values.iter().map(encoded).collect();
        let sorted = keys.clone();
        keys.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn test_string_keys_preserve_order() {
        let a = encoded(&"a".to_string());
        let aa = encoded(&"aa".to_string());
        let b = encoded(&"b".to_string());
        assert!(a < aa);
        assert!(aa < b);
    }

    #[test]
    fn test_bool_key_round_trip() {
        assert!(!bool::decode_key(&encoded(&false)).unwrap());
        assert!(bool::decode_key(&encoded(&true)).unwrap());
        assert!(bool::decode_key(b"xx").is_err());
    }

    #[test]
    fn test_value_round_trip() {
        let value = vec!["alpha".to_string(), "beta".to_string()];
        let bytes = value_bytes(&value, false).unwrap();
        let back: Vec<String> = value_from_bytes(&bytes).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_compressed_value_round_trip() {
        let value = "granary ".repeat(100);
        let framed = value_bytes(&value, true).unwrap();
        // Highly repetitive data must actually shrink.
        assert!(framed.len() < value.encode_value().unwrap().len());
        let back: String = value_from_bytes(&framed).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_mixed_frames_read_back() {
        let value = 42u64;
        let raw = value_bytes(&value, false).unwrap();
        let packed = value_bytes(&value, true).unwrap();
        assert_eq!(value_from_bytes::<u64>(&raw).unwrap(), 42);
        assert_eq!(value_from_bytes::<u64>(&packed).unwrap(), 42);
    }

    #[test]
    fn test_fallback_round_trip() {
        #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
        struct Pair(u16, u16);
        let bytes = encode_fallback(&Pair(3, 7)).unwrap();
        assert_eq!(decode_fallback::<Pair>(&bytes).unwrap(), Pair(3, 7));
    }
}
