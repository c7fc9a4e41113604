//! TLV records
//!
//! A `RecordProducer` encodes one value under its type; a `RecordSink`
//! receives the raw value of its type during extraction.

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::error::TlvError;

/// Decoded stream contents: type -> raw value bytes
pub type TypeMap = BTreeMap<u64, Vec<u8>>;

/// Something that can be packed as a single TLV record
pub trait RecordProducer {
    fn record_type(&self) -> u64;

    /// Append the value bytes (without type or length)
    fn encode_value(&self, buf: &mut Vec<u8>);
}

/// Destination for one record type during extraction
pub trait RecordSink {
    fn record_type(&self) -> u64;

    fn decode_value(&mut self, value: &[u8]) -> Result<(), TlvError>;
}

/// Fixed-width and byte-string values
pub trait Primitive: Sized {
    fn encode(&self, buf: &mut Vec<u8>);

    fn decode(value: &[u8]) -> Option<Self>;
}

macro_rules! impl_primitive_int {
    ($($ty:ty),*) => {
        $(
            impl Primitive for $ty {
                fn encode(&self, buf: &mut Vec<u8>) {
                    buf.extend_from_slice(&self.to_be_bytes());
                }

                fn decode(value: &[u8]) -> Option<Self> {
                    value.try_into().ok().map(<$ty>::from_be_bytes)
                }
            }
        )*
    };
}

impl_primitive_int!(u8, u16, u32, u64);

impl Primitive for Vec<u8> {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self);
    }

    fn decode(value: &[u8]) -> Option<Self> {
        Some(value.to_vec())
    }
}

impl Primitive for [u8; 32] {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self);
    }

    fn decode(value: &[u8]) -> Option<Self> {
        value.try_into().ok()
    }
}

/// A typed record usable both for packing and as an extraction sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimitiveRecord<T> {
    record_type: u64,
    value: T,
}

impl<T: Primitive> PrimitiveRecord<T> {
    pub fn new(record_type: u64, value: T) -> Self {
        Self { record_type, value }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

impl<T: Primitive + Default> PrimitiveRecord<T> {
    /// Empty sink for `record_type`
    pub fn sink(record_type: u64) -> Self {
        Self::new(record_type, T::default())
    }
}

impl<T: Primitive> RecordProducer for PrimitiveRecord<T> {
    fn record_type(&self) -> u64 {
        self.record_type
    }

    fn encode_value(&self, buf: &mut Vec<u8>) {
        self.value.encode(buf);
    }
}

impl<T: Primitive> RecordSink for PrimitiveRecord<T> {
    fn record_type(&self) -> u64 {
        self.record_type
    }

    fn decode_value(&mut self, value: &[u8]) -> Result<(), TlvError> {
        self.value = T::decode(value).ok_or_else(|| {
            TlvError::invalid_value(
                self.record_type,
                format!("unexpected length {}", value.len()),
            )
        })?;
        Ok(())
    }
}

/// An opaque record carried as raw bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub record_type: u64,
    pub value: Bytes,
}

impl RawRecord {
    pub fn new(record_type: u64, value: impl Into<Bytes>) -> Self {
        Self {
            record_type,
            value: value.into(),
        }
    }

    /// One raw record per map entry
    pub fn from_type_map(map: &TypeMap) -> Vec<Self> {
        map.iter()
            .map(|(t, v)| Self::new(*t, Bytes::copy_from_slice(v)))
            .collect()
    }
}

impl RecordProducer for RawRecord {
    fn record_type(&self) -> u64 {
        self.record_type
    }

    fn encode_value(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_sink_rejects_wrong_width() {
        let mut sink = PrimitiveRecord::<u32>::sink(2);
        assert!(sink.decode_value(&[0, 0, 0, 99]).is_ok());
        assert_eq!(*sink.value(), 99);

        assert!(matches!(
            sink.decode_value(&[1, 2]),
            Err(TlvError::InvalidValue { record_type: 2, .. })
        ));
    }

    #[test]
    fn test_raw_record_from_map() {
        let map = TypeMap::from([(1, b"a".to_vec()), (70000, b"b".to_vec())]);
        let records = RawRecord::from_type_map(&map);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].record_type, 70000);
        assert_eq!(&records[1].value[..], b"b");
    }
}
