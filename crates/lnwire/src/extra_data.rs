//! ExtraOpaqueData - trailing TLV bytes of a wire message

use std::fmt;

use bytes::{Buf, BufMut, Bytes};
use tracing::trace;

use crate::bigsize::{bigsize_len, read_bigsize, write_bigsize};
use crate::error::TlvError;
use crate::record::{RawRecord, RecordProducer, RecordSink, TypeMap};
use crate::wire_map::{WireTlvMap, MIN_CUSTOM_RECORDS_TLV_TYPE};

/// Opaque trailing bytes holding a TLV stream.
///
/// Encoding writes the bytes as-is; decoding consumes everything left in
/// the buffer.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ExtraOpaqueData(Bytes);

impl ExtraOpaqueData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_slice(&self.0);
    }

    pub fn decode<B: Buf>(buf: &mut B) -> Self {
        Self(buf.copy_to_bytes(buf.remaining()))
    }

    /// Replace the contents with `records`, sorted by type.
    ///
    /// # Errors
    /// `DuplicateType` if two records share a type; the contents are left
    /// unchanged.
    pub fn pack_records(&mut self, records: &[&dyn RecordProducer]) -> Result<(), TlvError> {
        let mut sorted: Vec<&dyn RecordProducer> = records.to_vec();
        sorted.sort_by_key(|r| r.record_type());

        for pair in sorted.windows(2) {
            if pair[0].record_type() == pair[1].record_type() {
                return Err(TlvError::DuplicateType(pair[0].record_type()));
            }
        }

        let mut stream = Vec::new();
        let mut value = Vec::new();
        for record in sorted {
            value.clear();
            record.encode_value(&mut value);

            write_bigsize(&mut stream, record.record_type());
            write_bigsize(&mut stream, value.len() as u64);
            stream.extend_from_slice(&value);
        }

        self.0 = Bytes::from(stream);
        Ok(())
    }

    /// Build from a decoded type map
    pub fn from_type_map(map: &TypeMap) -> Self {
        let mut stream = Vec::with_capacity(
            map.iter()
                .map(|(t, v)| bigsize_len(*t) + bigsize_len(v.len() as u64) + v.len())
                .sum(),
        );
        for (record_type, value) in map {
            write_bigsize(&mut stream, *record_type);
            write_bigsize(&mut stream, value.len() as u64);
            stream.extend_from_slice(value);
        }
        Self(Bytes::from(stream))
    }

    /// Decode the stream, filling every sink whose type is present.
    ///
    /// Returns every record found, including types no sink asked for.
    pub fn extract_records(
        &self,
        sinks: &mut [&mut dyn RecordSink],
    ) -> Result<TypeMap, TlvError> {
        let map = decode_stream(&self.0)?;

        for sink in sinks.iter_mut() {
            if let Some(value) = map.get(&sink.record_type()) {
                sink.decode_value(value)?;
            }
        }

        trace!(records = map.len(), "extracted tlv records");
        Ok(map)
    }

    /// Records in the custom range only
    pub fn custom_records(&self) -> Result<TypeMap, TlvError> {
        let mut map = decode_stream(&self.0)?;
        Ok(map.split_off(&MIN_CUSTOM_RECORDS_TLV_TYPE))
    }

    /// Check the stream decodes without keeping the result
    pub fn validate_tlv(&self) -> Result<(), TlvError> {
        decode_stream(&self.0).map(|_| ())
    }
}

impl fmt::Debug for ExtraOpaqueData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExtraOpaqueData(")?;
        for byte in self.0.iter() {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}

impl From<&TypeMap> for ExtraOpaqueData {
    fn from(map: &TypeMap) -> Self {
        Self::from_type_map(map)
    }
}

/// Split extra data into custom records and the remaining official stream
pub fn parse_and_extract_custom_records(
    extra: &ExtraOpaqueData,
) -> Result<(TypeMap, ExtraOpaqueData), TlvError> {
    let map = decode_stream(extra.as_bytes())?;
    let (official, custom) = WireTlvMap::new(map).into_parts();
    Ok((custom, ExtraOpaqueData::from_type_map(&official)))
}

/// Encode known records, existing extra data and custom records into one
/// stream.
///
/// # Errors
/// `DuplicateType` if any type appears in more than one source, or
/// `InvalidValue` if a custom record sits below the custom range.
pub fn merge_and_encode(
    known: &[&dyn RecordProducer],
    extra: &ExtraOpaqueData,
    custom: &TypeMap,
) -> Result<ExtraOpaqueData, TlvError> {
    if let Some(&below) = custom.range(..MIN_CUSTOM_RECORDS_TLV_TYPE).next().map(|(t, _)| t) {
        return Err(TlvError::invalid_value(
            below,
            "custom record type below the custom range",
        ));
    }

    let existing = RawRecord::from_type_map(&decode_stream(extra.as_bytes())?);
    let customs = RawRecord::from_type_map(custom);

    let mut all: Vec<&dyn RecordProducer> = known.to_vec();
    all.extend(existing.iter().map(|r| r as &dyn RecordProducer));
    all.extend(customs.iter().map(|r| r as &dyn RecordProducer));

    let mut merged = ExtraOpaqueData::new();
    merged.pack_records(&all)?;
    Ok(merged)
}

fn decode_stream(mut input: &[u8]) -> Result<TypeMap, TlvError> {
    let mut map = TypeMap::new();
    let mut prev: Option<u64> = None;

    while input.has_remaining() {
        let record_type = read_bigsize(&mut input)?;
        match prev {
            Some(p) if p == record_type => return Err(TlvError::DuplicateType(record_type)),
            Some(p) if p > record_type => {
                return Err(TlvError::UnsortedTypes {
                    prev: p,
                    next: record_type,
                })
            }
            _ => {}
        }
        prev = Some(record_type);

        let length = read_bigsize(&mut input)?;
        if length > input.remaining() as u64 {
            return Err(TlvError::LengthOverflow {
                record_type,
                length,
                remaining: input.remaining(),
            });
        }

        let (value, rest) = input.split_at(length as usize);
        map.insert(record_type, value.to_vec());
        input = rest;
    }

    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::PrimitiveRecord;
    use proptest::prelude::*;

    #[test]
    fn test_empty_roundtrip() {
        let extra = ExtraOpaqueData::new();
        let mut buf = Vec::new();
        extra.encode(&mut buf);
        assert!(buf.is_empty());

        let decoded = ExtraOpaqueData::decode(&mut buf.as_slice());
        assert!(decoded.is_empty());
        assert!(decoded.extract_records(&mut []).unwrap().is_empty());
    }

    #[test]
    fn test_pack_and_extract_into_sinks() {
        let channel_type = PrimitiveRecord::new(1, 2u8);
        let hop = PrimitiveRecord::new(2, 99u32);

        let mut extra = ExtraOpaqueData::new();
        extra.pack_records(&[&channel_type, &hop]).unwrap();

        let mut channel_sink = PrimitiveRecord::<u8>::sink(1);
        let mut hop_sink = PrimitiveRecord::<u32>::sink(2);
        let map = extra
            .extract_records(&mut [&mut channel_sink, &mut hop_sink])
            .unwrap();

        assert_eq!(*channel_sink.value(), 2);
        assert_eq!(*hop_sink.value(), 99);
        assert!(map.contains_key(&1));
        assert!(map.contains_key(&2));
    }

    #[test]
    fn test_pack_order_independent_and_replaces() {
        let r1 = PrimitiveRecord::new(1, b"recordBytes1".to_vec());
        let r2 = PrimitiveRecord::new(2, b"recordBytes2".to_vec());
        let r3 = PrimitiveRecord::new(3, b"recordBytes3".to_vec());

        let mut extra = ExtraOpaqueData::new();
        extra.pack_records(&[&r1, &r2]).unwrap();
        let map = extra.extract_records(&mut []).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map[&1], b"recordBytes1");

        extra.pack_records(&[&r3, &r1, &r2]).unwrap();
        let map = extra.extract_records(&mut []).unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(map[&2], b"recordBytes2");
        assert_eq!(map[&3], b"recordBytes3");
    }

    #[test]
    fn test_custom_and_official_passthrough() {
        let custom = RawRecord::new(70000, &b"custom"[..]);
        let official = RawRecord::new(1, &b"official"[..]);

        let mut extra = ExtraOpaqueData::new();
        extra.pack_records(&[&custom, &official]).unwrap();

        let map = extra.extract_records(&mut []).unwrap();
        assert_eq!(map.keys().copied().collect::<Vec<_>>(), vec![1, 70000]);
        assert_eq!(map[&70000], b"custom");

        let wire = WireTlvMap::new(map);
        assert_eq!(wire.official_types().len(), 1);
        assert!(wire.official_types().contains_key(&1));
        assert_eq!(wire.custom_types().len(), 1);
        assert!(wire.custom_types().contains_key(&70000));

        let customs = extra.custom_records().unwrap();
        assert_eq!(customs.keys().copied().collect::<Vec<_>>(), vec![70000]);
    }

    #[test]
    fn test_duplicate_pack_rejected() {
        let a = PrimitiveRecord::new(5, 1u8);
        let b = PrimitiveRecord::new(5, 2u8);
        let mut extra = ExtraOpaqueData::from_bytes(&b"\x01\x00"[..]);

        assert_eq!(
            extra.pack_records(&[&a, &b]),
            Err(TlvError::DuplicateType(5))
        );
        assert_eq!(extra.as_bytes(), b"\x01\x00");
    }

    #[test]
    fn test_malformed_streams() {
        // type 2 then type 1
        let unsorted = ExtraOpaqueData::from_bytes(&[2u8, 0, 1, 0][..]);
        assert_eq!(
            unsorted.validate_tlv(),
            Err(TlvError::UnsortedTypes { prev: 2, next: 1 })
        );

        let duplicate = ExtraOpaqueData::from_bytes(&[1u8, 0, 1, 0][..]);
        assert_eq!(duplicate.validate_tlv(), Err(TlvError::DuplicateType(1)));

        let overflow = ExtraOpaqueData::from_bytes(&[1u8, 5, 0xaa][..]);
        assert!(matches!(
            overflow.validate_tlv(),
            Err(TlvError::LengthOverflow { record_type: 1, length: 5, .. })
        ));
    }

    #[test]
    fn test_parse_and_merge_custom_records() {
        let map = TypeMap::from([
            (1, b"a".to_vec()),
            (65536, b"b".to_vec()),
            (70000, b"c".to_vec()),
        ]);
        let extra = ExtraOpaqueData::from_type_map(&map);

        let (custom, official) = parse_and_extract_custom_records(&extra).unwrap();
        assert_eq!(custom.len(), 2);
        assert_eq!(official.extract_records(&mut []).unwrap().len(), 1);

        let known = PrimitiveRecord::new(3, 7u16);
        let merged = merge_and_encode(&[&known], &official, &custom).unwrap();
        let all = merged.extract_records(&mut []).unwrap();
        assert_eq!(all.keys().copied().collect::<Vec<_>>(), vec![1, 3, 65536, 70000]);

        let clash = PrimitiveRecord::new(1, 0u8);
        assert_eq!(
            merge_and_encode(&[&clash], &official, &custom),
            Err(TlvError::DuplicateType(1))
        );

        let bad_custom = TypeMap::from([(10, Vec::new())]);
        assert!(matches!(
            merge_and_encode(&[], &official, &bad_custom),
            Err(TlvError::InvalidValue { record_type: 10, .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_encode_decode_preserves_bytes(input in proptest::collection::vec(any::<u8>(), 0..1000)) {
            let extra = ExtraOpaqueData::from_bytes(input.clone());
            let mut buf = Vec::new();
            extra.encode(&mut buf);

            let decoded = ExtraOpaqueData::decode(&mut buf.as_slice());
            prop_assert_eq!(decoded.as_bytes(), &input[..]);
        }

        #[test]
        fn prop_pack_then_extract_reproduces_map(
            map in proptest::collection::btree_map(any::<u64>(), proptest::collection::vec(any::<u8>(), 0..64), 0..16)
        ) {
            let records = RawRecord::from_type_map(&map);
            let producers: Vec<&dyn RecordProducer> =
                records.iter().map(|r| r as &dyn RecordProducer).collect();

            let mut extra = ExtraOpaqueData::new();
            extra.pack_records(&producers).unwrap();

            prop_assert_eq!(extra.extract_records(&mut []).unwrap(), map.clone());
            prop_assert_eq!(ExtraOpaqueData::from_type_map(&map), extra);
        }
    }
}
