//! # Lnwire
//!
//! Peripheral TLV encoding for opaque extension data.
//!
//! Responsibilities:
//! - BigSize varints with canonical-encoding checks
//! - Typed and raw TLV records
//! - `ExtraOpaqueData`: pack records into a stream, extract them back out
//! - Partition of a type map into official and custom ranges

mod bigsize;
mod error;
mod extra_data;
mod record;
mod wire_map;

pub use bigsize::{bigsize_len, read_bigsize, write_bigsize};
pub use error::TlvError;
pub use extra_data::{merge_and_encode, parse_and_extract_custom_records, ExtraOpaqueData};
pub use record::{Primitive, PrimitiveRecord, RawRecord, RecordProducer, RecordSink, TypeMap};
pub use wire_map::{WireTlvMap, MIN_CUSTOM_RECORDS_TLV_TYPE};
