//! Official / custom partition of a TLV type map

use crate::record::TypeMap;

/// First TLV type reserved for custom (application-defined) records
pub const MIN_CUSTOM_RECORDS_TLV_TYPE: u64 = 65536;

/// A type map split at `MIN_CUSTOM_RECORDS_TLV_TYPE`.
///
/// Every input type lands in exactly one half.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WireTlvMap {
    official_types: TypeMap,
    custom_types: TypeMap,
}

impl WireTlvMap {
    pub fn new(mut map: TypeMap) -> Self {
        let custom_types = map.split_off(&MIN_CUSTOM_RECORDS_TLV_TYPE);
        Self {
            official_types: map,
            custom_types,
        }
    }

    /// Types below the custom range
    pub fn official_types(&self) -> &TypeMap {
        &self.official_types
    }

    /// Types at or above `MIN_CUSTOM_RECORDS_TLV_TYPE`
    pub fn custom_types(&self) -> &TypeMap {
        &self.custom_types
    }

    pub fn len(&self) -> usize {
        self.official_types.len() + self.custom_types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(official, custom)`
    pub fn into_parts(self) -> (TypeMap, TypeMap) {
        (self.official_types, self.custom_types)
    }
}
