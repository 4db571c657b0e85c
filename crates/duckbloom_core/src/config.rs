use crate::hash::Addressing;
use crate::storage::MapFlags;
use serde::{Deserialize, Serialize};

/// Knobs beyond `(path, size, hash_count)`.
///
/// The hints only affect how the storage backing lays out and faults in the
/// region. `addressing` changes which bits an item maps to and must match
/// between every open of the same file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterOptions {
    #[serde(default)]
    pub addressing: Addressing,
    pub random_access: bool,
    pub preallocate: bool,
    pub prefault: bool,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            addressing: Addressing::Compatible,
            random_access: true,
            preallocate: true,
            prefault: true,
        }
    }
}

impl FilterOptions {
    pub fn map_flags(&self, exclusive: bool) -> MapFlags {
        MapFlags {
            create: true,
            exclusive,
            random_access: self.random_access,
            preallocate: self.preallocate,
            prefault: self.prefault,
        }
    }
}
