pub mod config;
pub mod consts;
pub mod errors;
pub mod filter;
pub mod hash;
pub mod params;
pub mod sidecar;
pub mod storage;

pub use config::FilterOptions;
pub use consts::DIGEST160_LEN;
pub use errors::{BloomError, Result};
pub use filter::BloomFilter;
pub use hash::Addressing;
pub use params::{validate_size, FilterParams};
pub use sidecar::FilterMeta;
pub use storage::{MapFlags, MappedRegion};
