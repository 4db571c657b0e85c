// crates/duckbloom_core/src/consts.rs

pub const VERSION_MAJOR: u32 = 0;
pub const VERSION_MINOR: u32 = 3;

/// Length of the fixed-size items taken by `add160` / `check160`.
pub const DIGEST160_LEN: usize = 20;

/// Suffix appended to a filter path to name its metadata sidecar.
pub const META_SUFFIX: &str = ".meta.json";

// Storage flag bits, as passed through `_bloom_open_create`.
pub const MAP_RW: u32 = 0x01;
pub const MAP_CR: u32 = 0x02;
pub const MAP_EX: u32 = 0x04;
pub const MAP_RND: u32 = 0x08;
pub const MAP_PRE: u32 = 0x10;
pub const MAP_WILLNEED: u32 = 0x20;
