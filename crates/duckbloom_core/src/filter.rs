//! Persistent, memory-mapped bloom filter.
//!
//! The filter is a flat array of `size` bytes with no header. `size` and
//! `hash_count` (and the [`Addressing`] scheme) are not recorded in the file;
//! callers must supply the same values on every open.
//!
//! Lifecycle: [`BloomFilter::create`] / [`BloomFilter::open`] map the region,
//! [`BloomFilter::add`] only ever sets bits, [`BloomFilter::sync`] makes the
//! file durable, and [`BloomFilter::close`] unmaps. `close` does **not** sync;
//! call `sync` first if the writes must survive a crash.
//!
//! Concurrency: [`BloomFilter::add`] takes `&mut self` and does a plain
//! read-modify-write per byte. To share one filter across threads, use
//! [`BloomFilter::add_atomic`], which sets bits with an atomic `fetch_or`.
//! Writers in other processes mapping the same file are not coordinated.

use crate::config::FilterOptions;
use crate::consts::DIGEST160_LEN;
use crate::errors::{display_path, Result};
use crate::hash::{Addressing, BitPositions};
use crate::params::validate_size;
use crate::storage::{MapFlags, MappedRegion};
use std::path::Path;
use std::sync::atomic::Ordering;
use tracing::{debug, error};

#[derive(Debug)]
pub struct BloomFilter {
    region: MappedRegion,
    size: usize,
    hash_count: u32,
    addressing: Addressing,
}

impl BloomFilter {
    /// Exclusively create a new file-backed filter. Fails if `path` exists.
    pub fn create(path: impl AsRef<Path>, size: usize, hash_count: u32) -> Result<Self> {
        Self::create_with(Some(path.as_ref()), size, hash_count, &FilterOptions::default())
    }

    /// Open `path`, creating it if absent. Existing bits are kept.
    pub fn open(path: impl AsRef<Path>, size: usize, hash_count: u32) -> Result<Self> {
        Self::open_with_options(Some(path.as_ref()), size, hash_count, &FilterOptions::default())
    }

    /// A filter over anonymous memory; its contents vanish on close.
    pub fn in_memory(size: usize, hash_count: u32) -> Result<Self> {
        Self::open_with_options(None, size, hash_count, &FilterOptions::default())
    }

    pub fn create_with(path: Option<&Path>, size: usize, hash_count: u32, options: &FilterOptions) -> Result<Self> {
        Self::open_with(path, size, hash_count, options.map_flags(true), options.addressing)
    }

    pub fn open_with_options(path: Option<&Path>, size: usize, hash_count: u32, options: &FilterOptions) -> Result<Self> {
        Self::open_with(path, size, hash_count, options.map_flags(false), options.addressing)
    }

    /// Validate `size`, then map it with explicit storage flags.
    ///
    /// A `hash_count` of zero is accepted: `add` becomes a no-op and `check`
    /// always answers true.
    pub fn open_with(
        path: Option<&Path>,
        size: usize,
        hash_count: u32,
        flags: MapFlags,
        addressing: Addressing,
    ) -> Result<Self> {
        if let Err(e) = validate_size(size) {
            error!(size, "bloom filter size is non-power-of-two");
            return Err(e);
        }
        let region = match MappedRegion::map(path, size, flags) {
            Ok(r) => r,
            Err(e) => {
                error!(path = %display_path(path), size, reason = %e, "can't open/create bloom file");
                return Err(e);
            }
        };
        debug!(path = %display_path(path), size, hash_count, ?addressing, "bloom filter open");
        Ok(Self { region, size, hash_count, addressing })
    }

    #[inline]
    fn positions<'a>(&self, item: &'a [u8]) -> BitPositions<'a> {
        BitPositions::new(item, self.hash_count, self.size, self.addressing)
    }

    /// Set the item's `hash_count` bits.
    pub fn add(&mut self, item: &[u8]) {
        let positions = self.positions(item);
        let bytes = self.region.as_mut_slice();
        for (idx, bit) in positions {
            bytes[idx] |= bit;
        }
    }

    pub fn add160(&mut self, digest: &[u8; DIGEST160_LEN]) {
        self.add(digest)
    }

    /// Like [`add`](Self::add), but through a shared borrow using atomic bit-sets,
    /// so concurrent adders never lose each other's bits within a byte.
    pub fn add_atomic(&self, item: &[u8]) {
        let bytes = self.region.atomic_bytes();
        for (idx, bit) in self.positions(item) {
            bytes[idx].fetch_or(bit, Ordering::Relaxed);
        }
    }

    /// True when every one of the item's bits is set. Never false for an added item.
    pub fn check(&self, item: &[u8]) -> bool {
        let bytes = self.region.atomic_bytes();
        self.positions(item).all(|(idx, bit)| bytes[idx].load(Ordering::Relaxed) & bit != 0)
    }

    pub fn check160(&self, digest: &[u8; DIGEST160_LEN]) -> bool {
        self.check(digest)
    }

    /// Flush the mapping and fsync the backing file. No-op for in-memory filters.
    pub fn sync(&self) -> Result<()> {
        self.region.flush()?;
        debug!(path = %display_path(self.path()), "bloom filter synced");
        Ok(())
    }

    /// Unmap and release the file. Does not sync.
    pub fn close(self) {
        debug!(path = %display_path(self.path()), "bloom filter closed");
        drop(self.region);
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn hash_count(&self) -> u32 {
        self.hash_count
    }

    pub fn addressing(&self) -> Addressing {
        self.addressing
    }

    pub fn path(&self) -> Option<&Path> {
        self.region.path()
    }

    pub fn is_file_backed(&self) -> bool {
        self.region.is_file_backed()
    }

    /// Number of set bits in the region.
    pub fn count_ones(&self) -> u64 {
        self.region
            .atomic_bytes()
            .iter()
            .map(|b| b.load(Ordering::Relaxed).count_ones() as u64)
            .sum()
    }

    /// A copy of the raw filter bytes.
    pub fn to_vec(&self) -> Vec<u8> {
        self.region.atomic_bytes().iter().map(|b| b.load(Ordering::Relaxed)).collect()
    }
}
