//! Optional `<file>.meta.json` sidecar recording how a filter file was made.
//!
//! The filter file itself stays headerless; the sidecar only saves callers
//! from carrying `size` / `hash_count` / addressing around out of band.

use crate::consts::META_SUFFIX;
use crate::errors::Result;
use crate::filter::BloomFilter;
use crate::hash::Addressing;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterMeta {
    pub size: usize,
    pub hash_count: u32,
    #[serde(default)]
    pub addressing: Addressing,
}

impl FilterMeta {
    pub fn of(filter: &BloomFilter) -> Self {
        Self { size: filter.size(), hash_count: filter.hash_count(), addressing: filter.addressing() }
    }

    pub fn path_for(filter_path: &Path) -> PathBuf {
        let mut s: OsString = filter_path.as_os_str().to_owned();
        s.push(META_SUFFIX);
        PathBuf::from(s)
    }

    /// `Ok(None)` when no sidecar exists.
    pub fn load(filter_path: &Path) -> Result<Option<Self>> {
        let p = Self::path_for(filter_path);
        if !p.exists() {
            return Ok(None);
        }
        let f = File::open(p)?;
        Ok(Some(serde_json::from_reader(BufReader::new(f))?))
    }

    /// Write via a temp file in the same directory and rename over the target.
    pub fn save_atomic(&self, filter_path: &Path) -> Result<()> {
        let p = Self::path_for(filter_path);
        let dir = match p.parent() {
            Some(d) if !d.as_os_str().is_empty() => d,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::Builder::new().prefix(".duckbloom_meta_").tempfile_in(dir)?;
        tmp.as_file_mut().write_all(serde_json::to_string_pretty(self)?.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&p)?;
        Ok(())
    }

    pub fn remove(filter_path: &Path) -> Result<()> {
        let p = Self::path_for(filter_path);
        if p.exists() {
            fs::remove_file(p)?;
        }
        Ok(())
    }
}
