//! Mapped storage backing: a writable region of exactly `size` bytes, backed
//! by a named file or by anonymous memory.
//!
//! The region is owned by a single `MappedRegion`; dropping it unmaps the
//! memory and closes the file. Nothing here flushes implicitly, durability
//! is only guaranteed after [`MappedRegion::flush`].

use crate::consts::{MAP_CR, MAP_EX, MAP_PRE, MAP_RND, MAP_RW, MAP_WILLNEED};
use crate::errors::{display_path, BloomError, Result};
use memmap2::{MmapMut, MmapOptions};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicU8;
use tracing::{debug, warn};

/// Behavioral flags requested from the storage backing.
///
/// Mappings are always read-write; the remaining flags select creation
/// policy and performance hints. Hints may be ignored without affecting
/// correctness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapFlags {
    pub create: bool,
    pub exclusive: bool,
    pub random_access: bool,
    pub preallocate: bool,
    pub prefault: bool,
}

impl MapFlags {
    /// Create-if-missing, with every hint enabled.
    pub fn open() -> Self {
        Self { create: true, exclusive: false, random_access: true, preallocate: true, prefault: true }
    }

    /// Exclusive create, with every hint enabled.
    pub fn create() -> Self {
        Self { exclusive: true, ..Self::open() }
    }

    pub fn bits(&self) -> u32 {
        let mut bits = MAP_RW;
        if self.create {
            bits |= MAP_CR;
        }
        if self.exclusive {
            bits |= MAP_EX;
        }
        if self.random_access {
            bits |= MAP_RND;
        }
        if self.preallocate {
            bits |= MAP_PRE;
        }
        if self.prefault {
            bits |= MAP_WILLNEED;
        }
        bits
    }

    pub fn from_bits(bits: u32) -> Result<Self> {
        if bits & MAP_RW == 0 {
            return Err(BloomError::InvalidInput("bloom mappings must be read-write".into()));
        }
        Ok(Self {
            create: bits & MAP_CR != 0,
            exclusive: bits & MAP_EX != 0,
            random_access: bits & MAP_RND != 0,
            preallocate: bits & MAP_PRE != 0,
            prefault: bits & MAP_WILLNEED != 0,
        })
    }
}

/// A live mapping plus, when file-backed, the file it maps.
#[derive(Debug)]
pub struct MappedRegion {
    map: MmapMut,
    file: Option<File>,
    path: Option<PathBuf>,
}

impl MappedRegion {
    /// Map `size` bytes of `path`, or anonymous memory when `path` is `None`.
    pub fn map(path: Option<&Path>, size: usize, flags: MapFlags) -> Result<Self> {
        match path {
            None => {
                let map = map_anon(size, flags).map_err(|e| BloomError::storage(None, size, e))?;
                Ok(Self { map, file: None, path: None })
            }
            Some(p) => Self::map_file(p, size, flags),
        }
    }

    fn map_file(path: &Path, size: usize, flags: MapFlags) -> Result<Self> {
        let (file, created) = open_file(path, flags).map_err(|e| BloomError::storage(Some(path), size, e))?;

        let mapped = prepare_and_map(path, &file, size, flags);
        match mapped {
            Ok(map) => Ok(Self { map, file: Some(file), path: Some(path.to_path_buf()) }),
            Err(e) => {
                drop(file);
                if created {
                    // leave nothing behind for a failed create
                    let _ = fs::remove_file(path);
                }
                Err(e)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_file_backed(&self) -> bool {
        self.file.is_some()
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.map[..]
    }

    /// The region viewed as atomic bytes, for access through a shared borrow.
    pub fn atomic_bytes(&self) -> &[AtomicU8] {
        let ptr = self.map.as_ptr() as *const AtomicU8;
        // SAFETY: AtomicU8 has the size and alignment of u8, the mapping is
        // `len` bytes long and lives as long as `self`. All access through a
        // shared borrow goes through these atomics.
        unsafe { std::slice::from_raw_parts(ptr, self.map.len()) }
    }

    /// msync the dirty pages, then fsync the file. No-op for anonymous memory.
    pub fn flush(&self) -> io::Result<()> {
        if let Some(file) = &self.file {
            self.map.flush()?;
            file.sync_all()?;
        }
        Ok(())
    }
}

fn open_file(path: &Path, flags: MapFlags) -> io::Result<(File, bool)> {
    let mut opts = OpenOptions::new();
    opts.read(true).write(true);
    if flags.exclusive {
        return Ok((opts.create_new(true).open(path)?, true));
    }
    if !flags.create {
        return Ok((opts.open(path)?, false));
    }
    match opts.clone().create_new(true).open(path) {
        Ok(f) => Ok((f, true)),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok((opts.open(path)?, false)),
        Err(e) => Err(e),
    }
}

fn prepare_and_map(path: &Path, file: &File, size: usize, flags: MapFlags) -> Result<MmapMut> {
    let storage_err = |e| BloomError::storage(Some(path), size, e);

    let current = file.metadata().map_err(storage_err)?.len();
    if current != 0 && current != size as u64 {
        return Err(BloomError::SizeMismatch { path: display_path(Some(path)), expected: size, actual: current });
    }
    if current == 0 {
        file.set_len(size as u64).map_err(storage_err)?;
    }
    if flags.preallocate {
        preallocate(file, size).map_err(storage_err)?;
    }

    let mut opts = MmapOptions::new();
    opts.len(size);
    #[cfg(target_os = "linux")]
    {
        if flags.prefault {
            opts.populate();
        }
    }
    // SAFETY: the file stays open for the life of the mapping; concurrent
    // mappers of the same file are the caller's responsibility.
    let map = unsafe { opts.map_mut(file) }.map_err(storage_err)?;
    advise(&map, flags);
    debug!(path = %path.display(), size, "mapped bloom file");
    Ok(map)
}

fn map_anon(size: usize, flags: MapFlags) -> io::Result<MmapMut> {
    let mut opts = MmapOptions::new();
    opts.len(size);
    #[cfg(target_os = "linux")]
    {
        if flags.prefault {
            opts.populate();
        }
    }
    let map = opts.map_anon()?;
    advise(&map, flags);
    Ok(map)
}

#[cfg(target_os = "linux")]
fn preallocate(file: &File, size: usize) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;
    // SAFETY: plain syscall on a descriptor we own.
    let ret = unsafe { libc::posix_fallocate(file.as_raw_fd(), 0, size as libc::off_t) };
    match ret {
        0 => Ok(()),
        libc::EOPNOTSUPP | libc::EINVAL => {
            debug!(size, "posix_fallocate unsupported here, relying on set_len");
            Ok(())
        }
        errno => Err(io::Error::from_raw_os_error(errno)),
    }
}

#[cfg(not(target_os = "linux"))]
fn preallocate(_file: &File, _size: usize) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn advise(map: &MmapMut, flags: MapFlags) {
    use memmap2::Advice;
    if flags.random_access {
        if let Err(e) = map.advise(Advice::Random) {
            warn!(error = %e, "madvise(RANDOM) failed");
        }
    }
    if flags.prefault {
        if let Err(e) = map.advise(Advice::WillNeed) {
            warn!(error = %e, "madvise(WILLNEED) failed");
        }
    }
}

#[cfg(not(unix))]
fn advise(_map: &MmapMut, _flags: MapFlags) {}
