//! C ABI for duckbloom (`include/duckbloom.h`).
//!
//! A `bloom_ctx` is allocated with `bloom_malloc`, bound to a filter by
//! `bloom_open` / `bloom_create`, and released with `bloom_close` then
//! `bloom_free`. `bloom_close` does not sync.
//!
//! Calls on a NULL or closed context are precondition violations. They never
//! unwind into C: adds do nothing, checks return false, and an error event is
//! logged.

use duckbloom_core::consts::{DIGEST160_LEN, VERSION_MAJOR, VERSION_MINOR};
use duckbloom_core::{Addressing, BloomFilter, MapFlags};
use std::ffi::{c_char, c_int, CStr};
use std::path::PathBuf;
use tracing::{error, warn};

pub use duckbloom_core::consts::{MAP_CR, MAP_EX, MAP_PRE, MAP_RND, MAP_RW, MAP_WILLNEED};

/// Opaque handle behind `bloom_ctx *`.
#[derive(Default)]
pub struct BloomCtx {
    filter: Option<BloomFilter>,
}

unsafe fn live<'a>(ctx: *const BloomCtx, op: &str) -> Option<&'a BloomFilter> {
    let filter = ctx.as_ref().and_then(|c| c.filter.as_ref());
    if filter.is_none() {
        error!(op, "bloom_ctx is NULL or not open");
    }
    filter
}

unsafe fn live_mut<'a>(ctx: *mut BloomCtx, op: &str) -> Option<&'a mut BloomFilter> {
    let filter = ctx.as_mut().and_then(|c| c.filter.as_mut());
    if filter.is_none() {
        error!(op, "bloom_ctx is NULL or not open");
    }
    filter
}

unsafe fn bytes<'a>(data: *const u8, len: usize, op: &str) -> Option<&'a [u8]> {
    if data.is_null() {
        if len == 0 {
            return Some(&[]);
        }
        error!(op, len, "NULL data with nonzero length");
        return None;
    }
    Some(std::slice::from_raw_parts(data, len))
}

unsafe fn path_arg(fname: *const c_char) -> Option<PathBuf> {
    if fname.is_null() {
        return None;
    }
    let raw = CStr::from_ptr(fname);
    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStrExt;
        Some(PathBuf::from(std::ffi::OsStr::from_bytes(raw.to_bytes())))
    }
    #[cfg(not(unix))]
    {
        Some(PathBuf::from(raw.to_string_lossy().into_owned()))
    }
}

/// `(major << 16) | minor`
#[no_mangle]
pub extern "C" fn bloom_version() -> u32 {
    (VERSION_MAJOR << 16) | VERSION_MINOR
}

/// Install a stderr `tracing` subscriber honoring `RUST_LOG`. Safe to call twice.
#[no_mangle]
pub extern "C" fn bloom_log_init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

#[no_mangle]
pub extern "C" fn bloom_malloc() -> *mut BloomCtx {
    Box::into_raw(Box::new(BloomCtx::default()))
}

/// # Safety
/// `ctx` must come from `bloom_malloc` and not have been freed. NULL is ignored.
#[no_mangle]
pub unsafe extern "C" fn bloom_free(ctx: *mut BloomCtx) {
    if !ctx.is_null() {
        drop(Box::from_raw(ctx));
    }
}

/// # Safety
/// `ctx` must be a live context or NULL.
#[no_mangle]
pub unsafe extern "C" fn bloom_sync(ctx: *mut BloomCtx) {
    if let Some(f) = live(ctx, "bloom_sync") {
        if let Err(e) = f.sync() {
            error!(reason = %e, "bloom_sync failed");
        }
    }
}

/// Unmap and close the file without syncing. The context can be reopened.
///
/// # Safety
/// `ctx` must be a live context or NULL.
#[no_mangle]
pub unsafe extern "C" fn bloom_close(ctx: *mut BloomCtx) {
    match ctx.as_mut().and_then(|c| c.filter.take()) {
        Some(f) => f.close(),
        None => error!(op = "bloom_close", "bloom_ctx is NULL or not open"),
    }
}

/// Open with explicit `MAP_*` flags. Returns 0 on success, -1 on error.
///
/// A context that is still open is closed first, unsynced, so after a failed
/// call the context is closed.
///
/// # Safety
/// `ctx` must be a live context; `fname` NULL or a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn _bloom_open_create(
    ctx: *mut BloomCtx,
    fname: *const c_char,
    size: usize,
    hashcount: c_int,
    flags: c_int,
) -> c_int {
    let Some(ctx) = ctx.as_mut() else {
        error!("_bloom_open_create on NULL bloom_ctx");
        return -1;
    };
    if let Some(previous) = ctx.filter.take() {
        warn!(
            path = ?previous.path(),
            "bloom_ctx already open; closing the previous filter without sync"
        );
        previous.close();
    }
    let flags = match MapFlags::from_bits(flags as u32) {
        Ok(f) => f,
        Err(e) => {
            error!(reason = %e, "bad bloom flags");
            return -1;
        }
    };
    let path = path_arg(fname);
    let rounds = hashcount.max(0) as u32;
    match BloomFilter::open_with(path.as_deref(), size, rounds, flags, Addressing::Compatible) {
        Ok(f) => {
            ctx.filter = Some(f);
            0
        }
        // the engine has already logged the cause
        Err(_) => -1,
    }
}

/// Exclusive create. Returns 0 on success, -1 on error.
///
/// # Safety
/// See [`_bloom_open_create`].
#[no_mangle]
pub unsafe extern "C" fn bloom_create(ctx: *mut BloomCtx, fname: *const c_char, size: usize, hashcount: c_int) -> c_int {
    _bloom_open_create(ctx, fname, size, hashcount, MapFlags::create().bits() as c_int)
}

/// Open, creating the file if needed; NULL `fname` gives an in-memory filter.
/// Returns 0 on success, -1 on error.
///
/// # Safety
/// See [`_bloom_open_create`].
#[no_mangle]
pub unsafe extern "C" fn bloom_open(ctx: *mut BloomCtx, fname: *const c_char, size: usize, hashcount: c_int) -> c_int {
    _bloom_open_create(ctx, fname, size, hashcount, MapFlags::open().bits() as c_int)
}

/// # Safety
/// `data` must point to 20 readable bytes.
#[no_mangle]
pub unsafe extern "C" fn bloom_add160(ctx: *mut BloomCtx, data: *const u8) {
    bloom_add(ctx, data, DIGEST160_LEN)
}

/// # Safety
/// `data` must point to `len` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn bloom_add(ctx: *mut BloomCtx, data: *const u8, len: usize) {
    if let (Some(f), Some(item)) = (live_mut(ctx, "bloom_add"), bytes(data, len, "bloom_add")) {
        f.add(item);
    }
}

/// # Safety
/// `data` must point to 20 readable bytes.
#[no_mangle]
pub unsafe extern "C" fn bloom_check160(ctx: *mut BloomCtx, data: *const u8) -> bool {
    bloom_check(ctx, data, DIGEST160_LEN)
}

/// # Safety
/// `data` must point to `len` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn bloom_check(ctx: *mut BloomCtx, data: *const u8, len: usize) -> bool {
    match (live(ctx, "bloom_check"), bytes(data, len, "bloom_check")) {
        (Some(f), Some(item)) => f.check(item),
        _ => false,
    }
}
