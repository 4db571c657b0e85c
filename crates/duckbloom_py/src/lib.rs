use duckbloom_core::params::is_power_of_two;
use duckbloom_core::{BloomError, BloomFilter, FilterParams, DIGEST160_LEN};
use pyo3::exceptions::{PyIOError, PyTypeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyByteArray, PyBytes, PyString};
use std::path::PathBuf;

fn to_py_err(e: BloomError) -> PyErr {
    match e {
        BloomError::NotPowerOfTwo { .. } | BloomError::SizeMismatch { .. } | BloomError::InvalidInput(_) => {
            PyValueError::new_err(e.to_string())
        }
        _ => PyIOError::new_err(e.to_string()),
    }
}

/// Minimal big-endian two's-complement encoding; 0 encodes as no bytes.
fn signed_be_bytes(v: i64) -> Vec<u8> {
    let raw = v.to_be_bytes();
    let mut start = 0;
    while start < raw.len() {
        let next_high = raw.get(start + 1).map(|b| b & 0x80 != 0);
        let redundant = match (raw[start], next_high) {
            (0x00, Some(false)) | (0x00, None) => true,
            (0xff, Some(true)) => true,
            _ => false,
        };
        if !redundant {
            break;
        }
        start += 1;
    }
    raw[start..].to_vec()
}

/// Why a `Bloom(...)` argument set was refused.
#[derive(Debug, PartialEq)]
enum ParamError {
    SizeMismatch { given: usize, on_disk: usize },
    NeedSize,
    NeedHashcount,
    NotPowerOfTwo(usize),
    Plan(String),
}

impl ParamError {
    fn into_py(self) -> PyErr {
        match self {
            ParamError::SizeMismatch { given, on_disk } => PyValueError::new_err(format!(
                "Size of bloom file doesn't match supplied size argument ({on_disk} != {given})"
            )),
            ParamError::NeedSize => PyTypeError::new_err("Must specify n and p if not specifying size"),
            ParamError::NeedHashcount => PyTypeError::new_err("Must specify hashcount, n or p"),
            ParamError::NotPowerOfTwo(_) => PyValueError::new_err("Size must be power of 2"),
            ParamError::Plan(msg) => PyValueError::new_err(msg),
        }
    }
}

/// Settle `(size, hashcount)` from the constructor arguments and the length
/// of an existing file. Sizing and rounds follow the wrapper's `size * 8`
/// bit count so files it made reopen with the same `k`.
fn resolve_params(
    size: Option<usize>,
    on_disk: Option<usize>,
    hashcount: Option<u32>,
    n: Option<u64>,
    p: Option<f64>,
) -> Result<(usize, u32), ParamError> {
    if let (Some(given), Some(on_disk)) = (size, on_disk) {
        if given != on_disk {
            return Err(ParamError::SizeMismatch { given, on_disk });
        }
    }

    let size = match size.or(on_disk) {
        Some(s) => s,
        None => match (n, p) {
            (Some(n), Some(p)) => FilterParams::plan_classic(n, p).map_err(|e| ParamError::Plan(e.to_string()))?.size,
            _ => return Err(ParamError::NeedSize),
        },
    };
    if !is_power_of_two(size) {
        return Err(ParamError::NotPowerOfTwo(size));
    }

    let hashcount = match (hashcount, n, p) {
        (Some(k), _, _) => k,
        (None, Some(n), _) => FilterParams::classic_hash_count(size, n),
        (None, None, Some(p)) => FilterParams::hash_count_for_rate(p).map_err(|e| ParamError::Plan(e.to_string()))?,
        (None, None, None) => return Err(ParamError::NeedHashcount),
    };
    Ok((size, hashcount))
}

fn item_bytes(thing: &Bound<'_, PyAny>) -> PyResult<Vec<u8>> {
    if let Ok(b) = thing.downcast::<PyBytes>() {
        return Ok(b.as_bytes().to_vec());
    }
    if let Ok(b) = thing.downcast::<PyByteArray>() {
        return Ok(b.to_vec());
    }
    if let Ok(s) = thing.downcast::<PyString>() {
        return Ok(s.to_cow()?.as_bytes().to_vec());
    }
    Ok(signed_be_bytes(thing.hash()? as i64))
}

fn digest160(thing: &Bound<'_, PyAny>, op: &str) -> PyResult<[u8; DIGEST160_LEN]> {
    let raw = if let Ok(b) = thing.downcast::<PyBytes>() {
        b.as_bytes().to_vec()
    } else if let Ok(b) = thing.downcast::<PyByteArray>() {
        b.to_vec()
    } else {
        return Err(PyTypeError::new_err(format!("{op} requires bytes or bytearray")));
    };
    as_digest160(&raw).ok_or_else(|| PyValueError::new_err(format!("{op} requires 20-Byte bytes/bytearray")))
}

fn as_digest160(raw: &[u8]) -> Option<[u8; DIGEST160_LEN]> {
    <[u8; DIGEST160_LEN]>::try_from(raw).ok()
}

/// Bloom filter over a memory-mapped file (or anonymous memory when `fname` is None).
///
/// Either pass `size` (bytes, power of two) or `n` and `p`; `hashcount` is
/// derived from `n` or `p` when omitted. Leaving a `with` block syncs.
#[pyclass(name = "Bloom", module = "duckbloom_py")]
pub struct Bloom {
    fname: Option<PathBuf>,
    size: usize,
    hashcount: u32,
    inner: Option<BloomFilter>,
}

impl Bloom {
    fn filter(&self) -> PyResult<&BloomFilter> {
        self.inner.as_ref().ok_or_else(|| PyValueError::new_err("operation on closed Bloom"))
    }

    fn filter_mut(&mut self) -> PyResult<&mut BloomFilter> {
        self.inner.as_mut().ok_or_else(|| PyValueError::new_err("operation on closed Bloom"))
    }
}

#[pymethods]
impl Bloom {
    #[new]
    #[pyo3(signature = (fname=None, size=None, hashcount=None, n=None, p=None))]
    fn new(
        fname: Option<PathBuf>,
        size: Option<usize>,
        hashcount: Option<u32>,
        n: Option<u64>,
        p: Option<f64>,
    ) -> PyResult<Self> {
        let on_disk = fname
            .as_ref()
            .and_then(|f| std::fs::metadata(f).ok())
            .map(|m| m.len() as usize)
            .filter(|&len| len > 0);
        let (size, hashcount) = resolve_params(size, on_disk, hashcount, n, p).map_err(ParamError::into_py)?;

        let inner = match &fname {
            Some(f) => BloomFilter::open(f, size, hashcount),
            None => BloomFilter::in_memory(size, hashcount),
        }
        .map_err(to_py_err)?;

        Ok(Self { fname, size, hashcount, inner: Some(inner) })
    }

    #[getter]
    fn size(&self) -> usize {
        self.size
    }

    #[getter]
    fn hashcount(&self) -> u32 {
        self.hashcount
    }

    #[getter]
    fn closed(&self) -> bool {
        self.inner.is_none()
    }

    fn __repr__(&self) -> String {
        let fname = self.fname.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "None".into());
        format!("Bloom(fname={fname}, size={}-Bytes, hashcount={})", self.size, self.hashcount)
    }

    fn __enter__(slf: PyRef<'_, Self>) -> PyRef<'_, Self> {
        slf
    }

    #[pyo3(signature = (_exc_type=None, _exc_value=None, _traceback=None))]
    fn __exit__(
        &self,
        _exc_type: Option<&Bound<'_, PyAny>>,
        _exc_value: Option<&Bound<'_, PyAny>>,
        _traceback: Option<&Bound<'_, PyAny>>,
    ) -> PyResult<bool> {
        self.sync()?;
        Ok(false)
    }

    fn sync(&self) -> PyResult<()> {
        self.filter()?.sync().map_err(to_py_err)
    }

    /// Unmap without syncing. Later calls raise ValueError.
    fn close(&mut self) {
        if let Some(f) = self.inner.take() {
            f.close();
        }
    }

    /// Is thing in the bloom filter
    fn check(&self, thing: &Bound<'_, PyAny>) -> PyResult<bool> {
        let item = item_bytes(thing)?;
        Ok(self.filter()?.check(&item))
    }

    fn check160(&self, thing: &Bound<'_, PyAny>) -> PyResult<bool> {
        let digest = digest160(thing, "check160")?;
        Ok(self.filter()?.check160(&digest))
    }

    fn add(&mut self, thing: &Bound<'_, PyAny>) -> PyResult<()> {
        let item = item_bytes(thing)?;
        self.filter_mut()?.add(&item);
        Ok(())
    }

    fn add160(&mut self, thing: &Bound<'_, PyAny>) -> PyResult<()> {
        let digest = digest160(thing, "add160")?;
        self.filter_mut()?.add160(&digest);
        Ok(())
    }
}

#[pymodule]
fn duckbloom_py(_py: Python<'_>, m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<Bloom>()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_encoding_is_minimal_twos_complement() {
        // same bytes as h.to_bytes((h.bit_length() + 7) // 8, "big", signed=True)
        // where that fits; 128 needs the extra sign byte
        assert_eq!(signed_be_bytes(0), Vec::<u8>::new());
        assert_eq!(signed_be_bytes(-1), vec![0xff]);
        assert_eq!(signed_be_bytes(127), vec![0x7f]);
        assert_eq!(signed_be_bytes(128), vec![0x00, 0x80]);
        assert_eq!(signed_be_bytes(-128), vec![0x80]);
        assert_eq!(signed_be_bytes(-129), vec![0xff, 0x7f]);
        assert_eq!(signed_be_bytes(i64::MIN), vec![0x80, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(signed_be_bytes(i64::MAX), vec![0x7f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn digests_must_be_exactly_twenty_bytes() {
        assert_eq!(as_digest160(&[7u8; 20]), Some([7u8; 20]));
        assert_eq!(as_digest160(&[7u8; 19]), None);
        assert_eq!(as_digest160(&[7u8; 21]), None);
        assert_eq!(as_digest160(b""), None);
    }

    #[test]
    fn planned_from_n_and_p() {
        assert_eq!(resolve_params(None, None, None, Some(1000), Some(1e-6)), Ok((4096, 23)));
        assert_eq!(resolve_params(None, None, Some(5), Some(1000), Some(1e-6)), Ok((4096, 5)));
    }

    #[test]
    fn existing_file_reopens_with_the_same_rounds() {
        // a 4096-byte file made with n=1000, p=1e-6
        assert_eq!(resolve_params(None, Some(4096), None, Some(1000), Some(1e-6)), Ok((4096, 23)));
        assert_eq!(resolve_params(Some(4096), Some(4096), None, Some(1000), None), Ok((4096, 23)));
    }

    #[test]
    fn rounds_from_p_alone() {
        assert_eq!(resolve_params(Some(1024), None, None, None, Some(1e-6)), Ok((1024, 20)));
    }

    #[test]
    fn refused_argument_sets() {
        assert_eq!(
            resolve_params(Some(2048), Some(4096), Some(3), None, None),
            Err(ParamError::SizeMismatch { given: 2048, on_disk: 4096 })
        );
        assert_eq!(resolve_params(None, None, Some(3), Some(10), None), Err(ParamError::NeedSize));
        assert_eq!(resolve_params(Some(1024), None, None, None, None), Err(ParamError::NeedHashcount));
        assert_eq!(resolve_params(Some(1000), None, Some(3), None, None), Err(ParamError::NotPowerOfTwo(1000)));
        assert!(matches!(resolve_params(None, None, None, Some(10), Some(2.0)), Err(ParamError::Plan(_))));
        assert!(matches!(resolve_params(Some(64), None, None, None, Some(0.0)), Err(ParamError::Plan(_))));
    }
}
