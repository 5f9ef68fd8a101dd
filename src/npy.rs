//! Positional access into `.npy` files.
//!
//! Whole arrays are written and read with `ndarray-npy`. The stores also need
//! to touch one clip's worth of data at a time, so this module reads the
//! header written by `ndarray-npy` to find where the raw data starts and then
//! does offset-based reads and writes of little-endian `f32` elements.
//!
//! `ndarray-npy` only offers partial access through `ViewNpyExt` and
//! `ViewMutNpyExt`, which work on a memory-mapped byte slice. This crate does
//! not memory-map its stores, so the header is parsed here instead and data is
//! moved with positional file reads and writes.

use std::fs::{File, OpenOptions};
use std::path::Path;

use crate::{Error, Result};

const MAGIC: &[u8; 6] = b"\x93NUMPY";
const F32_DESCR: &str = "<f4";

/// Parsed `.npy` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NpyHeader {
    pub descr: String,
    pub fortran_order: bool,
    pub shape: Vec<usize>,
    /// Byte offset of the first element.
    pub data_offset: u64,
}

impl NpyHeader {
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An open `.npy` file of little-endian `f32` elements.
#[derive(Debug)]
pub struct NpyFile {
    file: File,
    header: NpyHeader,
}

impl NpyFile {
    /// Open an existing array read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::from_file(path.as_ref(), file)
    }

    /// Open an existing array for positional writes.
    pub fn open_rw(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path.as_ref())?;
        Self::from_file(path.as_ref(), file)
    }

    fn from_file(path: &Path, file: File) -> Result<Self> {
        let header = read_header(path, &file)?;
        if header.descr != F32_DESCR {
            return Err(Error::format(
                path,
                format!("expected dtype {F32_DESCR}, found {}", header.descr),
            ));
        }
        let expected_len = header.data_offset + 4 * header.len() as u64;
        let actual_len = file.metadata()?.len();
        if actual_len < expected_len {
            return Err(Error::format(
                path,
                format!("file holds {actual_len} bytes, header needs {expected_len}"),
            ));
        }
        Ok(Self { file, header })
    }

    pub fn header(&self) -> &NpyHeader {
        &self.header
    }

    pub fn shape(&self) -> &[usize] {
        &self.header.shape
    }

    /// Read `out.len()` elements starting at flat element index `start`.
    pub fn read_at(&self, start: usize, out: &mut [f32]) -> Result<()> {
        self.check_range(start, out.len())?;
        let mut bytes = vec![0u8; out.len() * 4];
        read_exact_at(&self.file, &mut bytes, self.byte_offset(start))?;
        for (dst, chunk) in out.iter_mut().zip(bytes.chunks_exact(4)) {
            *dst = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Ok(())
    }

    /// Write `data` starting at flat element index `start`.
    ///
    /// Takes `&self`: positional writes do not share a cursor, so callers may
    /// write disjoint ranges from several threads.
    pub fn write_at(&self, start: usize, data: &[f32]) -> Result<()> {
        self.check_range(start, data.len())?;
        let mut bytes = Vec::with_capacity(data.len() * 4);
        for v in data {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        write_all_at(&self.file, &bytes, self.byte_offset(start))?;
        Ok(())
    }

    /// Flush written data to disk.
    pub fn sync(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    fn byte_offset(&self, start: usize) -> u64 {
        self.header.data_offset + 4 * start as u64
    }

    fn check_range(&self, start: usize, len: usize) -> Result<()> {
        let total = self.header.len();
        if start.checked_add(len).is_none_or(|end| end > total) {
            return Err(Error::shape(
                format!("element range within 0..{total}"),
                format!("{start}..{}", start.saturating_add(len)),
            ));
        }
        Ok(())
    }
}

fn read_header(path: &Path, file: &File) -> Result<NpyHeader> {
    let mut preamble = [0u8; 12];
    read_exact_at(file, &mut preamble[..10], 0)
        .map_err(|_| Error::format(path, "file is too short for an npy header"))?;
    if &preamble[..6] != MAGIC {
        return Err(Error::format(path, "missing npy magic string"));
    }

    let major = preamble[6];
    let (header_len, prefix_len) = match major {
        1 => (u16::from_le_bytes([preamble[8], preamble[9]]) as usize, 10u64),
        2 | 3 => {
            read_exact_at(file, &mut preamble[10..12], 10)?;
            let len = u32::from_le_bytes([preamble[8], preamble[9], preamble[10], preamble[11]]);
            (len as usize, 12u64)
        }
        v => return Err(Error::format(path, format!("unsupported npy version {v}"))),
    };

    let mut dict = vec![0u8; header_len];
    read_exact_at(file, &mut dict, prefix_len)?;
    let dict = String::from_utf8(dict)
        .map_err(|_| Error::format(path, "npy header is not valid text"))?;

    let (descr, fortran_order, shape) =
        parse_header_dict(&dict).map_err(|reason| Error::format(path, reason))?;

    Ok(NpyHeader {
        descr,
        fortran_order,
        shape,
        data_offset: prefix_len + header_len as u64,
    })
}

/// Parse the Python dict literal of an npy header, e.g.
/// `{'descr': '<f4', 'fortran_order': False, 'shape': (3, 4), }`.
fn parse_header_dict(dict: &str) -> std::result::Result<(String, bool, Vec<usize>), String> {
    let value_after = |key: &str| -> std::result::Result<&str, String> {
        let pattern = format!("'{key}':");
        let at = dict
            .find(&pattern)
            .ok_or_else(|| format!("header has no '{key}' entry"))?;
        Ok(dict[at + pattern.len()..].trim_start())
    };

    let descr = value_after("descr")?;
    let descr = descr
        .strip_prefix('\'')
        .and_then(|s| s.split('\'').next())
        .ok_or("malformed 'descr' entry")?
        .to_string();

    let fortran = value_after("fortran_order")?;
    let fortran_order = if fortran.starts_with("True") {
        true
    } else if fortran.starts_with("False") {
        false
    } else {
        return Err("malformed 'fortran_order' entry".to_string());
    };

    let shape = value_after("shape")?;
    let inner = shape
        .strip_prefix('(')
        .and_then(|s| s.split(')').next())
        .ok_or("malformed 'shape' entry")?;
    let shape = inner
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<usize>().map_err(|e| format!("bad shape dimension {s:?}: {e}")))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok((descr, fortran_order, shape))
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(unix)]
fn write_all_at(file: &File, buf: &[u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset)? {
            0 => return Err(std::io::ErrorKind::UnexpectedEof.into()),
            n => {
                let rest = buf;
                buf = &mut rest[n..];
                offset += n as u64;
            }
        }
    }
    Ok(())
}

#[cfg(windows)]
fn write_all_at(file: &File, mut buf: &[u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_write(buf, offset)? {
            0 => return Err(std::io::ErrorKind::WriteZero.into()),
            n => {
                buf = &buf[n..];
                offset += n as u64;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3, Dim};
    use ndarray_npy::{read_npy, write_npy, write_zeroed_npy};

    #[test]
    fn test_parse_header_dict() {
        let (descr, fortran, shape) =
            parse_header_dict("{'descr': '<f4', 'fortran_order': False, 'shape': (3, 4), }")
                .unwrap();
        assert_eq!(descr, "<f4");
        assert!(!fortran);
        assert_eq!(shape, vec![3, 4]);

        let (_, fortran, shape) =
            parse_header_dict("{'descr': '<f4', 'fortran_order': True, 'shape': (7,), }").unwrap();
        assert!(fortran);
        assert_eq!(shape, vec![7]);

        let (_, _, shape) =
            parse_header_dict("{'descr': '<f4', 'fortran_order': False, 'shape': (), }").unwrap();
        assert!(shape.is_empty());
    }

    #[test]
    fn test_parse_header_dict_missing_key() {
        assert!(parse_header_dict("{'descr': '<f4', 'shape': (3,), }").is_err());
    }

    #[test]
    fn test_positional_write_then_read_npy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zeros.npy");
        write_zeroed_npy::<f32, _>(&std::fs::File::create(&path).unwrap(), Dim([2, 3, 4])).unwrap();

        let file = NpyFile::open_rw(&path).unwrap();
        assert_eq!(file.shape(), &[2, 3, 4]);
        assert!(!file.header().fortran_order);

        file.write_at(12, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        file.sync().unwrap();

        let arr: Array3<f32> = read_npy(&path).unwrap();
        assert_eq!(arr[(1, 0, 0)], 1.0);
        assert_eq!(arr[(1, 0, 3)], 4.0);
        assert_eq!(arr[(0, 2, 3)], 0.0);

        let mut back = [0.0f32; 4];
        file.read_at(12, &mut back).unwrap();
        assert_eq!(back, [1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_out_of_range_access() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.npy");
        write_zeroed_npy::<f32, _>(&std::fs::File::create(&path).unwrap(), Dim([4])).unwrap();
        let file = NpyFile::open_rw(&path).unwrap();
        assert!(matches!(
            file.write_at(2, &[0.0; 3]),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_rejects_other_dtypes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f64.npy");
        write_npy(&path, &Array2::<f64>::zeros((2, 2))).unwrap();
        assert!(matches!(NpyFile::open(&path), Err(Error::Format { .. })));
    }
}
