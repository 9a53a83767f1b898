//! Minimal reader/writer for the NumPy `.npy` matrices the ETL emits.
//!
//! Only 2-D, C-ordered, little-endian `f4`/`f8` arrays are supported; that
//! is what `np.save` produces for an embedding matrix. `f8` data is narrowed
//! to `f32` on load.
//!
//! Layout:
//! - 6 bytes: magic `\x93NUMPY`
//! - 2 bytes: format version (major, minor)
//! - 2 bytes (v1) or 4 bytes (v2/v3): header length, LE
//! - header: a Python dict literal padded with spaces and a trailing `\n`
//! - row-major element data

use std::{io::Write, path::Path};

use crate::error::{Error, Result};

const MAGIC: &[u8; 6] = b"\x93NUMPY";

/// Header plus magic/version/length prefix must be a multiple of this.
const HEADER_ALIGN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dtype {
    F32,
    F64,
}

impl Dtype {
    fn parse(descr: &str) -> Result<Self> {
        match descr {
            "<f4" | "f4" => Ok(Self::F32),
            "<f8" | "f8" => Ok(Self::F64),
            other => Err(Error::Config(format!(
                "unsupported npy dtype '{other}' (expected '<f4' or '<f8')"
            ))),
        }
    }

    fn size(self) -> usize {
        match self {
            Self::F32 => 4,
            Self::F64 => 8,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
struct Header {
    dtype: Dtype,
    rows: usize,
    cols: usize,
}

/// Read a 2-D float matrix, returning `(rows, cols, row-major data)`.
pub fn read_f32(path: &Path) -> Result<(usize, usize, Vec<f32>)> {
    let bytes = std::fs::read(path)?;
    parse_f32(&bytes)
}

/// Parse an in-memory `.npy` buffer.
pub fn parse_f32(bytes: &[u8]) -> Result<(usize, usize, Vec<f32>)> {
    if bytes.len() < 10 || &bytes[..6] != MAGIC {
        return Err(Error::Config("not an npy file (bad magic)".into()));
    }

    let major = bytes[6];
    let (header_len, header_start) = match major {
        1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
        2 | 3 => {
            if bytes.len() < 12 {
                return Err(Error::Config("truncated npy header".into()));
            }
            let len = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
            (len as usize, 12)
        }
        v => {
            return Err(Error::Config(format!(
                "unsupported npy format version {v}"
            )));
        }
    };

    let data_start = header_start + header_len;
    if bytes.len() < data_start {
        return Err(Error::Config("truncated npy header".into()));
    }
    let header_text = std::str::from_utf8(&bytes[header_start..data_start])
        .map_err(|_| Error::Config("npy header is not valid UTF-8".into()))?;
    let header = parse_header(header_text)?;

    let payload = &bytes[data_start..];
    let expected = header
        .rows
        .checked_mul(header.cols)
        .and_then(|n| n.checked_mul(header.dtype.size()))
        .ok_or_else(|| Error::Config("npy shape overflows".into()))?;
    if payload.len() != expected {
        return Err(Error::Config(format!(
            "npy payload is {} bytes, expected {expected} for shape ({}, {})",
            payload.len(),
            header.rows,
            header.cols
        )));
    }

    let data = match header.dtype {
        Dtype::F32 => bytemuck::pod_collect_to_vec::<u8, f32>(payload),
        Dtype::F64 => bytemuck::pod_collect_to_vec::<u8, f64>(payload)
            .into_iter()
            .map(|v| v as f32)
            .collect(),
    };

    Ok((header.rows, header.cols, data))
}

fn parse_header(text: &str) -> Result<Header> {
    let descr = dict_value(text, "descr")
        .map(|v| v.trim_matches(|c| c == '\'' || c == '"'))
        .ok_or_else(|| Error::Config("npy header has no 'descr'".into()))?;
    let dtype = Dtype::parse(descr)?;

    if dict_value(text, "fortran_order") == Some("True") {
        return Err(Error::Config(
            "fortran-ordered npy arrays are not supported".into(),
        ));
    }

    let shape = text
        .find("'shape'")
        .and_then(|at| {
            let rest = &text[at..];
            let open = rest.find('(')?;
            let close = rest.find(')')?;
            Some(&rest[open + 1..close])
        })
        .ok_or_else(|| Error::Config("npy header has no 'shape'".into()))?;

    let dims: Vec<usize> = shape
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse().map_err(|_| {
                Error::Config(format!("invalid npy shape component '{s}'"))
            })
        })
        .collect::<Result<_>>()?;

    let &[rows, cols] = dims.as_slice() else {
        return Err(Error::Config(format!(
            "expected a 2-D npy array, got shape ({shape})"
        )));
    };

    Ok(Header { dtype, rows, cols })
}

/// Extract the raw text of a scalar value for `key` in the header dict.
fn dict_value<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    let needle = format!("'{key}'");
    let after_key = &text[text.find(&needle)? + needle.len()..];
    let after_colon = &after_key[after_key.find(':')? + 1..];
    let end = after_colon.find(',').unwrap_or(after_colon.len());
    Some(after_colon[..end].trim())
}

/// Write a row-major `f32` matrix as a version 1.0 `.npy` file.
pub fn write_f32(path: &Path, rows: usize, cols: usize, data: &[f32]) -> Result<()> {
    if rows.checked_mul(cols) != Some(data.len()) {
        return Err(Error::Config(format!(
            "data length {} does not match shape ({rows}, {cols})",
            data.len()
        )));
    }

    let mut header =
        format!("{{'descr': '<f4', 'fortran_order': False, 'shape': ({rows}, {cols}), }}");
    let unpadded = MAGIC.len() + 4 + header.len() + 1;
    let padding = (HEADER_ALIGN - unpadded % HEADER_ALIGN) % HEADER_ALIGN;
    header.extend(std::iter::repeat_n(' ', padding));
    header.push('\n');

    let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
    file.write_all(MAGIC)?;
    file.write_all(&[1, 0])?;
    file.write_all(&(header.len() as u16).to_le_bytes())?;
    file.write_all(header.as_bytes())?;
    file.write_all(bytemuck::cast_slice(data))?;
    file.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("emb.npy");
        let data: Vec<f32> = (0..12).map(|i| i as f32 * 0.5).collect();

        write_f32(&path, 3, 4, &data).unwrap();
        let (rows, cols, back) = read_f32(&path).unwrap();

        assert_eq!((rows, cols), (3, 4));
        assert_eq!(back, data);
    }

    #[test]
    fn header_is_aligned() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("emb.npy");
        write_f32(&path, 2, 2, &[1.0, 2.0, 3.0, 4.0]).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
        assert_eq!((10 + header_len) % HEADER_ALIGN, 0);
        assert_eq!(bytes[10 + header_len - 1], b'\n');
    }

    #[test]
    fn reads_f64_payload() {
        let header = "{'descr': '<f8', 'fortran_order': False, 'shape': (1, 2), }\n";
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&[1, 0]);
        bytes.extend_from_slice(&(header.len() as u16).to_le_bytes());
        bytes.extend_from_slice(header.as_bytes());
        bytes.extend_from_slice(&1.5f64.to_le_bytes());
        bytes.extend_from_slice(&(-2.0f64).to_le_bytes());

        let (rows, cols, data) = parse_f32(&bytes).unwrap();
        assert_eq!((rows, cols), (1, 2));
        assert_eq!(data, vec![1.5, -2.0]);
    }

    #[test]
    fn rejects_bad_magic() {
        let err = parse_f32(b"NOTNUMPY\x00\x00").unwrap_err();
        assert!(err.to_string().contains("bad magic"));
    }

    #[test]
    fn rejects_unsupported_dtype() {
        let err = parse_header("{'descr': '<i8', 'fortran_order': False, 'shape': (2, 2), }")
            .unwrap_err();
        assert!(err.to_string().contains("unsupported npy dtype"));
    }

    #[test]
    fn rejects_fortran_order() {
        let err = parse_header("{'descr': '<f4', 'fortran_order': True, 'shape': (2, 2), }")
            .unwrap_err();
        assert!(err.to_string().contains("fortran"));
    }

    #[test]
    fn rejects_one_dimensional_shape() {
        let err = parse_header("{'descr': '<f4', 'fortran_order': False, 'shape': (4,), }")
            .unwrap_err();
        assert!(err.to_string().contains("2-D"));
    }

    #[test]
    fn rejects_truncated_payload() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("emb.npy");
        write_f32(&path, 2, 2, &[1.0, 2.0, 3.0, 4.0]).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        bytes.truncate(bytes.len() - 4);
        let err = parse_f32(&bytes).unwrap_err();
        assert!(err.to_string().contains("payload"));
    }

    #[test]
    fn rejects_shape_that_overflows() {
        let header =
            "{'descr': '<f4', 'fortran_order': False, 'shape': (4611686018427387904, 8), }\n";
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&[1, 0]);
        bytes.extend_from_slice(&(header.len() as u16).to_le_bytes());
        bytes.extend_from_slice(header.as_bytes());

        let err = parse_f32(&bytes).unwrap_err();
        assert!(err.to_string().contains("npy shape overflows"));
    }

    #[test]
    fn write_rejects_shape_mismatch() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("emb.npy");
        assert!(write_f32(&path, 2, 3, &[1.0]).is_err());
    }
}
