//! # NumPy `.npy` Codec
//!
//! Parameter dumps and the layer graph are stored as `.npy` files. This
//! module reads format versions 1.0 to 3.0 for the numeric dtypes (any
//! byte order, C or Fortran layout) into an `ndarray::ArrayD<f64>`, and
//! writes little-endian C-order arrays.

use ndarray::{ArrayD, IxDyn, ShapeBuilder};
use std::fs;
use std::path::Path;

const NPY_MAGIC: &[u8] = b"\x93NUMPY";

// --- Error Type ---
#[derive(thiserror::Error, Debug)]
pub enum NpyError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Not a .npy file (bad magic string)")]
    BadMagic,
    #[error("Unsupported .npy format version {major}.{minor}")]
    UnsupportedVersion { major: u8, minor: u8 },
    #[error("Malformed .npy header: {0}")]
    Header(String),
    #[error("Unsupported dtype descriptor '{0}'")]
    UnsupportedDtype(String),
    #[error("Truncated .npy file: expected {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },
    #[error("ndarray error: {0}")]
    NdarrayError(#[from] ndarray::ShapeError),
}

// --- Dtype ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    fn native() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Float,
    Int,
    UInt,
    Bool,
}

/// A parsed `descr` entry such as `<f4` or `|u1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dtype {
    pub kind: ScalarKind,
    pub size: usize,
    pub order: ByteOrder,
}

impl Dtype {
    /// Parses a NumPy type descriptor. Only fixed-size numeric types are accepted.
    pub fn parse(descr: &str) -> Result<Self, NpyError> {
        let unsupported = || NpyError::UnsupportedDtype(descr.to_string());
        let (order, rest) = match descr.as_bytes().first() {
            Some(b'<') => (ByteOrder::Little, &descr[1..]),
            Some(b'>') => (ByteOrder::Big, &descr[1..]),
            Some(b'|') | Some(b'=') => (ByteOrder::native(), &descr[1..]),
            _ => (ByteOrder::native(), descr),
        };
        let kind = match rest.as_bytes().first() {
            Some(b'f') => ScalarKind::Float,
            Some(b'i') => ScalarKind::Int,
            Some(b'u') => ScalarKind::UInt,
            Some(b'b') => ScalarKind::Bool,
            _ => return Err(unsupported()),
        };
        let size: usize = rest[1..].parse().map_err(|_| unsupported())?;
        match (kind, size) {
            (ScalarKind::Float, 4 | 8)
            | (ScalarKind::Int, 1 | 2 | 4 | 8)
            | (ScalarKind::UInt, 1 | 2 | 4 | 8)
            | (ScalarKind::Bool, 1) => Ok(Dtype { kind, size, order }),
            _ => Err(unsupported()),
        }
    }

    /// Decodes one element. `bytes` holds exactly `self.size` bytes.
    fn decode(&self, bytes: &[u8]) -> f64 {
        macro_rules! read {
            ($t:ty, $n:expr) => {{
                let mut raw = [0u8; $n];
                raw.copy_from_slice(&bytes[..$n]);
                (match self.order {
                    ByteOrder::Little => <$t>::from_le_bytes(raw),
                    ByteOrder::Big => <$t>::from_be_bytes(raw),
                }) as f64
            }};
        }
        match (self.kind, self.size) {
            (ScalarKind::Float, 4) => read!(f32, 4),
            (ScalarKind::Float, 8) => read!(f64, 8),
            (ScalarKind::Int, 1) => bytes[0] as i8 as f64,
            (ScalarKind::Int, 2) => read!(i16, 2),
            (ScalarKind::Int, 4) => read!(i32, 4),
            (ScalarKind::Int, 8) => read!(i64, 8),
            (ScalarKind::UInt, 1) => bytes[0] as f64,
            (ScalarKind::UInt, 2) => read!(u16, 2),
            (ScalarKind::UInt, 4) => read!(u32, 4),
            (ScalarKind::UInt, 8) => read!(u64, 8),
            (ScalarKind::Bool, _) => {
                if bytes[0] != 0 {
                    1.0
                } else {
                    0.0
                }
            }
            // Rejected by `Dtype::parse`.
            _ => f64::NAN,
        }
    }
}

// --- Decoded Array ---

/// Contents of one `.npy` file. Values are widened to `f64`, which is exact
/// for every float32 parameter and every realistic graph entry.
#[derive(Debug, Clone)]
pub struct NpyArray {
    pub dtype: Dtype,
    pub data: ArrayD<f64>,
}

impl NpyArray {
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// Converts the values to the blob element type.
    pub fn to_f32(&self) -> ArrayD<f32> {
        self.data.mapv(|v| v as f32)
    }
}

// --- Reading ---

struct Header {
    descr: String,
    fortran_order: bool,
    shape: Vec<usize>,
}

/// Returns the text following `'key':` in the header dict.
fn value_after<'a>(header: &'a str, key: &str) -> Result<&'a str, NpyError> {
    let start = header
        .find(&format!("'{}'", key))
        .or_else(|| header.find(&format!("\"{}\"", key)))
        .ok_or_else(|| NpyError::Header(format!("missing key '{}'", key)))?;
    let rest = &header[start + key.len() + 2..];
    let colon = rest
        .find(':')
        .ok_or_else(|| NpyError::Header(format!("no ':' after '{}'", key)))?;
    Ok(rest[colon + 1..].trim_start())
}

fn parse_header(header: &str) -> Result<Header, NpyError> {
    // {'descr': '<f4', 'fortran_order': False, 'shape': (3, 4), }
    let descr_text = value_after(header, "descr")?;
    let quote = descr_text
        .chars()
        .next()
        .filter(|c| *c == '\'' || *c == '"')
        .ok_or_else(|| NpyError::Header("descr is not a string".to_string()))?;
    let end = descr_text[1..]
        .find(quote)
        .ok_or_else(|| NpyError::Header("unterminated descr string".to_string()))?;
    let descr = descr_text[1..1 + end].to_string();

    let order_text = value_after(header, "fortran_order")?;
    let fortran_order = if order_text.starts_with("True") {
        true
    } else if order_text.starts_with("False") {
        false
    } else {
        return Err(NpyError::Header("fortran_order is not a bool".to_string()));
    };

    let shape_text = value_after(header, "shape")?;
    if !shape_text.starts_with('(') {
        return Err(NpyError::Header("shape is not a tuple".to_string()));
    }
    let close = shape_text
        .find(')')
        .ok_or_else(|| NpyError::Header("unterminated shape tuple".to_string()))?;
    let shape = shape_text[1..close]
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.trim_end_matches('L')
                .parse::<usize>()
                .map_err(|e| NpyError::Header(format!("bad shape dimension '{}': {}", s, e)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Header {
        descr,
        fortran_order,
        shape,
    })
}

/// Parses an in-memory `.npy` file.
pub fn parse_npy(bytes: &[u8]) -> Result<NpyArray, NpyError> {
    if bytes.len() < 10 || &bytes[..6] != NPY_MAGIC {
        return Err(NpyError::BadMagic);
    }
    let (major, minor) = (bytes[6], bytes[7]);
    let (header_len, header_start): (usize, usize) = match major {
        1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
        2 | 3 => {
            if bytes.len() < 12 {
                return Err(NpyError::Truncated {
                    expected: 12,
                    got: bytes.len(),
                });
            }
            let len = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
            (len as usize, 12)
        }
        _ => return Err(NpyError::UnsupportedVersion { major, minor }),
    };
    let header_end = header_start
        .checked_add(header_len)
        .ok_or_else(|| NpyError::Header("header length too large".to_string()))?;
    if bytes.len() < header_end {
        return Err(NpyError::Truncated {
            expected: header_end,
            got: bytes.len(),
        });
    }
    let header_text = std::str::from_utf8(&bytes[header_start..header_end])
        .map_err(|_| NpyError::Header("header is not valid UTF-8".to_string()))?;
    let header = parse_header(header_text)?;
    let dtype = Dtype::parse(&header.descr)?;

    let too_large = || NpyError::Header("shape too large".to_string());
    let needed = header
        .shape
        .iter()
        .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
        .and_then(|count| count.checked_mul(dtype.size))
        .ok_or_else(too_large)?;
    let body = &bytes[header_end..];
    if body.len() < needed {
        return Err(NpyError::Truncated {
            expected: header_end.saturating_add(needed),
            got: bytes.len(),
        });
    }
    let values: Vec<f64> = body[..needed]
        .chunks_exact(dtype.size)
        .map(|chunk| dtype.decode(chunk))
        .collect();

    let data = if header.fortran_order {
        ArrayD::from_shape_vec(IxDyn(&header.shape).f(), values)?
    } else {
        ArrayD::from_shape_vec(IxDyn(&header.shape), values)?
    };
    Ok(NpyArray { dtype, data })
}

/// Reads a `.npy` file from disk.
pub fn read_npy<P: AsRef<Path>>(path: P) -> Result<NpyArray, NpyError> {
    let bytes = fs::read(path.as_ref())?;
    parse_npy(&bytes)
}

// --- Writing ---

/// Element types the writer knows how to store.
pub trait NpyElement: Copy {
    const DESCR: &'static str;
    fn write_le(self, out: &mut Vec<u8>);
}

macro_rules! impl_npy_element {
    ($t:ty, $descr:expr) => {
        impl NpyElement for $t {
            const DESCR: &'static str = $descr;
            fn write_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }
        }
    };
}

impl_npy_element!(f32, "<f4");
impl_npy_element!(f64, "<f8");
impl_npy_element!(i32, "<i4");
impl_npy_element!(i64, "<i8");

/// Serializes an array as a version 1.0, C-order `.npy` file.
pub fn serialize_npy<T: NpyElement>(array: &ArrayD<T>) -> Vec<u8> {
    let shape_str = match array.shape() {
        [] => "()".to_string(),
        [n] => format!("({},)", n),
        dims => format!(
            "({})",
            dims.iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ),
    };
    let dict = format!(
        "{{'descr': '{}', 'fortran_order': False, 'shape': {}, }}",
        T::DESCR,
        shape_str
    );
    // magic(6) + version(2) + header_len(2), header padded to 64 bytes with a trailing newline
    let total = 10 + dict.len() + 1;
    let padding = (64 - total % 64) % 64;
    let header_len = dict.len() + padding + 1;

    let mut out = Vec::with_capacity(10 + header_len + array.len() * 8);
    out.extend_from_slice(NPY_MAGIC);
    out.push(1);
    out.push(0);
    out.extend_from_slice(&(header_len as u16).to_le_bytes());
    out.extend_from_slice(dict.as_bytes());
    out.extend(std::iter::repeat(b' ').take(padding));
    out.push(b'\n');
    for &value in array.iter() {
        value.write_le(&mut out);
    }
    out
}

/// Writes an array to a `.npy` file.
pub fn write_npy<P: AsRef<Path>, T: NpyElement>(path: P, array: &ArrayD<T>) -> Result<(), NpyError> {
    fs::write(path.as_ref(), serialize_npy(array))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2};

    /// Builds a file of format `major`.0 with an arbitrary header dict and body.
    fn raw_npy_version(major: u8, dict: &str, body: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(NPY_MAGIC);
        out.extend_from_slice(&[major, 0]);
        let header = format!("{}\n", dict);
        if major == 1 {
            out.extend_from_slice(&(header.len() as u16).to_le_bytes());
        } else {
            out.extend_from_slice(&(header.len() as u32).to_le_bytes());
        }
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(body);
        out
    }

    fn raw_npy(dict: &str, body: &[u8]) -> Vec<u8> {
        raw_npy_version(1, dict, body)
    }

    #[test]
    fn test_read_written_f32() {
        let array = arr2(&[[1.5f32, -2.0, 3.25], [0.0, 4.0, 5.0]]).into_dyn();
        let bytes = serialize_npy(&array);
        assert_eq!((bytes.len() - 6 * 4) % 64, 0);

        let parsed = parse_npy(&bytes).unwrap();
        assert_eq!(parsed.dtype.kind, ScalarKind::Float);
        assert_eq!(parsed.shape(), &[2, 3]);
        assert_eq!(parsed.to_f32(), array);
    }

    #[test]
    fn test_one_dimensional_shape() {
        let array = arr1(&[7i64, 8, 9]).into_dyn();
        let parsed = parse_npy(&serialize_npy(&array)).unwrap();
        assert_eq!(parsed.shape(), &[3]);
        assert_eq!(parsed.data.iter().copied().collect::<Vec<_>>(), vec![7.0, 8.0, 9.0]);
    }

    #[test]
    fn test_fortran_order() {
        // Column-major storage of [[1, 2], [3, 4]]
        let body: Vec<u8> = [1i32, 3, 2, 4].iter().flat_map(|v| v.to_le_bytes()).collect();
        let bytes = raw_npy(
            "{'descr': '<i4', 'fortran_order': True, 'shape': (2, 2), }",
            &body,
        );
        let parsed = parse_npy(&bytes).unwrap();
        assert_eq!(parsed.data[[0, 1]], 2.0);
        assert_eq!(parsed.data[[1, 0]], 3.0);
    }

    #[test]
    fn test_big_endian_double() {
        let body: Vec<u8> = [0.5f64, -1.0].iter().flat_map(|v| v.to_be_bytes()).collect();
        let bytes = raw_npy("{'descr': '>f8', 'fortran_order': False, 'shape': (2,), }", &body);
        let parsed = parse_npy(&bytes).unwrap();
        assert_eq!(parsed.data.iter().copied().collect::<Vec<_>>(), vec![0.5, -1.0]);
    }

    #[test]
    fn test_bool_and_scalar() {
        let bytes = raw_npy("{'descr': '|b1', 'fortran_order': False, 'shape': (), }", &[1]);
        let parsed = parse_npy(&bytes).unwrap();
        assert_eq!(parsed.shape(), &[] as &[usize]);
        assert_eq!(parsed.data.iter().next(), Some(&1.0));
    }

    #[test]
    fn test_bad_magic() {
        assert!(matches!(parse_npy(b"NOTNUMPYDATA"), Err(NpyError::BadMagic)));
    }

    #[test]
    fn test_truncated_body() {
        let bytes = raw_npy("{'descr': '<f4', 'fortran_order': False, 'shape': (4,), }", &[0; 8]);
        assert!(matches!(parse_npy(&bytes), Err(NpyError::Truncated { .. })));
    }

    #[test]
    fn test_unsupported_dtype() {
        let bytes = raw_npy("{'descr': '<c8', 'fortran_order': False, 'shape': (1,), }", &[0; 8]);
        assert!(matches!(parse_npy(&bytes), Err(NpyError::UnsupportedDtype(d)) if d == "<c8"));
    }

    #[test]
    fn test_version_2_and_3_headers() {
        let body: Vec<u8> = [1.0f32, 2.0, 3.0].iter().flat_map(|v| v.to_le_bytes()).collect();
        let dict = "{'descr': '<f4', 'fortran_order': False, 'shape': (3,), }";
        for major in [2, 3] {
            let parsed = parse_npy(&raw_npy_version(major, dict, &body)).unwrap();
            assert_eq!(parsed.shape(), &[3]);
            assert_eq!(parsed.data.iter().copied().collect::<Vec<_>>(), vec![1.0, 2.0, 3.0]);
        }
    }

    #[test]
    fn test_version_2_prefix_truncated() {
        let mut bytes = NPY_MAGIC.to_vec();
        bytes.extend_from_slice(&[2, 0, 16, 0]);
        assert!(matches!(
            parse_npy(&bytes),
            Err(NpyError::Truncated { expected: 12, got: 10 })
        ));
    }

    #[test]
    fn test_unsupported_version() {
        let bytes = raw_npy_version(4, "{}", &[]);
        assert!(matches!(
            parse_npy(&bytes),
            Err(NpyError::UnsupportedVersion { major: 4, minor: 0 })
        ));
    }

    #[test]
    fn test_small_integer_dtypes() {
        let body: Vec<u8> = [-300i16, 7].iter().flat_map(|v| v.to_le_bytes()).collect();
        let bytes = raw_npy("{'descr': '<i2', 'fortran_order': False, 'shape': (2,), }", &body);
        assert_eq!(parse_npy(&bytes).unwrap().data.iter().copied().collect::<Vec<_>>(), vec![-300.0, 7.0]);

        let body: Vec<u8> = [65535u16, 1].iter().flat_map(|v| v.to_be_bytes()).collect();
        let bytes = raw_npy("{'descr': '>u2', 'fortran_order': False, 'shape': (2,), }", &body);
        assert_eq!(parse_npy(&bytes).unwrap().data.iter().copied().collect::<Vec<_>>(), vec![65535.0, 1.0]);

        let bytes = raw_npy("{'descr': '|i1', 'fortran_order': False, 'shape': (2,), }", &[0xff, 0x05]);
        assert_eq!(parse_npy(&bytes).unwrap().data.iter().copied().collect::<Vec<_>>(), vec![-1.0, 5.0]);

        let bytes = raw_npy("{'descr': '|u1', 'fortran_order': False, 'shape': (1,), }", &[0xff]);
        assert_eq!(parse_npy(&bytes).unwrap().data.iter().copied().collect::<Vec<_>>(), vec![255.0]);

        let body: Vec<u8> = [4_000_000_000u32].iter().flat_map(|v| v.to_le_bytes()).collect();
        let bytes = raw_npy("{'descr': '<u4', 'fortran_order': False, 'shape': (1,), }", &body);
        assert_eq!(parse_npy(&bytes).unwrap().data[[0]], 4_000_000_000.0);

        let body: Vec<u8> = [1u64 << 40].iter().flat_map(|v| v.to_le_bytes()).collect();
        let bytes = raw_npy("{'descr': '<u8', 'fortran_order': False, 'shape': (1,), }", &body);
        assert_eq!(parse_npy(&bytes).unwrap().data[[0]], (1u64 << 40) as f64);
    }

    #[test]
    fn test_oversized_shape_is_an_error() {
        let bytes = raw_npy(
            "{'descr': '<f4', 'fortran_order': False, 'shape': (4294967296, 4294967296, 16), }",
            &[0; 16],
        );
        assert!(matches!(parse_npy(&bytes), Err(NpyError::Header(m)) if m == "shape too large"));

        // The element count fits but the byte count does not.
        let count = usize::MAX / 2 + 1;
        let dict = format!("{{'descr': '<f8', 'fortran_order': False, 'shape': ({},), }}", count);
        let bytes = raw_npy(&dict, &[]);
        assert!(matches!(parse_npy(&bytes), Err(NpyError::Header(_))));
    }
}
