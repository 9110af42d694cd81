//! Multi-frame NPY stack containers.
//!
//! Reads a single `.npy` file holding a little-endian C-order array of shape
//! `(t, h, w)` or `(t, h, w, c)`. Frames are addressed by byte offset, so a
//! read touches only its own slice of the file.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use ndarray::Array3;
use tracing::debug;

use stackscope_core::{Frame, FrameShape, Result, SampleType, StackscopeError};

use crate::dataset::{Dataset, FrameDescriptor, FrameLocation, LoadOptions};
use crate::source::FrameSource;

const NPY_MAGIC: &[u8; 6] = b"\x93NUMPY";

#[derive(Debug)]
struct NpyHeader {
    shape: Vec<usize>,
    sample_type: SampleType,
    data_offset: u64,
}

fn format_err(path: &Path, what: impl std::fmt::Display) -> StackscopeError {
    StackscopeError::Format(format!("{}: {}", path.display(), what))
}

fn parse_descr(descr: &str, path: &Path) -> Result<SampleType> {
    let normalized = descr.trim_start_matches(['<', '|', '=']);
    match normalized {
        "u1" => Ok(SampleType::U8),
        "u2" => Ok(SampleType::U16),
        "f4" => Ok(SampleType::F32),
        _ => Err(format_err(
            path,
            format!("unsupported dtype descriptor {descr:?} (supported: u1, u2, f4)"),
        )),
    }
}

fn header_field<'a>(header: &'a str, key: &str, path: &Path) -> Result<&'a str> {
    let start = header
        .find(key)
        .ok_or_else(|| format_err(path, format!("missing {key:?} in header")))?;
    Ok(&header[start + key.len()..])
}

fn read_header(file: &mut File, path: &Path) -> Result<NpyHeader> {
    let mut magic = [0u8; 8];
    file.read_exact(&mut magic)?;
    if &magic[..6] != NPY_MAGIC {
        return Err(format_err(path, "not an NPY file (bad magic)"));
    }
    let major = magic[6];

    let (header_len, prefix_len) = match major {
        1 => {
            let mut len = [0u8; 2];
            file.read_exact(&mut len)?;
            (u64::from(u16::from_le_bytes(len)), 10u64)
        }
        2 | 3 => {
            let mut len = [0u8; 4];
            file.read_exact(&mut len)?;
            (u64::from(u32::from_le_bytes(len)), 12u64)
        }
        other => {
            return Err(format_err(path, format!("unsupported NPY version {other}")));
        }
    };

    let mut header_bytes = vec![0u8; header_len as usize];
    file.read_exact(&mut header_bytes)?;
    let header = String::from_utf8_lossy(&header_bytes).into_owned();

    let descr_part = header_field(&header, "'descr':", path)?;
    let descr = descr_part
        .split('\'')
        .nth(1)
        .ok_or_else(|| format_err(path, "malformed 'descr' entry"))?;
    let sample_type = parse_descr(descr, path)?;

    let order_part = header_field(&header, "'fortran_order':", path)?;
    if order_part.trim_start().starts_with("True") {
        return Err(format_err(path, "fortran-order arrays are not supported"));
    }

    let shape_part = header_field(&header, "'shape':", path)?;
    let open = shape_part
        .find('(')
        .ok_or_else(|| format_err(path, "malformed 'shape' entry"))?;
    let close = shape_part[open..]
        .find(')')
        .ok_or_else(|| format_err(path, "malformed 'shape' entry"))?
        + open;
    let mut shape = Vec::new();
    for part in shape_part[open + 1..close].split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let dim: usize = part
            .parse()
            .map_err(|_| format_err(path, format!("bad shape dimension {part:?}")))?;
        shape.push(dim);
    }

    Ok(NpyHeader {
        shape,
        sample_type,
        data_offset: prefix_len + header_len,
    })
}

/// A frame source over one NPY stack file.
pub struct NpyStackSource {
    dataset: Dataset,
    path: PathBuf,
    native_channels: u32,
    grayscale: bool,
    /// Encoded size of one frame slice.
    frame_disk_bytes: usize,
}

impl NpyStackSource {
    /// Open and validate a stack container.
    pub fn open(path: &Path, options: &LoadOptions) -> Result<Self> {
        let mut file = File::open(path)?;
        let header = read_header(&mut file, path)?;

        let (frames, height, width, native_channels) = match header.shape.as_slice() {
            [t, h, w] => (*t, *h, *w, 1usize),
            [t, h, w, c @ (1 | 3)] => (*t, *h, *w, *c),
            other => {
                return Err(format_err(
                    path,
                    format!("unsupported array shape {other:?} (expected (t, h, w[, c]))"),
                ));
            }
        };
        if frames == 0 {
            return Err(format_err(path, "stack contains no frames"));
        }

        let channels = if options.grayscale { 1 } else { native_channels };
        let shape = FrameShape::new(height as u32, width as u32, channels as u32);
        let frame_disk_bytes =
            height * width * native_channels * header.sample_type.bytes_per_sample();

        // Validate the file is long enough for the advertised shape.
        let expected_len = header.data_offset + (frames * frame_disk_bytes) as u64;
        let actual_len = file.metadata()?.len();
        if actual_len < expected_len {
            return Err(format_err(
                path,
                format!("file truncated: {actual_len} bytes, header implies {expected_len}"),
            ));
        }

        let kept = options.kept_indices(shape.decoded_bytes(), frames);
        debug!(
            kept = kept.len(),
            total = frames,
            dtype = header.sample_type.name(),
            "Opened NPY stack"
        );

        let stem = path
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let descriptors = kept
            .iter()
            .map(|&original| FrameDescriptor {
                location: FrameLocation::Offset(
                    header.data_offset + (original * frame_disk_bytes) as u64,
                ),
                source_name: format!("{stem}-{original}"),
                byte_size: frame_disk_bytes as u64,
            })
            .collect();

        Ok(Self {
            dataset: Dataset::new(shape, header.sample_type, descriptors)?,
            path: path.to_path_buf(),
            native_channels: native_channels as u32,
            grayscale: options.grayscale,
            frame_disk_bytes,
        })
    }

    fn decode_slice(&self, raw: &[u8], index: usize) -> Result<Frame> {
        let shape = self.dataset.shape();
        let height = shape.height as usize;
        let width = shape.width as usize;
        let native = self.native_channels as usize;
        let bps = self.dataset.sample_type().bytes_per_sample();

        let value_at = |y: usize, x: usize, c: usize| -> f32 {
            let sample = ((y * width + x) * native + c) * bps;
            match self.dataset.sample_type() {
                SampleType::U8 => f32::from(raw[sample]),
                SampleType::U16 => f32::from(u16::from_le_bytes([raw[sample], raw[sample + 1]])),
                SampleType::F32 => f32::from_le_bytes([
                    raw[sample],
                    raw[sample + 1],
                    raw[sample + 2],
                    raw[sample + 3],
                ]),
            }
        };

        let collapse = self.grayscale && native == 3;
        let samples = Array3::from_shape_fn(
            (height, width, shape.channels as usize),
            |(y, x, c)| {
                if collapse {
                    let r = f64::from(value_at(y, x, 0));
                    let g = f64::from(value_at(y, x, 1));
                    let b = f64::from(value_at(y, x, 2));
                    (0.2989 * r + 0.5870 * g + 0.1140 * b) as f32
                } else {
                    value_at(y, x, c)
                }
            },
        );
        Frame::from_samples(index, shape, samples)
    }
}

impl FrameSource for NpyStackSource {
    fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    fn read_frame(&self, index: usize) -> Result<Frame> {
        let descriptor = self.dataset.descriptor(index)?;
        let FrameLocation::Offset(offset) = descriptor.location else {
            return Err(StackscopeError::Decode(
                "Stack frame without a byte offset".into(),
            ));
        };

        // Independent handle per call; concurrent prefetch reads never share
        // a file cursor.
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut raw = vec![0u8; self.frame_disk_bytes];
        file.read_exact(&mut raw)?;
        self.decode_slice(&raw, index)
    }
}

/// Write a v1 NPY stack file.
///
/// Intended for generating sample stacks and test fixtures; `descr` is a
/// NumPy descriptor such as `|u1`, `<u2`, or `<f4` and `data` the raw
/// little-endian payload.
pub fn write_npy(path: &Path, descr: &str, shape: &[usize], data: &[u8]) -> Result<()> {
    use std::io::Write;

    let shape_str = match shape.len() {
        1 => format!("({},)", shape[0]),
        _ => format!(
            "({})",
            shape
                .iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ),
    };
    let mut header =
        format!("{{'descr': '{descr}', 'fortran_order': False, 'shape': {shape_str}, }}");
    // Pad so magic + version + length field + header is 64-byte aligned.
    let unpadded = 10 + header.len() + 1;
    header.push_str(&" ".repeat(unpadded.div_ceil(64) * 64 - unpadded));
    header.push('\n');

    let mut file = File::create(path)?;
    file.write_all(b"\x93NUMPY\x01\x00")?;
    file.write_all(&(header.len() as u16).to_le_bytes())?;
    file.write_all(header.as_bytes())?;
    file.write_all(data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u8_stack_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("stack.npy");
        // 2 frames of 2x2
        write_npy(&path, "|u1", &[2, 2, 2], &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();

        let source = NpyStackSource::open(&path, &LoadOptions::default()).unwrap();
        assert_eq!(source.dataset().len(), 2);
        assert_eq!(source.dataset().shape(), FrameShape::new(2, 2, 1));
        assert_eq!(source.dataset().sample_type(), SampleType::U8);

        let frame = source.read_frame(1).unwrap();
        assert_eq!(frame.sample(0, 0, 0), 5.0);
        assert_eq!(frame.sample(1, 1, 0), 8.0);
    }

    #[test]
    fn test_u16_values_exact() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("stack16.npy");
        let values: Vec<u16> = vec![0, 1000, 40000, 65535];
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        write_npy(&path, "<u2", &[1, 2, 2], &bytes).unwrap();

        let source = NpyStackSource::open(&path, &LoadOptions::default()).unwrap();
        let frame = source.read_frame(0).unwrap();
        assert_eq!(frame.sample(1, 0, 0), 40000.0);
        assert_eq!(frame.sample(1, 1, 0), 65535.0);
    }

    #[test]
    fn test_rgb_stack_grayscale_collapse() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("rgb.npy");
        // 1 frame, 1x1, c=3, all channels 100
        write_npy(&path, "|u1", &[1, 1, 1, 3], &[100, 100, 100]).unwrap();

        let options = LoadOptions {
            grayscale: true,
            ..Default::default()
        };
        let source = NpyStackSource::open(&path, &options).unwrap();
        assert_eq!(source.dataset().shape().channels, 1);
        // Luma weights sum to 0.9999, so the collapse is off by 0.01.
        let frame = source.read_frame(0).unwrap();
        assert!((frame.sample(0, 0, 0) - 100.0).abs() < 0.05);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("junk.npy");
        std::fs::write(&path, b"not numpy at all").unwrap();
        let err = NpyStackSource::open(&path, &LoadOptions::default()).err().unwrap();
        assert!(matches!(err, StackscopeError::Format(_)));
    }

    #[test]
    fn test_fortran_order_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("fortran.npy");
        let mut header =
            String::from("{'descr': '|u1', 'fortran_order': True, 'shape': (1, 2, 2), }");
        let unpadded = 10 + header.len() + 1;
        header.push_str(&" ".repeat(unpadded.div_ceil(64) * 64 - unpadded));
        header.push('\n');
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"\x93NUMPY\x01\x00");
        bytes.extend_from_slice(&(header.len() as u16).to_le_bytes());
        bytes.extend_from_slice(header.as_bytes());
        bytes.extend_from_slice(&[0; 4]);
        std::fs::write(&path, bytes).unwrap();

        let err = NpyStackSource::open(&path, &LoadOptions::default()).err().unwrap();
        assert!(err.to_string().contains("fortran-order"));
    }

    #[test]
    fn test_truncated_file_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("short.npy");
        // Header advertises 4 frames but only 1 frame of payload follows.
        write_npy(&path, "|u1", &[4, 2, 2], &[9, 9, 9, 9]).unwrap();
        let err = NpyStackSource::open(&path, &LoadOptions::default()).err().unwrap();
        assert!(err.to_string().contains("truncated"));
    }

    #[test]
    fn test_step_subset_addresses_original_offsets() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("steps.npy");
        // 4 frames of 1x1 with values 0, 10, 20, 30
        write_npy(&path, "|u1", &[4, 1, 1], &[0, 10, 20, 30]).unwrap();

        let options = LoadOptions {
            step: 2,
            ..Default::default()
        };
        let source = NpyStackSource::open(&path, &options).unwrap();
        assert_eq!(source.dataset().len(), 2);
        assert_eq!(source.read_frame(0).unwrap().sample(0, 0, 0), 0.0);
        assert_eq!(source.read_frame(1).unwrap().sample(0, 0, 0), 20.0);
    }
}
