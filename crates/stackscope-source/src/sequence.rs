//! One-image-per-frame sequence decoding via the `image` crate.

use std::path::{Path, PathBuf};

use image::{ColorType, DynamicImage, ImageDecoder, ImageReader};
use ndarray::Array3;
use tracing::debug;

use stackscope_core::{Frame, FrameShape, Result, SampleType, StackscopeError};

use crate::dataset::{Dataset, FrameDescriptor, FrameLocation, LoadOptions};
use crate::source::FrameSource;

/// Channel count and sample type implied by an image color type.
///
/// Alpha channels are dropped; color always decodes to three channels.
fn layout_of(color: ColorType, path: &Path) -> Result<(u32, SampleType)> {
    match color {
        ColorType::L8 | ColorType::La8 => Ok((1, SampleType::U8)),
        ColorType::Rgb8 | ColorType::Rgba8 => Ok((3, SampleType::U8)),
        ColorType::L16 | ColorType::La16 => Ok((1, SampleType::U16)),
        ColorType::Rgb16 | ColorType::Rgba16 => Ok((3, SampleType::U16)),
        ColorType::Rgb32F | ColorType::Rgba32F => Ok((3, SampleType::F32)),
        other => Err(StackscopeError::Format(format!(
            "Unsupported color type {:?} in {}",
            other,
            path.display()
        ))),
    }
}

/// Rec. 601 luma from natural-range color values.
#[inline]
fn luma601(r: f32, g: f32, b: f32) -> f32 {
    let value = 0.2989 * f64::from(r) + 0.5870 * f64::from(g) + 0.1140 * f64::from(b);
    value as f32
}

/// Read dimensions and color type from a file header without decoding pixels.
fn probe_header(path: &Path) -> Result<(u32, u32, ColorType)> {
    let reader = ImageReader::open(path)?.with_guessed_format()?;
    let decoder = reader.into_decoder().map_err(|e| {
        StackscopeError::Format(format!("Unreadable header in {}: {}", path.display(), e))
    })?;
    let (width, height) = decoder.dimensions();
    let color = decoder.color_type();
    Ok((height, width, color))
}

fn samples_from_buffer<P>(
    buf: &image::ImageBuffer<P, Vec<P::Subpixel>>,
    color_channels: usize,
    grayscale: bool,
) -> Array3<f32>
where
    P: image::Pixel,
    P::Subpixel: Into<f32> + Copy,
{
    let (width, height) = buf.dimensions();
    let out_channels = if grayscale || color_channels == 1 {
        1
    } else {
        3
    };
    Array3::from_shape_fn(
        (height as usize, width as usize, out_channels),
        |(y, x, c)| {
            let channels = buf.get_pixel(x as u32, y as u32).channels();
            if color_channels == 1 {
                channels[0].into()
            } else if grayscale {
                luma601(channels[0].into(), channels[1].into(), channels[2].into())
            } else {
                channels[c].into()
            }
        },
    )
}

/// Convert a decoded image into the in-memory sample layout.
fn samples_from_image(img: &DynamicImage, grayscale: bool) -> Result<Array3<f32>> {
    match img {
        DynamicImage::ImageLuma8(buf) => Ok(samples_from_buffer(buf, 1, grayscale)),
        DynamicImage::ImageLumaA8(buf) => Ok(samples_from_buffer(buf, 1, grayscale)),
        DynamicImage::ImageRgb8(buf) => Ok(samples_from_buffer(buf, 3, grayscale)),
        DynamicImage::ImageRgba8(buf) => Ok(samples_from_buffer(buf, 3, grayscale)),
        DynamicImage::ImageLuma16(buf) => Ok(samples_from_buffer(buf, 1, grayscale)),
        DynamicImage::ImageLumaA16(buf) => Ok(samples_from_buffer(buf, 1, grayscale)),
        DynamicImage::ImageRgb16(buf) => Ok(samples_from_buffer(buf, 3, grayscale)),
        DynamicImage::ImageRgba16(buf) => Ok(samples_from_buffer(buf, 3, grayscale)),
        DynamicImage::ImageRgb32F(buf) => Ok(samples_from_buffer(buf, 3, grayscale)),
        DynamicImage::ImageRgba32F(buf) => Ok(samples_from_buffer(buf, 3, grayscale)),
        other => Err(StackscopeError::Decode(format!(
            "Unsupported decoded color type {:?}",
            other.color()
        ))),
    }
}

/// A frame source over a sorted set of image files, one file per frame.
///
/// Every `read_frame` call opens its own file handle, so concurrent reads
/// from prefetch workers never contend on shared decoder state.
pub struct ImageSequenceSource {
    dataset: Dataset,
    grayscale: bool,
}

impl ImageSequenceSource {
    /// Probe all files and build the dataset.
    ///
    /// The first file determines shape and sample type; any member that
    /// disagrees makes the whole open fail with a `Format` error.
    pub fn open(files: Vec<PathBuf>, options: &LoadOptions) -> Result<Self> {
        let first = files.first().ok_or_else(|| {
            StackscopeError::InvalidParameter("Empty image sequence".into())
        })?;
        let (height, width, color) = probe_header(first)?;
        let (native_channels, sample_type) = layout_of(color, first)?;
        let channels = if options.grayscale { 1 } else { native_channels };
        let shape = FrameShape::new(height, width, channels);

        let kept = options.kept_indices(shape.decoded_bytes(), files.len());
        debug!(
            kept = kept.len(),
            total = files.len(),
            "Probing image sequence members"
        );

        let mut descriptors = Vec::with_capacity(kept.len());
        for &file_index in &kept {
            let path = &files[file_index];
            let (h, w, file_color) = probe_header(path)?;
            if (h, w) != (height, width) {
                return Err(StackscopeError::Format(format!(
                    "Frame shapes disagree: {} is {}x{}, expected {}x{}",
                    path.display(),
                    h,
                    w,
                    height,
                    width
                )));
            }
            let file_layout = layout_of(file_color, path)?;
            if file_layout != (native_channels, sample_type) {
                return Err(StackscopeError::Format(format!(
                    "Sample types disagree: {} is {:?}, expected {:?}",
                    path.display(),
                    file_layout,
                    (native_channels, sample_type)
                )));
            }
            descriptors.push(FrameDescriptor {
                location: FrameLocation::File(path.clone()),
                source_name: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string()),
                byte_size: std::fs::metadata(path)?.len(),
            });
        }

        Ok(Self {
            dataset: Dataset::new(shape, sample_type, descriptors)?,
            grayscale: options.grayscale,
        })
    }
}

impl FrameSource for ImageSequenceSource {
    fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    fn read_frame(&self, index: usize) -> Result<Frame> {
        let descriptor = self.dataset.descriptor(index)?;
        let FrameLocation::File(path) = &descriptor.location else {
            return Err(StackscopeError::Decode(
                "Image sequence frame without a file location".into(),
            ));
        };
        let img = ImageReader::open(path)?
            .with_guessed_format()?
            .decode()
            .map_err(|e| {
                StackscopeError::Decode(format!("Failed to decode {}: {}", path.display(), e))
            })?;
        let samples = samples_from_image(&img, self.grayscale)?;
        Frame::from_samples(index, self.dataset.shape(), samples)
    }
}
