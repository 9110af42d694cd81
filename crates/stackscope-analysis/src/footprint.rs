//! Zone footprint rasterization.
//!
//! A [`Footprint`] maps a zone's geometry onto a frame's pixel grid as
//! per-pixel area weights in `[0, 1]`. Rectangles get exact fractional
//! coverage; polygons are supersampled on a fixed grid. The rasterization is
//! a pure function of geometry and frame shape, so repeated computation is
//! bit-identical.

use ndarray::Array2;
use stackscope_core::{FrameShape, Rect};

use crate::zone::ZoneShape;

/// Supersampling grid side for polygon coverage (16 samples per pixel).
const POLYGON_SAMPLES: u32 = 4;

/// Per-pixel coverage weights of a zone over one frame shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Footprint {
    x0: u32,
    y0: u32,
    weights: Array2<f64>,
    total_weight: f64,
}

impl Footprint {
    /// Rasterize a shape onto a frame's pixel grid.
    ///
    /// Geometry outside the frame bounds is clipped away; a zone entirely
    /// off-frame produces an empty footprint.
    pub fn compute(shape: &ZoneShape, frame: FrameShape) -> Self {
        let empty = Self {
            x0: 0,
            y0: 0,
            weights: Array2::zeros((0, 0)),
            total_weight: 0.0,
        };
        if shape.is_degenerate() {
            return empty;
        }

        let bounds = shape.bounding_box();
        let x0 = bounds.x.floor().max(0.0) as u32;
        let y0 = bounds.y.floor().max(0.0) as u32;
        let x1 = (bounds.max().x.ceil().max(0.0) as u32).min(frame.width);
        let y1 = (bounds.max().y.ceil().max(0.0) as u32).min(frame.height);
        if x0 >= x1 || y0 >= y1 {
            return empty;
        }

        let rows = (y1 - y0) as usize;
        let cols = (x1 - x0) as usize;
        let weights = match shape {
            ZoneShape::Rect(rect) => rect_coverage(*rect, x0, y0, rows, cols),
            ZoneShape::Polygon { .. } => polygon_coverage(shape, x0, y0, rows, cols),
        };
        let total_weight = weights.iter().sum();

        Self {
            x0,
            y0,
            weights,
            total_weight,
        }
    }

    /// Sum of all pixel weights (the covered area in pixels).
    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    /// True when no pixel is covered.
    pub fn is_empty(&self) -> bool {
        self.total_weight == 0.0
    }

    /// Visit covered pixels in row-major order.
    pub fn for_each(&self, mut visit: impl FnMut(u32, u32, f64)) {
        for ((row, col), &weight) in self.weights.indexed_iter() {
            if weight > 0.0 {
                visit(self.y0 + row as u32, self.x0 + col as u32, weight);
            }
        }
    }
}

fn rect_coverage(rect: Rect, x0: u32, y0: u32, rows: usize, cols: usize) -> Array2<f64> {
    Array2::from_shape_fn((rows, cols), |(row, col)| {
        let px = (x0 + col as u32) as f32;
        let py = (y0 + row as u32) as f32;
        let wx = Rect::overlap_1d(px, px + 1.0, rect.x, rect.x + rect.width);
        let wy = Rect::overlap_1d(py, py + 1.0, rect.y, rect.y + rect.height);
        f64::from(wx) * f64::from(wy)
    })
}

fn polygon_coverage(
    shape: &ZoneShape,
    x0: u32,
    y0: u32,
    rows: usize,
    cols: usize,
) -> Array2<f64> {
    let step = 1.0 / POLYGON_SAMPLES as f32;
    let samples = (POLYGON_SAMPLES * POLYGON_SAMPLES) as f64;
    Array2::from_shape_fn((rows, cols), |(row, col)| {
        let px = (x0 + col as u32) as f32;
        let py = (y0 + row as u32) as f32;
        let mut hits = 0u32;
        for sy in 0..POLYGON_SAMPLES {
            for sx in 0..POLYGON_SAMPLES {
                let x = px + (sx as f32 + 0.5) * step;
                let y = py + (sy as f32 + 0.5) * step;
                if shape.contains_point(x, y) {
                    hits += 1;
                }
            }
        }
        f64::from(hits) / samples
    })
}
