//! YuNet detector post-processing.
//!
//! YuNet is anchor-free. For each stride (8, 16, 32) over a square input it
//! emits four heads, flattened over the `(input / stride)^2` grid:
//!
//! - `cls`  `[1, N, 1]`  face classification score
//! - `obj`  `[1, N, 1]`  objectness score
//! - `bbox` `[1, N, 4]`  center offset in cells, log width/height in cells
//! - `kps`  `[1, N, 10]` five landmark offsets in cells
//!
//! The twelve outputs come grouped by head: `cls_8, cls_16, cls_32, obj_8, ...,
//! kps_32`. Coordinates produced here are normalized to `[0, 1]` of the input.

use anyhow::{bail, Result};
use ndarray::Array2;

pub const STRIDES: [usize; 3] = [8, 16, 32];

const HEADS_PER_STRIDE: usize = 4;

#[derive(Debug, Clone)]
pub struct RawDetection {
    pub bbox: [f32; 4], // x, y, w, h
    pub score: f32,
    pub landmarks: [f32; 10],
}

/// Detector heads for one stride.
#[derive(Debug, Clone)]
pub struct Level {
    pub stride: usize,
    pub cls: Array2<f32>,
    pub obj: Array2<f32>,
    pub bbox: Array2<f32>,
    pub kps: Array2<f32>,
}

impl Level {
    fn grid(&self, input_size: usize) -> usize {
        input_size / self.stride
    }
}

fn head(
    outputs: &[(Vec<i64>, Vec<f32>)],
    index: usize,
    name: &str,
    rows: usize,
    cols: usize,
) -> Result<Array2<f32>> {
    let Some((shape, data)) = outputs.get(index) else {
        bail!("missing {} output at index {}", name, index);
    };
    let expected = [1, rows as i64, cols as i64];
    if shape.as_slice() != expected {
        bail!(
            "unexpected {} shape at index {}: {:?}, expected {:?}",
            name,
            index,
            shape,
            expected
        );
    }
    Ok(Array2::from_shape_vec((rows, cols), data.clone())?)
}

/// Split the raw YuNet outputs into per-stride levels, validating every shape.
pub fn parse_outputs(outputs: &[(Vec<i64>, Vec<f32>)], input_size: usize) -> Result<Vec<Level>> {
    if outputs.len() < HEADS_PER_STRIDE * STRIDES.len() {
        bail!(
            "expected {} detector outputs, got {}",
            HEADS_PER_STRIDE * STRIDES.len(),
            outputs.len()
        );
    }

    let n = STRIDES.len();
    let mut levels = Vec::with_capacity(n);
    for (level, &stride) in STRIDES.iter().enumerate() {
        let grid = input_size / stride;
        let rows = grid * grid;
        levels.push(Level {
            stride,
            cls: head(outputs, level, "cls", rows, 1)?,
            obj: head(outputs, n + level, "obj", rows, 1)?,
            bbox: head(outputs, 2 * n + level, "bbox", rows, 4)?,
            kps: head(outputs, 3 * n + level, "kps", rows, 10)?,
        });
    }
    Ok(levels)
}

/// Combined detection confidence from the two score heads.
pub fn fused_score(cls: f32, obj: f32) -> f32 {
    (cls.clamp(0.0, 1.0) * obj.clamp(0.0, 1.0)).sqrt()
}

/// Decode every grid cell scoring at least `score_threshold`.
pub fn decode(levels: &[Level], input_size: usize, score_threshold: f32) -> Vec<RawDetection> {
    let norm = input_size as f32;
    let mut detections = Vec::new();

    for level in levels {
        let grid = level.grid(input_size);
        let stride = level.stride as f32;

        for row in 0..grid {
            for col in 0..grid {
                let idx = row * grid + col;
                let score = fused_score(level.cls[[idx, 0]], level.obj[[idx, 0]]);
                if score < score_threshold {
                    continue;
                }

                let cx = (col as f32 + level.bbox[[idx, 0]]) * stride;
                let cy = (row as f32 + level.bbox[[idx, 1]]) * stride;
                let w = level.bbox[[idx, 2]].exp() * stride;
                let h = level.bbox[[idx, 3]].exp() * stride;

                let mut landmarks = [0.0f32; 10];
                for k in 0..5 {
                    landmarks[k * 2] = (col as f32 + level.kps[[idx, k * 2]]) * stride / norm;
                    landmarks[k * 2 + 1] =
                        (row as f32 + level.kps[[idx, k * 2 + 1]]) * stride / norm;
                }

                detections.push(RawDetection {
                    bbox: [
                        (cx - w / 2.0) / norm,
                        (cy - h / 2.0) / norm,
                        w / norm,
                        h / norm,
                    ],
                    score,
                    landmarks,
                });
            }
        }
    }

    detections
}
