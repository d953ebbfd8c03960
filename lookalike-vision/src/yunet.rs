//! YuNet detector post-processing.
//!
//! YuNet is anchor-free: every cell of the stride 8, 16 and 32 grids predicts
//! a classification score, an objectness score, a box and five landmarks,
//! all relative to the cell. The model emits twelve tensors in the order
//! `cls_8, cls_16, cls_32, obj_8, obj_16, obj_32, bbox_8, .., kps_32`.
//!
//! Decoding for a cell at `(row, col)` of a grid with stride `s`:
//! `cx = (col + dx) * s`, `cy = (row + dy) * s`, `w = dw * s`, `h = dh * s`,
//! normalised by the input size.

use anyhow::{bail, Result};
use ndarray::Array2;

pub const STRIDES: [usize; 3] = [8, 16, 32];

#[derive(Debug, Clone)]
pub struct RawDetection {
    pub bbox: [f32; 4], // x, y, w, h (normalized [0,1])
    pub score: f32,
    pub landmarks: [f32; 10], // 5 points: x1,y1,...,x5,y5 (normalized [0,1])
}

/// Predictions of one stride, one row per grid cell.
#[derive(Debug, Clone)]
pub struct ScaleOutput {
    pub stride: usize,
    pub scores: Array2<f32>,    // [cells, 1]
    pub boxes: Array2<f32>,     // [cells, 4]
    pub landmarks: Array2<f32>, // [cells, 10]
}

impl ScaleOutput {
    fn grid(&self, input_size: usize) -> usize {
        input_size / self.stride
    }
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Pull tensor `idx` out of the raw outputs, checking it is `[1, cells, width]`.
fn tensor(
    outputs: &[(&[i64], &[f32])],
    idx: usize,
    cells: usize,
    width: usize,
) -> Result<Array2<f32>> {
    let Some((shape, data)) = outputs.get(idx) else {
        bail!("missing YuNet output {}", idx);
    };
    if shape.len() != 3 || shape[0] != 1 || shape[1] as usize != cells || shape[2] as usize != width
    {
        bail!(
            "YuNet output {} has shape {:?}, expected [1, {}, {}]",
            idx,
            shape,
            cells,
            width
        );
    }
    Ok(Array2::from_shape_vec((cells, width), data.to_vec())?)
}

/// Group the twelve raw outputs by stride. Scores come back as
/// `sigmoid(cls * obj)` so they are directly comparable to a threshold.
pub fn parse_outputs(outputs: &[(&[i64], &[f32])], input_size: usize) -> Result<Vec<ScaleOutput>> {
    let n = STRIDES.len();
    STRIDES
        .iter()
        .enumerate()
        .map(|(i, &stride)| {
            let side = input_size / stride;
            let cells = side * side;
            let cls = tensor(outputs, i, cells, 1)?;
            let obj = tensor(outputs, i + n, cells, 1)?;
            let mut scores = cls * obj;
            scores.mapv_inplace(sigmoid);
            Ok(ScaleOutput {
                stride,
                scores,
                boxes: tensor(outputs, i + 2 * n, cells, 4)?,
                landmarks: tensor(outputs, i + 3 * n, cells, 10)?,
            })
        })
        .collect()
}

/// Decode every cell scoring at least `score_threshold`.
pub fn decode(
    scales: &[ScaleOutput],
    score_threshold: f32,
    input_size: usize,
) -> Result<Vec<RawDetection>> {
    let norm = input_size as f32;
    let mut detections = Vec::new();

    for scale in scales {
        let side = scale.grid(input_size);
        if scale.scores.nrows() != side * side {
            bail!(
                "stride {} expects a {}x{} grid, got {} cells",
                scale.stride,
                side,
                side,
                scale.scores.nrows()
            );
        }
        let stride = scale.stride as f32;

        for row in 0..side {
            for col in 0..side {
                let idx = row * side + col;
                let score = scale.scores[[idx, 0]];
                if score < score_threshold {
                    continue;
                }

                let b = scale.boxes.row(idx);
                let cx = (col as f32 + b[0]) * stride / norm;
                let cy = (row as f32 + b[1]) * stride / norm;
                let w = b[2] * stride / norm;
                let h = b[3] * stride / norm;

                let kps = scale.landmarks.row(idx);
                let mut landmarks = [0.0f32; 10];
                for k in 0..5 {
                    landmarks[k * 2] = (col as f32 + kps[k * 2]) * stride / norm;
                    landmarks[k * 2 + 1] = (row as f32 + kps[k * 2 + 1]) * stride / norm;
                }

                detections.push(RawDetection {
                    bbox: [cx - w / 2.0, cy - h / 2.0, w, h],
                    score,
                    landmarks,
                });
            }
        }
    }

    Ok(detections)
}
