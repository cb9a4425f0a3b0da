//! YuNet output decoding.
//!
//! The 2023mar export produces twelve tensors, four per stride (8, 16, 32),
//! ordered `cls_8, cls_16, cls_32, obj_8, obj_16, obj_32, bbox_8, bbox_16,
//! bbox_32, kps_8, kps_16, kps_32`. Every tensor is `[1, rows*cols, C]` with
//! `C` = 1, 1, 4 and 10 respectively. Scores are already activated.
//!
//! For a grid cell `(row, col)` of stride `s`:
//!
//! ```text
//! score = sqrt(clamp(cls) * clamp(obj))
//! cx = (col + dx) * s          w = exp(dw) * s
//! cy = (row + dy) * s          h = exp(dh) * s
//! lm_k = ((col + kx_k) * s, (row + ky_k) * s)
//! ```
//!
//! All coordinates are pixels of the square network input.

use anyhow::{bail, Result};
use ndarray::ArrayView2;

pub const INPUT_SIZE: usize = 640;
pub const STRIDES: [usize; 3] = [8, 16, 32];

/// A decoded face in network-input pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// x, y, w, h
    pub bbox: [f32; 4],
    pub score: f32,
    /// right eye, left eye, nose tip, right mouth corner, left mouth corner
    pub landmarks: [(f32, f32); 5],
}

/// Views over the four head outputs of one stride.
pub struct StrideHead<'a> {
    pub stride: usize,
    pub cls: ArrayView2<'a, f32>,
    pub obj: ArrayView2<'a, f32>,
    pub bbox: ArrayView2<'a, f32>,
    pub kps: ArrayView2<'a, f32>,
}

fn view<'a>(
    tensors: &'a [(Vec<i64>, Vec<f32>)],
    index: usize,
    cells: usize,
    channels: usize,
) -> Result<ArrayView2<'a, f32>> {
    let Some((shape, data)) = tensors.get(index) else {
        bail!("YuNet output {} missing ({} outputs)", index, tensors.len());
    };
    let expected = [1, cells as i64, channels as i64];
    if shape.as_slice() != expected {
        bail!(
            "YuNet output {} has shape {:?}, expected {:?}",
            index,
            shape,
            expected
        );
    }
    Ok(ArrayView2::from_shape((cells, channels), data.as_slice())?)
}

/// Group raw output tensors per stride, checking their shapes.
pub fn stride_heads(
    tensors: &[(Vec<i64>, Vec<f32>)],
    input_size: usize,
) -> Result<Vec<StrideHead<'_>>> {
    if tensors.len() < 4 * STRIDES.len() {
        bail!(
            "YuNet model must produce {} outputs, got {}",
            4 * STRIDES.len(),
            tensors.len()
        );
    }
    let n = STRIDES.len();
    STRIDES
        .iter()
        .enumerate()
        .map(|(i, &stride)| {
            let side = input_size / stride;
            let cells = side * side;
            Ok(StrideHead {
                stride,
                cls: view(tensors, i, cells, 1)?,
                obj: view(tensors, n + i, cells, 1)?,
                bbox: view(tensors, 2 * n + i, cells, 4)?,
                kps: view(tensors, 3 * n + i, cells, 10)?,
            })
        })
        .collect()
}

/// Decode every cell of one stride whose score reaches `score_threshold`.
pub fn decode_stride(head: &StrideHead<'_>, input_size: usize, score_threshold: f32) -> Vec<Candidate> {
    let cols = input_size / head.stride;
    let s = head.stride as f32;
    let mut out = Vec::new();

    for idx in 0..head.cls.nrows() {
        let cls = head.cls[[idx, 0]].clamp(0.0, 1.0);
        let obj = head.obj[[idx, 0]].clamp(0.0, 1.0);
        let score = (cls * obj).sqrt();
        if score < score_threshold {
            continue;
        }

        let row = (idx / cols) as f32;
        let col = (idx % cols) as f32;

        let cx = (col + head.bbox[[idx, 0]]) * s;
        let cy = (row + head.bbox[[idx, 1]]) * s;
        let w = head.bbox[[idx, 2]].exp() * s;
        let h = head.bbox[[idx, 3]].exp() * s;

        let mut landmarks = [(0.0, 0.0); 5];
        for (k, lm) in landmarks.iter_mut().enumerate() {
            *lm = (
                (col + head.kps[[idx, 2 * k]]) * s,
                (row + head.kps[[idx, 2 * k + 1]]) * s,
            );
        }

        out.push(Candidate {
            bbox: [cx - w / 2.0, cy - h / 2.0, w, h],
            score,
            landmarks,
        });
    }

    out
}

/// Decode all strides. Candidates are not yet suppressed.
pub fn decode(
    tensors: &[(Vec<i64>, Vec<f32>)],
    input_size: usize,
    score_threshold: f32,
) -> Result<Vec<Candidate>> {
    let heads = stride_heads(tensors, input_size)?;
    Ok(heads
        .iter()
        .flat_map(|head| decode_stride(head, input_size, score_threshold))
        .collect())
}
