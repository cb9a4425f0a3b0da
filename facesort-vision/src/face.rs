use crate::{model, yunet};
use anyhow::{Context, Result};
use image::{imageops::FilterType, DynamicImage, GenericImageView, Rgb, RgbImage};
use ndarray::Array4;
use ort::{session::Session, value::Value};
use std::path::Path;

/// Eye centres of the canonical 112x112 ArcFace/SFace crop.
const REF_EYES_112: [(f32, f32); 2] = [(38.2946, 51.6963), (73.5318, 51.5014)];

/// A detected face in source-image pixel coordinates.
#[derive(Debug, Clone)]
pub struct Detection {
    /// x, y, w, h
    pub bbox: [f32; 4],
    pub score: f32,
    pub landmarks: [(f32, f32); 5],
}

/// Square letterbox placement of the source image inside the network input.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    fn unmap(&self, (x, y): (f32, f32)) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// YuNet face detector producing aligned face chips.
pub struct FaceDetector {
    session: Session,
    score_threshold: f32,
    nms_threshold: f32,
    chip_size: u32,
}

impl FaceDetector {
    pub fn load(
        model_path: &Path,
        score_threshold: f32,
        nms_threshold: f32,
        chip_size: u32,
    ) -> Result<Self> {
        Ok(Self {
            session: model::detector_session(model_path)?,
            score_threshold,
            nms_threshold,
            chip_size,
        })
    }

    /// Detect faces, highest confidence first.
    pub fn detect(&mut self, img: &DynamicImage) -> Result<Vec<Detection>> {
        let size = yunet::INPUT_SIZE;
        let (input, letterbox) = letterbox(img, size);

        let tensors = {
            let input_tensor = Value::from_array(input)?;
            let outputs = self
                .session
                .run(ort::inputs![input_tensor])
                .context("running detector")?;
            let mut tensors: Vec<(Vec<i64>, Vec<f32>)> = Vec::new();
            for (_name, output) in outputs.iter() {
                let (shape, data) = output.try_extract_tensor::<f32>()?;
                tensors.push((shape.iter().copied().collect(), data.to_vec()));
            }
            tensors
        };

        let candidates = yunet::decode(&tensors, size, self.score_threshold)?;
        let detections: Vec<Detection> = candidates
            .into_iter()
            .map(|c| {
                let (x, y) = letterbox.unmap((c.bbox[0], c.bbox[1]));
                Detection {
                    bbox: [x, y, c.bbox[2] / letterbox.scale, c.bbox[3] / letterbox.scale],
                    score: c.score,
                    landmarks: c.landmarks.map(|p| letterbox.unmap(p)),
                }
            })
            .collect();

        let mut kept = nms(&detections, self.nms_threshold);
        kept.sort_by(|a, b| b.score.total_cmp(&a.score));
        log::debug!("detected {} face(s)", kept.len());
        Ok(kept)
    }

    /// Detect faces and return one aligned square chip per face.
    pub fn detect_faces(&mut self, img: &DynamicImage) -> Result<Vec<DynamicImage>> {
        let chip_size = self.chip_size;
        Ok(self
            .detect(img)?
            .iter()
            .map(|d| face_chip(img, d, chip_size))
            .collect())
    }
}

/// Fit `img` into a `size`x`size` canvas, centred, as a BGR NCHW tensor.
fn letterbox(img: &DynamicImage, size: usize) -> (Array4<f32>, Letterbox) {
    let (w, h) = img.dimensions();
    let scale = size as f32 / w.max(h).max(1) as f32;
    let new_w = ((w as f32 * scale) as u32).clamp(1, size as u32);
    let new_h = ((h as f32 * scale) as u32).clamp(1, size as u32);
    let resized = img
        .resize_exact(new_w, new_h, FilterType::Triangle)
        .to_rgb8();

    let pad_x = (size as u32 - new_w) / 2;
    let pad_y = (size as u32 - new_h) / 2;

    let mut input = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, px) in resized.enumerate_pixels() {
        let (cx, cy) = ((x + pad_x) as usize, (y + pad_y) as usize);
        input[[0, 0, cy, cx]] = px[2] as f32;
        input[[0, 1, cy, cx]] = px[1] as f32;
        input[[0, 2, cy, cx]] = px[0] as f32;
    }

    (
        input,
        Letterbox {
            scale,
            pad_x: pad_x as f32,
            pad_y: pad_y as f32,
        },
    )
}

/// Greedy non-maximum suppression, best score wins.
pub fn nms(detections: &[Detection], iou_threshold: f32) -> Vec<Detection> {
    let mut sorted = detections.to_vec();
    sorted.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<Detection> = Vec::new();
    for det in sorted {
        if keep.iter().all(|k| iou(&k.bbox, &det.bbox) <= iou_threshold) {
            keep.push(det);
        }
    }
    keep
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = (a[0] + a[2]).min(b[0] + b[2]);
    let y2 = (a[1] + a[3]).min(b[1] + b[3]);
    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }
    let inter = (x2 - x1) * (y2 - y1);
    let union = a[2] * a[3] + b[2] * b[3] - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

/// Cut an upright `size`x`size` face chip, rotating and scaling so the eyes
/// land on the canonical positions. Falls back to a plain square crop of the
/// bounding box when the eye landmarks are degenerate.
pub fn face_chip(img: &DynamicImage, det: &Detection, size: u32) -> DynamicImage {
    if img.width() == 0 || img.height() == 0 {
        return DynamicImage::new_rgb8(size, size);
    }
    let (e0, e1) = (det.landmarks[0], det.landmarks[1]);
    let (dx, dy) = (e1.0 - e0.0, e1.1 - e0.1);
    let eye_dist = (dx * dx + dy * dy).sqrt();
    if eye_dist < 1.0 {
        return square_crop(img, &det.bbox, size);
    }

    let k = size as f32 / 112.0;
    let r0 = (REF_EYES_112[0].0 * k, REF_EYES_112[0].1 * k);
    let r1 = (REF_EYES_112[1].0 * k, REF_EYES_112[1].1 * k);
    let ref_dist = ((r1.0 - r0.0).powi(2) + (r1.1 - r0.1).powi(2)).sqrt();

    // output -> source: rotate by the eye angle, scale by the distance ratio
    let s = eye_dist / ref_dist;
    let angle = dy.atan2(dx) - (r1.1 - r0.1).atan2(r1.0 - r0.0);
    let (sin, cos) = angle.sin_cos();
    let src_mid = ((e0.0 + e1.0) / 2.0, (e0.1 + e1.1) / 2.0);
    let ref_mid = ((r0.0 + r1.0) / 2.0, (r0.1 + r1.1) / 2.0);

    let rgb = img.to_rgb8();
    let mut out = RgbImage::new(size, size);
    for (ox, oy, px) in out.enumerate_pixels_mut() {
        let (u, v) = (ox as f32 - ref_mid.0, oy as f32 - ref_mid.1);
        let sx = src_mid.0 + s * (cos * u - sin * v);
        let sy = src_mid.1 + s * (sin * u + cos * v);
        if let Some(p) = bilinear(&rgb, sx, sy) {
            *px = p;
        }
    }
    DynamicImage::ImageRgb8(out)
}

fn bilinear(img: &RgbImage, x: f32, y: f32) -> Option<Rgb<u8>> {
    let (w, h) = img.dimensions();
    if x < 0.0 || y < 0.0 || x > (w - 1) as f32 || y > (h - 1) as f32 {
        return None;
    }
    let (x0, y0) = (x.floor() as u32, y.floor() as u32);
    let (x1, y1) = ((x0 + 1).min(w - 1), (y0 + 1).min(h - 1));
    let (fx, fy) = (x - x0 as f32, y - y0 as f32);

    let p00 = img.get_pixel(x0, y0);
    let p10 = img.get_pixel(x1, y0);
    let p01 = img.get_pixel(x0, y1);
    let p11 = img.get_pixel(x1, y1);

    let mut out = [0u8; 3];
    for (c, o) in out.iter_mut().enumerate() {
        let top = p00[c] as f32 * (1.0 - fx) + p10[c] as f32 * fx;
        let bottom = p01[c] as f32 * (1.0 - fx) + p11[c] as f32 * fx;
        *o = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Some(Rgb(out))
}

fn square_crop(img: &DynamicImage, bbox: &[f32; 4], size: u32) -> DynamicImage {
    let (w, h) = img.dimensions();
    let side = bbox[2].max(bbox[3]).max(1.0);
    let cx = bbox[0] + bbox[2] / 2.0;
    let cy = bbox[1] + bbox[3] / 2.0;
    let x = (cx - side / 2.0).clamp(0.0, w.saturating_sub(1) as f32) as u32;
    let y = (cy - side / 2.0).clamp(0.0, h.saturating_sub(1) as f32) as u32;
    let cw = (side as u32).clamp(1, w - x);
    let ch = (side as u32).clamp(1, h - y);
    img.crop_imm(x, y, cw, ch)
        .resize_exact(size, size, FilterType::Triangle)
}
