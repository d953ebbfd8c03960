use crate::yunet;
use anyhow::{bail, Result};
use image::{imageops::FilterType, DynamicImage, GenericImageView, RgbImage};
use ndarray::{Array4, ArrayView1};
use ort::{session::Session, value::Value};

/// Length of an SFace embedding.
pub const EMBEDDING_DIM: usize = 128;

const DETECTOR_INPUT: u32 = 640;
const ENCODER_INPUT: u32 = 112;

/// Detection result from YuNet, in source image pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: [f32; 4], // x, y, w, h
    pub score: f32,
    pub landmarks: [f32; 10], // 5 points: x1,y1,x2,y2,...,x5,y5
}

impl Detection {
    /// A detection with no landmarks, covering the given box.
    pub fn from_bbox(bbox: [f32; 4], score: f32) -> Self {
        Self {
            bbox,
            score,
            landmarks: [0.0; 10],
        }
    }
}

/// Face embedding. Always exactly [`EMBEDDING_DIM`] values.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    vector: Vec<f32>,
}

impl Embedding {
    pub fn new(vector: Vec<f32>) -> Result<Self> {
        if vector.len() != EMBEDDING_DIM {
            bail!(
                "embedding has {} values, expected {}",
                vector.len(),
                EMBEDDING_DIM
            );
        }
        if vector.iter().any(|v| !v.is_finite()) {
            bail!("embedding contains non-finite values");
        }
        Ok(Self { vector })
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.vector
    }

    pub fn view(&self) -> ArrayView1<'_, f32> {
        ArrayView1::from(self.vector.as_slice())
    }
}

impl AsRef<[f32]> for Embedding {
    fn as_ref(&self) -> &[f32] {
        &self.vector
    }
}

/// Euclidean distance between two vectors. Vectors of different lengths are
/// infinitely far apart.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }
    let diff = &ArrayView1::from(a) - &ArrayView1::from(b);
    diff.dot(&diff).sqrt()
}

/// Planar BGR float tensor `[1, 3, H, W]` with values in [0, 255], the
/// layout shared by YuNet and SFace.
fn bgr_planes(img: &RgbImage) -> Result<Array4<f32>> {
    let (w, h) = img.dimensions();
    let pixel_count = (w * h) as usize;
    let mut data = vec![0.0f32; 3 * pixel_count];
    let (b, rest) = data.split_at_mut(pixel_count);
    let (g, r) = rest.split_at_mut(pixel_count);
    for (i, px) in img.pixels().enumerate() {
        r[i] = px[0] as f32;
        g[i] = px[1] as f32;
        b[i] = px[2] as f32;
    }
    Ok(Array4::from_shape_vec((1, 3, h as usize, w as usize), data)?)
}

/// Letterboxes `img` into the detector's square input, returning the canvas
/// and the (scale, offset_x, offset_y) needed to map results back.
fn letterbox(img: &DynamicImage) -> (RgbImage, f32, f32, f32) {
    let (width, height) = img.dimensions();
    let scale = DETECTOR_INPUT as f32 / width.max(height) as f32;
    let new_w = ((width as f32 * scale) as u32).max(1);
    let new_h = ((height as f32 * scale) as u32).max(1);
    let resized = img.resize_exact(new_w, new_h, FilterType::Triangle).to_rgb8();

    let mut canvas = RgbImage::new(DETECTOR_INPUT, DETECTOR_INPUT);
    let off_x = (DETECTOR_INPUT - new_w) / 2;
    let off_y = (DETECTOR_INPUT - new_h) / 2;
    image::imageops::overlay(&mut canvas, &resized, off_x as i64, off_y as i64);
    (canvas, scale, off_x as f32, off_y as f32)
}

/// Detect faces in an image using YuNet detector
pub fn detect_faces(
    session: &mut Session,
    img: &DynamicImage,
    score_threshold: f32,
    nms_threshold: f32,
) -> Result<Vec<Detection>> {
    let (canvas, scale, off_x, off_y) = letterbox(img);
    let input_tensor = Value::from_array(bgr_planes(&canvas)?)?;
    let outputs = session.run(ort::inputs![input_tensor])?;

    let mut raw: Vec<(Vec<i64>, Vec<f32>)> = Vec::new();
    for (_name, output) in outputs.iter() {
        let (shape, data) = output.try_extract_tensor::<f32>()?;
        raw.push((shape.iter().copied().collect(), data.to_vec()));
    }
    let refs: Vec<(&[i64], &[f32])> = raw
        .iter()
        .map(|(s, d)| (s.as_slice(), d.as_slice()))
        .collect();

    let input_size = DETECTOR_INPUT as usize;
    let scales = yunet::parse_outputs(&refs, input_size)?;
    let decoded = yunet::decode(&scales, score_threshold, input_size)?;

    // Normalised canvas coordinates -> source pixels.
    let px = DETECTOR_INPUT as f32;
    let to_x = |v: f32| (v * px - off_x) / scale;
    let to_y = |v: f32| (v * px - off_y) / scale;
    let detections: Vec<Detection> = decoded
        .into_iter()
        .map(|d| {
            let mut landmarks = [0.0f32; 10];
            for k in 0..5 {
                landmarks[k * 2] = to_x(d.landmarks[k * 2]);
                landmarks[k * 2 + 1] = to_y(d.landmarks[k * 2 + 1]);
            }
            Detection {
                bbox: [
                    to_x(d.bbox[0]),
                    to_y(d.bbox[1]),
                    d.bbox[2] * px / scale,
                    d.bbox[3] * px / scale,
                ],
                score: d.score,
                landmarks,
            }
        })
        .collect();

    log::debug!("yunet: {} candidate face(s)", detections.len());

    if nms_threshold < 1.0 {
        Ok(nms(&detections, nms_threshold))
    } else {
        Ok(detections)
    }
}

/// Apply non-maximum suppression to remove overlapping detections
pub fn nms(detections: &[Detection], iou_threshold: f32) -> Vec<Detection> {
    let mut sorted = detections.to_vec();
    sorted.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<Detection> = Vec::new();
    for det in sorted {
        if keep
            .iter()
            .all(|k| compute_iou(&k.bbox, &det.bbox) <= iou_threshold)
        {
            keep.push(det);
        }
    }
    keep
}

fn compute_iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = (a[0] + a[2]).min(b[0] + b[2]);
    let y2 = (a[1] + a[3]).min(b[1] + b[3]);

    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }

    let inter = (x2 - x1) * (y2 - y1);
    inter / (a[2] * a[3] + b[2] * b[3] - inter)
}

/// Align and crop face using the eye landmarks. The similarity transform maps
/// the eyes onto the ArcFace reference positions of a 112x112 crop.
pub fn align_face(img: &DynamicImage, detection: &Detection, size: u32) -> Result<DynamicImage> {
    const REF_LEFT_EYE: (f32, f32) = (38.3, 51.7);
    const REF_RIGHT_EYE: (f32, f32) = (73.5, 51.5);

    let left = (detection.landmarks[0], detection.landmarks[1]);
    let right = (detection.landmarks[2], detection.landmarks[3]);
    let (dx, dy) = (right.0 - left.0, right.1 - left.1);
    let eye_dist = (dx * dx + dy * dy).sqrt();
    if eye_dist <= f32::EPSILON {
        bail!("degenerate eye landmarks");
    }

    let ref_dist = ((REF_RIGHT_EYE.0 - REF_LEFT_EYE.0).powi(2)
        + (REF_RIGHT_EYE.1 - REF_LEFT_EYE.1).powi(2))
    .sqrt();
    let unit = size as f32 / ENCODER_INPUT as f32;
    let scale = unit * ref_dist / eye_dist;
    let angle = dy.atan2(dx);

    let eye_center = ((left.0 + right.0) / 2.0, (left.1 + right.1) / 2.0);
    let target = (
        (REF_LEFT_EYE.0 + REF_RIGHT_EYE.0) / 2.0 * unit,
        (REF_LEFT_EYE.1 + REF_RIGHT_EYE.1) / 2.0 * unit,
    );

    // out = M * in + t, M = scale * [cos sin; -sin cos]
    let (a, b) = (scale * angle.cos(), scale * angle.sin());
    let (c, d) = (-b, a);
    let tx = target.0 - (a * eye_center.0 + b * eye_center.1);
    let ty = target.1 - (c * eye_center.0 + d * eye_center.1);
    let det = a * d - b * c;

    let src = img.to_rgb8();
    let (img_w, img_h) = src.dimensions();
    let mut output = RgbImage::new(size, size);

    for (out_x, out_y, pixel) in output.enumerate_pixels_mut() {
        let (ox, oy) = (out_x as f32 - tx, out_y as f32 - ty);
        let in_x = (d * ox - b * oy) / det;
        let in_y = (-c * ox + a * oy) / det;
        if in_x < 0.0 || in_y < 0.0 || in_x >= img_w as f32 || in_y >= img_h as f32 {
            continue;
        }

        // Bilinear interpolation
        let (x0, y0) = (in_x.floor() as u32, in_y.floor() as u32);
        let (x1, y1) = ((x0 + 1).min(img_w - 1), (y0 + 1).min(img_h - 1));
        let (fx, fy) = (in_x - x0 as f32, in_y - y0 as f32);
        let weights = [
            (x0, y0, (1.0 - fx) * (1.0 - fy)),
            (x1, y0, fx * (1.0 - fy)),
            (x0, y1, (1.0 - fx) * fy),
            (x1, y1, fx * fy),
        ];
        for ch in 0..3 {
            let v: f32 = weights
                .iter()
                .map(|&(x, y, w)| src.get_pixel(x, y)[ch] as f32 * w)
                .sum();
            pixel[ch] = v as u8;
        }
    }

    Ok(DynamicImage::ImageRgb8(output))
}

/// Encode an aligned face crop to an L2-normalised SFace embedding.
pub fn encode_face(session: &mut Session, face_img: &DynamicImage) -> Result<Embedding> {
    let face = face_img
        .resize_exact(ENCODER_INPUT, ENCODER_INPUT, FilterType::Triangle)
        .to_rgb8();
    let input_tensor = Value::from_array(bgr_planes(&face)?)?;

    let outputs = session.run(ort::inputs![input_tensor])?;
    let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;

    // Expecting shape [1, 128]
    let dim = if shape.len() == 2 {
        shape[1] as usize
    } else {
        data.len()
    };
    if data.len() < dim {
        bail!("encoder returned {} values, shape {:?}", data.len(), shape);
    }
    let mut vector = data[..dim].to_vec();

    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    }

    Embedding::new(vector)
}
