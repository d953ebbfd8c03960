use anyhow::{Context, Result};
use image::{DynamicImage, RgbImage};
use ort::session::Session;

use crate::face::{self, Detection, Embedding};
use crate::model::{self, ModelPaths};

/// Encoder input side; aligned crops are produced at this size.
const ALIGNED_SIZE: u32 = 112;

/// Full pipeline: detect faces → align → encode
pub struct Pipeline {
    pub detector: Session,
    pub encoder: Session,
    pub score_threshold: f32,
    pub nms_threshold: f32,
}

impl Pipeline {
    pub fn new(paths: &ModelPaths, score_threshold: f32, nms_threshold: f32) -> Result<Self> {
        Ok(Self {
            detector: model::detector_session(paths)?,
            encoder: model::recog_session(paths)?,
            score_threshold,
            nms_threshold,
        })
    }

    /// All faces in the image, best score first.
    pub fn locate(&mut self, img: &RgbImage) -> Result<Vec<Detection>> {
        let img = DynamicImage::ImageRgb8(img.clone());
        let mut detections =
            face::detect_faces(&mut self.detector, &img, self.score_threshold, self.nms_threshold)
                .context("detecting faces")?;
        detections.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(detections)
    }

    /// One embedding per given face, in the same order.
    pub fn encode(&mut self, img: &RgbImage, faces: &[Detection]) -> Result<Vec<Embedding>> {
        let img = DynamicImage::ImageRgb8(img.clone());
        faces
            .iter()
            .map(|det| {
                let crop = face::align_face(&img, det, ALIGNED_SIZE).context("aligning face")?;
                face::encode_face(&mut self.encoder, &crop).context("encoding face")
            })
            .collect()
    }

    /// Process an image: detect best face and return it with its embedding
    pub fn process_image(&mut self, img: &RgbImage) -> Result<(Detection, Embedding)> {
        let best = self
            .locate(img)?
            .into_iter()
            .next()
            .context("No face detected in image")?;
        let embedding = self
            .encode(img, std::slice::from_ref(&best))?
            .into_iter()
            .next()
            .context("encoder produced no embedding")?;
        Ok((best, embedding))
    }
}
