//! Seams between the matching logic and the recognition backend.
//!
//! The capture loop, gallery loader and matcher only see these traits, so
//! they can run against the ONNX pipeline and V4L2 camera in production and
//! against in-memory fakes in tests.

use anyhow::Result;
use image::RgbImage;
use lookalike_vision::{face, Camera, Detection, Embedding, Pipeline};

/// Face location and embedding extraction.
pub trait FaceBackend {
    /// Faces found in the image, most confident first.
    fn locate(&mut self, image: &RgbImage) -> Result<Vec<Detection>>;

    /// One embedding per face, in the order given.
    fn encode(&mut self, image: &RgbImage, faces: &[Detection]) -> Result<Vec<Embedding>>;
}

/// Distance between two embeddings. Smaller means more alike.
pub trait DistanceMetric {
    fn distance(&self, a: &[f32], b: &[f32]) -> f32;

    fn distances(&self, query: &[f32], candidates: &[&[f32]]) -> Vec<f32> {
        candidates.iter().map(|c| self.distance(query, c)).collect()
    }
}

/// Euclidean distance over the embedding space.
#[derive(Debug, Clone, Copy, Default)]
pub struct Euclidean;

impl DistanceMetric for Euclidean {
    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        face::euclidean_distance(a, b)
    }
}

/// A stream of RGB frames.
pub trait VideoSource {
    fn read_frame(&mut self) -> Result<RgbImage>;
}

/// Acquires a [`VideoSource`]. The source is released when it is dropped.
pub trait SourceOpener {
    type Source: VideoSource;

    fn open(&mut self) -> Result<Self::Source>;
}

impl FaceBackend for Pipeline {
    fn locate(&mut self, image: &RgbImage) -> Result<Vec<Detection>> {
        Pipeline::locate(self, image)
    }

    fn encode(&mut self, image: &RgbImage, faces: &[Detection]) -> Result<Vec<Embedding>> {
        Pipeline::encode(self, image, faces)
    }
}

impl VideoSource for Camera {
    fn read_frame(&mut self) -> Result<RgbImage> {
        self.frame()
    }
}

/// Opens a V4L2 device by path, e.g. `/dev/video0`.
#[derive(Debug, Clone)]
pub struct CameraOpener {
    pub device: String,
}

impl SourceOpener for CameraOpener {
    type Source = Camera;

    fn open(&mut self) -> Result<Camera> {
        Camera::open(&self.device)
    }
}
