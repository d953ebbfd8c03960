//! Capture, gallery loading and matching wired together with an in-memory
//! camera and a backend that reads faces off pixel colours.

use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};
use lookalike::annotate;
use lookalike::backend::{Euclidean, FaceBackend, SourceOpener, VideoSource};
use lookalike::capture::{capture_face, CapturePolicy};
use lookalike::gallery::Gallery;
use lookalike::matcher::find_match;
use lookalike::report::MatchReport;
use lookalike::{Detection, Embedding, MatchError, EMBEDDING_DIM};
use std::path::Path;

/// A face is any image whose top-left pixel is not black; its embedding puts
/// the pixel's red channel (scaled to [0, 1]) in the first slot.
struct ColourFaces;

impl FaceBackend for ColourFaces {
    fn locate(&mut self, image: &RgbImage) -> Result<Vec<Detection>> {
        if image.get_pixel(0, 0).0 == [0, 0, 0] {
            return Ok(vec![]);
        }
        let (w, h) = image.dimensions();
        Ok(vec![Detection::from_bbox(
            [1.0, 1.0, w as f32 - 2.0, h as f32 - 2.0],
            0.95,
        )])
    }

    fn encode(&mut self, image: &RgbImage, faces: &[Detection]) -> Result<Vec<Embedding>> {
        let mut v = vec![0.0; EMBEDDING_DIM];
        v[0] = image.get_pixel(0, 0)[0] as f32 / 255.0;
        faces.iter().map(|_| Embedding::new(v.clone())).collect()
    }
}

struct Frames(Vec<RgbImage>);

impl VideoSource for Frames {
    fn read_frame(&mut self) -> Result<RgbImage> {
        if self.0.is_empty() {
            return Err(anyhow!("end of stream"));
        }
        Ok(self.0.remove(0))
    }
}

struct Webcam(Option<Vec<RgbImage>>);

impl SourceOpener for Webcam {
    type Source = Frames;

    fn open(&mut self) -> Result<Frames> {
        self.0
            .take()
            .map(Frames)
            .ok_or_else(|| anyhow!("device busy"))
    }
}

fn solid(red: u8) -> RgbImage {
    RgbImage::from_pixel(16, 16, Rgb([red, 30, 30]))
}

fn write_portrait(dir: &Path, name: &str, red: u8) -> Result<()> {
    solid(red).save(dir.join(name))?;
    Ok(())
}

#[test]
fn test_capture_and_match_against_portraits() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write_portrait(dir.path(), "George Washington.png", 250)?;
    write_portrait(dir.path(), "John Adams.png", 128)?;
    write_portrait(dir.path(), "Thomas Jefferson.png", 10)?;
    RgbImage::new(16, 16).save(dir.path().join("flash drive.png"))?;

    let mut backend = ColourFaces;
    let gallery = Gallery::load_dir(dir.path(), &mut backend)?;
    assert_eq!(gallery.len(), 3);
    assert!(!gallery.labels().contains(&"flash drive"));

    // Two empty frames, then a face closest to John Adams.
    let mut webcam = Webcam(Some(vec![RgbImage::new(8, 8), RgbImage::new(8, 8), solid(140)]));
    let capture = capture_face(&mut webcam, &mut backend, &CapturePolicy::default())?;
    assert_eq!(capture.attempt, 3);

    let encoding = capture.primary().expect("capture has an embedding");
    let found = find_match(encoding.as_slice(), &gallery.embeddings(), &Euclidean)?;
    let entry = gallery.get(found.index).expect("index in gallery");
    assert_eq!(entry.label, "John Adams");

    let expected = (140.0 - 128.0) / 255.0;
    assert!((found.distance - expected).abs() < 1e-5);
    assert!((found.similarity - (1.0 - expected) * 100.0).abs() < 1e-3);

    let out = dir.path().join("out");
    let (user, portrait) = annotate::save_pair(
        &out,
        (&capture.image, &capture.faces[0]),
        (&entry.image, &entry.face),
        None,
    )?;
    assert!(user.exists() && portrait.exists());

    let report = MatchReport::new(&entry.label, &found, capture.attempt);
    assert!(report.to_text().contains("John Adams"));
    Ok(())
}

#[test]
fn test_gallery_without_faces_fails_at_match() -> Result<()> {
    let dir = tempfile::tempdir()?;
    RgbImage::new(16, 16).save(dir.path().join("blank.png"))?;
    std::fs::write(dir.path().join("readme.jpg"), "text")?;

    let gallery = Gallery::load_dir(dir.path(), &mut ColourFaces)?;
    assert!(gallery.is_empty());

    let query = vec![0.5f32; EMBEDDING_DIM];
    let err = find_match(&query, &gallery.embeddings(), &Euclidean).unwrap_err();
    assert!(matches!(err, MatchError::NoValidCandidates));
    Ok(())
}

#[test]
fn test_busy_camera_is_unavailable() {
    let mut webcam = Webcam(None);
    let err = capture_face(&mut webcam, &mut ColourFaces, &CapturePolicy::default()).unwrap_err();
    assert!(matches!(err, MatchError::SourceUnavailable(_)));
}

#[test]
fn test_stream_ending_without_face() {
    let mut webcam = Webcam(Some(vec![RgbImage::new(8, 8); 3]));
    let policy = CapturePolicy {
        max_attempts: 10,
        ..Default::default()
    };
    let err = capture_face(&mut webcam, &mut ColourFaces, &policy).unwrap_err();
    assert!(matches!(err, MatchError::NoFaceFound));
}
