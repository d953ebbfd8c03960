use std::time::Duration;

use image::RgbImage;
use log::{debug, info, warn};

use crate::backend::{FaceBackend, SourceOpener, VideoSource};
use crate::error::{MatchError, Result};
use crate::{Detection, Embedding};

/// Default number of frames sampled before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 100;

#[derive(Debug, Clone)]
pub struct CapturePolicy {
    pub max_attempts: u32,
    /// Pause between unsuccessful attempts.
    pub frame_delay: Duration,
}

impl Default for CapturePolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            frame_delay: Duration::ZERO,
        }
    }
}

/// A frame with at least one face in it.
#[derive(Debug, Clone)]
pub struct Capture {
    pub image: RgbImage,
    pub faces: Vec<Detection>,
    pub embeddings: Vec<Embedding>,
    /// 1-based attempt on which the face was found.
    pub attempt: u32,
}

impl Capture {
    /// Embedding of the most confident face.
    pub fn primary(&self) -> Option<&Embedding> {
        self.embeddings.first()
    }
}

/// Sample frames from the source until one yields a face embedding.
///
/// A frame that cannot be read counts as a failed attempt and sampling goes
/// on; only an unopenable source or an exhausted budget ends the loop early.
/// The source is dropped before this returns on every path.
pub fn capture_face<O, B>(opener: &mut O, backend: &mut B, policy: &CapturePolicy) -> Result<Capture>
where
    O: SourceOpener,
    B: FaceBackend + ?Sized,
{
    let mut source = opener.open().map_err(|e| {
        warn!("failed to open video source: {:#}", e);
        MatchError::SourceUnavailable(e)
    })?;

    for attempt in 1..=policy.max_attempts {
        if attempt > 1 && !policy.frame_delay.is_zero() {
            std::thread::sleep(policy.frame_delay);
        }

        let image = match source.read_frame() {
            Ok(image) => image,
            Err(e) => {
                warn!("Attempt {}: failed to capture frame: {:#}", attempt, e);
                continue;
            }
        };

        let faces = backend.locate(&image).map_err(MatchError::Backend)?;
        if faces.is_empty() {
            debug!("Attempt {}: no face detected, retrying", attempt);
            continue;
        }

        let embeddings = backend.encode(&image, &faces).map_err(MatchError::Backend)?;
        if embeddings.is_empty() {
            debug!("Attempt {}: face not encodable, retrying", attempt);
            continue;
        }

        info!(
            "Face captured on attempt {} ({} face(s) in frame)",
            attempt,
            faces.len()
        );
        return Ok(Capture {
            image,
            faces,
            embeddings,
            attempt,
        });
    }

    warn!("No face found after {} attempts", policy.max_attempts);
    Err(MatchError::NoFaceFound)
}
