use std::path::{Path, PathBuf};

use ab_glyph::{FontVec, PxScale};
use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::Detection;

const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const CAPTION_SCALE: f32 = 24.0;

/// Text written next to the user's face: who they matched and how closely.
pub struct Caption<'a> {
    pub font: &'a FontVec,
    pub label: &'a str,
    pub similarity: f32,
}

/// The two caption lines, similarity rounded to a whole percent.
pub fn caption_lines(label: &str, similarity: f32) -> (String, String) {
    (
        format!("Match: {}", label),
        format!("Similarity: {}%", similarity.round() as i64),
    )
}

pub fn load_font(path: &Path) -> Result<FontVec> {
    let data = std::fs::read(path).with_context(|| format!("reading font {}", path.display()))?;
    FontVec::try_from_vec(data).map_err(|_| anyhow!("{} is not a usable font", path.display()))
}

/// Box around `face`, clipped to the image. `None` if nothing of it is visible.
fn face_rect(image: &RgbImage, face: &Detection) -> Option<Rect> {
    let (w, h) = image.dimensions();
    let [x, y, bw, bh] = face.bbox;
    let x0 = x.max(0.0) as u32;
    let y0 = y.max(0.0) as u32;
    let x1 = ((x + bw).max(0.0) as u32).min(w);
    let y1 = ((y + bh).max(0.0) as u32).min(h);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some(Rect::at(x0 as i32, y0 as i32).of_size(x1 - x0, y1 - y0))
}

/// Copy of `image` with a green two-pixel frame around the face.
pub fn outline_face(image: &RgbImage, face: &Detection) -> RgbImage {
    let mut out = image.clone();
    if let Some(rect) = face_rect(image, face) {
        draw_hollow_rect_mut(&mut out, rect, GREEN);
        if rect.width() > 2 && rect.height() > 2 {
            let inner = Rect::at(rect.left() + 1, rect.top() + 1)
                .of_size(rect.width() - 2, rect.height() - 2);
            draw_hollow_rect_mut(&mut out, inner, GREEN);
        }
    }
    out
}

/// Writes the match line above the face box and the similarity line below it.
/// Text is kept inside the left and top edges; anything past the right or
/// bottom edge is clipped.
pub fn draw_caption(image: &mut RgbImage, face: &Detection, caption: &Caption<'_>) {
    let (w, h) = image.dimensions();
    let rect = face_rect(image, face).unwrap_or_else(|| Rect::at(0, 0).of_size(w, h));
    let scale = PxScale::from(CAPTION_SCALE);
    let (match_line, similarity_line) = caption_lines(caption.label, caption.similarity);

    let match_x = (rect.left() - 100).max(0);
    let match_y = (rect.top() - CAPTION_SCALE as i32 - 6).max(0);
    draw_text_mut(image, WHITE, match_x, match_y, scale, caption.font, &match_line);

    let sim_x = (rect.left() - 6).max(0);
    let sim_y = rect.bottom() + 6;
    draw_text_mut(image, WHITE, sim_x, sim_y, scale, caption.font, &similarity_line);
}

/// Annotated user frame and matched portrait, written to `dir` as
/// `user.png` and `match.png`. With a caption, the user frame also carries
/// the match name and similarity.
pub fn save_pair(
    dir: &Path,
    user: (&RgbImage, &Detection),
    portrait: (&RgbImage, &Detection),
    caption: Option<&Caption<'_>>,
) -> Result<(PathBuf, PathBuf)> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let user_path = dir.join("user.png");
    let mut user_img = outline_face(user.0, user.1);
    if let Some(caption) = caption {
        draw_caption(&mut user_img, user.1, caption);
    }
    user_img
        .save(&user_path)
        .with_context(|| format!("writing {}", user_path.display()))?;

    let match_path = dir.join("match.png");
    outline_face(portrait.0, portrait.1)
        .save(&match_path)
        .with_context(|| format!("writing {}", match_path.display()))?;

    log::info!(
        "Annotated images saved to {} and {}",
        user_path.display(),
        match_path.display()
    );
    Ok((user_path, match_path))
}
