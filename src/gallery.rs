use std::path::{Path, PathBuf};

use image::RgbImage;
use log::{debug, info, warn};

use crate::backend::FaceBackend;
use crate::error::{MatchError, Result};
use crate::{Detection, Embedding};

/// One labelled reference face.
#[derive(Debug, Clone)]
pub struct GalleryEntry {
    /// File name without its extension.
    pub label: String,
    pub embedding: Embedding,
    pub image: RgbImage,
    /// Where the face sits in `image`.
    pub face: Detection,
    pub path: PathBuf,
}

/// The reference set loaded from an image directory. Immutable once loaded.
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    entries: Vec<GalleryEntry>,
}

/// Regular files in `dir`, sorted by name.
pub fn list_image_files(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Err(MatchError::InvalidPath(dir.to_path_buf()));
    }
    let read = std::fs::read_dir(dir).map_err(|_| MatchError::InvalidPath(dir.to_path_buf()))?;

    let mut names: Vec<String> = read
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| !name.starts_with('.'))
        .collect();
    names.sort();
    Ok(names)
}

fn label_for(file: &str) -> String {
    Path::new(file)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.to_string())
}

impl Gallery {
    /// Encode every listed file under `dir`. Files that cannot be decoded or
    /// that show no face are logged and left out; only a missing directory
    /// is an error.
    pub fn load<B>(dir: &Path, files: &[String], backend: &mut B) -> Result<Self>
    where
        B: FaceBackend + ?Sized,
    {
        if !dir.is_dir() {
            return Err(MatchError::InvalidPath(dir.to_path_buf()));
        }

        let mut entries = Vec::with_capacity(files.len());
        for file in files {
            let path = dir.join(file);
            let image = match image::open(&path) {
                Ok(img) => img.to_rgb8(),
                Err(e) => {
                    warn!("Could not read image {}: {}. Skipping.", file, e);
                    continue;
                }
            };

            let (face, embedding) = match encode_first(backend, &image) {
                Ok(Some(found)) => found,
                Ok(None) => {
                    warn!("No face detected in {}. Skipping.", file);
                    continue;
                }
                Err(e) => {
                    warn!("Error encoding {}: {:#}. Skipping.", file, e);
                    continue;
                }
            };

            debug!("gallery: {} encoded", file);
            entries.push(GalleryEntry {
                label: label_for(file),
                embedding,
                image,
                face,
                path,
            });
        }

        info!(
            "Loaded {} of {} gallery image(s) from {}",
            entries.len(),
            files.len(),
            dir.display()
        );
        Ok(Self { entries })
    }

    /// Load every file in `dir`.
    pub fn load_dir<B>(dir: &Path, backend: &mut B) -> Result<Self>
    where
        B: FaceBackend + ?Sized,
    {
        let files = list_image_files(dir)?;
        Self::load(dir, &files, backend)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&GalleryEntry> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn labels(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.label.as_str()).collect()
    }

    pub fn embeddings(&self) -> Vec<&[f32]> {
        self.entries.iter().map(|e| e.embedding.as_slice()).collect()
    }
}

fn encode_first<B>(backend: &mut B, image: &RgbImage) -> anyhow::Result<Option<(Detection, Embedding)>>
where
    B: FaceBackend + ?Sized,
{
    let Some(face) = backend.locate(image)?.into_iter().next() else {
        return Ok(None);
    };
    let embedding = backend
        .encode(image, std::slice::from_ref(&face))?
        .into_iter()
        .next();
    Ok(embedding.map(|e| (face, e)))
}
