pub mod annotate;
pub mod backend;
pub mod capture;
pub mod config;
pub mod error;
pub mod gallery;
pub mod matcher;
pub mod prompt;
pub mod report;

// Re-export vision types for convenience
pub use lookalike_vision::{face, pipeline, video, Detection, Embedding, Pipeline, EMBEDDING_DIM};

pub use error::MatchError;
