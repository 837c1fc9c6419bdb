use rasterscene_common::FilteringMethod;
use std::path::PathBuf;

/// Errors reported by a render backend.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("failed to create {kind} buffer `{label}`: {reason}")]
    BufferCreation {
        kind: &'static str,
        label: String,
        reason: String,
    },
    #[error("failed to load texture {path:?}: {reason}")]
    TextureLoad { path: PathBuf, reason: String },
    #[error("failed to create {filter} sampler: {reason}")]
    SamplerCreation {
        filter: FilteringMethod,
        reason: String,
    },
    #[error("failed to load shader program {path:?}: {reason}")]
    ProgramLoad { path: PathBuf, reason: String },
    #[error("gpu device unavailable: {0}")]
    Device(String),
    #[error("surface unavailable: {0}")]
    Surface(String),
    #[error("no frame in progress")]
    NoFrame,
}
