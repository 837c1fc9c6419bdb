//! Render backend seam: resources, draws and presentation.
//!
//! # Invariants
//! - The scene only talks to a GPU through the [`Backend`] traits.
//! - Resources are owned values; dropping one releases it.
//!
//! [`RecordingBackend`] records every call instead of drawing, so scene
//! logic runs headless in tests and in the CLI.

pub mod backend;
mod error;
mod recording;

pub use backend::{
    Backend, ClearValues, DrawContext, Gpu, PassBindings, Presenter, ResourceFactory,
    ShaderProgram, SlotId, SlotKind, TechniqueDesc, TechniqueId, slots, techniques,
};
pub use error::RenderError;
pub use recording::{
    Command, Journal, ProgramDesc, RecordedBuffer, RecordedProgram, RecordedSampler,
    RecordedTexture, RecordingBackend, ResourceId,
};

pub fn crate_info() -> &'static str {
    "rasterscene-render v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("render"));
    }

    #[test]
    fn filtering_techniques_are_distinct() {
        use rasterscene_common::FilteringMethod;
        let names: Vec<_> = FilteringMethod::ALL
            .iter()
            .map(|f| techniques::for_filtering(*f))
            .collect();
        assert_eq!(names, vec!["point", "linear", "anisotropic"]);
    }
}
