use crate::RenderError;
use glam::Mat4;
use rasterscene_common::FilteringMethod;
use std::path::Path;

/// Well-known shader parameter slot names.
pub mod slots {
    pub const WORLD: &str = "world";
    pub const WORLD_VIEW_PROJ: &str = "world_view_proj";
    pub const VIEW_INVERSE: &str = "view_inverse";
    pub const DIFFUSE_MAP: &str = "diffuse_map";
    pub const NORMAL_MAP: &str = "normal_map";
    pub const SPECULAR_MAP: &str = "specular_map";
    pub const GLOSSINESS_MAP: &str = "glossiness_map";
    pub const SAMPLER: &str = "sampler";
}

/// Well-known technique names.
pub mod techniques {
    use rasterscene_common::FilteringMethod;

    pub const DEFAULT: &str = "default";
    pub const POINT: &str = "point";
    pub const LINEAR: &str = "linear";
    pub const ANISOTROPIC: &str = "anisotropic";
    pub const TRANSPARENT: &str = "transparent";

    /// Technique a program exposes for one filtering tier, when it bakes
    /// the sampler state into separate techniques.
    pub fn for_filtering(filter: FilteringMethod) -> &'static str {
        match filter {
            FilteringMethod::Point => POINT,
            FilteringMethod::Linear => LINEAR,
            FilteringMethod::Anisotropic => ANISOTROPIC,
        }
    }

    /// Whether `name` is drawn blended over what is already in the target,
    /// without writing depth: `transparent` itself or `transparent_<suffix>`.
    pub fn is_transparent(name: &str) -> bool {
        name.strip_prefix(TRANSPARENT)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('_'))
    }
}

/// Index of a resolved parameter slot within a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(pub u32);

/// What a parameter slot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    Matrix,
    Texture,
    Sampler,
}

/// Index of a technique within a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TechniqueId(pub u32);

/// A named technique and the number of sequential passes it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TechniqueDesc {
    pub name: String,
    pub passes: u32,
}

impl TechniqueDesc {
    pub fn new(name: impl Into<String>, passes: u32) -> Self {
        Self {
            name: name.into(),
            passes,
        }
    }
}

/// Values used to clear the frame targets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearValues {
    pub color: [f32; 4],
    pub depth: f32,
    pub stencil: u32,
}

impl Default for ClearValues {
    fn default() -> Self {
        Self {
            color: [0.0, 0.0, 0.3, 1.0],
            depth: 1.0,
            stencil: 0,
        }
    }
}

/// Resource types of a backend.
pub trait Gpu {
    type Buffer;
    type Texture;
    type Sampler;
    type Program: ShaderProgram;
}

/// A loaded shader program: named parameter slots and selectable techniques.
pub trait ShaderProgram {
    /// Resolve a named slot of the given kind.
    fn slot(&self, name: &str, kind: SlotKind) -> Option<SlotId>;

    /// Techniques in declaration order.
    fn techniques(&self) -> &[TechniqueDesc];

    fn technique(&self, name: &str) -> Option<TechniqueId> {
        self.techniques()
            .iter()
            .position(|t| t.name == name)
            .map(|i| TechniqueId(i as u32))
    }

    fn pass_count(&self, technique: TechniqueId) -> u32 {
        self.techniques()
            .get(technique.0 as usize)
            .map_or(0, |t| t.passes)
    }
}

/// Creates GPU-resident resources.
pub trait ResourceFactory: Gpu {
    /// Immutable vertex buffer holding exactly `contents`.
    fn create_vertex_buffer(&self, label: &str, contents: &[u8])
    -> Result<Self::Buffer, RenderError>;

    /// Immutable 32-bit index buffer holding exactly `indices`.
    fn create_index_buffer(&self, label: &str, indices: &[u32])
    -> Result<Self::Buffer, RenderError>;

    fn create_texture_view(&self, path: &Path) -> Result<Self::Texture, RenderError>;

    fn create_sampler(&self, filter: FilteringMethod) -> Result<Self::Sampler, RenderError>;

    fn load_program(&self, path: &Path) -> Result<Self::Program, RenderError>;
}

/// Parameter values handed to the backend when a pass is applied.
pub struct PassBindings<'a, G: Gpu + ?Sized> {
    pub matrices: Vec<(SlotId, Mat4)>,
    pub textures: Vec<(SlotId, &'a G::Texture)>,
    pub sampler: Option<(SlotId, &'a G::Sampler)>,
}

impl<G: Gpu + ?Sized> Default for PassBindings<'_, G> {
    fn default() -> Self {
        Self {
            matrices: Vec::new(),
            textures: Vec::new(),
            sampler: None,
        }
    }
}

/// Binds state and records draws for the frame in progress.
pub trait DrawContext: Gpu {
    fn bind_geometry(&mut self, vertices: &Self::Buffer, stride: u32, indices: &Self::Buffer);

    /// Apply pass `pass` of `technique`, uploading `bindings` first.
    fn apply_pass(
        &mut self,
        program: &Self::Program,
        technique: TechniqueId,
        pass: u32,
        bindings: &PassBindings<'_, Self>,
    );

    fn draw_indexed(&mut self, index_count: u32);
}

/// Frame begin/end against the presentation surface.
pub trait Presenter {
    /// Whether device and surface finished initializing.
    fn is_ready(&self) -> bool {
        true
    }

    /// Begin a frame by clearing color, depth and stencil.
    fn clear(&mut self, values: &ClearValues) -> Result<(), RenderError>;

    /// Submit the frame's draws and present it.
    fn present(&mut self) -> Result<(), RenderError>;

    fn resize(&mut self, _width: u32, _height: u32) {}
}

/// Everything the scene needs from a backend.
pub trait Backend: ResourceFactory + DrawContext + Presenter {}

impl<T: ResourceFactory + DrawContext + Presenter> Backend for T {}
