use crate::config::TransformStrategy;
use crate::error::SceneError;
use crate::material::Material;
use crate::mesh::Mesh;
use glam::Mat4;
use rasterscene_common::math::project_point;
use rasterscene_common::{FilteringMethod, Vertex};
use rasterscene_render::{DrawContext, Gpu, RenderError, ResourceFactory};
use std::fmt;
use std::path::PathBuf;

/// Everything needed to build a [`RenderObject`] from files on disk.
#[derive(Debug, Clone)]
pub struct ObjectDesc {
    pub name: String,
    pub mesh: Mesh,
    pub shader: PathBuf,
    pub diffuse_map: Option<PathBuf>,
    pub normal_map: Option<PathBuf>,
    pub specular_map: Option<PathBuf>,
    pub glossiness_map: Option<PathBuf>,
    pub world: Mat4,
    /// `None` defers to the scene's configured strategy.
    pub strategy: Option<TransformStrategy>,
}

impl ObjectDesc {
    pub fn new(name: impl Into<String>, mesh: Mesh, shader: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            mesh,
            shader: shader.into(),
            diffuse_map: None,
            normal_map: None,
            specular_map: None,
            glossiness_map: None,
            world: Mat4::IDENTITY,
            strategy: None,
        }
    }

    pub fn with_diffuse_map(mut self, path: impl Into<PathBuf>) -> Self {
        self.diffuse_map = Some(path.into());
        self
    }

    pub fn with_normal_map(mut self, path: impl Into<PathBuf>) -> Self {
        self.normal_map = Some(path.into());
        self
    }

    pub fn with_specular_map(mut self, path: impl Into<PathBuf>) -> Self {
        self.specular_map = Some(path.into());
        self
    }

    pub fn with_glossiness_map(mut self, path: impl Into<PathBuf>) -> Self {
        self.glossiness_map = Some(path.into());
        self
    }

    pub fn placed_at(mut self, world: Mat4) -> Self {
        self.world = world;
        self
    }

    pub fn with_strategy(mut self, strategy: TransformStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }
}

struct Geometry<G: Gpu> {
    vertices: G::Buffer,
    indices: G::Buffer,
    index_count: u32,
}

/// A mesh on the GPU drawn with one material.
///
/// # Invariants
/// - The world matrix changes only through [`update`](Self::update) and
///   [`place`](Self::place).
/// - The draw index count equals the index buffer length.
/// - When buffer creation failed the object stays alive but draws nothing.
pub struct RenderObject<G: Gpu> {
    name: String,
    mesh: Mesh,
    geometry: Option<Geometry<G>>,
    material: Material<G>,
    strategy: TransformStrategy,
    start_world: Mat4,
    world: Mat4,
    world_view_proj: Mat4,
    rotating: bool,
    angle: f32,
    rotation_speed: f32,
}

impl<G: ResourceFactory> RenderObject<G> {
    pub fn new(
        factory: &G,
        name: impl Into<String>,
        mesh: Mesh,
        material: Material<G>,
        strategy: TransformStrategy,
    ) -> Self {
        let name = name.into();
        let geometry = match upload(factory, &name, &mesh) {
            Ok(geometry) => Some(geometry),
            Err(err) => {
                tracing::error!(object = %name, %err, "object will not be drawn");
                None
            }
        };
        Self {
            name,
            mesh,
            geometry,
            material,
            strategy,
            start_world: Mat4::IDENTITY,
            world: Mat4::IDENTITY,
            world_view_proj: Mat4::IDENTITY,
            rotating: false,
            angle: 0.0,
            rotation_speed: 1.0,
        }
    }

    /// Load the shader and textures named by `desc` and build the object.
    ///
    /// A missing texture leaves its slot unbound; a missing shader is fatal.
    pub fn from_shader(
        factory: &G,
        desc: ObjectDesc,
        filtering: FilteringMethod,
    ) -> Result<Self, SceneError> {
        let program = factory.load_program(&desc.shader).inspect_err(|err| {
            tracing::error!(object = %desc.name, %err, "failed to load shader program");
        })?;
        let mut material = Material::new(factory, desc.name.clone(), program, filtering);

        let maps: [(&str, Option<PathBuf>, fn(&mut Material<G>, G::Texture)); 4] = [
            ("diffuse", desc.diffuse_map, Material::set_diffuse_map),
            ("normal", desc.normal_map, Material::set_normal_map),
            ("specular", desc.specular_map, Material::set_specular_map),
            ("glossiness", desc.glossiness_map, Material::set_glossiness_map),
        ];
        for (kind, path, set) in maps {
            let Some(path) = path else { continue };
            match factory.create_texture_view(&path) {
                Ok(texture) => set(&mut material, texture),
                Err(err) => {
                    tracing::warn!(object = %desc.name, map = kind, %err, "texture left unbound");
                }
            }
        }

        let mut object = Self::new(
            factory,
            desc.name,
            desc.mesh,
            material,
            desc.strategy.unwrap_or_default(),
        );
        object.place(desc.world);
        Ok(object)
    }

    /// Transform every vertex by the current world-view-projection on the
    /// CPU and swap in a freshly uploaded vertex buffer.
    ///
    /// On failure the previous buffer stays bound.
    pub fn bake_transformed_vertices(&mut self, factory: &G) -> Result<(), RenderError> {
        let Some(geometry) = self.geometry.as_mut() else {
            return Ok(());
        };
        let baked: Vec<Vertex> = self
            .mesh
            .vertices()
            .iter()
            .map(|v| Vertex {
                position: project_point(self.world_view_proj, v.position()).to_array(),
                ..*v
            })
            .collect();
        let buffer = factory.create_vertex_buffer(&self.name, bytemuck::cast_slice(&baked))?;
        geometry.vertices = buffer;
        tracing::trace!(object = %self.name, vertices = baked.len(), "baked vertices");
        Ok(())
    }
}

impl<G: Gpu> RenderObject<G> {
    pub fn with_rotation_speed(mut self, radians_per_second: f32) -> Self {
        self.rotation_speed = radians_per_second;
        self
    }

    /// Place the object; rotation restarts from this matrix.
    pub fn place(&mut self, world: Mat4) {
        self.start_world = world;
        self.world = world;
        self.angle = 0.0;
    }

    /// Advance the spin when rotation is enabled.
    pub fn update(&mut self, dt: f32) {
        if !self.rotating {
            return;
        }
        self.angle += self.rotation_speed * dt;
        self.world = self.start_world * Mat4::from_rotation_y(self.angle);
    }

    /// Push world, world-view-projection and inverse view into the material.
    ///
    /// With [`TransformStrategy::CpuBake`] the shader receives the identity
    /// as its world-view-projection, the vertices being transformed already.
    pub fn set_matrix(&mut self, view_projection: Mat4, inverse_view: Mat4) {
        self.world_view_proj = view_projection * self.world;
        self.material.set_world_matrix(self.world);
        self.material.set_world_view_proj_matrix(match self.strategy {
            TransformStrategy::GpuMatrices => self.world_view_proj,
            TransformStrategy::CpuBake => Mat4::IDENTITY,
        });
        self.material.set_inverse_view_matrix(inverse_view);
    }

    pub fn toggle_rotation(&mut self) {
        self.rotating = !self.rotating;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn material(&self) -> &Material<G> {
        &self.material
    }

    pub fn material_mut(&mut self) -> &mut Material<G> {
        &mut self.material
    }

    pub fn strategy(&self) -> TransformStrategy {
        self.strategy
    }

    pub fn world(&self) -> Mat4 {
        self.world
    }

    pub fn start_world(&self) -> Mat4 {
        self.start_world
    }

    pub fn world_view_proj(&self) -> Mat4 {
        self.world_view_proj
    }

    pub fn is_rotating(&self) -> bool {
        self.rotating
    }

    /// Accumulated rotation in radians.
    pub fn angle(&self) -> f32 {
        self.angle
    }

    /// Whether buffer creation succeeded.
    pub fn is_drawable(&self) -> bool {
        self.geometry.is_some()
    }

    pub fn index_count(&self) -> u32 {
        self.geometry.as_ref().map_or(0, |g| g.index_count)
    }

    pub fn vertex_buffer(&self) -> Option<&G::Buffer> {
        self.geometry.as_ref().map(|g| &g.vertices)
    }
}

impl<G: DrawContext> RenderObject<G> {
    /// Bind geometry and draw once per pass of the active technique.
    pub fn render(&self, ctx: &mut G) {
        let Some(geometry) = &self.geometry else {
            return;
        };
        ctx.bind_geometry(&geometry.vertices, Vertex::STRIDE, &geometry.indices);

        let (technique, passes) = self.material.active_technique();
        let bindings = self.material.bindings();
        for pass in 0..passes {
            ctx.apply_pass(self.material.program(), technique, pass, &bindings);
            ctx.draw_indexed(geometry.index_count);
        }
    }
}

impl<G: Gpu> fmt::Debug for RenderObject<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderObject")
            .field("name", &self.name)
            .field("material", &self.material)
            .field("strategy", &self.strategy)
            .field("drawable", &self.is_drawable())
            .field("rotating", &self.rotating)
            .field("angle", &self.angle)
            .finish_non_exhaustive()
    }
}

fn upload<G: ResourceFactory>(
    factory: &G,
    name: &str,
    mesh: &Mesh,
) -> Result<Geometry<G>, RenderError> {
    let vertices = factory.create_vertex_buffer(name, bytemuck::cast_slice(mesh.vertices()))?;
    let indices = factory.create_index_buffer(name, mesh.indices())?;
    Ok(Geometry {
        vertices,
        indices,
        index_count: mesh.index_count(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::{Vec2, Vec3};
    use rasterscene_render::{
        Command, ProgramDesc, RecordingBackend, SlotKind, slots, techniques,
    };
    use std::path::Path;

    fn backend() -> RecordingBackend {
        RecordingBackend::new()
            .with_program("mesh.fx", ProgramDesc::standard())
            .with_program(
                "two_pass.fx",
                ProgramDesc::new()
                    .slot(slots::WORLD_VIEW_PROJ, SlotKind::Matrix)
                    .technique(techniques::DEFAULT, 2),
            )
    }

    fn object(
        backend: &RecordingBackend,
        strategy: TransformStrategy,
    ) -> RenderObject<RecordingBackend> {
        let desc = ObjectDesc::new("cube", Mesh::cube(1.0), "mesh.fx").with_strategy(strategy);
        RenderObject::from_shader(backend, desc, FilteringMethod::Point).unwrap()
    }

    fn uploaded_vertices(object: &RenderObject<RecordingBackend>) -> Vec<Vertex> {
        object
            .vertex_buffer()
            .unwrap()
            .contents()
            .chunks_exact(Vertex::STRIDE as usize)
            .map(bytemuck::pod_read_unaligned)
            .collect()
    }

    fn last_pass_matrix(backend: &RecordingBackend, slot: &str) -> Mat4 {
        backend
            .commands()
            .into_iter()
            .rev()
            .find_map(|c| match c {
                Command::ApplyPass { matrices, .. } => matrices
                    .into_iter()
                    .find(|(name, _)| name == slot)
                    .map(|(_, m)| m),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn buffers_are_sized_exactly() {
        let backend = backend();
        let object = object(&backend, TransformStrategy::GpuMatrices);
        assert_eq!(object.vertex_buffer().unwrap().byte_len(), 24 * 44);
        let commands = backend.commands();
        assert!(commands.iter().any(|c| matches!(
            c,
            Command::CreateIndexBuffer { label, indices: 36, .. } if label == "cube"
        )));
        assert_eq!(object.index_count(), 36);
    }

    #[test]
    fn missing_shader_is_a_construction_error() {
        let backend = backend();
        let desc = ObjectDesc::new("cube", Mesh::cube(1.0), "missing.fx");
        let err = RenderObject::from_shader(&backend, desc, FilteringMethod::Point).unwrap_err();
        assert!(matches!(err, SceneError::Render(RenderError::ProgramLoad { .. })));
    }

    #[test]
    fn missing_texture_leaves_slot_unbound() {
        let backend = backend().with_missing_texture("gone.png");
        let desc = ObjectDesc::new("cube", Mesh::cube(1.0), "mesh.fx")
            .with_diffuse_map("gone.png")
            .with_normal_map("normal.png");
        let object = RenderObject::from_shader(&backend, desc, FilteringMethod::Point).unwrap();
        assert_eq!(object.material().bindings().textures.len(), 1);
    }

    #[test]
    fn buffer_failure_makes_render_a_no_op() {
        let mut backend = backend();
        backend.set_fail_buffers(true);
        let object = object(&backend, TransformStrategy::GpuMatrices);
        assert!(!object.is_drawable());
        backend.set_fail_buffers(false);
        backend.journal().clear();
        object.render(&mut backend);
        assert!(backend.commands().is_empty());
    }

    #[test]
    fn rotation_accumulates_only_while_enabled() {
        let backend = backend();
        let mut object =
            object(&backend, TransformStrategy::GpuMatrices).with_rotation_speed(2.0);
        object.update(1.0);
        assert_eq!(object.angle(), 0.0);

        object.toggle_rotation();
        object.update(0.25);
        object.update(0.5);
        assert_relative_eq!(object.angle(), 2.0 * 0.75, epsilon = 1e-6);

        object.toggle_rotation();
        object.update(3.0);
        assert_relative_eq!(object.angle(), 1.5, epsilon = 1e-6);

        object.toggle_rotation();
        object.toggle_rotation();
        assert!(!object.is_rotating());
    }

    #[test]
    fn one_second_at_unit_speed_rotates_by_one_radian() {
        let backend = backend();
        let mut object = object(&backend, TransformStrategy::GpuMatrices);
        let start =
            Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)) * Mat4::from_scale(Vec3::splat(2.0));
        object.place(start);
        object.toggle_rotation();
        object.update(1.0);
        assert!(object.world().abs_diff_eq(start * Mat4::from_rotation_y(1.0), 1e-6));
    }

    #[test]
    fn render_draws_with_world_then_view_projection() {
        let mut backend = backend();
        let mut object = object(&backend, TransformStrategy::GpuMatrices);
        let world = Mat4::from_scale(Vec3::new(2.0, 3.0, 0.5));
        let view = Mat4::from_rotation_y(0.4) * Mat4::from_translation(Vec3::new(0.0, 0.0, 10.0));
        let projection = rasterscene_common::math::perspective_lh(1.0, 1.5, 0.1, 100.0);
        let view_projection = projection * view;
        let inverse_view = view.inverse();
        object.place(world);
        object.set_matrix(view_projection, inverse_view);
        object.render(&mut backend);

        let wvp = last_pass_matrix(&backend, "world_view_proj");
        assert!(wvp.abs_diff_eq(view_projection * world, 1e-5));
        assert_eq!(last_pass_matrix(&backend, "world"), world);
        assert_eq!(last_pass_matrix(&backend, "view_inverse"), inverse_view);

        // A point goes through the world transform before the view.
        let p = Vec3::new(1.0, 1.0, 1.0);
        let expected = view_projection.project_point3(world.transform_point3(p));
        let actual = (view_projection * world).project_point3(p);
        assert!(actual.abs_diff_eq(expected, 1e-5));
    }

    #[test]
    fn identity_setup_draws_every_index_once_per_pass() {
        let mut backend = backend();
        let desc = ObjectDesc::new("cube", Mesh::cube(1.0), "two_pass.fx");
        let mut object = RenderObject::from_shader(&backend, desc, FilteringMethod::Point).unwrap();
        object.set_matrix(Mat4::IDENTITY, Mat4::IDENTITY);
        backend.journal().clear();
        object.render(&mut backend);

        let commands = backend.commands();
        assert!(matches!(commands[0], Command::BindGeometry { stride: 44, .. }));
        let passes: Vec<u32> = commands
            .iter()
            .filter_map(|c| match c {
                Command::ApplyPass { pass, .. } => Some(*pass),
                _ => None,
            })
            .collect();
        assert_eq!(passes, vec![0, 1]);
        assert_eq!(backend.journal().draws(), vec![36, 36]);
    }

    #[test]
    fn cpu_bake_uploads_projected_vertices_and_identity_wvp() {
        let mut backend = backend();
        let mut object = object(&backend, TransformStrategy::CpuBake);
        let vp = Mat4::from_translation(Vec3::new(0.0, 0.0, 5.0));
        object.set_matrix(vp, Mat4::IDENTITY);
        object.bake_transformed_vertices(&backend).unwrap();

        let baked = uploaded_vertices(&object);
        for (baked, source) in baked.iter().zip(object.mesh().vertices()) {
            let expected = source.position() + Vec3::new(0.0, 0.0, 5.0);
            assert!(baked.position().abs_diff_eq(expected, 1e-6));
            assert_eq!(baked.uv, source.uv);
        }

        object.render(&mut backend);
        assert_eq!(last_pass_matrix(&backend, "world_view_proj"), Mat4::IDENTITY);
    }

    #[test]
    fn bake_divides_by_w() {
        let backend = backend();
        let vertices = vec![
            Vertex::new(Vec3::new(2.0, 4.0, 1.0), Vec2::ZERO, Vec3::Z, Vec3::X),
            Vertex::new(Vec3::new(1.0, 1.0, 0.0), Vec2::ZERO, Vec3::Z, Vec3::X),
            Vertex::new(Vec3::new(0.0, 0.0, 2.0), Vec2::ZERO, Vec3::Z, Vec3::X),
        ];
        let mesh = Mesh::new(vertices, vec![0, 1, 2]).unwrap();
        let program = backend.load_program(Path::new("mesh.fx")).unwrap();
        let material = Material::new(&backend, "tri", program, FilteringMethod::Point);
        let mut object =
            RenderObject::new(&backend, "tri", mesh, material, TransformStrategy::CpuBake);

        // w = z: the second vertex has w = 0 and keeps its undivided xyz.
        let w_from_z = Mat4::from_cols(
            glam::Vec4::X,
            glam::Vec4::Y,
            glam::Vec4::new(0.0, 0.0, 1.0, 1.0),
            glam::Vec4::ZERO,
        );
        object.set_matrix(w_from_z, Mat4::IDENTITY);
        object.bake_transformed_vertices(&backend).unwrap();

        let baked = uploaded_vertices(&object);
        assert!(baked[0].position().abs_diff_eq(Vec3::new(2.0, 4.0, 1.0), 1e-6));
        assert!(baked[1].position().abs_diff_eq(Vec3::new(1.0, 1.0, 0.0), 1e-6));
        assert!(baked[2].position().abs_diff_eq(Vec3::new(0.0, 0.0, 1.0), 1e-6));
    }

    #[test]
    fn failed_bake_keeps_previous_buffer() {
        let mut backend = backend();
        let mut object = object(&backend, TransformStrategy::CpuBake);
        let before = object.vertex_buffer().unwrap().id();
        backend.set_fail_buffers(true);
        assert!(object.bake_transformed_vertices(&backend).is_err());
        assert_eq!(object.vertex_buffer().unwrap().id(), before);
    }

    #[test]
    fn dropping_object_releases_all_resources() {
        let backend = backend();
        let journal = backend.journal();
        let desc = ObjectDesc::new("cube", Mesh::cube(1.0), "mesh.fx").with_diffuse_map("d.png");
        let object = RenderObject::from_shader(&backend, desc, FilteringMethod::Point).unwrap();
        drop(object);
        // program, sampler, texture, vertex buffer, index buffer
        assert_eq!(journal.released().len(), 5);
    }
}
