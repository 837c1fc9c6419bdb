use crate::camera::Camera;
use crate::config::{SceneConfig, TransformStrategy, Viewport};
use crate::error::SceneError;
use crate::object::{ObjectDesc, RenderObject};
use rasterscene_common::FilteringMethod;
use rasterscene_input::InputState;
use rasterscene_render::{Backend, ClearValues};

/// Index of an object in submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub usize);

/// Owns the backend, the camera and every object, and steps them frame by
/// frame: [`update`](Scene::update) then [`render`](Scene::render).
///
/// Objects are drawn in insertion order. Global toggles are broadcast to
/// every object.
pub struct Scene<B: Backend> {
    backend: B,
    camera: Camera,
    objects: Vec<RenderObject<B>>,
    viewport: Viewport,
    clear: ClearValues,
    rotation_speed: f32,
    transform_strategy: TransformStrategy,
    filtering: FilteringMethod,
}

impl<B: Backend> Scene<B> {
    pub fn new(backend: B, config: &SceneConfig, viewport: Viewport) -> Result<Self, SceneError> {
        config.validate()?;
        let mut scene = Self {
            backend,
            camera: Camera::from_config(&config.camera, viewport.aspect_ratio()),
            objects: Vec::new(),
            viewport,
            clear: ClearValues {
                color: config.clear_color,
                ..ClearValues::default()
            },
            rotation_speed: config.rotation_speed,
            transform_strategy: config.transform_strategy,
            filtering: config.filtering,
        };
        scene.backend.resize(viewport.width, viewport.height);
        if scene.is_initialized() {
            tracing::info!(
                width = viewport.width,
                height = viewport.height,
                filtering = %scene.filtering,
                "scene initialized"
            );
        } else {
            tracing::warn!("backend not ready; frames will be skipped");
        }
        Ok(scene)
    }

    /// Build an object from disk and append it.
    pub fn spawn(&mut self, mut desc: ObjectDesc) -> Result<ObjectId, SceneError> {
        desc.strategy.get_or_insert(self.transform_strategy);
        let object = RenderObject::from_shader(&self.backend, desc, self.filtering)?
            .with_rotation_speed(self.rotation_speed);
        Ok(self.push(object))
    }

    /// Append an already built object, bringing its material to the scene's
    /// filtering tier.
    pub fn push(&mut self, mut object: RenderObject<B>) -> ObjectId {
        if object.material().filtering() != self.filtering {
            if let Err(err) = object.material_mut().activate(self.filtering, &self.backend) {
                tracing::warn!(object = object.name(), %err, "failed to sync filtering");
            }
        }
        tracing::debug!(object = object.name(), index = self.objects.len(), "object added");
        self.objects.push(object);
        ObjectId(self.objects.len() - 1)
    }

    /// Camera, then for every object: matrices, animation, optional bake.
    pub fn update(&mut self, dt: f32, input: &InputState) {
        self.camera.update(dt, input);
        let view_projection = self.camera.view_projection();
        let inverse_view = self.camera.inverse_view_matrix();

        for object in &mut self.objects {
            object.set_matrix(view_projection, inverse_view);
            object.update(dt);
            if object.strategy() == TransformStrategy::CpuBake {
                if let Err(err) = object.bake_transformed_vertices(&self.backend) {
                    tracing::warn!(
                        object = object.name(),
                        %err,
                        "bake failed, keeping old vertices"
                    );
                }
            }
        }
    }

    /// Clear, draw every object in order, present. Skipped until the backend
    /// is ready; failures are logged and the frame is dropped.
    pub fn render(&mut self) {
        if !self.is_initialized() {
            tracing::trace!("render skipped: backend not ready");
            return;
        }
        if let Err(err) = self.backend.clear(&self.clear) {
            tracing::warn!(%err, "frame skipped");
            return;
        }
        for object in &self.objects {
            object.render(&mut self.backend);
        }
        if let Err(err) = self.backend.present() {
            tracing::warn!(%err, "present failed");
        }
    }

    pub fn toggle_rotation(&mut self) {
        for object in &mut self.objects {
            object.toggle_rotation();
        }
        tracing::info!(objects = self.objects.len(), "rotation toggled");
    }

    /// Advance every material to the next tier and return it.
    pub fn toggle_filtering_method(&mut self) -> FilteringMethod {
        self.filtering = self.filtering.next();
        for object in &mut self.objects {
            if let Err(err) = object.material_mut().activate(self.filtering, &self.backend) {
                tracing::warn!(object = object.name(), %err, "sampler rebuild failed");
            }
        }
        tracing::info!("filtering method: {}", self.filtering.label());
        self.filtering
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.viewport = Viewport::new(width, height);
        self.camera.set_aspect_ratio(self.viewport.aspect_ratio());
        self.backend.resize(width, height);
    }

    pub fn is_initialized(&self) -> bool {
        self.backend.is_ready()
    }

    pub fn filtering(&self) -> FilteringMethod {
        self.filtering
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn objects(&self) -> &[RenderObject<B>] {
        &self.objects
    }

    pub fn object(&self, id: ObjectId) -> Option<&RenderObject<B>> {
        self.objects.get(id.0)
    }

    pub fn object_mut(&mut self, id: ObjectId) -> Option<&mut RenderObject<B>> {
        self.objects.get_mut(id.0)
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::Material;
    use crate::mesh::Mesh;
    use glam::{Mat4, Vec2, Vec3};
    use rasterscene_input::{Key, MouseButtons};
    use rasterscene_render::{Command, ProgramDesc, RecordingBackend, ResourceFactory, slots};
    use std::path::Path;

    fn backend() -> RecordingBackend {
        RecordingBackend::new()
            .with_program("mesh.fx", ProgramDesc::standard())
            .with_program("swap.fx", ProgramDesc::per_filter_techniques())
            .with_program("fire.fx", ProgramDesc::transparent())
    }

    fn scene(config: &SceneConfig) -> Scene<RecordingBackend> {
        Scene::new(backend(), config, Viewport::new(640, 480)).unwrap()
    }

    fn matrices_of_last_frame(scene: &Scene<RecordingBackend>) -> Vec<Vec<(String, Mat4)>> {
        let frames = scene.backend().journal().frames();
        frames
            .last()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                Command::ApplyPass { matrices, .. } => Some(matrices.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = SceneConfig::default();
        config.camera.far = 0.01;
        let result = Scene::new(backend(), &config, Viewport::new(1, 1));
        assert!(matches!(result, Err(SceneError::Config(_))));
    }

    #[test]
    fn render_clears_draws_in_order_and_presents() {
        let mut scene = scene(&SceneConfig::default());
        scene.spawn(ObjectDesc::new("a", Mesh::cube(1.0), "mesh.fx")).unwrap();
        scene.spawn(ObjectDesc::new("b", Mesh::quad(1.0), "mesh.fx")).unwrap();
        scene.update(0.016, &InputState::new());
        scene.render();

        let journal = scene.backend().journal();
        let frames = journal.frames();
        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        assert_eq!(
            frame[0],
            Command::Clear(ClearValues {
                color: [0.0, 0.0, 0.3, 1.0],
                depth: 1.0,
                stencil: 0,
            })
        );
        assert_eq!(frame.last(), Some(&Command::Present));
        assert_eq!(journal.draws(), vec![36, 6]);
    }

    #[test]
    fn transparent_objects_draw_after_opaque_ones() {
        let mut scene = scene(&SceneConfig::default());
        scene.spawn(ObjectDesc::new("body", Mesh::cube(1.0), "mesh.fx")).unwrap();
        let fire = ObjectDesc::new("fire", Mesh::quad(1.0), "fire.fx").with_diffuse_map("fire.png");
        scene.spawn(fire).unwrap();
        scene.update(0.016, &InputState::new());
        scene.render();

        let techniques: Vec<String> = scene.backend().journal().frames()[0]
            .iter()
            .filter_map(|c| match c {
                Command::ApplyPass { technique, .. } => Some(technique.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(techniques, vec!["default", "transparent"]);
        assert_eq!(scene.backend().journal().draws(), vec![36, 6]);
        let fire = &scene.objects()[1];
        assert_eq!(fire.material().bindings().textures.len(), 1);
        assert!(!fire.material().has_slot(slots::NORMAL_MAP));
    }

    #[test]
    fn render_is_skipped_until_backend_is_ready() {
        let backend = RecordingBackend::new().not_ready();
        let mut scene = Scene::new(backend, &SceneConfig::default(), Viewport::new(1, 1)).unwrap();
        assert!(!scene.is_initialized());
        scene.render();
        assert!(scene.backend().commands().is_empty());
    }

    #[test]
    fn update_pushes_camera_matrices_to_every_object() {
        let mut scene = scene(&SceneConfig::default());
        let world = Mat4::from_scale(Vec3::new(1.0, 2.0, 3.0));
        scene
            .spawn(ObjectDesc::new("a", Mesh::cube(1.0), "mesh.fx").placed_at(world))
            .unwrap();
        let input = InputState::new()
            .with_key(Key::W)
            .with_buttons(MouseButtons::RIGHT)
            .with_mouse_delta(Vec2::new(12.0, 3.0));
        scene.update(0.1, &input);
        scene.render();

        let camera = scene.camera();
        let passes = matrices_of_last_frame(&scene);
        let find = |slot: &str| {
            passes[0]
                .iter()
                .find(|(name, _)| name == slot)
                .map(|(_, m)| *m)
                .unwrap()
        };
        assert!(find("world_view_proj").abs_diff_eq(camera.view_projection() * world, 1e-5));
        assert!(find("view_inverse").abs_diff_eq(camera.inverse_view_matrix(), 1e-6));
        assert_eq!(find("world"), world);
    }

    #[test]
    fn matrices_are_set_before_animation() {
        let mut scene = scene(&SceneConfig::default());
        let id = scene.spawn(ObjectDesc::new("a", Mesh::cube(1.0), "mesh.fx")).unwrap();
        scene.toggle_rotation();
        scene.update(1.0, &InputState::new());
        scene.render();

        let object = scene.object(id).unwrap();
        assert!(object.world().abs_diff_eq(Mat4::from_rotation_y(1.0), 1e-6));
        // The frame still carries the world from before this update's spin.
        let world = matrices_of_last_frame(&scene)[0]
            .iter()
            .find(|(name, _)| name == "world")
            .map(|(_, m)| *m)
            .unwrap();
        assert_eq!(world, Mat4::IDENTITY);
    }

    #[test]
    fn toggle_rotation_broadcasts_and_restores() {
        let mut scene = scene(&SceneConfig::default());
        scene.spawn(ObjectDesc::new("a", Mesh::cube(1.0), "mesh.fx")).unwrap();
        scene.spawn(ObjectDesc::new("b", Mesh::cube(1.0), "mesh.fx")).unwrap();
        scene.toggle_rotation();
        assert!(scene.objects().iter().all(|o| o.is_rotating()));
        scene.toggle_rotation();
        assert!(scene.objects().iter().all(|o| !o.is_rotating()));
    }

    #[test]
    fn rotation_speed_comes_from_config() {
        let config = SceneConfig {
            rotation_speed: 0.5,
            ..SceneConfig::default()
        };
        let mut scene = scene(&config);
        let id = scene.spawn(ObjectDesc::new("a", Mesh::cube(1.0), "mesh.fx")).unwrap();
        scene.toggle_rotation();
        scene.update(0.5, &InputState::new());
        scene.update(1.5, &InputState::new());
        assert!((scene.object(id).unwrap().angle() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn toggle_filtering_keeps_every_material_in_sync() {
        let mut scene = scene(&SceneConfig::default());
        scene.spawn(ObjectDesc::new("a", Mesh::cube(1.0), "mesh.fx")).unwrap();
        scene.spawn(ObjectDesc::new("b", Mesh::cube(1.0), "swap.fx")).unwrap();

        for n in 1..=4 {
            let tier = scene.toggle_filtering_method();
            assert_eq!(tier, FilteringMethod::Point.advanced_by(n));
            for object in scene.objects() {
                assert_eq!(object.material().filtering(), tier);
            }
        }
    }

    #[test]
    fn sampler_failure_does_not_stop_the_scene() {
        let mut scene = scene(&SceneConfig::default());
        scene.spawn(ObjectDesc::new("a", Mesh::cube(1.0), "mesh.fx")).unwrap();
        scene.spawn(ObjectDesc::new("b", Mesh::cube(1.0), "swap.fx")).unwrap();

        scene.backend_mut().set_fail_samplers(true);
        assert_eq!(scene.toggle_filtering_method(), FilteringMethod::Linear);
        for object in scene.objects() {
            assert_eq!(object.material().filtering(), FilteringMethod::Linear);
        }
        assert!(scene.objects()[0].material().bindings().sampler.is_none());

        scene.update(0.016, &InputState::new());
        scene.render();
        assert_eq!(scene.backend().journal().draws(), vec![36, 36]);
        assert_eq!(scene.backend().journal().frames().len(), 1);
    }

    #[test]
    fn three_filtering_toggles_restore_the_tier() {
        let config = SceneConfig {
            filtering: FilteringMethod::Linear,
            ..SceneConfig::default()
        };
        let mut scene = scene(&config);
        scene.spawn(ObjectDesc::new("a", Mesh::cube(1.0), "swap.fx")).unwrap();
        let technique = scene.objects()[0].material().active_technique();
        for _ in 0..3 {
            scene.toggle_filtering_method();
        }
        assert_eq!(scene.filtering(), FilteringMethod::Linear);
        assert_eq!(scene.objects()[0].material().active_technique(), technique);
    }

    #[test]
    fn pushed_objects_join_the_scene_tier() {
        let config = SceneConfig {
            filtering: FilteringMethod::Anisotropic,
            ..SceneConfig::default()
        };
        let mut scene = scene(&config);
        let program = scene.backend().load_program(Path::new("mesh.fx")).unwrap();
        let material = Material::new(scene.backend(), "m", program, FilteringMethod::Point);
        let object = RenderObject::new(
            scene.backend(),
            "manual",
            Mesh::cube(1.0),
            material,
            TransformStrategy::GpuMatrices,
        );
        let id = scene.push(object);
        assert_eq!(id, ObjectId(0));
        assert_eq!(
            scene.object(id).unwrap().material().filtering(),
            FilteringMethod::Anisotropic
        );
    }

    #[test]
    fn cpu_bake_strategy_rebakes_every_update() {
        let config = SceneConfig {
            transform_strategy: TransformStrategy::CpuBake,
            ..SceneConfig::default()
        };
        let mut scene = scene(&config);
        let id = scene.spawn(ObjectDesc::new("a", Mesh::cube(1.0), "mesh.fx")).unwrap();
        let first = scene.object(id).unwrap().vertex_buffer().unwrap().id();
        scene.update(0.016, &InputState::new());
        let second = scene.object(id).unwrap().vertex_buffer().unwrap().id();
        assert_ne!(first, second);
        assert!(scene.backend().journal().released().contains(&first));

        scene.render();
        let wvp = matrices_of_last_frame(&scene)[0]
            .iter()
            .find(|(name, _)| name == "world_view_proj")
            .map(|(_, m)| *m)
            .unwrap();
        assert_eq!(wvp, Mat4::IDENTITY);
    }

    #[test]
    fn object_strategy_overrides_config() {
        let config = SceneConfig {
            transform_strategy: TransformStrategy::CpuBake,
            ..SceneConfig::default()
        };
        let mut scene = scene(&config);
        let desc = ObjectDesc::new("a", Mesh::cube(1.0), "mesh.fx")
            .with_strategy(TransformStrategy::GpuMatrices);
        let id = scene.spawn(desc).unwrap();
        assert_eq!(scene.object(id).unwrap().strategy(), TransformStrategy::GpuMatrices);
    }

    #[test]
    fn failing_object_does_not_affect_siblings() {
        let mut scene = scene(&SceneConfig::default());
        scene.spawn(ObjectDesc::new("a", Mesh::cube(1.0), "mesh.fx")).unwrap();
        assert!(scene.spawn(ObjectDesc::new("b", Mesh::cube(1.0), "nope.fx")).is_err());
        scene.backend_mut().set_fail_buffers(true);
        scene.spawn(ObjectDesc::new("c", Mesh::cube(1.0), "mesh.fx")).unwrap();
        scene.backend_mut().set_fail_buffers(false);

        scene.update(0.016, &InputState::new());
        scene.render();
        assert_eq!(scene.objects().len(), 2);
        assert_eq!(scene.backend().journal().draws(), vec![36]);
    }

    #[test]
    fn resize_updates_projection_and_backend() {
        let mut scene = scene(&SceneConfig::default());
        scene.resize(1000, 500);
        assert_eq!(scene.camera().aspect_ratio(), 2.0);
        assert_eq!(scene.backend().size(), (1000, 500));
        assert_eq!(scene.viewport(), Viewport::new(1000, 500));
    }

    #[test]
    fn dropping_the_scene_releases_everything() {
        let mut scene = scene(&SceneConfig::default());
        let journal = scene.backend().journal();
        scene
            .spawn(ObjectDesc::new("a", Mesh::cube(1.0), "mesh.fx").with_diffuse_map("d.png"))
            .unwrap();
        drop(scene);
        assert_eq!(journal.released().len(), 5);
    }
}
