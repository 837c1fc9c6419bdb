use crate::config::CameraConfig;
use glam::{Mat4, Quat, Vec3};
use rasterscene_common::math::{
    CANONICAL_FORWARD, WORLD_UP, camera_to_world, orthonormal_affine_inverse, perspective_lh,
};
use rasterscene_input::{InputState, Key, MouseButtons};
use std::f32::consts::PI;

/// Largest pitch magnitude; keeps the forward axis off the world up axis.
pub const PITCH_LIMIT: f32 = PI / 2.001;

/// Free-fly camera driven by keyboard and mouse.
///
/// The basis is left-handed: `right = up_world × forward` and
/// `up = forward × right`. View and projection are recomputed on every
/// [`update`](Camera::update).
#[derive(Debug, Clone)]
pub struct Camera {
    origin: Vec3,
    forward: Vec3,
    right: Vec3,
    up: Vec3,
    /// Tangent of half the vertical field of view.
    fov: f32,
    aspect_ratio: f32,
    near: f32,
    far: f32,
    yaw: f32,
    pitch: f32,
    move_speed: f32,
    mouse_sensitivity: f32,
    view: Mat4,
    inverse_view: Mat4,
    projection: Mat4,
}

impl Default for Camera {
    fn default() -> Self {
        Self::from_config(&CameraConfig::default(), 1.0)
    }
}

impl Camera {
    pub fn from_config(config: &CameraConfig, aspect_ratio: f32) -> Self {
        let mut camera = Self {
            origin: Vec3::ZERO,
            forward: CANONICAL_FORWARD,
            right: Vec3::X,
            up: WORLD_UP,
            fov: 1.0,
            aspect_ratio,
            near: config.near,
            far: config.far,
            yaw: 0.0,
            pitch: 0.0,
            move_speed: config.move_speed,
            mouse_sensitivity: config.mouse_sensitivity,
            view: Mat4::IDENTITY,
            inverse_view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
        };
        camera.initialize(aspect_ratio, config.fov_degrees, config.origin);
        camera
    }

    /// Place the camera at `origin` looking down +Z with the given lens.
    pub fn initialize(&mut self, aspect_ratio: f32, fov_degrees: f32, origin: Vec3) {
        self.aspect_ratio = aspect_ratio;
        self.fov = (fov_degrees.to_radians() / 2.0).tan();
        self.origin = origin;
        self.yaw = 0.0;
        self.pitch = 0.0;
        self.forward = CANONICAL_FORWARD;
        self.recompute();
    }

    /// Apply one frame of input, then rebuild view and projection.
    ///
    /// Keyboard translation uses the basis from the previous update.
    pub fn update(&mut self, dt: f32, input: &InputState) {
        let step = self.move_speed * dt;

        if input.is_down(Key::W) {
            self.origin += self.forward * step;
        }
        if input.is_down(Key::S) {
            self.origin -= self.forward * step;
        }
        if input.is_down(Key::D) {
            self.origin += self.right * step;
        }
        if input.is_down(Key::A) {
            self.origin -= self.right * step;
        }
        if input.is_down(Key::E) {
            self.origin.y += step;
        }
        if input.is_down(Key::Q) {
            self.origin.y -= step;
        }

        let delta = input.mouse_delta();
        let buttons = input.buttons();
        if buttons.contains(MouseButtons::LEFT | MouseButtons::RIGHT) {
            self.origin.y -= step * delta.y;
        } else if buttons.contains(MouseButtons::RIGHT) {
            self.yaw += self.mouse_sensitivity * delta.x;
            self.pitch = (self.pitch - self.mouse_sensitivity * delta.y)
                .clamp(-PITCH_LIMIT, PITCH_LIMIT);
        } else if buttons.contains(MouseButtons::LEFT) {
            self.yaw += self.mouse_sensitivity * delta.x;
            self.origin -= self.forward * step * delta.y;
        }

        let orientation = Quat::from_rotation_y(self.yaw) * Quat::from_rotation_x(-self.pitch);
        self.forward = (orientation * CANONICAL_FORWARD).normalize();
        self.recompute();
    }

    fn recompute(&mut self) {
        self.right = WORLD_UP.cross(self.forward).normalize_or(Vec3::X);
        self.up = self.forward.cross(self.right);
        self.inverse_view = camera_to_world(self.right, self.up, self.forward, self.origin);
        self.view = orthonormal_affine_inverse(self.inverse_view);
        self.projection = perspective_lh(self.fov, self.aspect_ratio, self.near, self.far);
    }

    pub fn set_aspect_ratio(&mut self, aspect_ratio: f32) {
        self.aspect_ratio = aspect_ratio;
        self.projection = perspective_lh(self.fov, self.aspect_ratio, self.near, self.far);
    }

    pub fn view_matrix(&self) -> Mat4 {
        self.view
    }

    pub fn projection_matrix(&self) -> Mat4 {
        self.projection
    }

    /// Camera-to-world matrix.
    pub fn inverse_view_matrix(&self) -> Mat4 {
        self.inverse_view
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }

    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    pub fn forward(&self) -> Vec3 {
        self.forward
    }

    pub fn right(&self) -> Vec3 {
        self.right
    }

    pub fn up(&self) -> Vec3 {
        self.up
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    /// Tangent of half the vertical field of view.
    pub fn fov(&self) -> f32 {
        self.fov
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.aspect_ratio
    }
}
