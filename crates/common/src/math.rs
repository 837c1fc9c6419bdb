//! Matrix helpers shared by the camera and the CPU bake path.
//!
//! All matrices use glam's column-vector convention (`clip = m * v`). The
//! column-major storage is byte-identical to a row-major, row-vector matrix,
//! so `m.to_cols_array_2d()[r][c]` reads as "row r, column c" of that form.

use glam::{Mat4, Vec3, Vec4};

/// World up axis used to derive the camera basis.
pub const WORLD_UP: Vec3 = Vec3::Y;

/// Forward axis of an unrotated camera.
pub const CANONICAL_FORWARD: Vec3 = Vec3::Z;

/// Camera-to-world matrix with the basis vectors as columns.
pub fn camera_to_world(right: Vec3, up: Vec3, forward: Vec3, origin: Vec3) -> Mat4 {
    Mat4::from_cols(
        right.extend(0.0),
        up.extend(0.0),
        forward.extend(0.0),
        origin.extend(1.0),
    )
}

/// Inverse of an affine matrix whose 3x3 part is orthonormal.
///
/// The rotation inverts by transposition and the translation becomes
/// `-(Rᵀ · t)`.
pub fn orthonormal_affine_inverse(m: Mat4) -> Mat4 {
    let right = m.x_axis.truncate();
    let up = m.y_axis.truncate();
    let forward = m.z_axis.truncate();
    let origin = m.w_axis.truncate();

    Mat4::from_cols(
        Vec4::new(right.x, up.x, forward.x, 0.0),
        Vec4::new(right.y, up.y, forward.y, 0.0),
        Vec4::new(right.z, up.z, forward.z, 0.0),
        Vec4::new(-right.dot(origin), -up.dot(origin), -forward.dot(origin), 1.0),
    )
}

/// Left-handed perspective projection mapping depth to [0, 1].
///
/// `fov` is the tangent of half the vertical field of view.
pub fn perspective_lh(fov: f32, aspect_ratio: f32, near: f32, far: f32) -> Mat4 {
    let depth = far / (far - near);
    Mat4::from_cols(
        Vec4::new(1.0 / (aspect_ratio * fov), 0.0, 0.0, 0.0),
        Vec4::new(0.0, 1.0 / fov, 0.0, 0.0),
        Vec4::new(0.0, 0.0, depth, 1.0),
        Vec4::new(0.0, 0.0, -(far * near) / (far - near), 0.0),
    )
}

/// Full homogeneous transform of a point followed by the perspective divide.
///
/// When `|w|` is too small to divide by, the undivided xyz is returned.
pub fn project_point(m: Mat4, p: Vec3) -> Vec3 {
    let clip = m * p.extend(1.0);
    if clip.w.abs() <= f32::EPSILON {
        return clip.truncate();
    }
    clip.truncate() / clip.w
}
