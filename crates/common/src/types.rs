use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Interleaved vertex consumed by every mesh: position, uv, normal, tangent.
///
/// The layout is `#[repr(C)]` with offsets 0 / 12 / 20 / 32 and a 44-byte
/// stride, so a `&[Vertex]` can be uploaded to a vertex buffer as-is.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
    pub normal: [f32; 3],
    pub tangent: [f32; 3],
}

impl Vertex {
    /// Size of one vertex in bytes.
    pub const STRIDE: u32 = std::mem::size_of::<Vertex>() as u32;

    pub fn new(position: Vec3, uv: Vec2, normal: Vec3, tangent: Vec3) -> Self {
        Self {
            position: position.to_array(),
            uv: uv.to_array(),
            normal: normal.to_array(),
            tangent: tangent.to_array(),
        }
    }

    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }
}

/// Texture filtering quality tier.
///
/// Cycling is total: Point → Linear → Anisotropic → Point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilteringMethod {
    #[default]
    Point,
    Linear,
    Anisotropic,
}

impl FilteringMethod {
    pub const ALL: [FilteringMethod; 3] = [Self::Point, Self::Linear, Self::Anisotropic];

    /// The next tier in the cycle.
    pub fn next(self) -> Self {
        match self {
            Self::Point => Self::Linear,
            Self::Linear => Self::Anisotropic,
            Self::Anisotropic => Self::Point,
        }
    }

    /// The tier reached after `steps` calls to [`FilteringMethod::next`].
    pub fn advanced_by(self, steps: usize) -> Self {
        let index = Self::ALL.iter().position(|m| *m == self).unwrap_or(0);
        Self::ALL[(index + steps % Self::ALL.len()) % Self::ALL.len()]
    }

    /// Maximum anisotropy a sampler for this tier may use.
    pub fn max_anisotropy(self) -> u16 {
        match self {
            Self::Anisotropic => 16,
            Self::Point | Self::Linear => 1,
        }
    }

    /// Upper-case label used in diagnostics.
    pub fn label(self) -> &'static str {
        match self {
            Self::Point => "POINT",
            Self::Linear => "LINEAR",
            Self::Anisotropic => "ANISOTROPIC",
        }
    }
}

impl fmt::Display for FilteringMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_layout_matches_interleaved_offsets() {
        assert_eq!(Vertex::STRIDE, 44);
        assert_eq!(std::mem::offset_of!(Vertex, uv), 12);
        assert_eq!(std::mem::offset_of!(Vertex, normal), 20);
        assert_eq!(std::mem::offset_of!(Vertex, tangent), 32);
    }

    #[test]
    fn filtering_cycle_has_order_three() {
        for start in FilteringMethod::ALL {
            let mut m = start;
            for _ in 0..3 {
                m = m.next();
            }
            assert_eq!(m, start);
        }
    }

    #[test]
    fn advanced_by_matches_repeated_next() {
        for start in FilteringMethod::ALL {
            let mut m = start;
            for n in 0..10 {
                assert_eq!(start.advanced_by(n), m);
                m = m.next();
            }
        }
    }

    #[test]
    fn only_anisotropic_uses_anisotropy() {
        assert_eq!(FilteringMethod::Point.max_anisotropy(), 1);
        assert_eq!(FilteringMethod::Linear.max_anisotropy(), 1);
        assert_eq!(FilteringMethod::Anisotropic.max_anisotropy(), 16);
        assert_eq!(FilteringMethod::Linear.to_string(), "LINEAR");
    }
}
