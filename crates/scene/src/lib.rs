//! Scene front-end: free-fly camera, materials with filtering tiers, render
//! objects and the frame orchestrator that drives them.
//!
//! # Invariants
//! - Each frame runs update before render.
//! - Objects are submitted in insertion order.
//! - Every material shares the scene's filtering tier.
//! - Resources are released by dropping their owner.

pub mod camera;
pub mod config;
mod error;
pub mod material;
mod mesh;
pub mod object;
mod scene;

pub use camera::Camera;
pub use config::{CameraConfig, SceneConfig, TransformStrategy, Viewport};
pub use error::{ConfigError, MeshError, SceneError};
pub use material::{FilterRealization, Material};
pub use mesh::Mesh;
pub use object::{ObjectDesc, RenderObject};
pub use scene::{ObjectId, Scene};
