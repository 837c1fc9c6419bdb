//! wgpu implementation of the render backend traits.
//!
//! Programs are WGSL files. A program exposes a slot when it declares the
//! matching identifier, and a technique for every fragment entry point named
//! `fs_<technique>` or `fs_<technique>_pass<N>`. All programs share one bind
//! group layout:
//!
//! | binding | resource |
//! |---|---|
//! | 0 | uniform block `{ world, world_view_proj, view_inverse }` |
//! | 1..=4 | `diffuse_map`, `normal_map`, `specular_map`, `glossiness_map` |
//! | 5 | `sampler_state` |
//!
//! # Invariants
//! - Buffers are immutable after creation.
//! - A lost or outdated surface is reconfigured and that frame is skipped.

mod backend;
mod shaders;

pub use backend::{WgpuBackend, WgpuProgram, sampler_descriptor};
