//! wgpu objects behind the bench loop.
//!
//! - `context` owns the instance, device and optional preview surface.
//! - `texture` wraps every texture kind the harness binds (render targets,
//!   image files, data arrays, random streams, placeholders).
//! - `targets` ping-pongs two render targets so each sample can read the
//!   previous one.
//! - `uniforms` packs user uniforms with std140 rules.
//! - `program` compiles the wrapped user shader and draws it.
//! - `output` encodes a render target into 8-bit pixels for display or PNG.
//! - `readback` copies textures back into host memory.

mod context;
mod output;
mod program;
mod readback;
mod targets;
mod texture;
mod uniforms;

pub(crate) use context::GpuContext;
pub(crate) use output::OutputShader;
pub(crate) use program::{ShaderProgram, TextureSlot};
pub(crate) use readback::read_texture;
pub(crate) use targets::PingPong;
pub(crate) use texture::Texture;
pub use uniforms::UniformError;
