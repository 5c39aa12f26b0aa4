//! Shader descriptor loading for glsl-bench.
//!
//! A descriptor is a small JSON document naming a GLSL fragment shader, the
//! resolution it renders at, and a mapping of uniform names to either literal
//! values or symbolic sources (`"time"`, `"previous_frame"`, textures, random
//! streams). This crate turns that document into typed [`UniformSource`]s and
//! validates everything that can be checked before a GPU is involved.

mod error;
mod load;
mod manifest;
mod source;

pub mod inline;

pub use error::DescriptorError;
pub use load::{load_descriptor, LoadedDescriptor, NamedUniform};
pub use manifest::{GammaSetting, OutputEncoding, ShaderDescriptor};
pub use source::{DataArray, Distribution, RandomSpec, UniformSource, MAX_RANDOM_COMPONENTS};
