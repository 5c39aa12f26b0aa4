//! Renderer crate for glsl-bench.
//!
//! Takes a loaded shader descriptor and runs the sample loop:
//!
//! ```text
//!   glsl-bench CLI
//!          │ BenchConfig
//!          ▼
//!   Renderer::run ──▶ window (winit) or headless loop
//!                          │
//!                          ▼
//!                     Bench::tick ──▶ BindingPlan::update ─▶ uniforms/textures
//!                          │
//!                          └─▶ ShaderProgram::draw into PingPong::back, swap
//! ```
//!
//! User shaders are written against the legacy GLSL interface (`uniform`
//! declarations, `gl_FragColor`, `varying vec3 pos`); `compile` rewrites
//! them into Vulkan-style GLSL that wgpu's naga frontend accepts.

mod bench;
mod bindings;
pub mod compile;
pub mod export;
mod gpu;
pub mod random;
mod runtime;
mod types;
mod window;

use anyhow::{Context, Result};
use descriptor::LoadedDescriptor;

pub use bindings::{BindingError, FrameInputs};
pub use compile::{ShaderCompileError, WrappedShader};
pub use gpu::UniformError;
pub use types::{AdapterProfile, BenchConfig, GpuPowerPreference, RenderMode};

/// Entry point used by the CLI.
pub struct Renderer {
    config: BenchConfig,
}

impl Renderer {
    pub fn new(config: BenchConfig) -> Self {
        Self { config }
    }

    pub fn run(self) -> Result<()> {
        self.config.validate()?;
        preflight(&self.config.descriptor)?;
        match self.config.mode {
            RenderMode::Windowed => window::run_window(&self.config),
            RenderMode::Headless => runtime::run_headless(&self.config),
        }
    }
}

/// Wraps and parses the descriptor's shader without touching the GPU, so
/// syntax errors surface before a window opens.
pub fn preflight(descriptor: &LoadedDescriptor) -> Result<()> {
    let label = descriptor.label();
    WrappedShader::new(&descriptor.source)
        .and_then(|shader| shader.check())
        .with_context(|| format!("failed to compile shader from {label}"))
}
