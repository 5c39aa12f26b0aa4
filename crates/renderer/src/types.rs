use std::path::PathBuf;
use std::time::Duration;

use descriptor::LoadedDescriptor;

/// How the bench presents frames while it renders.
///
/// * `Windowed` opens a preview window driven by `winit`; closing it ends the
///   run and saves the outputs.
/// * `Headless` renders without any surface and stops after `max_samples`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    #[default]
    Windowed,
    Headless,
}

/// Adapter selection hint forwarded to wgpu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GpuPowerPreference {
    Low,
    #[default]
    High,
}

/// Summary of the adapter wgpu selected, kept for logging.
#[derive(Debug, Clone)]
pub struct AdapterProfile {
    pub name: String,
    pub backend: wgpu::Backend,
    pub device_type: wgpu::DeviceType,
}

impl AdapterProfile {
    pub(crate) fn from_wgpu(info: &wgpu::AdapterInfo) -> Self {
        Self {
            name: info.name.clone(),
            backend: info.backend,
            device_type: info.device_type,
        }
    }

    pub fn is_software(&self) -> bool {
        matches!(self.device_type, wgpu::DeviceType::Cpu)
            || self.name.to_ascii_lowercase().contains("llvmpipe")
    }
}

/// Everything a bench run needs, assembled by the CLI.
#[derive(Debug, Clone)]
pub struct BenchConfig {
    pub descriptor: LoadedDescriptor,
    /// Present every N samples. Falls back to the descriptor's value.
    pub refresh_every: u32,
    pub numpy_output: Option<PathBuf>,
    pub png_output: Option<PathBuf>,
    /// Window size; defaults to the descriptor resolution.
    pub preview_resolution: Option<(u32, u32)>,
    /// Stop after this many samples; 0 runs until the window closes.
    pub max_samples: u64,
    pub sleep: Duration,
    pub seed: Option<u64>,
    pub mode: RenderMode,
    pub gpu_power: GpuPowerPreference,
}

impl BenchConfig {
    pub fn new(descriptor: LoadedDescriptor) -> Self {
        let refresh_every = descriptor.refresh_every();
        Self {
            descriptor,
            refresh_every,
            numpy_output: None,
            png_output: None,
            preview_resolution: None,
            max_samples: 0,
            sleep: Duration::ZERO,
            seed: None,
            mode: RenderMode::default(),
            gpu_power: GpuPowerPreference::default(),
        }
    }

    pub fn window_size(&self) -> (u32, u32) {
        self.preview_resolution
            .unwrap_or_else(|| self.descriptor.resolution())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.refresh_every == 0 {
            anyhow::bail!("refresh_every must be at least 1");
        }
        if self.mode == RenderMode::Headless && self.max_samples == 0 {
            anyhow::bail!("headless runs need --max-samples greater than 0");
        }
        if let Some((width, height)) = self.preview_resolution {
            if width == 0 || height == 0 {
                anyhow::bail!("preview resolution must be positive (got {width}x{height})");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn config() -> BenchConfig {
        let descriptor = LoadedDescriptor::from_value(
            json!({ "source": "void main() {}", "resolution": [64, 32], "refresh_every": 3 }),
            ".",
        )
        .unwrap();
        BenchConfig::new(descriptor)
    }

    #[test]
    fn defaults_follow_descriptor() {
        let config = config();
        assert_eq!(config.refresh_every, 3);
        assert_eq!(config.window_size(), (64, 32));
        assert_eq!(config.mode, RenderMode::Windowed);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn headless_requires_sample_limit() {
        let mut config = config();
        config.mode = RenderMode::Headless;
        assert!(config.validate().is_err());
        config.max_samples = 10;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn preview_resolution_overrides_window_size() {
        let mut config = config();
        config.preview_resolution = Some((800, 400));
        assert_eq!(config.window_size(), (800, 400));
        config.preview_resolution = Some((0, 400));
        assert!(config.validate().is_err());
    }
}
