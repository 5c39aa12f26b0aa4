use anyhow::{anyhow, Context as AnyhowContext, Result};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::dpi::PhysicalSize;

use crate::types::{AdapterProfile, GpuPowerPreference};

use super::texture::FLOAT_FORMAT;

/// Usages every ping-pong target needs.
const TARGET_USAGES: wgpu::TextureUsages = wgpu::TextureUsages::RENDER_ATTACHMENT
    .union(wgpu::TextureUsages::TEXTURE_BINDING)
    .union(wgpu::TextureUsages::COPY_SRC);

/// Swapchain state for the preview window.
pub(crate) struct PresentSurface {
    pub surface: wgpu::Surface<'static>,
    pub config: wgpu::SurfaceConfiguration,
}

impl PresentSurface {
    pub fn format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        PhysicalSize::new(self.config.width, self.config.height)
    }
}

pub(crate) struct GpuContext {
    pub _instance: wgpu::Instance,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_profile: AdapterProfile,
    pub surface: Option<PresentSurface>,
    max_texture_dimension: u32,
    float_usages: wgpu::TextureUsages,
}

impl GpuContext {
    /// Device without a presentation surface, for `--headless` runs.
    pub(crate) fn headless(gpu_power: GpuPowerPreference) -> Result<Self> {
        let instance = create_instance();
        let adapter = request_adapter(&instance, gpu_power, None)?;
        Self::finish(instance, adapter, None)
    }

    pub(crate) fn with_window<T>(
        target: &T,
        initial_size: PhysicalSize<u32>,
        gpu_power: GpuPowerPreference,
    ) -> Result<Self>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let instance = create_instance();

        let window_handle = target
            .window_handle()
            .map_err(|err| anyhow!("failed to acquire window handle: {err}"))?;
        let display_handle = target
            .display_handle()
            .map_err(|err| anyhow!("failed to acquire display handle: {err}"))?;

        // The caller keeps the window alive for as long as this context.
        let surface = unsafe {
            instance.create_surface_unsafe(wgpu::SurfaceTargetUnsafe::RawHandle {
                raw_display_handle: display_handle.as_raw(),
                raw_window_handle: window_handle.as_raw(),
            })
        }
        .context("failed to create rendering surface")?;

        let adapter = request_adapter(&instance, gpu_power, Some(&surface))?;
        let caps = surface.get_capabilities(&adapter);
        if caps.formats.is_empty() {
            anyhow::bail!("surface reports no supported formats for the selected adapter");
        }

        // The output shader already encodes gamma, so the swapchain must not
        // apply a second sRGB conversion.
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|format| !format.is_srgb())
            .unwrap_or_else(|| {
                let fallback = caps.formats[0];
                tracing::warn!(
                    ?fallback,
                    "no linear (non-sRGB) surface format available; preview colours will be brighter than saved images"
                );
                fallback
            });
        let present_mode = caps
            .present_modes
            .iter()
            .copied()
            .find(|mode| *mode == wgpu::PresentMode::Fifo)
            .unwrap_or(wgpu::PresentMode::AutoVsync);
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: initial_size.width.max(1),
            height: initial_size.height.max(1),
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        tracing::debug!(?format, ?present_mode, "configured preview surface");

        let context = Self::finish(instance, adapter, Some(PresentSurface { surface, config }))?;
        if let Some(present) = &context.surface {
            present.surface.configure(&context.device, &present.config);
        }
        Ok(context)
    }

    fn finish(
        instance: wgpu::Instance,
        adapter: wgpu::Adapter,
        surface: Option<PresentSurface>,
    ) -> Result<Self> {
        let info = adapter.get_info();
        let limits = adapter.limits();
        let adapter_profile = AdapterProfile::from_wgpu(&info);
        let float_usages = adapter.get_texture_format_features(FLOAT_FORMAT).allowed_usages;
        tracing::info!(
            name = %adapter_profile.name,
            backend = ?adapter_profile.backend,
            device_type = ?adapter_profile.device_type,
            software = adapter_profile.is_software(),
            "selected GPU adapter"
        );

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("glsl-bench device"),
            required_features: wgpu::Features::empty(),
            required_limits: limits.clone(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::default(),
        }))
        .context("failed to create GPU device")?;

        Ok(Self {
            _instance: instance,
            device,
            queue,
            adapter_profile,
            surface,
            max_texture_dimension: limits.max_texture_dimension_2d,
            float_usages,
        })
    }

    pub(crate) fn ensure_texture_fits(&self, width: u32, height: u32) -> Result<()> {
        let max_dimension = self.max_texture_dimension;
        if width > max_dimension || height > max_dimension {
            anyhow::bail!(
                "GPU max texture dimension is {max_dimension}, requested render target is {width}x{height}"
            );
        }
        Ok(())
    }

    /// Fails instead of letting wgpu abort when the adapter cannot render
    /// into RGBA32F targets (common on downlevel GL backends).
    pub(crate) fn ensure_float_targets(&self) -> Result<()> {
        check_target_usages(FLOAT_FORMAT, self.float_usages).with_context(|| {
            format!(
                "adapter {} cannot run with float_buffers or monte_carlo enabled",
                self.adapter_profile.name
            )
        })
    }

    pub(crate) fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        if let Some(present) = self.surface.as_mut() {
            present.config.width = new_size.width;
            present.config.height = new_size.height;
            present.surface.configure(&self.device, &present.config);
        }
    }

    /// Re-applies the current configuration after a lost or outdated frame.
    pub(crate) fn reconfigure(&mut self) {
        if let Some(present) = self.surface.as_ref() {
            present.surface.configure(&self.device, &present.config);
        }
    }
}

fn check_target_usages(format: wgpu::TextureFormat, allowed: wgpu::TextureUsages) -> Result<()> {
    let missing = TARGET_USAGES - allowed;
    if !missing.is_empty() {
        anyhow::bail!("{format:?} render targets are not supported (missing usages {missing:?})");
    }
    Ok(())
}

fn create_instance() -> wgpu::Instance {
    wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        flags: wgpu::InstanceFlags::default(),
        memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
        backend_options: wgpu::BackendOptions::default(),
    })
}

fn request_adapter(
    instance: &wgpu::Instance,
    gpu_power: GpuPowerPreference,
    compatible_surface: Option<&wgpu::Surface<'static>>,
) -> Result<wgpu::Adapter> {
    let power_preference = match gpu_power {
        GpuPowerPreference::Low => wgpu::PowerPreference::LowPower,
        GpuPowerPreference::High => wgpu::PowerPreference::HighPerformance,
    };
    pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference,
        compatible_surface,
        force_fallback_adapter: false,
    }))
    .context("failed to find a suitable GPU adapter")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_targets_need_render_and_sample_usages() {
        let downlevel = wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_SRC;
        let err = check_target_usages(FLOAT_FORMAT, downlevel).unwrap_err();
        assert!(err.to_string().contains("RENDER_ATTACHMENT"), "{err}");

        let full = TARGET_USAGES | wgpu::TextureUsages::COPY_DST;
        assert!(check_target_usages(FLOAT_FORMAT, full).is_ok());
    }
}
