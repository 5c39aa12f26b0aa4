use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use winit::dpi::PhysicalSize;

use crate::bindings::{BindingPlan, FrameInputs};
use crate::compile::WrappedShader;
use crate::export::{rgb_rows_top_down, write_npy, write_png, FramePixels};
use crate::gpu::{read_texture, GpuContext, OutputShader, PingPong, ShaderProgram, Texture};
use crate::random::RandomStream;
use crate::types::BenchConfig;

#[derive(Debug, thiserror::Error)]
pub(crate) enum PresentError {
    #[error(transparent)]
    Surface(#[from] wgpu::SurfaceError),
    #[error(transparent)]
    Render(#[from] anyhow::Error),
}

/// Result of one [`Bench::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct TickOutcome {
    /// A sample in this tick landed on a `refresh_every` boundary.
    pub present_due: bool,
    /// `max_samples` has been reached.
    pub finished: bool,
}

/// Decides what happens after a sample; split out so the cadence can be
/// checked without a GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SampleSchedule {
    pub refresh_every: u32,
    pub batch_size: u32,
    pub max_samples: u64,
}

impl SampleSchedule {
    pub fn presents_after(&self, sample: u64) -> bool {
        sample % u64::from(self.refresh_every.max(1)) == 0
    }

    pub fn is_finished(&self, sample: u64) -> bool {
        self.max_samples > 0 && sample >= self.max_samples
    }

    /// Whether a tick stops after `sample` so it can be presented.
    pub fn ends_batch(&self, sample: u64, presenting: bool) -> bool {
        presenting && self.presents_after(sample)
    }

    /// Most samples the tick starting after `sample` will render.
    pub fn batch_after(&self, sample: u64) -> u64 {
        let batch = u64::from(self.batch_size.max(1));
        if self.max_samples > 0 {
            batch.min(self.max_samples.saturating_sub(sample))
        } else {
            batch
        }
    }
}

/// GPU state and bookkeeping for a bench run.
pub(crate) struct Bench {
    gpu: GpuContext,
    program: ShaderProgram,
    output: OutputShader,
    targets: PingPong,
    plan: BindingPlan,
    rng: RandomStream,
    schedule: SampleSchedule,
    started: Instant,
    sample: u64,
    resolution: (u32, u32),
    numpy_output: Option<PathBuf>,
    png_output: Option<PathBuf>,
}

impl Bench {
    pub fn new(config: &BenchConfig, gpu: GpuContext) -> Result<Self> {
        let loaded = &config.descriptor;
        let descriptor = &loaded.descriptor;
        let (width, height) = loaded.resolution();
        gpu.ensure_texture_fits(width, height)?;

        let shader = WrappedShader::new(&loaded.source)
            .with_context(|| format!("failed to prepare shader from {}", loaded.label()))?;
        let plan = BindingPlan::new(loaded, &shader)
            .with_context(|| format!("invalid uniform mapping in {}", loaded.label()))?;
        if descriptor.monte_carlo && !plan.uses_previous_frame() {
            tracing::warn!("monte_carlo is set but no uniform maps previous_frame; samples will not accumulate");
        }

        let float_buffers = descriptor.uses_float_buffers();
        if float_buffers {
            gpu.ensure_float_targets()?;
        }
        let targets = PingPong::new(&gpu.device, width, height, float_buffers);
        let mut program = ShaderProgram::compile(
            &gpu.device,
            &gpu.queue,
            &shader,
            descriptor.aspect_ratio(),
            targets.back().format,
        )
        .with_context(|| format!("failed to build shader program for {}", loaded.label()))?;
        plan.install(&mut program, &gpu.device, &gpu.queue)?;
        program.link(&gpu.device, &targets)?;

        let output = OutputShader::new(&gpu.device, loaded.output_encoding, descriptor.flip_y)?;

        let schedule = SampleSchedule {
            refresh_every: config.refresh_every,
            batch_size: loaded.batch_size(),
            max_samples: config.max_samples,
        };
        tracing::info!(
            shader = %loaded.label(),
            adapter = %gpu.adapter_profile.name,
            width,
            height,
            float_buffers,
            monte_carlo = descriptor.monte_carlo,
            refresh_every = schedule.refresh_every,
            batch_size = schedule.batch_size,
            max_samples = schedule.max_samples,
            "bench ready"
        );

        Ok(Self {
            gpu,
            program,
            output,
            targets,
            plan,
            rng: RandomStream::new(config.seed),
            schedule,
            started: Instant::now(),
            sample: 0,
            resolution: (width, height),
            numpy_output: config.numpy_output.clone(),
            png_output: config.png_output.clone(),
        })
    }

    pub fn samples(&self) -> u64 {
        self.sample
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Renders one batch of samples. Each sample reads the previous one
    /// through the ping-pong targets and is submitted on its own. With a
    /// preview surface the batch ends at the first `refresh_every` boundary,
    /// so `present` shows that sample rather than the end of the batch.
    pub fn tick(&mut self, mouse_relative: [f32; 2]) -> Result<TickOutcome> {
        let mut outcome = TickOutcome::default();
        for _ in 0..self.schedule.batch_after(self.sample) {
            self.sample += 1;
            let inputs = FrameInputs {
                elapsed: self.started.elapsed().as_secs_f32(),
                sample: self.sample,
                mouse_relative,
            };
            self.plan
                .update(&mut self.program, &self.gpu.queue, &inputs, &mut self.rng)?;

            let mut encoder = self
                .gpu
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("bench sample encoder"),
                });
            self.program
                .draw(&self.gpu.queue, &mut encoder, &self.targets)?;
            self.gpu.queue.submit(std::iter::once(encoder.finish()));

            self.targets.swap();
            if self.schedule.presents_after(self.sample) {
                outcome.present_due = true;
                // Stop here so the caller presents this exact sample.
                if self.schedule.ends_batch(self.sample, self.gpu.surface.is_some()) {
                    break;
                }
            }
        }
        outcome.finished = self.schedule.is_finished(self.sample);
        if self.sample % 100 == 0 || outcome.finished {
            tracing::debug!(sample = self.sample, elapsed = ?self.elapsed(), "bench progress");
        }
        Ok(outcome)
    }

    /// Draws the most recent frame to the preview window.
    pub fn present(&mut self) -> Result<(), PresentError> {
        let Some(present) = self.gpu.surface.as_ref() else {
            return Ok(());
        };
        let frame = present.surface.get_current_texture()?;
        let format = present.format();
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("present encoder"),
            });
        self.output.draw(
            &self.gpu.device,
            &mut encoder,
            self.targets.front(),
            &view,
            format,
        )?;
        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        Ok(())
    }

    pub fn surface_size(&self) -> Option<PhysicalSize<u32>> {
        self.gpu.surface.as_ref().map(|present| present.size())
    }

    pub fn resize_surface(&mut self, size: PhysicalSize<u32>) {
        self.gpu.resize(size);
    }

    pub fn reconfigure_surface(&mut self) {
        self.gpu.reconfigure();
    }

    /// Writes the configured outputs from the most recent frame.
    pub fn save_results(&mut self) -> Result<()> {
        let (width, height) = self.resolution;
        tracing::info!(
            samples = self.sample,
            elapsed = ?self.elapsed(),
            "saving results"
        );

        if let Some(path) = self.numpy_output.clone() {
            let front = self.targets.front();
            let bytes = read_texture(&self.gpu.device, &self.gpu.queue, front)?;
            let pixels = if front.is_float() {
                FramePixels::Float(
                    bytes
                        .chunks_exact(4)
                        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                        .collect(),
                )
            } else {
                FramePixels::Byte(bytes)
            };
            let rgb = rgb_rows_top_down(&pixels, width as usize, height as usize);
            write_npy(&path, width as usize, height as usize, &rgb)?;
        }

        if let Some(path) = self.png_output.clone() {
            let target = Texture::export_target(&self.gpu.device, width, height);
            let mut encoder = self
                .gpu
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("export encoder"),
                });
            self.output.draw(
                &self.gpu.device,
                &mut encoder,
                self.targets.front(),
                &target.view,
                target.format,
            )?;
            self.gpu.queue.submit(std::iter::once(encoder.finish()));
            let rgba = read_texture(&self.gpu.device, &self.gpu.queue, &target)?;
            write_png(&path, width, height, &rgba)?;
        }
        Ok(())
    }
}
