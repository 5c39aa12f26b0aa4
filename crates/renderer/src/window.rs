use std::time::Instant;

use anyhow::{anyhow, Result};
use winit::dpi::{PhysicalPosition, PhysicalSize};
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::WindowBuilder;

use crate::bench::{Bench, PresentError};
use crate::gpu::GpuContext;
use crate::types::BenchConfig;

/// Opens the preview window and renders until it closes or `max_samples`
/// is reached, then saves the outputs.
pub(crate) fn run_window(config: &BenchConfig) -> Result<()> {
    let event_loop = EventLoop::new().map_err(|err| anyhow!("failed to create event loop: {err}"))?;

    let (width, height) = config.window_size();
    let window = WindowBuilder::new()
        .with_title(format!("glsl-bench: {}", config.descriptor.label()))
        .with_inner_size(PhysicalSize::new(width, height))
        .with_resizable(true)
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create preview window: {err}"))?;

    let gpu = GpuContext::with_window(&window, window.inner_size(), config.gpu_power)?;
    let mut bench = Bench::new(config, gpu)?;
    let mut mouse = MouseState::default();
    let mut failure: Option<anyhow::Error> = None;
    let mut next_tick = Instant::now();
    let sleep = config.sleep;

    let run_result = event_loop.run(|event, elwt| match event {
        Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                tracing::info!(samples = bench.samples(), "preview window closed");
                elwt.exit();
            }
            WindowEvent::CursorMoved { position, .. } => {
                mouse.handle_cursor_moved(position);
            }
            WindowEvent::Resized(new_size) => {
                bench.resize_surface(new_size);
            }
            WindowEvent::RedrawRequested => {
                let size = bench.surface_size().unwrap_or_else(|| window.inner_size());
                let outcome = match bench.tick(mouse.relative(size)) {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        failure = Some(err);
                        elwt.exit();
                        return;
                    }
                };
                if outcome.present_due {
                    match bench.present() {
                        Ok(()) => {}
                        Err(PresentError::Surface(
                            wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated,
                        )) => bench.reconfigure_surface(),
                        Err(PresentError::Surface(wgpu::SurfaceError::Timeout)) => {
                            tracing::warn!("surface timeout; retrying next frame");
                        }
                        Err(PresentError::Surface(wgpu::SurfaceError::OutOfMemory)) => {
                            failure = Some(anyhow!("surface out of memory"));
                            elwt.exit();
                        }
                        Err(PresentError::Surface(other)) => {
                            tracing::warn!(error = ?other, "surface error; retrying next frame");
                        }
                        Err(PresentError::Render(err)) => {
                            failure = Some(err);
                            elwt.exit();
                        }
                    }
                }
                if outcome.finished {
                    tracing::info!(samples = bench.samples(), "sample limit reached");
                    elwt.exit();
                }
                next_tick = Instant::now() + sleep;
            }
            _ => {}
        },
        Event::AboutToWait => {
            let now = Instant::now();
            if now >= next_tick {
                window.request_redraw();
                elwt.set_control_flow(ControlFlow::Wait);
            } else {
                elwt.set_control_flow(ControlFlow::WaitUntil(next_tick));
            }
        }
        _ => {}
    });

    if let Err(err) = run_result {
        return Err(anyhow!("window event loop error: {err}"));
    }
    if let Some(err) = failure {
        return Err(err);
    }
    bench.save_results()
}

/// Last known cursor position inside the preview window.
#[derive(Debug, Default)]
struct MouseState {
    position: Option<PhysicalPosition<f64>>,
}

impl MouseState {
    fn handle_cursor_moved(&mut self, position: PhysicalPosition<f64>) {
        self.position = Some(position);
    }

    /// Position divided by the window size, origin in the top-left corner.
    fn relative(&self, size: PhysicalSize<u32>) -> [f32; 2] {
        let Some(pos) = self.position else {
            return [0.0, 0.0];
        };
        [
            (pos.x / f64::from(size.width.max(1))) as f32,
            (pos.y / f64::from(size.height.max(1))) as f32,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mouse_is_zero_until_the_cursor_moves() {
        let mouse = MouseState::default();
        assert_eq!(mouse.relative(PhysicalSize::new(100, 50)), [0.0, 0.0]);
    }

    #[test]
    fn mouse_is_relative_to_window_size() {
        let mut mouse = MouseState::default();
        mouse.handle_cursor_moved(PhysicalPosition::new(25.0, 40.0));
        assert_eq!(mouse.relative(PhysicalSize::new(100, 50)), [0.25, 0.8]);
    }
}
