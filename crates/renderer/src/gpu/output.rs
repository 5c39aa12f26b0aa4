use anyhow::Result;
use descriptor::OutputEncoding;
use wgpu::naga::ShaderStage;

use crate::compile::{create_module, output_fragment_source, vertex_shader_source};

use super::program::fullscreen_pipeline;
use super::texture::Texture;

/// Turns a render target into displayable 8-bit pixels.
///
/// Applies the descriptor's output encoding (copy, gamma or sRGB) and the
/// optional vertical flip. Used both for presenting to the preview window and
/// for producing the PNG export, so the two always match.
pub(crate) struct OutputShader {
    vertex_module: wgpu::ShaderModule,
    fragment_module: wgpu::ShaderModule,
    bind_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    pipelines: Vec<(wgpu::TextureFormat, wgpu::RenderPipeline)>,
}

impl OutputShader {
    pub fn new(device: &wgpu::Device, encoding: OutputEncoding, flip_y: bool) -> Result<Self> {
        let vertex_module = create_module(
            device,
            "output vertex shader",
            vertex_shader_source(1.0),
            ShaderStage::Vertex,
        )?;
        let fragment_module = create_module(
            device,
            "output fragment shader",
            output_fragment_source(encoding, flip_y),
            ShaderStage::Fragment,
        )?;
        let bind_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("output layout"),
            entries: &Texture::layout_entries(0, false),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("output pipeline layout"),
            bind_group_layouts: &[&bind_layout],
            push_constant_ranges: &[],
        });
        tracing::debug!(?encoding, flip_y, "built output shader");
        Ok(Self {
            vertex_module,
            fragment_module,
            bind_layout,
            pipeline_layout,
            pipelines: Vec::new(),
        })
    }

    fn pipeline(
        &mut self,
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
    ) -> Result<&wgpu::RenderPipeline> {
        let index = match self.pipelines.iter().position(|(known, _)| *known == format) {
            Some(index) => index,
            None => {
                let pipeline = fullscreen_pipeline(
                    device,
                    "output pipeline",
                    &self.pipeline_layout,
                    &self.vertex_module,
                    &self.fragment_module,
                    format,
                )?;
                self.pipelines.push((format, pipeline));
                self.pipelines.len() - 1
            }
        };
        Ok(&self.pipelines[index].1)
    }

    pub fn draw(
        &mut self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        source: &Texture,
        target: &wgpu::TextureView,
        target_format: wgpu::TextureFormat,
    ) -> Result<()> {
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("output bind group"),
            layout: &self.bind_layout,
            entries: &source.bind_entries(0),
        });
        let pipeline = self.pipeline(device, target_format)?;

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("output pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.draw(0..3, 0..1);
        Ok(())
    }
}
