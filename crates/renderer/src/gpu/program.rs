use anyhow::{anyhow, Context, Result};
use wgpu::naga::ShaderStage;

use crate::compile::{create_module, vertex_shader_source, WrappedShader};

use super::targets::PingPong;
use super::texture::Texture;
use super::uniforms::{UniformBlock, UniformError, UniformLayout};

/// What a `sampler2D` uniform reads from.
pub(crate) enum TextureSlot {
    Texture(Texture),
    /// The ping-pong texture written by the previous sample.
    PreviousFrame,
}

impl TextureSlot {
    fn is_filterable(&self) -> bool {
        match self {
            TextureSlot::Texture(texture) => texture.is_filterable(),
            TextureSlot::PreviousFrame => false,
        }
    }
}

struct LinkedProgram {
    pipeline: wgpu::RenderPipeline,
    /// Indexed by [`PingPong::parity`].
    texture_bind_groups: [wgpu::BindGroup; 2],
}

/// The user's fragment shader plus its uniform storage and texture slots.
///
/// Building a program is two-phase: [`ShaderProgram::compile`] validates and
/// compiles the shader, then textures are attached with
/// [`ShaderProgram::bind_texture`] and [`ShaderProgram::link`] creates the
/// pipeline and bind groups for both ping-pong parities.
pub(crate) struct ShaderProgram {
    vertex_module: wgpu::ShaderModule,
    fragment_module: wgpu::ShaderModule,
    target_format: wgpu::TextureFormat,
    uniforms: UniformBlock,
    uniform_buffer: wgpu::Buffer,
    uniform_layout: wgpu::BindGroupLayout,
    uniform_bind_group: wgpu::BindGroup,
    sampler_names: Vec<String>,
    slots: Vec<TextureSlot>,
    linked: Option<LinkedProgram>,
}

impl ShaderProgram {
    pub fn compile(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        shader: &WrappedShader,
        aspect: f32,
        target_format: wgpu::TextureFormat,
    ) -> Result<Self> {
        shader.check()?;
        let vertex_module = create_module(
            device,
            "bench vertex shader",
            vertex_shader_source(aspect),
            ShaderStage::Vertex,
        )?;
        let fragment_module = create_module(
            device,
            "bench fragment shader",
            shader.source.clone(),
            ShaderStage::Fragment,
        )
        .context("failed to compile shader")?;

        let uniforms = UniformBlock::new(UniformLayout::new(&shader.uniforms));
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("bench uniform buffer"),
            size: uniforms.layout().size() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("bench uniform layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("bench uniform bind group"),
            layout: &uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let slots = shader
            .samplers
            .iter()
            .map(|name| {
                TextureSlot::Texture(Texture::placeholder(
                    device,
                    queue,
                    &format!("placeholder for {name}"),
                ))
            })
            .collect();

        tracing::debug!(
            uniforms = shader.uniforms.len(),
            samplers = shader.samplers.len(),
            block_size = uniforms.layout().size(),
            "compiled shader program"
        );

        Ok(Self {
            vertex_module,
            fragment_module,
            target_format,
            uniforms,
            uniform_buffer,
            uniform_layout,
            uniform_bind_group,
            sampler_names: shader.samplers.clone(),
            slots,
            linked: None,
        })
    }

    /// Writes a value uniform. Names the shader does not declare are skipped
    /// with a warning, mirroring a uniform location of `-1`.
    pub fn set_uniform(&mut self, name: &str, values: &[f32]) -> Result<(), UniformError> {
        match self.uniforms.set(name, values) {
            Err(UniformError::Unknown(name)) => {
                tracing::warn!(uniform = %name, "shader does not declare uniform; value ignored");
                Ok(())
            }
            other => other,
        }
    }

    /// Attaches `slot` to the sampler `name`. Invalidates any previous link.
    pub fn bind_texture(&mut self, name: &str, slot: TextureSlot) -> bool {
        let Some(index) = self.sampler_names.iter().position(|sampler| sampler == name) else {
            tracing::warn!(sampler = %name, "shader does not declare sampler; texture ignored");
            return false;
        };
        self.slots[index] = slot;
        self.linked = None;
        true
    }

    pub fn texture(&self, name: &str) -> Option<&Texture> {
        let index = self.sampler_names.iter().position(|sampler| sampler == name)?;
        match &self.slots[index] {
            TextureSlot::Texture(texture) => Some(texture),
            TextureSlot::PreviousFrame => None,
        }
    }

    pub fn link(&mut self, device: &wgpu::Device, targets: &PingPong) -> Result<()> {
        let layout_entries: Vec<wgpu::BindGroupLayoutEntry> = self
            .slots
            .iter()
            .enumerate()
            .flat_map(|(index, slot)| Texture::layout_entries(index as u32 * 2, slot.is_filterable()))
            .collect();
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("bench texture layout"),
            entries: &layout_entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("bench pipeline layout"),
            bind_group_layouts: &[&self.uniform_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let pipeline = fullscreen_pipeline(
            device,
            "bench pipeline",
            &pipeline_layout,
            &self.vertex_module,
            &self.fragment_module,
            self.target_format,
        )?;

        let make_group = |parity: usize| {
            let entries: Vec<wgpu::BindGroupEntry> = self
                .slots
                .iter()
                .enumerate()
                .flat_map(|(index, slot)| {
                    let texture = match slot {
                        TextureSlot::Texture(texture) => texture,
                        TextureSlot::PreviousFrame => targets.get(parity),
                    };
                    texture.bind_entries(index as u32 * 2)
                })
                .collect();
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&format!("bench texture bind group #{parity}")),
                layout: &texture_layout,
                entries: &entries,
            })
        };
        let texture_bind_groups = [make_group(0), make_group(1)];

        self.linked = Some(LinkedProgram {
            pipeline,
            texture_bind_groups,
        });
        Ok(())
    }

    /// Records one full-screen draw into the back target. Uniform changes are
    /// queued ahead of the encoder's submission.
    pub fn draw(
        &mut self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        targets: &PingPong,
    ) -> Result<()> {
        let linked = self
            .linked
            .as_ref()
            .ok_or_else(|| anyhow!("shader program drawn before link"))?;
        if let Some(bytes) = self.uniforms.take_dirty() {
            queue.write_buffer(&self.uniform_buffer, 0, bytes);
        }

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("bench pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &targets.back().view,
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
        pass.set_pipeline(&linked.pipeline);
        pass.set_bind_group(0, &self.uniform_bind_group, &[]);
        pass.set_bind_group(1, &linked.texture_bind_groups[targets.parity()], &[]);
        pass.draw(0..3, 0..1);
        Ok(())
    }
}

/// Pipeline drawing the three-vertex full-screen triangle without blending.
pub(crate) fn fullscreen_pipeline(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::PipelineLayout,
    vertex_module: &wgpu::ShaderModule,
    fragment_module: &wgpu::ShaderModule,
    format: wgpu::TextureFormat,
) -> Result<wgpu::RenderPipeline> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: vertex_module,
            entry_point: Some("main"),
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        fragment: Some(wgpu::FragmentState {
            module: fragment_module,
            entry_point: Some("main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview: None,
        cache: None,
    });
    if let Some(error) = pollster::block_on(device.pop_error_scope()) {
        anyhow::bail!("failed to create {label}: {error}");
    }
    Ok(pipeline)
}
