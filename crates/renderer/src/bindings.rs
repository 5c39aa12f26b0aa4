//! Resolves descriptor uniform sources against what the shader declares.
//!
//! `BindingPlan::new` runs once at start-up and sorts every mapping into
//! values written once, values recomputed per sample, and textures. The
//! render loop then only calls [`BindingPlan::update`].
use anyhow::{Context, Result};
use descriptor::{LoadedDescriptor, RandomSpec, UniformSource};

use crate::compile::{UniformDecl, WrappedShader};
use crate::gpu::{ShaderProgram, Texture, TextureSlot};
use crate::random::RandomStream;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BindingError {
    #[error("uniform `{name}` is mapped to a texture but the shader declares it as `{declared}`")]
    ExpectedSampler { name: String, declared: String },
    #[error("uniform `{name}` is a sampler2D in the shader but is mapped to a value")]
    ExpectedValue { name: String },
    #[error("uniform `{name}` is declared as `{declared}` ({expected} components) but its source provides {got}")]
    Components {
        name: String,
        declared: String,
        expected: usize,
        got: usize,
    },
}

/// Inputs that change between samples.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameInputs {
    /// Seconds since the bench started.
    pub elapsed: f32,
    /// 1-based sample counter.
    pub sample: u64,
    /// Cursor position relative to the preview window, origin top left.
    pub mouse_relative: [f32; 2],
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BindingPlan {
    resolution: (u32, u32),
    /// Constants and `resolution`, written once.
    pub statics: Vec<(String, Vec<f32>)>,
    /// Time, mouse, frame number and random vectors.
    pub dynamics: Vec<(String, UniformSource)>,
    /// Texture sources for samplers the shader declares.
    pub textures: Vec<(String, UniformSource)>,
}

impl BindingPlan {
    pub fn new(descriptor: &LoadedDescriptor, shader: &WrappedShader) -> Result<Self, BindingError> {
        let resolution = descriptor.resolution();
        let mut plan = Self {
            resolution,
            statics: Vec::new(),
            dynamics: Vec::new(),
            textures: Vec::new(),
        };

        for mapping in &descriptor.uniforms {
            let name = mapping.name.as_str();
            let source = &mapping.source;
            let declared_sampler = shader.samplers.iter().any(|sampler| sampler == name);
            let declared_value = shader.uniforms.iter().find(|decl| decl.name == name);

            if source.is_texture() {
                if let Some(decl) = declared_value {
                    return Err(BindingError::ExpectedSampler {
                        name: name.to_string(),
                        declared: describe(decl),
                    });
                }
                if !declared_sampler {
                    tracing::warn!(uniform = %name, "texture mapping not used by the shader; ignoring");
                    continue;
                }
                plan.textures.push((name.to_string(), source.clone()));
                continue;
            }

            if declared_sampler {
                return Err(BindingError::ExpectedValue {
                    name: name.to_string(),
                });
            }
            let Some(decl) = declared_value else {
                tracing::warn!(uniform = %name, "uniform mapping not declared by the shader; ignoring");
                continue;
            };
            let got = source.component_count().unwrap_or(0);
            if got != decl.components() {
                return Err(BindingError::Components {
                    name: name.to_string(),
                    declared: describe(decl),
                    expected: decl.components(),
                    got,
                });
            }

            match source {
                UniformSource::Constant(values) => {
                    plan.statics.push((name.to_string(), values.clone()));
                }
                UniformSource::Resolution => {
                    plan.statics
                        .push((name.to_string(), vec![resolution.0 as f32, resolution.1 as f32]));
                }
                other => plan.dynamics.push((name.to_string(), other.clone())),
            }
        }

        for decl in &shader.uniforms {
            if descriptor.uniform(&decl.name).is_none() {
                tracing::warn!(uniform = %decl.name, "shader uniform has no mapping; it stays zero");
            }
        }
        for sampler in &shader.samplers {
            if descriptor.uniform(sampler).is_none() {
                tracing::warn!(sampler = %sampler, "sampler has no mapping; binding a black placeholder");
            }
        }

        tracing::debug!(
            statics = plan.statics.len(),
            dynamics = plan.dynamics.len(),
            textures = plan.textures.len(),
            "resolved uniform bindings"
        );
        Ok(plan)
    }

    /// Writes static values and creates every texture. Must run before the
    /// program is linked.
    pub fn install(
        &self,
        program: &mut ShaderProgram,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
    ) -> Result<()> {
        for (name, values) in &self.statics {
            program
                .set_uniform(name, values)
                .with_context(|| format!("failed to set uniform {name}"))?;
        }

        for (name, source) in &self.textures {
            let slot = match source {
                UniformSource::PreviousFrame => TextureSlot::PreviousFrame,
                UniformSource::ImageFile { path } => {
                    TextureSlot::Texture(Texture::from_image_file(device, queue, path)?)
                }
                UniformSource::Data(data) => {
                    TextureSlot::Texture(Texture::from_data(device, queue, name, data))
                }
                UniformSource::RandomTexture(spec) => TextureSlot::Texture(Texture::random(
                    device,
                    queue,
                    name,
                    spec.size as u32,
                )),
                other => anyhow::bail!("uniform {name} cannot be bound as a texture: {other:?}"),
            };
            program.bind_texture(name, slot);
        }
        Ok(())
    }

    /// Refreshes every per-sample source for the sample described by `inputs`.
    pub fn update(
        &self,
        program: &mut ShaderProgram,
        queue: &wgpu::Queue,
        inputs: &FrameInputs,
        rng: &mut RandomStream,
    ) -> Result<()> {
        for (name, source) in &self.textures {
            if let UniformSource::RandomTexture(RandomSpec { distribution, size }) = source {
                if let Some(texture) = program.texture(name) {
                    let texels = rng.texels(*distribution, *size);
                    texture.update(queue, &texels);
                }
            }
        }
        for (name, values) in self.dynamic_values(inputs, rng) {
            program
                .set_uniform(name, &values)
                .with_context(|| format!("failed to set uniform {name}"))?;
        }
        Ok(())
    }

    pub fn dynamic_values<'a>(
        &'a self,
        inputs: &FrameInputs,
        rng: &mut RandomStream,
    ) -> Vec<(&'a str, Vec<f32>)> {
        self.dynamics
            .iter()
            .filter_map(|(name, source)| {
                value_for(source, inputs, self.resolution, rng).map(|values| (name.as_str(), values))
            })
            .collect()
    }

    pub fn uses_previous_frame(&self) -> bool {
        self.textures
            .iter()
            .any(|(_, source)| matches!(source, UniformSource::PreviousFrame))
    }
}

/// Value of a per-sample source; `None` for sources that are not values.
pub(crate) fn value_for(
    source: &UniformSource,
    inputs: &FrameInputs,
    resolution: (u32, u32),
    rng: &mut RandomStream,
) -> Option<Vec<f32>> {
    let [rel_x, rel_y] = inputs.mouse_relative;
    let values = match source {
        UniformSource::Constant(values) => values.clone(),
        UniformSource::Time => vec![inputs.elapsed],
        UniformSource::FrameNumber => vec![inputs.sample as f32],
        UniformSource::Resolution => vec![resolution.0 as f32, resolution.1 as f32],
        UniformSource::RelativeMouse => vec![rel_x, rel_y],
        UniformSource::Mouse => vec![rel_x * resolution.0 as f32, rel_y * resolution.1 as f32],
        UniformSource::Random(spec) => {
            let mut values = vec![0.0; spec.size];
            rng.fill(spec.distribution, &mut values);
            values
        }
        UniformSource::PreviousFrame
        | UniformSource::ImageFile { .. }
        | UniformSource::Data(_)
        | UniformSource::RandomTexture(_) => return None,
    };
    Some(values)
}

fn describe(decl: &UniformDecl) -> String {
    match decl.array_len {
        Some(len) => format!("{}[{len}]", decl.ty.keyword()),
        None => decl.ty.keyword().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use descriptor::Distribution;
    use serde_json::json;

    use super::*;

    const SHADER: &str = r"uniform float t;
uniform vec2 resolution;
uniform vec2 mouse;
uniform float frame;
uniform vec3 tint;
uniform vec2 jitter;
uniform sampler2D base_image;
uniform sampler2D noise;
uniform sampler2D unmapped;
void main() { gl_FragColor = vec4(t); }
";

    fn descriptor(uniforms: serde_json::Value) -> LoadedDescriptor {
        LoadedDescriptor::from_value(
            json!({ "source": SHADER, "resolution": [200, 100], "uniforms": uniforms }),
            ".",
        )
        .unwrap()
    }

    fn plan(uniforms: serde_json::Value) -> Result<BindingPlan, BindingError> {
        let loaded = descriptor(uniforms);
        let shader = WrappedShader::new(&loaded.source).unwrap();
        BindingPlan::new(&loaded, &shader)
    }

    #[test]
    fn sorts_sources_into_static_dynamic_and_textures() {
        let plan = plan(json!({
            "t": "time",
            "resolution": "resolution",
            "mouse": "mouse",
            "frame": "frame_number",
            "tint": [1.0, 0.5, 0.25],
            "jitter": "random_normal_2",
            "base_image": "previous_frame",
            "noise": { "random": { "distribution": "uniform", "size": 8 } },
            "not_in_shader": 3.0
        }))
        .unwrap();

        let statics: Vec<&str> = plan.statics.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(statics, vec!["resolution", "tint"]);
        assert_eq!(plan.statics[0].1, vec![200.0, 100.0]);

        let dynamics: Vec<&str> = plan.dynamics.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(dynamics, vec!["frame", "jitter", "mouse", "t"]);

        assert_eq!(plan.textures.len(), 2);
        assert!(plan.uses_previous_frame());
    }

    #[test]
    fn rejects_texture_sources_on_value_uniforms() {
        let err = plan(json!({ "t": "previous_frame" })).unwrap_err();
        assert_eq!(
            err,
            BindingError::ExpectedSampler {
                name: "t".into(),
                declared: "float".into()
            }
        );
    }

    #[test]
    fn rejects_values_on_samplers() {
        let err = plan(json!({ "noise": 1.0 })).unwrap_err();
        assert!(matches!(err, BindingError::ExpectedValue { .. }));
    }

    #[test]
    fn rejects_component_mismatches() {
        let err = plan(json!({ "tint": [1.0, 2.0] })).unwrap_err();
        assert_eq!(
            err,
            BindingError::Components {
                name: "tint".into(),
                declared: "vec3".into(),
                expected: 3,
                got: 2
            }
        );
        assert!(plan(json!({ "mouse": "time" })).is_err());
    }

    #[test]
    fn dynamic_values_follow_frame_inputs() {
        let plan = plan(json!({
            "t": "time",
            "mouse": "mouse",
            "frame": "frame_number",
            "jitter": "random_uniform_2"
        }))
        .unwrap();
        let mut rng = RandomStream::new(Some(5));
        let inputs = FrameInputs {
            elapsed: 2.5,
            sample: 7,
            mouse_relative: [0.5, 0.25],
        };
        let values = plan.dynamic_values(&inputs, &mut rng);
        let lookup = |name: &str| {
            values
                .iter()
                .find(|(candidate, _)| *candidate == name)
                .map(|(_, values)| values.clone())
                .unwrap()
        };
        assert_eq!(lookup("t"), vec![2.5]);
        assert_eq!(lookup("frame"), vec![7.0]);
        assert_eq!(lookup("mouse"), vec![100.0, 25.0]);
        let jitter = lookup("jitter");
        assert_eq!(jitter.len(), 2);
        assert!(jitter.iter().all(|v| (0.0..1.0).contains(v)));
    }

    #[test]
    fn random_values_are_reproducible_with_a_seed() {
        let source = UniformSource::Random(RandomSpec {
            distribution: Distribution::Normal,
            size: 3,
        });
        let inputs = FrameInputs::default();
        let mut a = RandomStream::new(Some(11));
        let mut b = RandomStream::new(Some(11));
        assert_eq!(
            value_for(&source, &inputs, (1, 1), &mut a),
            value_for(&source, &inputs, (1, 1), &mut b)
        );
        assert_eq!(
            value_for(&UniformSource::PreviousFrame, &inputs, (1, 1), &mut a),
            None
        );
    }
}
