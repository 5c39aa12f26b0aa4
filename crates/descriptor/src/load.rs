use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::{DescriptorError, OutputEncoding, ShaderDescriptor, UniformSource};

#[derive(Debug, Clone, PartialEq)]
pub struct NamedUniform {
    pub name: String,
    pub source: UniformSource,
}

/// A validated descriptor together with everything resolved from disk.
#[derive(Debug, Clone)]
pub struct LoadedDescriptor {
    pub descriptor: ShaderDescriptor,
    /// Directory relative paths inside the descriptor are resolved against.
    pub base_dir: PathBuf,
    /// File the descriptor was read from, if any.
    pub origin: Option<PathBuf>,
    pub source: String,
    pub uniforms: Vec<NamedUniform>,
    pub output_encoding: OutputEncoding,
}

pub fn load_descriptor(path: &Path) -> Result<LoadedDescriptor, DescriptorError> {
    let contents = fs::read_to_string(path).map_err(|source| DescriptorError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value = serde_json::from_str(&contents).map_err(|source| DescriptorError::Parse {
        origin: path.display().to_string(),
        source,
    })?;
    let base_dir = descriptor_dir(path);
    debug!(
        descriptor = %path.display(),
        base_dir = %base_dir.display(),
        "loaded shader descriptor"
    );
    LoadedDescriptor::build(value, base_dir, Some(path.to_path_buf()))
}

impl LoadedDescriptor {
    /// Builds a descriptor from in-memory JSON; relative paths resolve
    /// against `base_dir`.
    pub fn from_value(value: Value, base_dir: impl Into<PathBuf>) -> Result<Self, DescriptorError> {
        Self::build(value, base_dir.into(), None)
    }

    fn build(
        value: Value,
        base_dir: PathBuf,
        origin: Option<PathBuf>,
    ) -> Result<Self, DescriptorError> {
        let label = origin
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "<inline>".to_string());
        let descriptor: ShaderDescriptor =
            serde_json::from_value(value).map_err(|source| DescriptorError::Parse {
                origin: label,
                source,
            })?;

        let issues = descriptor.validate();
        if !issues.is_empty() {
            return Err(DescriptorError::Invalid(issues));
        }
        let output_encoding = descriptor.output_encoding()?;

        let source = resolve_source(&descriptor, &base_dir)?;

        let mut uniforms = Vec::with_capacity(descriptor.uniforms.len());
        for (name, value) in &descriptor.uniforms {
            let source = match UniformSource::parse(name, value)? {
                UniformSource::ImageFile { path } => UniformSource::ImageFile {
                    path: resolve_relative(&base_dir, &path),
                },
                other => other,
            };
            uniforms.push(NamedUniform {
                name: name.clone(),
                source,
            });
        }

        Ok(Self {
            descriptor,
            base_dir,
            origin,
            source,
            uniforms,
            output_encoding,
        })
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.descriptor.width(), self.descriptor.height())
    }

    pub fn refresh_every(&self) -> u32 {
        self.descriptor.refresh_every.unwrap_or(1).max(1)
    }

    pub fn batch_size(&self) -> u32 {
        self.descriptor.batch_size.unwrap_or(1).max(1)
    }

    pub fn label(&self) -> String {
        self.origin
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "<inline>".to_string())
    }

    pub fn uniform(&self, name: &str) -> Option<&UniformSource> {
        self.uniforms
            .iter()
            .find(|uniform| uniform.name == name)
            .map(|uniform| &uniform.source)
    }
}

/// Returns the inline `source`, or reads `source_path` relative to `base_dir`.
pub(crate) fn resolve_source(
    descriptor: &ShaderDescriptor,
    base_dir: &Path,
) -> Result<String, DescriptorError> {
    if let Some(source) = &descriptor.source {
        return Ok(source.clone());
    }
    let relative = descriptor
        .source_path
        .as_ref()
        .ok_or(DescriptorError::MissingSource)?;
    let path = resolve_relative(base_dir, relative);
    fs::read_to_string(&path).map_err(|source| DescriptorError::Io { path, source })
}

pub(crate) fn descriptor_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn resolve_relative(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}
