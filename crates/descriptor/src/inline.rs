//! Rewrites descriptors so the shader source travels inside the JSON.
//!
//! Works on raw [`serde_json::Value`]s rather than [`ShaderDescriptor`] so
//! keys this crate does not know about survive the rewrite untouched.
//!
//! [`ShaderDescriptor`]: crate::ShaderDescriptor
use std::path::Path;

use serde_json::Value;

use crate::load::{descriptor_dir, resolve_source};
use crate::{DescriptorError, ShaderDescriptor};

/// Replaces `source_path` with an inline `source` string.
pub fn embed_source(spec: &mut Value, source: &str) -> Result<(), DescriptorError> {
    let object = spec.as_object_mut().ok_or_else(|| {
        DescriptorError::Invalid(vec!["descriptor root must be a JSON object".to_string()])
    })?;
    object.remove("source_path");
    object.insert("source".to_string(), Value::String(source.to_string()));
    Ok(())
}

/// Reads the shader the descriptor at `path` currently points to.
pub fn current_source(spec: &Value, path: &Path) -> Result<String, DescriptorError> {
    let descriptor: ShaderDescriptor =
        serde_json::from_value(spec.clone()).map_err(|source| DescriptorError::Parse {
            origin: path.display().to_string(),
            source,
        })?;
    resolve_source(&descriptor, &descriptor_dir(path))
}
