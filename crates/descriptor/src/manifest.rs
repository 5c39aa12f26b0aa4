//! Serde schema for the JSON shader descriptor.
//!
//! Types:
//!
//! - `ShaderDescriptor` mirrors the on-disk document. Uniform values stay as
//!   raw JSON here; `UniformSource::parse` gives them meaning so the schema
//!   can round-trip documents it does not fully understand.
//! - `GammaSetting` accepts either a number (`2.2`) or a string (`"sRGB"`,
//!   `"2.2"`), matching what hand-written descriptors use in practice.
//! - `OutputEncoding` is the post-processing the output shader applies before
//!   presenting or saving an 8-bit image.
use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::DescriptorError;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ShaderDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<PathBuf>,
    pub resolution: [u32; 2],
    #[serde(default)]
    pub uniforms: BTreeMap<String, Value>,
    #[serde(default)]
    pub monte_carlo: bool,
    #[serde(default)]
    pub float_buffers: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gamma: Option<GammaSetting>,
    #[serde(default)]
    pub flip_y: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_every: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum GammaSetting {
    Number(f32),
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum OutputEncoding {
    /// Pass the rendered values through unchanged.
    #[default]
    Copy,
    /// Apply `pow(color, 1 / gamma)` per channel.
    Gamma(f32),
    /// Apply the piecewise sRGB transfer function.
    Srgb,
}

impl GammaSetting {
    pub fn encoding(&self) -> Result<OutputEncoding, DescriptorError> {
        match self {
            GammaSetting::Number(gamma) => encoding_from_gamma(*gamma, &gamma.to_string()),
            GammaSetting::Text(text) => {
                let trimmed = text.trim();
                if trimmed.eq_ignore_ascii_case("srgb") {
                    return Ok(OutputEncoding::Srgb);
                }
                let gamma = trimmed
                    .parse::<f32>()
                    .map_err(|_| DescriptorError::InvalidGamma(text.clone()))?;
                encoding_from_gamma(gamma, text)
            }
        }
    }
}

fn encoding_from_gamma(gamma: f32, raw: &str) -> Result<OutputEncoding, DescriptorError> {
    if !gamma.is_finite() || gamma <= 0.0 {
        return Err(DescriptorError::InvalidGamma(raw.to_string()));
    }
    if (gamma - 1.0).abs() <= f32::EPSILON {
        Ok(OutputEncoding::Copy)
    } else {
        Ok(OutputEncoding::Gamma(gamma))
    }
}

impl ShaderDescriptor {
    pub fn width(&self) -> u32 {
        self.resolution[0]
    }

    pub fn height(&self) -> u32 {
        self.resolution[1]
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width() as f32 / self.height().max(1) as f32
    }

    /// Monte Carlo rendering accumulates into the previous frame, which needs
    /// full float precision to avoid banding after many samples.
    pub fn uses_float_buffers(&self) -> bool {
        self.float_buffers || self.monte_carlo
    }

    pub fn output_encoding(&self) -> Result<OutputEncoding, DescriptorError> {
        match &self.gamma {
            Some(setting) => setting.encoding(),
            None => Ok(OutputEncoding::default()),
        }
    }

    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.source.is_none() && self.source_path.is_none() {
            issues.push("descriptor must define `source` or `source_path`".to_string());
        }
        if self.width() == 0 || self.height() == 0 {
            issues.push(format!(
                "resolution must be positive (got {}x{})",
                self.width(),
                self.height()
            ));
        }
        if self.refresh_every == Some(0) {
            issues.push("refresh_every must be at least 1".to_string());
        }
        if self.batch_size == Some(0) {
            issues.push("batch_size must be at least 1".to_string());
        }
        if let Err(err) = self.output_encoding() {
            issues.push(err.to_string());
        }
        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> ShaderDescriptor {
        serde_json::from_str(json).expect("descriptor parses")
    }

    #[test]
    fn defaults_are_applied_to_sparse_documents() {
        let descriptor = parse(r#"{ "source": "void main() {}", "resolution": [640, 480] }"#);
        assert!(descriptor.uniforms.is_empty());
        assert!(!descriptor.monte_carlo);
        assert!(!descriptor.uses_float_buffers());
        assert_eq!(descriptor.output_encoding().unwrap(), OutputEncoding::Copy);
        assert!(descriptor.validate().is_empty());
    }

    #[test]
    fn monte_carlo_implies_float_buffers() {
        let descriptor = parse(
            r#"{ "source": "", "resolution": [4, 4], "monte_carlo": true }"#,
        );
        assert!(descriptor.uses_float_buffers());
    }

    #[test]
    fn gamma_accepts_numbers_and_strings() {
        let srgb = GammaSetting::Text("sRGB".into()).encoding().unwrap();
        assert_eq!(srgb, OutputEncoding::Srgb);

        let numeric_text = GammaSetting::Text("2.2".into()).encoding().unwrap();
        assert_eq!(numeric_text, OutputEncoding::Gamma(2.2));

        let unit = GammaSetting::Number(1.0).encoding().unwrap();
        assert_eq!(unit, OutputEncoding::Copy);
        assert_eq!(OutputEncoding::default(), OutputEncoding::Copy);

        assert!(GammaSetting::Text("bright".into()).encoding().is_err());
        assert!(GammaSetting::Number(0.0).encoding().is_err());
    }

    #[test]
    fn validate_reports_each_problem() {
        let descriptor = parse(
            r#"{ "resolution": [0, 10], "refresh_every": 0, "batch_size": 0, "gamma": "x" }"#,
        );
        let issues = descriptor.validate();
        assert_eq!(issues.len(), 5, "{issues:?}");
    }
}
