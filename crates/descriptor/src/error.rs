use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse shader descriptor {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("no shader source code defined (expected `source` or `source_path`)")]
    MissingSource,
    #[error("invalid uniform mapping {name} <- {reason}")]
    InvalidUniform { name: String, reason: String },
    #[error("invalid gamma setting '{0}'; expected a number or \"sRGB\"")]
    InvalidGamma(String),
    #[error("invalid shader descriptor: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

impl DescriptorError {
    pub(crate) fn uniform(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidUniform {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}
