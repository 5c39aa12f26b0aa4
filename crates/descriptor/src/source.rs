//! Interprets the values of the descriptor's `uniforms` table.
//!
//! Numbers and arrays are constants; strings name a per-frame source; objects
//! describe textures. Everything is checked here so the render loop only ever
//! sees well-formed sources.
use std::fmt;
use std::path::PathBuf;

use serde_json::{Map, Value};

use crate::DescriptorError;

/// `random_<dist>_<n>` uniforms map onto a scalar or vector, so `n` tops out
/// at a `vec4`.
pub const MAX_RANDOM_COMPONENTS: usize = 4;

const TEXEL_CHANNELS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distribution {
    Uniform,
    Normal,
}

impl Distribution {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "uniform" => Some(Self::Uniform),
            "normal" | "gauss" => Some(Self::Normal),
            _ => None,
        }
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Distribution::Uniform => f.write_str("uniform"),
            Distribution::Normal => f.write_str("normal"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RandomSpec {
    pub distribution: Distribution,
    /// Number of scalars for vector sources, number of RGBA texels for
    /// random textures.
    pub size: usize,
}

/// Inline RGBA float texture data, rows listed top to bottom.
#[derive(Debug, Clone, PartialEq)]
pub struct DataArray {
    pub width: u32,
    pub height: u32,
    pub texels: Vec<[f32; 4]>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UniformSource {
    Constant(Vec<f32>),
    Time,
    Mouse,
    RelativeMouse,
    FrameNumber,
    Resolution,
    PreviousFrame,
    Random(RandomSpec),
    ImageFile { path: PathBuf },
    Data(DataArray),
    RandomTexture(RandomSpec),
}

impl UniformSource {
    pub fn parse(name: &str, value: &Value) -> Result<Self, DescriptorError> {
        match value {
            Value::String(tag) => parse_tag(name, tag),
            Value::Object(map) => parse_object(name, map),
            Value::Number(_) | Value::Array(_) => {
                let mut values = Vec::new();
                flatten_numbers(name, value, &mut values)?;
                if values.is_empty() {
                    return Err(DescriptorError::uniform(name, "empty array"));
                }
                Ok(Self::Constant(values))
            }
            Value::Bool(_) | Value::Null => Err(DescriptorError::uniform(
                name,
                format!("unsupported value {value}"),
            )),
        }
    }

    pub fn is_texture(&self) -> bool {
        matches!(
            self,
            Self::PreviousFrame | Self::ImageFile { .. } | Self::Data(_) | Self::RandomTexture(_)
        )
    }

    /// Sources whose value has to be recomputed before every sample.
    pub fn is_dynamic(&self) -> bool {
        matches!(
            self,
            Self::Time
                | Self::Mouse
                | Self::RelativeMouse
                | Self::FrameNumber
                | Self::PreviousFrame
                | Self::Random(_)
                | Self::RandomTexture(_)
        )
    }

    /// Number of float components written for value (non-texture) sources.
    pub fn component_count(&self) -> Option<usize> {
        match self {
            Self::Constant(values) => Some(values.len()),
            Self::Time | Self::FrameNumber => Some(1),
            Self::Mouse | Self::RelativeMouse | Self::Resolution => Some(2),
            Self::Random(spec) => Some(spec.size),
            Self::PreviousFrame | Self::ImageFile { .. } | Self::Data(_) | Self::RandomTexture(_) => {
                None
            }
        }
    }
}

fn parse_tag(name: &str, tag: &str) -> Result<UniformSource, DescriptorError> {
    match tag {
        "time" => Ok(UniformSource::Time),
        "mouse" => Ok(UniformSource::Mouse),
        "relative_mouse" => Ok(UniformSource::RelativeMouse),
        "frame_number" => Ok(UniformSource::FrameNumber),
        "resolution" => Ok(UniformSource::Resolution),
        "previous_frame" => Ok(UniformSource::PreviousFrame),
        other if other.starts_with("random_") => parse_random_tag(name, other),
        other => Err(DescriptorError::uniform(name, other)),
    }
}

fn parse_random_tag(name: &str, tag: &str) -> Result<UniformSource, DescriptorError> {
    let parts: Vec<&str> = tag.split('_').collect();
    if parts.len() > 3 {
        return Err(DescriptorError::uniform(
            name,
            format!("{tag} (expected random_<distribution>[_<size>])"),
        ));
    }

    let distribution = Distribution::from_name(parts[1]).ok_or_else(|| {
        DescriptorError::uniform(name, format!("{tag} (unknown distribution '{}')", parts[1]))
    })?;

    let size = match parts.get(2) {
        Some(raw) => raw
            .parse::<usize>()
            .map_err(|_| DescriptorError::uniform(name, format!("{tag} (invalid size '{raw}')")))?,
        None => 1,
    };
    if size == 0 || size > MAX_RANDOM_COMPONENTS {
        return Err(DescriptorError::uniform(
            name,
            format!("{tag} (size must be between 1 and {MAX_RANDOM_COMPONENTS})"),
        ));
    }

    Ok(UniformSource::Random(RandomSpec { distribution, size }))
}

fn parse_object(name: &str, map: &Map<String, Value>) -> Result<UniformSource, DescriptorError> {
    if let Some(spec) = map.get("random") {
        return parse_random_texture(name, spec);
    }
    if let Some(data) = map.get("data") {
        return parse_data(name, data).map(UniformSource::Data);
    }
    if let Some(file) = map.get("file") {
        let path = file
            .as_str()
            .ok_or_else(|| DescriptorError::uniform(name, "texture `file` must be a string"))?;
        return Ok(UniformSource::ImageFile {
            path: PathBuf::from(path),
        });
    }
    Err(DescriptorError::uniform(
        name,
        format!("{} (expected `file`, `data` or `random`)", Value::Object(map.clone())),
    ))
}

fn parse_random_texture(name: &str, spec: &Value) -> Result<UniformSource, DescriptorError> {
    let distribution = spec
        .get("distribution")
        .and_then(Value::as_str)
        .ok_or_else(|| DescriptorError::uniform(name, "random texture needs a `distribution`"))?;
    let distribution = Distribution::from_name(distribution).ok_or_else(|| {
        DescriptorError::uniform(name, format!("unknown distribution '{distribution}'"))
    })?;
    let size = spec
        .get("size")
        .and_then(Value::as_u64)
        .ok_or_else(|| DescriptorError::uniform(name, "random texture needs an integer `size`"))?;
    if size == 0 {
        return Err(DescriptorError::uniform(name, "random texture size must be positive"));
    }
    Ok(UniformSource::RandomTexture(RandomSpec {
        distribution,
        size: size as usize,
    }))
}

fn parse_data(name: &str, data: &Value) -> Result<DataArray, DescriptorError> {
    let rows = data
        .as_array()
        .ok_or_else(|| DescriptorError::uniform(name, "`data` must be an array of rows"))?;
    if rows.is_empty() {
        return Err(DescriptorError::uniform(name, "`data` has no rows"));
    }

    let mut width = None;
    let mut texels = Vec::new();
    for (row_index, row) in rows.iter().enumerate() {
        let row = row.as_array().ok_or_else(|| {
            DescriptorError::uniform(name, format!("data row {row_index} is not an array"))
        })?;
        match width {
            None => width = Some(row.len()),
            Some(expected) if expected != row.len() => {
                return Err(DescriptorError::uniform(
                    name,
                    format!(
                        "data row {row_index} has {} texels, expected {expected}",
                        row.len()
                    ),
                ));
            }
            Some(_) => {}
        }

        for texel in row {
            let mut channels = Vec::with_capacity(TEXEL_CHANNELS);
            flatten_numbers(name, texel, &mut channels)?;
            let texel: [f32; TEXEL_CHANNELS] = channels.try_into().map_err(|got: Vec<f32>| {
                DescriptorError::uniform(
                    name,
                    format!("data texels need {TEXEL_CHANNELS} channels, got {}", got.len()),
                )
            })?;
            texels.push(texel);
        }
    }

    let width = width.unwrap_or(0);
    if width == 0 {
        return Err(DescriptorError::uniform(name, "`data` rows are empty"));
    }

    Ok(DataArray {
        width: width as u32,
        height: rows.len() as u32,
        texels,
    })
}

fn flatten_numbers(name: &str, value: &Value, out: &mut Vec<f32>) -> Result<(), DescriptorError> {
    match value {
        Value::Number(number) => {
            let value = number
                .as_f64()
                .ok_or_else(|| DescriptorError::uniform(name, format!("invalid number {number}")))?;
            out.push(value as f32);
            Ok(())
        }
        Value::Array(items) => {
            for item in items {
                flatten_numbers(name, item, out)?;
            }
            Ok(())
        }
        other => Err(DescriptorError::uniform(
            name,
            format!("expected a number, found {other}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_symbolic_tags() {
        assert_eq!(UniformSource::parse("t", &json!("time")).unwrap(), UniformSource::Time);
        assert_eq!(
            UniformSource::parse("base", &json!("previous_frame")).unwrap(),
            UniformSource::PreviousFrame
        );
        assert_eq!(
            UniformSource::parse("m", &json!("relative_mouse")).unwrap(),
            UniformSource::RelativeMouse
        );
        assert!(UniformSource::parse("x", &json!("tiem")).is_err());
    }

    #[test]
    fn parses_random_tags_with_optional_size() {
        assert_eq!(
            UniformSource::parse("r", &json!("random_uniform")).unwrap(),
            UniformSource::Random(RandomSpec {
                distribution: Distribution::Uniform,
                size: 1
            })
        );
        assert_eq!(
            UniformSource::parse("r", &json!("random_gauss_3")).unwrap(),
            UniformSource::Random(RandomSpec {
                distribution: Distribution::Normal,
                size: 3
            })
        );
        assert!(UniformSource::parse("r", &json!("random_normal_5")).is_err());
        assert!(UniformSource::parse("r", &json!("random_normal_0")).is_err());
        assert!(UniformSource::parse("r", &json!("random_poisson_2")).is_err());
        assert!(UniformSource::parse("r", &json!("random_uniform_2_x")).is_err());
    }

    #[test]
    fn flattens_constant_arrays() {
        let source = UniformSource::parse("m", &json!([[1, 0], [0, 1]])).unwrap();
        assert_eq!(source, UniformSource::Constant(vec![1.0, 0.0, 0.0, 1.0]));
        assert_eq!(source.component_count(), Some(4));
        assert!(UniformSource::parse("m", &json!([])).is_err());
        assert!(UniformSource::parse("m", &json!(["a"])).is_err());
        assert!(UniformSource::parse("m", &json!(true)).is_err());
    }

    #[test]
    fn parses_texture_objects() {
        let file = UniformSource::parse("stars", &json!({ "file": "stars.png" })).unwrap();
        assert_eq!(
            file,
            UniformSource::ImageFile {
                path: PathBuf::from("stars.png")
            }
        );
        assert!(file.is_texture());
        assert!(!file.is_dynamic());

        let random = UniformSource::parse(
            "noise",
            &json!({ "random": { "distribution": "normal", "size": 16 } }),
        )
        .unwrap();
        assert!(random.is_texture());
        assert!(random.is_dynamic());

        assert!(UniformSource::parse("x", &json!({ "random": { "size": 2 } })).is_err());
        assert!(UniformSource::parse("x", &json!({ "unknown": 1 })).is_err());
    }

    #[test]
    fn data_textures_keep_row_major_layout() {
        let source = UniformSource::parse(
            "lut",
            &json!({ "data": [
                [[1, 0, 0, 1], [0, 1, 0, 1], [0, 0, 1, 1]],
                [[1, 1, 1, 1], [0, 0, 0, 1], [0.5, 0.5, 0.5, 1]]
            ] }),
        )
        .unwrap();
        let UniformSource::Data(data) = source else {
            panic!("expected data texture");
        };
        assert_eq!((data.width, data.height), (3, 2));
        assert_eq!(data.texels.len(), 6);
        assert_eq!(data.texels[1], [0.0, 1.0, 0.0, 1.0]);
        assert_eq!(data.texels[5], [0.5, 0.5, 0.5, 1.0]);
    }

    #[test]
    fn data_textures_reject_ragged_rows_and_short_texels() {
        let ragged = json!({ "data": [[[1, 0, 0, 1]], [[1, 0, 0, 1], [1, 0, 0, 1]]] });
        assert!(UniformSource::parse("lut", &ragged).is_err());

        let short = json!({ "data": [[[1, 0, 0]]] });
        assert!(UniformSource::parse("lut", &short).is_err());
    }
}
