use std::borrow::Cow;
use std::fmt::Write as _;

use anyhow::{anyhow, Result};
use descriptor::OutputEncoding;
use wgpu::naga::front::glsl::{Frontend, Options};
use wgpu::naga::ShaderStage;

/// GLSL types a descriptor uniform can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlslType {
    Float,
    Int,
    Vec2,
    Vec3,
    Vec4,
    IVec2,
    IVec3,
    IVec4,
    Mat2,
    Mat3,
    Mat4,
    Sampler2D,
}

impl GlslType {
    pub fn from_keyword(word: &str) -> Option<Self> {
        let ty = match word {
            "float" => Self::Float,
            "int" => Self::Int,
            "vec2" => Self::Vec2,
            "vec3" => Self::Vec3,
            "vec4" => Self::Vec4,
            "ivec2" => Self::IVec2,
            "ivec3" => Self::IVec3,
            "ivec4" => Self::IVec4,
            "mat2" => Self::Mat2,
            "mat3" => Self::Mat3,
            "mat4" => Self::Mat4,
            "sampler2D" => Self::Sampler2D,
            _ => return None,
        };
        Some(ty)
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Self::Float => "float",
            Self::Int => "int",
            Self::Vec2 => "vec2",
            Self::Vec3 => "vec3",
            Self::Vec4 => "vec4",
            Self::IVec2 => "ivec2",
            Self::IVec3 => "ivec3",
            Self::IVec4 => "ivec4",
            Self::Mat2 => "mat2",
            Self::Mat3 => "mat3",
            Self::Mat4 => "mat4",
            Self::Sampler2D => "sampler2D",
        }
    }

    /// Scalar components of one element (matrices count every entry).
    pub fn components(self) -> usize {
        match self {
            Self::Float | Self::Int => 1,
            Self::Vec2 | Self::IVec2 => 2,
            Self::Vec3 | Self::IVec3 => 3,
            Self::Vec4 | Self::IVec4 | Self::Mat2 => 4,
            Self::Mat3 => 9,
            Self::Mat4 => 16,
            Self::Sampler2D => 0,
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(self, Self::Int | Self::IVec2 | Self::IVec3 | Self::IVec4)
    }

    pub fn is_sampler(self) -> bool {
        matches!(self, Self::Sampler2D)
    }
}

/// One `uniform` declaration found in the user's shader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformDecl {
    pub name: String,
    pub ty: GlslType,
    pub array_len: Option<usize>,
}

impl UniformDecl {
    pub fn components(&self) -> usize {
        self.ty.components() * self.array_len.unwrap_or(1)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ShaderCompileError {
    #[error("unsupported uniform declaration on line {line}: {text}")]
    UnsupportedUniform { line: usize, text: String },
    #[error("unsupported varying on line {line}: {text} (only `varying vec3 pos` is provided)")]
    UnsupportedVarying { line: usize, text: String },
    #[error("shader compilation failed: {0}")]
    Compile(String),
}

/// The user's shader rewritten for the wgpu GLSL frontend.
#[derive(Debug, Clone)]
pub struct WrappedShader {
    pub source: String,
    pub uniforms: Vec<UniformDecl>,
    pub samplers: Vec<String>,
    /// Lines inserted ahead of the user's first line.
    header_lines: usize,
    user_source: String,
}

impl WrappedShader {
    /// Scans `source` for legacy declarations and produces a `#version 450`
    /// fragment shader.
    ///
    /// Removed lines (`#version`, `precision`, `uniform`, `varying`) are kept
    /// as blank lines so compiler diagnostics point at the user's numbering.
    pub fn new(source: &str) -> Result<Self, ShaderCompileError> {
        let mut uniforms = Vec::new();
        let mut samplers = Vec::new();
        let mut uses_pos = false;
        let mut body = String::with_capacity(source.len());

        for (index, line) in source.lines().enumerate() {
            let line_no = index + 1;
            let code = strip_line_comment(line).trim();
            let directive = code.starts_with("#version") || code.starts_with("precision ");
            if directive {
                body.push('\n');
                continue;
            }
            if code.starts_with("uniform ") {
                for decl in parse_uniform_line(code, line_no)? {
                    if decl.ty.is_sampler() {
                        if decl.array_len.is_some() {
                            return Err(ShaderCompileError::UnsupportedUniform {
                                line: line_no,
                                text: line.trim().to_string(),
                            });
                        }
                        samplers.push(decl.name);
                    } else {
                        uniforms.push(decl);
                    }
                }
                body.push('\n');
                continue;
            }
            if code.starts_with("varying ") {
                if !is_pos_varying(code) {
                    return Err(ShaderCompileError::UnsupportedVarying {
                        line: line_no,
                        text: line.trim().to_string(),
                    });
                }
                uses_pos = true;
                body.push('\n');
                continue;
            }
            body.push_str(&rewrite_texture_calls(line));
            body.push('\n');
        }

        let header = build_header(&uniforms, &samplers, uses_pos);
        let header_lines = header.lines().count();
        Ok(Self {
            source: format!("{header}{body}"),
            uniforms,
            samplers,
            header_lines,
            user_source: source.to_string(),
        })
    }

    /// Runs the naga GLSL frontend so syntax and type errors surface with
    /// the offending user line instead of a device-lost panic.
    pub fn check(&self) -> Result<(), ShaderCompileError> {
        let mut frontend = Frontend::default();
        let options = Options::from(ShaderStage::Fragment);
        match frontend.parse(&options, &self.source) {
            Ok(_) => Ok(()),
            Err(errors) => {
                let mut report = String::new();
                for error in &errors.errors {
                    let location = error.meta.location(&self.source);
                    let line = location.line_number as usize;
                    let message = error.kind.to_string();
                    if line > self.header_lines {
                        let user_line = line - self.header_lines;
                        report.push_str(&describe_error_line(&message, &self.user_source, user_line));
                    } else {
                        let _ = write!(report, "{message} (in generated prelude line {line})");
                    }
                    report.push('\n');
                }
                Err(ShaderCompileError::Compile(report.trim_end().to_string()))
            }
        }
    }
}

/// Formats `message` followed by the failing line and its neighbours.
pub fn describe_error_line(message: &str, source: &str, line: usize) -> String {
    let lines: Vec<&str> = source.lines().collect();
    let mut out = format!("line {line}: {message}");
    let first = line.saturating_sub(1).max(1);
    let last = (line + 1).min(lines.len());
    for number in first..=last {
        if let Some(text) = lines.get(number - 1) {
            let marker = if number == line { '>' } else { ' ' };
            let _ = write!(out, "\n{marker} {number:>4}: {text}");
        }
    }
    out
}

fn strip_line_comment(line: &str) -> &str {
    match line.find("//") {
        Some(index) => &line[..index],
        None => line,
    }
}

fn is_pos_varying(code: &str) -> bool {
    let tokens: Vec<&str> = code
        .trim_end_matches(';')
        .split_whitespace()
        .filter(|token| !matches!(*token, "lowp" | "mediump" | "highp"))
        .collect();
    matches!(tokens.as_slice(), ["varying", "vec3", "pos"])
}

fn parse_uniform_line(code: &str, line: usize) -> Result<Vec<UniformDecl>, ShaderCompileError> {
    let unsupported = || ShaderCompileError::UnsupportedUniform {
        line,
        text: code.to_string(),
    };

    let mut decls = Vec::new();
    for statement in code.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        if statement.contains('=') || statement.contains('{') {
            return Err(unsupported());
        }
        let mut tokens = statement
            .split_whitespace()
            .filter(|token| !matches!(*token, "lowp" | "mediump" | "highp"));
        if tokens.next() != Some("uniform") {
            return Err(unsupported());
        }
        let ty = tokens
            .next()
            .and_then(GlslType::from_keyword)
            .ok_or_else(unsupported)?;
        let names: String = tokens.collect();
        for raw in names.split(',') {
            let (name, array_len) = match raw.split_once('[') {
                Some((name, rest)) => {
                    let len = rest
                        .trim_end_matches(']')
                        .parse::<usize>()
                        .ok()
                        .filter(|len| *len > 0)
                        .ok_or_else(unsupported)?;
                    (name, Some(len))
                }
                None => (raw, None),
            };
            if !is_identifier(name) {
                return Err(unsupported());
            }
            decls.push(UniformDecl {
                name: name.to_string(),
                ty,
                array_len,
            });
        }
    }
    Ok(decls)
}

/// Renames legacy `texture2D(`/`texture2DLod(` calls. Only call sites are
/// touched; a macro would also rewrite the `texture2D` type keyword used by
/// the generated texture bindings.
fn rewrite_texture_calls(line: &str) -> Cow<'_, str> {
    if !line.contains("texture2D") {
        return Cow::Borrowed(line);
    }
    let bytes = line.as_bytes();
    let mut out = String::with_capacity(line.len());
    let mut copied = 0;
    let mut index = 0;
    while index < bytes.len() {
        if !is_identifier_byte(bytes[index]) {
            index += 1;
            continue;
        }
        let start = index;
        while index < bytes.len() && is_identifier_byte(bytes[index]) {
            index += 1;
        }
        let replacement = match &line[start..index] {
            "texture2D" => "texture",
            "texture2DLod" => "textureLod",
            _ => continue,
        };
        if line[index..].trim_start().starts_with('(') {
            out.push_str(&line[copied..start]);
            out.push_str(replacement);
            copied = index;
        }
    }
    if copied == 0 {
        return Cow::Borrowed(line);
    }
    out.push_str(&line[copied..]);
    Cow::Owned(out)
}

fn is_identifier_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Block member name for a user uniform; distinct from the user-facing name
/// so the alias macro never refers to itself.
pub(crate) fn member_name(name: &str) -> String {
    format!("bench_{name}")
}

fn build_header(uniforms: &[UniformDecl], samplers: &[String], uses_pos: bool) -> String {
    let mut header = String::from("#version 450\n");
    if uses_pos {
        header.push_str("layout(location = 0) in vec3 pos;\n");
    }
    header.push_str("layout(location = 0) out vec4 bench_FragColor;\n");
    header.push_str("#define gl_FragColor bench_FragColor\n");

    header.push_str("layout(std140, set = 0, binding = 0) uniform BenchUniforms {\n");
    if uniforms.is_empty() {
        header.push_str("    vec4 bench_reserved;\n");
    }
    for decl in uniforms {
        let suffix = decl
            .array_len
            .map(|len| format!("[{len}]"))
            .unwrap_or_default();
        let _ = writeln!(
            header,
            "    {} {}{};",
            decl.ty.keyword(),
            member_name(&decl.name),
            suffix
        );
    }
    header.push_str("} bench_uniforms;\n");
    for decl in uniforms {
        let _ = writeln!(
            header,
            "#define {} bench_uniforms.{}",
            decl.name,
            member_name(&decl.name)
        );
    }

    for (index, name) in samplers.iter().enumerate() {
        let texture_binding = index * 2;
        let sampler_binding = index * 2 + 1;
        let _ = writeln!(
            header,
            "layout(set = 1, binding = {texture_binding}) uniform texture2D bench_{name}_texture;"
        );
        let _ = writeln!(
            header,
            "layout(set = 1, binding = {sampler_binding}) uniform sampler bench_{name}_sampler;"
        );
        let _ = writeln!(
            header,
            "#define {name} sampler2D(bench_{name}_texture, bench_{name}_sampler)"
        );
    }
    header
}

/// Full-screen triangle.
///
/// `pos` reproduces a legacy orthographic projection of `[-aspect, aspect] x
/// [-1, 1]`. The triangle is emitted upside down so that texel row 0 of every
/// render target is the bottom row, matching what shaders sampling
/// `gl_FragCoord.xy / resolution` from the previous frame expect.
pub(crate) fn vertex_shader_source(aspect: f32) -> String {
    format!(
        r"#version 450
layout(location = 0) out vec3 pos;
layout(location = 1) out vec2 bench_uv;

const float BENCH_ASPECT = {aspect:?};
const vec2 positions[3] = vec2[3](
    vec2(-1.0, -3.0),
    vec2(3.0, 1.0),
    vec2(-1.0, 1.0)
);

void main() {{
    vec2 clip = positions[gl_VertexIndex];
    pos = vec3(clip.x * BENCH_ASPECT, clip.y, 0.0);
    bench_uv = clip * 0.5 + vec2(0.5, 0.5);
    gl_Position = vec4(clip.x, -clip.y, 0.0, 1.0);
}}
"
    )
}

/// Post-processing shader that turns a render target into displayable pixels.
pub(crate) fn output_fragment_source(encoding: OutputEncoding, flip_y: bool) -> String {
    let coord = if flip_y {
        "bench_uv"
    } else {
        "vec2(bench_uv.x, 1.0 - bench_uv.y)"
    };
    let color = match encoding {
        OutputEncoding::Copy => "src".to_string(),
        OutputEncoding::Gamma(gamma) => format!(
            "vec4(pow(max(src.xyz, vec3(0.0)), vec3(1.0) / {gamma:?}), src.w)"
        ),
        OutputEncoding::Srgb => r"vec4(
        mix(
            vec3(1.055) * pow(max(src.xyz, vec3(0.0)), vec3(1.0 / 2.4)) - vec3(0.055),
            src.xyz * vec3(12.92),
            vec3(lessThan(src.xyz, vec3(0.0031308)))
        ),
        src.w)"
            .to_string(),
    };
    format!(
        r"#version 450
layout(location = 1) in vec2 bench_uv;
layout(location = 0) out vec4 outColor;

layout(set = 0, binding = 0) uniform texture2D bench_source_texture;
layout(set = 0, binding = 1) uniform sampler bench_source_sampler;

void main() {{
    vec4 src = texture(sampler2D(bench_source_texture, bench_source_sampler), {coord});
    outColor = {color};
}}
"
    )
}

pub(crate) fn create_module(
    device: &wgpu::Device,
    label: &str,
    source: String,
    stage: ShaderStage,
) -> Result<wgpu::ShaderModule> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Owned(source),
            stage,
            defines: &[],
        },
    });
    if let Some(error) = pollster::block_on(device.pop_error_scope()) {
        return Err(anyhow!(ShaderCompileError::Compile(format!("{label}: {error}"))));
    }
    Ok(module)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEGACY: &str = r"precision highp float;
uniform vec2 resolution;
uniform float t; // seconds
uniform sampler2D base_image;
varying vec3 pos;

void main() {
    vec3 base = texture2D(base_image, gl_FragCoord.xy / resolution.xy).xyz;
    gl_FragColor = vec4(base + vec3(pos.x, t, 0.0), 1.0);
}
";

    #[test]
    fn wrap_collects_uniforms_and_samplers() {
        let wrapped = WrappedShader::new(LEGACY).unwrap();
        assert_eq!(
            wrapped.uniforms,
            vec![
                UniformDecl {
                    name: "resolution".into(),
                    ty: GlslType::Vec2,
                    array_len: None
                },
                UniformDecl {
                    name: "t".into(),
                    ty: GlslType::Float,
                    array_len: None
                },
            ]
        );
        assert_eq!(wrapped.samplers, vec!["base_image".to_string()]);
    }

    #[test]
    fn wrap_rewrites_declarations_into_450_bindings() {
        let wrapped = WrappedShader::new(LEGACY).unwrap();
        let source = &wrapped.source;
        assert!(source.starts_with("#version 450\n"));
        assert!(source.contains("layout(location = 0) in vec3 pos;"));
        assert!(source.contains("    float bench_t;"));
        assert!(source.contains("#define t bench_uniforms.bench_t"));
        assert!(source.contains("layout(set = 1, binding = 1) uniform sampler bench_base_image_sampler;"));
        assert!(!source.contains("uniform float t;"));
        assert!(!source.contains("precision highp"));
    }

    #[test]
    fn wrap_preserves_user_line_numbers() {
        let wrapped = WrappedShader::new(LEGACY).unwrap();
        let user_lines = LEGACY.lines().count();
        assert_eq!(
            wrapped.source.lines().count(),
            wrapped.header_lines + user_lines
        );
        let main_line = wrapped
            .source
            .lines()
            .position(|line| line.starts_with("void main()"))
            .unwrap();
        assert_eq!(main_line - wrapped.header_lines + 1, 7);
    }

    #[test]
    fn legacy_shader_passes_the_frontend() {
        WrappedShader::new(LEGACY).unwrap().check().unwrap();
    }

    #[test]
    fn samplers_for_every_texture_source_compile() {
        // previous frame, image file, data array and random texture all bind
        // as plain sampler2D uniforms.
        let source = r"uniform vec2 resolution;
uniform sampler2D prev;
uniform sampler2D photo;
uniform sampler2D table;
uniform sampler2D noise;
uniform sampler2D unused;

void main() {
    vec2 uv = gl_FragCoord.xy / resolution;
    vec4 acc = texture2D(prev, uv) + texture2D (photo, uv);
    acc += texture2DLod(table, vec2(0.5), 0.0) + texture2D(noise, vec2(uv.x, 0.5));
    gl_FragColor = acc;
}
";
        let wrapped = WrappedShader::new(source).unwrap();
        assert_eq!(wrapped.samplers, vec!["prev", "photo", "table", "noise", "unused"]);
        assert!(wrapped.source.contains("uniform texture2D bench_prev_texture;"));
        wrapped.check().unwrap();
    }

    #[test]
    fn declared_but_unused_sampler_compiles() {
        let wrapped =
            WrappedShader::new("uniform sampler2D prev;\nvoid main() { gl_FragColor = vec4(0.5); }\n")
                .unwrap();
        wrapped.check().unwrap();
    }

    #[test]
    fn only_texture_call_sites_are_renamed() {
        assert_eq!(
            rewrite_texture_calls("c = texture2D(a, uv) + texture2DLod (b, uv, 1.0);"),
            "c = texture(a, uv) + textureLod (b, uv, 1.0);"
        );
        assert_eq!(rewrite_texture_calls("float my_texture2D = 1.0;"), "float my_texture2D = 1.0;");
        assert_eq!(rewrite_texture_calls("uniform texture2D t;"), "uniform texture2D t;");
        assert!(matches!(rewrite_texture_calls("no calls here"), Cow::Borrowed(_)));
    }

    #[test]
    fn uniform_lines_support_lists_arrays_and_precision() {
        let decls = parse_uniform_line("uniform highp vec3 a, b[3];", 1).unwrap();
        assert_eq!(decls.len(), 2);
        assert_eq!(decls[1].name, "b");
        assert_eq!(decls[1].array_len, Some(3));
        assert_eq!(decls[1].components(), 9);

        assert!(parse_uniform_line("uniform bool flag;", 4).is_err());
        assert!(parse_uniform_line("uniform float x = 1.0;", 4).is_err());
        assert!(parse_uniform_line("uniform float 2x;", 4).is_err());
    }

    #[test]
    fn rejects_varyings_other_than_pos() {
        let err = WrappedShader::new("varying vec2 uv;\nvoid main() {}\n").unwrap_err();
        assert!(matches!(err, ShaderCompileError::UnsupportedVarying { line: 1, .. }));
    }

    #[test]
    fn empty_uniform_block_gets_placeholder_member() {
        let wrapped = WrappedShader::new("void main() { gl_FragColor = vec4(1.0); }").unwrap();
        assert!(wrapped.source.contains("vec4 bench_reserved;"));
        assert!(wrapped.uniforms.is_empty());
    }

    #[test]
    fn error_context_marks_the_failing_line() {
        let source = "a\nb\nc\nd\n";
        let described = describe_error_line("unexpected token", source, 2);
        assert_eq!(
            described,
            "line 2: unexpected token\n     1: a\n>    2: b\n     3: c"
        );

        let first = describe_error_line("oops", source, 1);
        assert!(first.contains(">    1: a"));
        assert!(!first.contains("0:"));
    }

    #[test]
    fn vertex_shader_embeds_aspect_as_float_literal() {
        let source = vertex_shader_source(1.5);
        assert!(source.contains("const float BENCH_ASPECT = 1.5;"));
        let square = vertex_shader_source(1.0);
        assert!(square.contains("BENCH_ASPECT = 1.0;"));
    }

    #[test]
    fn output_shader_variants() {
        let copy = output_fragment_source(OutputEncoding::Copy, false);
        assert!(copy.contains("outColor = src;"));
        assert!(copy.contains("1.0 - bench_uv.y"));

        let flipped = output_fragment_source(OutputEncoding::Copy, true);
        assert!(!flipped.contains("1.0 - bench_uv.y"));

        let gamma = output_fragment_source(OutputEncoding::Gamma(2.2), false);
        assert!(gamma.contains("vec3(1.0) / 2.2"));

        let srgb = output_fragment_source(OutputEncoding::Srgb, false);
        assert!(srgb.contains("0.0031308"));
    }
}
