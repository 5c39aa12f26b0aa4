use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use renderer::GpuPowerPreference;

#[derive(Parser, Debug)]
#[command(
    name = "glsl-bench",
    author,
    version,
    about = "Render a GLSL fragment shader described by a JSON file",
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// JSON shader descriptor to render.
    #[arg(value_name = "SHADER_FILE")]
    pub shader_file: Option<PathBuf>,

    /// Present (and refresh the window) every N samples; overrides the descriptor.
    #[arg(long, alias = "refresh_every", value_name = "N", value_parser = parse_positive)]
    pub refresh_every: Option<u32>,

    /// Save the final frame as raw float32 RGB to a NumPy `.npy` file.
    #[arg(long, alias = "numpy_output_file", value_name = "PATH")]
    pub numpy_output: Option<PathBuf>,

    /// Save the final frame, after gamma encoding, as a PNG.
    #[arg(long, alias = "png_output_file", value_name = "PATH", default_value = "out.png")]
    pub png_output: PathBuf,

    /// Do not write a PNG.
    #[arg(long)]
    pub no_png: bool,

    /// Preview window size (e.g. `800x600`); rendering keeps the descriptor resolution.
    #[arg(
        long,
        alias = "preview_resolution",
        value_name = "WIDTHxHEIGHT",
        value_parser = parse_resolution
    )]
    pub preview_resolution: Option<(u32, u32)>,

    /// Stop after this many samples (0 = run until the window is closed).
    #[arg(long, alias = "max_samples", value_name = "N", default_value_t = 0)]
    pub max_samples: u64,

    /// Seconds to sleep between batches of samples.
    #[arg(
        short = 's',
        long,
        value_name = "SECONDS",
        value_parser = parse_sleep,
        default_value = "0"
    )]
    pub sleep: Duration,

    /// Seed for the random uniform streams.
    #[arg(long, value_name = "N")]
    pub seed: Option<u64>,

    /// Render without opening a window (requires `--max-samples`).
    #[arg(long)]
    pub headless: bool,

    /// GPU adapter preference: `high` (default) or `low`.
    #[arg(
        long,
        value_name = "POWER",
        value_parser = parse_gpu_power,
        default_value = "high"
    )]
    pub gpu_power: GpuPowerPreference,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Embed a shader source into a descriptor as its `source` field.
    Inline(InlineArgs),
}

#[derive(Parser, Debug)]
pub struct InlineArgs {
    /// Descriptor JSON to rewrite.
    #[arg(value_name = "SPEC")]
    pub spec: PathBuf,

    /// Shader to embed; defaults to the descriptor's current shader.
    #[arg(value_name = "SHADER")]
    pub shader: Option<PathBuf>,

    /// Write the rewritten descriptor here instead of printing the shader source.
    #[arg(short, long, alias = "output_file", value_name = "PATH")]
    pub output: Option<PathBuf>,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_positive(value: &str) -> Result<u32, String> {
    let parsed: u32 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid count '{value}'"))?;
    if parsed == 0 {
        return Err("value must be at least 1".to_string());
    }
    Ok(parsed)
}

pub fn parse_resolution(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| "expected WIDTHxHEIGHT".to_string())?;
    let width = w
        .trim()
        .parse::<u32>()
        .map_err(|_| "invalid width in resolution".to_string())?;
    let height = h
        .trim()
        .parse::<u32>()
        .map_err(|_| "invalid height in resolution".to_string())?;
    if width == 0 || height == 0 {
        return Err("resolution must be greater than zero".into());
    }
    Ok((width, height))
}

pub fn parse_sleep(value: &str) -> Result<Duration, String> {
    let seconds: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid sleep duration '{value}'"))?;
    Duration::try_from_secs_f64(seconds)
        .map_err(|_| format!("sleep must be a non-negative number of seconds (got {value})"))
}

pub fn parse_gpu_power(value: &str) -> Result<GpuPowerPreference, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "low" | "low-power" => Ok(GpuPowerPreference::Low),
        "high" | "high-performance" => Ok(GpuPowerPreference::High),
        other => Err(format!("unknown GPU power preference '{other}'; expected low or high")),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_resolution() {
        assert_eq!(parse_resolution("800x600").unwrap(), (800, 600));
        assert_eq!(parse_resolution(" 64X32 ").unwrap(), (64, 32));
        assert!(parse_resolution("800").is_err());
        assert!(parse_resolution("0x600").is_err());
        assert!(parse_resolution("axb").is_err());
    }

    #[test]
    fn parses_sleep_seconds() {
        assert_eq!(parse_sleep("0").unwrap(), Duration::ZERO);
        assert_eq!(parse_sleep("0.25").unwrap(), Duration::from_millis(250));
        assert!(parse_sleep("-1").is_err());
        assert!(parse_sleep("soon").is_err());
    }

    #[test]
    fn parses_gpu_power_and_counts() {
        assert_eq!(parse_gpu_power("LOW").unwrap(), GpuPowerPreference::Low);
        assert!(parse_gpu_power("medium").is_err());
        assert_eq!(parse_positive("4").unwrap(), 4);
        assert!(parse_positive("0").is_err());
    }

    #[test]
    fn run_arguments_have_expected_defaults() {
        let cli = Cli::try_parse_from(["glsl-bench", "shader.json"]).unwrap();
        assert_eq!(cli.run.shader_file, Some(PathBuf::from("shader.json")));
        assert_eq!(cli.run.png_output, PathBuf::from("out.png"));
        assert_eq!(cli.run.max_samples, 0);
        assert_eq!(cli.run.sleep, Duration::ZERO);
        assert!(!cli.run.headless);
        assert!(cli.command.is_none());
    }

    #[test]
    fn legacy_underscore_flags_are_accepted() {
        let cli = Cli::try_parse_from([
            "glsl-bench",
            "--refresh_every",
            "8",
            "--max_samples",
            "100",
            "--numpy_output_file",
            "out.npy",
            "shader.json",
        ])
        .unwrap();
        assert_eq!(cli.run.refresh_every, Some(8));
        assert_eq!(cli.run.max_samples, 100);
        assert_eq!(cli.run.numpy_output, Some(PathBuf::from("out.npy")));
    }

    #[test]
    fn inline_subcommand_parses() {
        let cli = Cli::try_parse_from(["glsl-bench", "inline", "spec.json", "new.glsl", "-o", "out.json"])
            .unwrap();
        let Some(Command::Inline(args)) = cli.command else {
            panic!("expected inline subcommand");
        };
        assert_eq!(args.spec, PathBuf::from("spec.json"));
        assert_eq!(args.shader, Some(PathBuf::from("new.glsl")));
        assert_eq!(args.output, Some(PathBuf::from("out.json")));
    }
}
