use std::fs;
use std::io::Write;

use anyhow::{bail, Context, Result};
use descriptor::inline::{current_source, embed_source};
use descriptor::load_descriptor;
use renderer::{BenchConfig, RenderMode, Renderer};
use tracing_subscriber::EnvFilter;

use crate::cli::{InlineArgs, RunArgs};

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn run(args: RunArgs) -> Result<()> {
    let config = build_config(args)?;
    tracing::debug!(
        shader = %config.descriptor.label(),
        mode = ?config.mode,
        refresh_every = config.refresh_every,
        max_samples = config.max_samples,
        seed = ?config.seed,
        "starting bench"
    );
    Renderer::new(config).run()
}

fn build_config(args: RunArgs) -> Result<BenchConfig> {
    let Some(shader_file) = args.shader_file else {
        bail!("no shader descriptor given; pass a JSON file such as `glsl-bench shader.json`");
    };
    let descriptor = load_descriptor(&shader_file)
        .with_context(|| format!("failed to load shader descriptor {}", shader_file.display()))?;

    let mut config = BenchConfig::new(descriptor);
    if let Some(refresh_every) = args.refresh_every {
        config.refresh_every = refresh_every;
    }
    config.numpy_output = args.numpy_output;
    config.png_output = (!args.no_png).then_some(args.png_output);
    config.preview_resolution = args.preview_resolution;
    config.max_samples = args.max_samples;
    config.sleep = args.sleep;
    config.seed = args.seed;
    config.gpu_power = args.gpu_power;
    config.mode = if args.headless {
        RenderMode::Headless
    } else {
        RenderMode::Windowed
    };
    Ok(config)
}

/// Embeds a shader into a descriptor. Without `--output` the resulting
/// shader source is printed to stdout instead.
pub fn inline(args: InlineArgs) -> Result<()> {
    let text = fs::read_to_string(&args.spec)
        .with_context(|| format!("failed to read descriptor {}", args.spec.display()))?;
    let mut spec: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse descriptor {}", args.spec.display()))?;

    let source = match &args.shader {
        Some(shader) => {
            let source = fs::read_to_string(shader)
                .with_context(|| format!("failed to read shader {}", shader.display()))?;
            embed_source(&mut spec, &source)?;
            source
        }
        None => current_source(&spec, &args.spec)?,
    };

    match &args.output {
        Some(output) => {
            if args.shader.is_none() {
                embed_source(&mut spec, &source)?;
            }
            let rendered = serde_json::to_string_pretty(&spec)?;
            fs::write(output, rendered + "\n")
                .with_context(|| format!("failed to write descriptor {}", output.display()))?;
            tracing::info!(output = %output.display(), "wrote inlined descriptor");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(source.as_bytes())?;
            if !source.ends_with('\n') {
                stdout.write_all(b"\n")?;
            }
        }
    }
    Ok(())
}
