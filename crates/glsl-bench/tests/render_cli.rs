use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

/// Messages that mean the machine cannot render at all (no adapter, no
/// device) or cannot render into float targets.
const UNSUPPORTED: &[&str] = &[
    "failed to find a suitable GPU adapter",
    "failed to create GPU device",
    "cannot run with float_buffers or monte_carlo enabled",
];

fn render(dir: &Path, descriptor: serde_json::Value, samples: u32) -> Option<Output> {
    fs::write(dir.join("shader.json"), descriptor.to_string()).unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_glsl-bench"))
        .current_dir(dir)
        .env("RUST_LOG", "warn")
        .args(["--headless", "--no-png", "--numpy-output", "frame.npy", "--seed", "1"])
        .args(["--max-samples", &samples.to_string(), "shader.json"])
        .output()
        .expect("failed to run glsl-bench");
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !output.status.success() && UNSUPPORTED.iter().any(|message| stderr.contains(message)) {
        eprintln!("skipping render test: {stderr}");
        return None;
    }
    assert!(output.status.success(), "{stderr}");
    Some(output)
}

/// Returns the shape and float32 payload of a `.npy` file.
fn read_npy(path: &Path) -> (String, Vec<f32>) {
    let bytes = fs::read(path).unwrap();
    assert_eq!(&bytes[..6], b"\x93NUMPY");
    let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
    let header = String::from_utf8(bytes[10..10 + header_len].to_vec()).unwrap();
    let values = bytes[10 + header_len..]
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    (header, values)
}

fn assert_close(actual: f32, expected: f32) {
    assert!(
        (actual - expected).abs() < 0.01,
        "expected {expected}, got {actual}"
    );
}

#[test]
fn previous_frame_feeds_back_between_samples() {
    let root = TempDir::new().unwrap();
    let descriptor = serde_json::json!({
        "source": "uniform vec2 resolution;
uniform sampler2D prev;
void main() {
    vec2 uv = gl_FragCoord.xy / resolution;
    float acc = texture2D(prev, uv).r + 0.125;
    gl_FragColor = vec4(acc, gl_FragCoord.y / resolution.y, 0.0, 1.0);
}
",
        "resolution": [4, 4],
        "uniforms": { "resolution": "resolution", "prev": "previous_frame" }
    });
    let Some(_) = render(root.path(), descriptor, 4) else {
        return;
    };

    let (header, values) = read_npy(&root.path().join("frame.npy"));
    assert!(header.contains("'shape': (4, 4, 3)"), "{header}");
    assert_eq!(values.len(), 4 * 4 * 3);
    // Four samples of +0.125 on an 8-bit target.
    for texel in values.chunks_exact(3) {
        assert_close(texel[0], 128.0 / 255.0);
    }
    // Rows are written top first; the top row has the largest fragment y.
    assert_close(values[1], 0.875);
    assert_close(values[values.len() - 2], 0.125);
}

#[test]
fn monte_carlo_averages_samples_in_float_buffers() {
    let root = TempDir::new().unwrap();
    let descriptor = serde_json::json!({
        "source": "uniform vec2 resolution;
uniform float frame;
uniform sampler2D prev;
void main() {
    vec3 acc = texture2D(prev, gl_FragCoord.xy / resolution).rgb;
    gl_FragColor = vec4(mix(acc, vec3(frame), 1.0 / frame), 1.0);
}
",
        "resolution": [2, 2],
        "monte_carlo": true,
        "batch_size": 3,
        "uniforms": {
            "resolution": "resolution",
            "frame": "frame_number",
            "prev": "previous_frame"
        }
    });
    let Some(_) = render(root.path(), descriptor, 4) else {
        return;
    };

    let (_, values) = read_npy(&root.path().join("frame.npy"));
    assert_eq!(values.len(), 2 * 2 * 3);
    // Mean of the frame numbers 1..=4, kept above 1.0 by the float targets.
    for value in values {
        assert_close(value, 2.5);
    }
}
