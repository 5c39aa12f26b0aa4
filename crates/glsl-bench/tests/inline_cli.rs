use std::fs;
use std::process::Command;

use tempfile::TempDir;

const SHADER: &str = "uniform float time;\nvoid main() {\n    gl_FragColor = vec4(time);\n}\n";

#[test]
fn inline_embeds_shader_into_output_descriptor() {
    let root = TempDir::new().unwrap();
    let spec = root.path().join("spec.json");
    let output = root.path().join("inlined.json");
    fs::write(root.path().join("shader.glsl"), SHADER).unwrap();
    fs::write(
        &spec,
        r#"{ "source_path": "shader.glsl", "resolution": [32, 32], "uniforms": { "time": "time" } }"#,
    )
    .unwrap();

    let status = Command::new(env!("CARGO_BIN_EXE_glsl-bench"))
        .arg("inline")
        .arg(&spec)
        .arg("-o")
        .arg(&output)
        .status()
        .expect("failed to run glsl-bench inline");
    assert!(status.success());

    let written: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(written["source"], SHADER);
    assert!(written.get("source_path").is_none());
    assert_eq!(written["uniforms"]["time"], "time");
}

#[test]
fn inline_without_output_prints_replacement_source() {
    let root = TempDir::new().unwrap();
    let spec = root.path().join("spec.json");
    let replacement = root.path().join("new.glsl");
    fs::write(&spec, r#"{ "source": "void main() {}" }"#).unwrap();
    fs::write(&replacement, SHADER).unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_glsl-bench"))
        .arg("inline")
        .arg(&spec)
        .arg(&replacement)
        .output()
        .expect("failed to run glsl-bench inline");
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), SHADER);

    // The descriptor on disk is left alone when no output is requested.
    let on_disk = fs::read_to_string(&spec).unwrap();
    assert!(on_disk.contains("void main() {}"));
}

#[test]
fn inline_reports_missing_descriptor() {
    let root = TempDir::new().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_glsl-bench"))
        .arg("inline")
        .arg(root.path().join("absent.json"))
        .output()
        .expect("failed to run glsl-bench inline");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("failed to read descriptor"));
}
