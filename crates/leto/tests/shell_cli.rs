use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

const VERTEX: &str = r"#version 450
layout(location = 0) out vec2 v_uv;

const vec2 positions[3] = vec2[3](
    vec2(-1.0, -3.0),
    vec2(3.0, 1.0),
    vec2(-1.0, 1.0)
);

void main() {
    uint vertex_index = uint(gl_VertexIndex);
    vec2 pos = positions[vertex_index];
    v_uv = pos * 0.5 + vec2(0.5, 0.5);
    gl_Position = vec4(pos, 0.0, 1.0);
}
";

const FRAGMENT: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 out_color;

void main() {
    out_color = vec4(v_uv, 0.25, 1.0);
}
";

fn create_assets(root: &Path, names: &[&str]) {
    for name in names {
        let dir = root.join("Shaders").join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("vertex.vs"), VERTEX).unwrap();
        fs::write(dir.join("fragment.fs"), FRAGMENT).unwrap();
    }
}

fn leto(config_dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_leto"))
        .env("LETO_CONFIG_DIR", config_dir)
        .env_remove("LETO_CONFIG")
        .env("RUST_LOG", "off")
        .args(args)
        .output()
        .expect("failed to run leto")
}

#[test]
fn headless_run_exits_cleanly() {
    let root = TempDir::new().unwrap();
    let assets = root.path().join("assets");
    create_assets(&assets, &["basic", "waves"]);

    let output = leto(
        root.path(),
        &[
            "--assets",
            assets.to_str().unwrap(),
            "--shader",
            "waves",
            "--shader",
            "basic",
            "--frames",
            "3",
            "--no-notify",
        ],
    );

    assert!(output.status.success(), "{output:?}");
    assert!(String::from_utf8_lossy(&output.stdout).trim().is_empty());
}

#[test]
fn missing_shader_is_fatal() {
    let root = TempDir::new().unwrap();
    let assets = root.path().join("assets");
    create_assets(&assets, &["basic"]);

    let output = leto(
        root.path(),
        &[
            "--assets",
            assets.to_str().unwrap(),
            "--shader",
            "absent",
            "--frames",
            "2",
            "--no-notify",
        ],
    );

    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("file_read"), "{stdout}");
    assert!(stdout.contains("Shaders/absent/vertex.vs"), "{stdout}");
    assert!(stdout.contains("gl_shader_comp"), "{stdout}");
}

#[test]
fn config_file_in_config_dir_is_picked_up() {
    let root = TempDir::new().unwrap();
    create_assets(&root.path().join("Assets"), &["basic"]);
    fs::write(
        root.path().join("leto.toml"),
        "notifications = false\n\n[headless]\nframes = 2\nframe_interval = \"1ms\"\n",
    )
    .unwrap();

    let output = leto(root.path(), &[]);
    assert!(output.status.success(), "{output:?}");
}

#[test]
fn invalid_config_fails_before_startup() {
    let root = TempDir::new().unwrap();
    fs::write(root.path().join("leto.toml"), "shaders = []\n").unwrap();

    let output = leto(root.path(), &["--frames", "1"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid configuration"), "{stderr}");
}

#[test]
fn problems_lists_the_catalog() {
    let root = TempDir::new().unwrap();
    let output = leto(root.path(), &["problems"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for name in ["null_param", "gl_shader_comp", "premature_swap", "time_error"] {
        assert!(stdout.contains(name), "{name} missing from:\n{stdout}");
    }
    assert!(stdout.contains("0x114e"));
}

#[test]
fn paths_honours_config_override() {
    let root = TempDir::new().unwrap();
    let output = leto(root.path(), &["paths"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(&root.path().join("leto.toml").display().to_string()));
}
