use assert_cmd::prelude::*;
use predicates::prelude::*;
use predicates::str::contains;
use std::fs;
use std::io::Write;
use std::process::Command;
use tempfile::{NamedTempFile, TempDir};

const CUBE_OBJ: &str = "\
v -0.5 -0.5 0.5
v 0.5 -0.5 0.5
v 0.5 0.5 0.5
v -0.5 0.5 0.5
vn 0 0 1
f 1//1 2//1 3//1 4//1
";

fn build_assets() -> TempDir {
    let dir = TempDir::new().expect("temp assets");
    let mesh_dir = dir.path().join("objects/quad");
    fs::create_dir_all(&mesh_dir).expect("create mesh dir");
    fs::write(mesh_dir.join("quad.obj"), CUBE_OBJ).expect("write mesh");
    dir
}

fn build_scene() -> NamedTempFile {
    let scene = r#"<scene>
  <object>
    <name>Quad</name>
    <mesh>objects/quad/quad.obj</mesh>
    <transform>turntable</transform>
  </object>
  <object>
    <name>Floor</name>
    <mesh>builtin:plane</mesh>
    <position>0 -1 0</position>
  </object>
  <object>
    <name>Ghost</name>
    <mesh>objects/missing.obj</mesh>
  </object>
</scene>
"#;
    let mut tmp = NamedTempFile::new().expect("temp scene");
    tmp.write_all(scene.as_bytes()).expect("write scene");
    tmp
}

fn viewer() -> Command {
    Command::cargo_bin("shadow-viewer").expect("binary exists")
}

#[test]
fn summary_lists_scene_objects() {
    let assets = build_assets();
    let scene = build_scene();
    let mut cmd = viewer();
    cmd.arg("--summary-only")
        .arg("--scene")
        .arg(scene.path())
        .arg("--assets")
        .arg(assets.path());
    cmd.assert()
        .success()
        .stdout(contains("Loaded scene with 3 objects"))
        .stdout(contains(" - Quad (objects/quad/quad.obj, 2 triangles)"))
        .stdout(contains(" - Ghost (objects/missing.obj, 0 triangles)"))
        .stdout(contains("Rendered 1 frame(s): 3 depth draws, 5 colour draws per frame"))
        .stdout(contains("Backend errors: 0"));
}

#[test]
fn held_keys_move_camera_and_light() {
    let assets = build_assets();
    let mut cmd = viewer();
    cmd.args(["--summary-only", "--frames", "10", "--hold", "W", "--hold", "L"])
        .arg("--assets")
        .arg(assets.path());
    cmd.assert()
        .success()
        .stdout(contains(", 2.50) yaw=-90.00"))
        .stdout(contains("Light: angle=10.00"));
}

#[test]
fn json_summary_is_machine_readable() {
    let assets = build_assets();
    let output = viewer()
        .args(["--summary-only", "--json", "--frames", "2", "--hold", "4"])
        .arg("--assets")
        .arg(assets.path())
        .output()
        .expect("run viewer");
    assert!(output.status.success());
    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).expect("valid JSON");
    assert_eq!(summary["frames"], 2);
    assert_eq!(summary["display_mode"], "Flat");
    assert_eq!(summary["objects"].as_array().map(Vec::len), Some(2));
}

#[test]
fn unreadable_scene_fails_with_status_one() {
    let mut cmd = viewer();
    cmd.args(["--summary-only", "--scene", "/definitely/not/here.xml"]);
    cmd.assert()
        .code(1)
        .stderr(contains("failed to read scene"));
}

#[test]
fn malformed_scene_reports_parse_error() {
    let mut tmp = NamedTempFile::new().expect("temp scene");
    tmp.write_all(b"<scene><object><mesh>x.obj</mesh></object></scene>")
        .expect("write scene");
    let mut cmd = viewer();
    cmd.arg("--summary-only").arg("--scene").arg(tmp.path());
    cmd.assert()
        .code(1)
        .stderr(contains("failed to parse scene").and(contains("<name>")));
}

#[test]
fn unknown_hold_key_is_rejected() {
    let mut cmd = viewer();
    cmd.args(["--summary-only", "--hold", "Tab"]);
    cmd.assert().code(1).stderr(contains("unknown key `Tab`"));
}
