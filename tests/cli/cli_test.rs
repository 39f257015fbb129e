//! CLI contract tests.

use assert_cmd::Command;

fn warden() -> Command {
    let mut cmd = Command::cargo_bin("warden").expect("binary should build");
    for var in [
        "WARDEN_CONFIG_PATH",
        "WARDEN_SOCKET",
        "WARDEN_LISTEN",
        "WARDEN_DOCKER_HOST",
        "WARDEN_ROOT_IDENTITY",
        "WARDEN_TRUSTED_REGISTRY",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn check_config_prints_resolved_config() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[policy]\nroot_identity = \"0:0\"\n").expect("write config");

    let output = warden()
        .arg("--config")
        .arg(&path)
        .arg("check-config")
        .output()
        .expect("run warden");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("root_identity"), "stdout: {stdout}");
}

#[test]
fn check_config_honours_env_overrides() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = warden()
        .arg("--config")
        .arg(dir.path().join("absent.toml"))
        .arg("check-config")
        .env("WARDEN_ROOT_IDENTITY", "4242:4242")
        .output()
        .expect("run warden");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("4242:4242"));
}

#[test]
fn check_config_rejects_invalid_config() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[registry]\nscheme = \"gopher\"\n").expect("write config");

    warden()
        .arg("--config")
        .arg(&path)
        .arg("check-config")
        .assert()
        .failure();
}

#[test]
fn verify_image_requires_a_reference() {
    warden().arg("verify-image").assert().failure();
}
