//! Integration tests for core CLI contract behavior.

use {predicates::prelude::*, std::fs, tempfile::tempdir};

fn cli_cmd() -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("ezflash");
    for var in [
        "EZFLASH_PORT",
        "EZFLASH_MILLIVOLTS",
        "EZFLASH_WIRE_MODE",
        "EZFLASH_TIMEOUT_MS",
        "EZFLASH_RETRIES",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

const SAMPLE_HEX: &str = "\
:10F800003140800240B2805A20010F430E43075A14
:02FFFE0000F809
:00000001FF
";

#[test]
fn help_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ezflash"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn version_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("ezflash"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn info_lists_segments_on_stdout() {
    let dir = tempdir().expect("tempdir should be created");
    let image = dir.path().join("blink.a43");
    fs::write(&image, SAMPLE_HEX).expect("write image");

    let mut cmd = cli_cmd();
    cmd.arg("info")
        .arg(&image)
        .assert()
        .success()
        .stdout(predicate::str::contains("Intel HEX"))
        .stdout(predicate::str::contains("0xF800"))
        .stdout(predicate::str::contains("0xFFFE"))
        .stdout(predicate::str::contains("Bytes:    18"));
}

#[test]
fn info_json_is_valid() {
    let dir = tempdir().expect("tempdir should be created");
    let image = dir.path().join("blink.a43");
    fs::write(&image, SAMPLE_HEX).expect("write image");

    let output = cli_cmd()
        .args(["info", "--json"])
        .arg(&image)
        .output()
        .expect("command should execute");
    assert!(output.status.success());

    let parsed: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(parsed["ok"], true);
    assert_eq!(parsed["data"]["segment_count"], 2);
    assert_eq!(parsed["data"]["total_bytes"], 18);
    assert_eq!(parsed["data"]["segments"][0]["address"], 0xF800);
    assert_eq!(parsed["data"]["segments"][1]["length"], 2);
}

#[test]
fn info_txt_honours_chunk_size() {
    let dir = tempdir().expect("tempdir should be created");
    let image = dir.path().join("app.txt");
    fs::write(&image, "@E000\n01 02 03 04 05\nq\n").expect("write image");

    let output = cli_cmd()
        .args(["info", "--json", "--chunk-size", "2"])
        .arg(&image)
        .output()
        .expect("command should execute");
    assert!(output.status.success());

    let parsed: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(parsed["data"]["segment_count"], 3);
    assert_eq!(parsed["data"]["format"], "TI-TXT");
}

#[test]
fn info_json_error_keeps_stdout_clean() {
    let dir = tempdir().expect("tempdir should be created");
    let nonexistent = dir.path().join("not_exists.a43");

    let mut cmd = cli_cmd();
    cmd.arg("info")
        .arg("--json")
        .arg(nonexistent.as_os_str())
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn info_rejects_unknown_extension() {
    let dir = tempdir().expect("tempdir should be created");
    let image = dir.path().join("firmware.elf");
    fs::write(&image, b"\x7fELF").expect("write image");

    let mut cmd = cli_cmd();
    cmd.arg("info")
        .arg(&image)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unsupported image format"));
}

#[test]
fn info_reports_bad_record_line() {
    let dir = tempdir().expect("tempdir should be created");
    let image = dir.path().join("broken.a43");
    fs::write(&image, ":0100000011EE\n:02001000DEAD64\n").expect("write image");

    let mut cmd = cli_cmd();
    cmd.arg("info")
        .arg(&image)
        .assert()
        .failure()
        .stderr(predicate::str::contains("line 2"));
}

#[test]
fn convert_writes_flat_binary() {
    let dir = tempdir().expect("tempdir should be created");
    let image = dir.path().join("app.txt");
    let output = dir.path().join("app.bin");
    fs::write(&image, "@0000\n01 02\n@0004\n03\nq\n").expect("write image");

    cli_cmd()
        .arg("convert")
        .arg(&image)
        .arg("-o")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    assert_eq!(
        fs::read(&output).expect("read output"),
        vec![0x01, 0x02, 0xFF, 0xFF, 0x03]
    );
}

#[test]
fn convert_flip_and_fill() {
    let dir = tempdir().expect("tempdir should be created");
    let image = dir.path().join("app.txt");
    let output = dir.path().join("app.bin");
    fs::write(&image, "@0000\n01 02\n@0004\n03\nq\n").expect("write image");

    cli_cmd()
        .arg("convert")
        .arg(&image)
        .args(["--flip", "--fill", "0x00", "-o"])
        .arg(&output)
        .assert()
        .success();

    assert_eq!(
        fs::read(&output).expect("read output"),
        vec![0x80, 0x40, 0x00, 0x00, 0xC0]
    );
}

#[test]
fn convert_refuses_image_beyond_address_space() {
    let dir = tempdir().expect("tempdir should be created");
    let image = dir.path().join("far.a43");
    let output = dir.path().join("far.bin");
    fs::write(&image, ":02000004FFFFFC\n:01000000AA55\n:00000001FF\n").expect("write image");

    cli_cmd()
        .arg("convert")
        .arg(&image)
        .arg("-o")
        .arg(&output)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("byte limit"));

    assert!(!output.exists());
}

#[test]
fn convert_rejects_out_of_range_fill() {
    let mut cmd = cli_cmd();
    cmd.args(["convert", "app.txt", "-o", "app.bin", "--fill", "0x1FF"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn flash_empty_image_fails_before_touching_the_port() {
    let dir = tempdir().expect("tempdir should be created");
    let image = dir.path().join("empty.txt");
    fs::write(&image, "q\n").expect("write image");

    let mut cmd = cli_cmd();
    cmd.args(["-p", "INVALID_PORT_NAME_XYZ", "flash"])
        .arg(&image)
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("no data"));
}

#[test]
fn flash_with_missing_port_fails_with_device_code() {
    let dir = tempdir().expect("tempdir should be created");
    let image = dir.path().join("blink.a43");
    fs::write(&image, SAMPLE_HEX).expect("write image");

    let mut cmd = cli_cmd();
    cmd.arg("-p")
        .arg(dir.path().join("no-such-tty"))
        .arg("flash")
        .arg(&image)
        .assert()
        .failure()
        .code(4)
        .stderr(predicate::str::contains("Failed to open adapter"));
}

#[test]
fn list_ports_json_returns_valid_json() {
    let output = cli_cmd()
        .args(["list-ports", "--json"])
        .output()
        .expect("command should execute");
    assert!(output.status.success());

    let parsed: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(parsed["ok"], true);
    assert!(parsed["data"]["ports"].is_array());
}

#[test]
fn invalid_config_file_only_warns() {
    let dir = tempdir().expect("tempdir should be created");
    fs::write(dir.path().join("ezflash.toml"), "invalid toml [[[").expect("write config");

    let output = cli_cmd()
        .current_dir(dir.path())
        .arg("list-ports")
        .output()
        .expect("command should execute");
    assert!(
        output.status.success(),
        "command should succeed despite config warning"
    );
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("TOML"), "should warn about invalid TOML");
}

#[test]
fn invalid_wire_mode_in_config_is_config_error() {
    let dir = tempdir().expect("tempdir should be created");
    let config = dir.path().join("custom.toml");
    fs::write(&config, "[target]\nwire_mode = \"usb\"\n").expect("write config");
    let image = dir.path().join("blink.a43");
    fs::write(&image, SAMPLE_HEX).expect("write image");

    let mut cmd = cli_cmd();
    cmd.arg("--config")
        .arg(&config)
        .arg("info")
        .arg(&image)
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("wire_mode"));
}

#[test]
fn completions_command_writes_to_stdout() {
    let mut cmd = cli_cmd();
    cmd.args(["completions", "bash"])
        .assert()
        .success()
        .stderr(predicate::str::is_empty())
        .stdout(predicate::str::contains("_ezflash()"));
}

#[test]
fn completions_without_shell_is_usage_error() {
    let mut cmd = cli_cmd();
    cmd.arg("completions")
        .assert()
        .failure()
        .code(2)
        .stdout(predicate::str::is_empty());
}

// ============================================================================
// Usage errors exit with code 2
// ============================================================================

#[test]
fn exit_code_two_for_unknown_command() {
    let mut cmd = cli_cmd();
    cmd.arg("unknown-command-xyz")
        .assert()
        .failure()
        .code(2);
}

#[test]
fn exit_code_two_for_invalid_wire_mode() {
    let mut cmd = cli_cmd();
    cmd.args(["--wire-mode", "usb", "erase"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("wire mode"));
}

#[test]
fn read_requires_address_and_length() {
    let mut cmd = cli_cmd();
    cmd.arg("read")
        .assert()
        .failure()
        .code(2)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("--address"));
}

#[test]
fn unknown_command_suggests_similar() {
    let mut cmd = cli_cmd();
    cmd.arg("falsh")
        .assert()
        .failure()
        .stderr(predicate::str::contains("flash"));
}
