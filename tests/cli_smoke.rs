use std::{path::PathBuf, process::Command};

fn glance_bin() -> Result<PathBuf, Box<dyn std::error::Error>> {
    if let Ok(bin) = std::env::var("CARGO_BIN_EXE_glance") {
        return Ok(PathBuf::from(bin));
    }

    let mut path = std::env::current_exe()?;
    path.pop();
    if path.ends_with("deps") {
        path.pop();
    }
    path.push("glance");

    if cfg!(windows) {
        path.set_extension("exe");
    }

    Ok(path)
}

#[test]
fn help_lists_subcommands() -> Result<(), Box<dyn std::error::Error>> {
    let output = Command::new(glance_bin()?).arg("--help").output()?;
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.contains("glance"));
    assert!(stdout.contains("serve"));
    Ok(())
}

#[test]
fn missing_file_fails_before_model_load()
-> Result<(), Box<dyn std::error::Error>> {
    let tempdir = tempfile::tempdir()?;
    let missing = tempdir.path().join("missing.rs");

    let output = Command::new(glance_bin()?)
        .args(["glance", "--file"])
        .arg(&missing)
        // Any model load would fail on this path, so reaching it would
        // change the reported error.
        .env("GLANCE_MODEL_PATH", tempdir.path().join("no-model"))
        .output()?;

    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr)?;
    assert!(stderr.contains("NotFound"), "stderr: {stderr}");
    assert!(stderr.contains("missing.rs"), "stderr: {stderr}");
    Ok(())
}

#[test]
fn blank_file_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let tempdir = tempfile::tempdir()?;
    let blank = tempdir.path().join("blank.rs");
    std::fs::write(&blank, "\n   \n\n")?;

    let output = Command::new(glance_bin()?)
        .args(["glance", "--file"])
        .arg(&blank)
        .env("GLANCE_MODEL_PATH", tempdir.path().join("no-model"))
        .output()?;

    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr)?;
    assert!(stderr.contains("InvalidInput"), "stderr: {stderr}");
    Ok(())
}

#[test]
fn zero_window_size_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let tempdir = tempfile::tempdir()?;
    let file = tempdir.path().join("lib.rs");
    std::fs::write(&file, "pub fn f() {}\n")?;

    let output = Command::new(glance_bin()?)
        .args(["glance", "--window-size", "0", "--file"])
        .arg(&file)
        .output()?;

    assert!(!output.status.success());
    Ok(())
}

#[test]
fn completions_are_generated() -> Result<(), Box<dyn std::error::Error>> {
    let output = Command::new(glance_bin()?)
        .args(["completions", "bash"])
        .output()?;
    assert!(output.status.success());
    assert!(String::from_utf8(output.stdout)?.contains("glance"));
    Ok(())
}
