use anyhow::Result;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;
use walkdir::WalkDir;

const PACKAGE_YAML: &str = r#"
build_targets:
  - name: default
    commands:
      - make
    environment:
      - GREETING=hello
  - name: web
    root: frontend
    commands:
      - npm test
    dependencies:
      build:
        - node:18.17.0
      containers:
        db:
          image: postgres:14
  - name: broken
    dependencies:
      build:
        - node
"#;

fn package() -> Result<TempDir> {
    let dir = TempDir::new()?;
    fs::write(dir.path().join(".yourbase.yml"), PACKAGE_YAML)?;
    fs::create_dir_all(dir.path().join("frontend"))?;
    Ok(dir)
}

fn ybctl(pkg: &TempDir, data: &TempDir) -> Result<Command> {
    let mut cmd = Command::cargo_bin("ybctl")?;
    cmd.current_dir(pkg.path())
        .env("YB_DATA_DIR", data.path())
        .env("YB_NO_CONTAINER", "1")
        .env_remove("YB_GH_TOKEN")
        .env_remove("YB_SECRETS_FILE")
        .env_remove("YB_COMMAND_TIMEOUT");
    Ok(cmd)
}

#[test]
fn plan_prints_deps_and_phase() -> Result<()> {
    let pkg = package()?;
    let data = TempDir::new()?;
    let output = ybctl(&pkg, &data)?.args(["plan", "web"]).output()?;
    assert!(output.status.success());

    let plan: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(plan["deps"]["target_name"], "web");
    assert_eq!(plan["deps"]["buildpacks"][0]["name"], "node");
    assert_eq!(plan["deps"]["resources"]["db"]["image"], "postgres:14");
    assert_eq!(plan["phase"]["root"], "frontend");
    assert_eq!(plan["phase"]["commands"][0], "npm test");
    Ok(())
}

#[test]
fn plan_reports_bad_target() -> Result<()> {
    let pkg = package()?;
    let data = TempDir::new()?;
    ybctl(&pkg, &data)?
        .args(["plan", "broken"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("target broken"));
    ybctl(&pkg, &data)?
        .args(["plan", "missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No such target: missing"));
    Ok(())
}

#[cfg(unix)]
#[test]
fn exec_propagates_exit_status() -> Result<()> {
    let pkg = package()?;
    let data = TempDir::new()?;
    ybctl(&pkg, &data)?
        .args(["exec", "default", "--", "sh", "-c", "exit 3"])
        .assert()
        .code(3);
    Ok(())
}

#[cfg(unix)]
#[test]
fn exec_runs_in_target_root_with_environment() -> Result<()> {
    let pkg = package()?;
    let data = TempDir::new()?;
    ybctl(&pkg, &data)?
        .args(["exec", "default", "--", "sh", "-c", "printf %s \"$GREETING\""])
        .assert()
        .success()
        .stdout("hello");

    ybctl(&pkg, &data)?
        .args(["exec", "web", "--", "sh", "-c", "basename \"$(pwd)\""])
        .assert()
        .success()
        .stdout("frontend\n");
    Ok(())
}

#[cfg(unix)]
#[test]
fn exec_removes_credential_afterwards() -> Result<()> {
    let pkg = package()?;
    let data = TempDir::new()?;
    ybctl(&pkg, &data)?
        .env("YB_GH_TOKEN", "abc123")
        .args([
            "exec",
            "default",
            "--",
            "sh",
            "-c",
            "grep -q 'password abc123' \"$HOME/.netrc\" && printf %s \"$YB_GH_TOKEN\"",
        ])
        .assert()
        .success()
        .stdout("abc123");

    let leftovers: Vec<_> = WalkDir::new(data.path())
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name() == ".netrc")
        .collect();
    assert!(leftovers.is_empty(), "{:?}", leftovers);
    Ok(())
}

fn netrc_files(root: &std::path::Path) -> Vec<std::path::PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name() == ".netrc")
        .map(|e| e.into_path())
        .collect()
}

#[cfg(unix)]
#[test]
fn interrupted_exec_still_removes_credential() -> Result<()> {
    use std::process::{Command as StdCommand, Stdio};
    use std::thread::sleep;
    use std::time::{Duration, Instant};

    let pkg = package()?;
    let data = TempDir::new()?;
    let mut child = StdCommand::new(assert_cmd::cargo::cargo_bin("ybctl"))
        .current_dir(pkg.path())
        .env("YB_DATA_DIR", data.path())
        .env("YB_NO_CONTAINER", "1")
        .env("YB_GH_TOKEN", "abc123")
        .env_remove("YB_SECRETS_FILE")
        .env_remove("YB_COMMAND_TIMEOUT")
        .args(["exec", "default", "--", "sleep", "30"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;

    // The credential is written after the interrupt handler is installed.
    let start = Instant::now();
    while netrc_files(data.path()).is_empty() {
        assert!(start.elapsed() < Duration::from_secs(20), "credential never written");
        sleep(Duration::from_millis(50));
    }

    let sent = StdCommand::new("kill")
        .arg("-INT")
        .arg(child.id().to_string())
        .status()?;
    assert!(sent.success());

    let start = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if start.elapsed() > Duration::from_secs(15) {
            let _ = child.kill();
            panic!("ybctl did not stop after interrupt");
        }
        sleep(Duration::from_millis(50));
    };

    assert_eq!(status.code(), Some(130));
    let leftovers = netrc_files(data.path());
    assert!(leftovers.is_empty(), "{:?}", leftovers);
    Ok(())
}
