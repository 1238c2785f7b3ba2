use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn bin() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("gatekeeper"));
    cmd.env_remove("GATEKEEPER_KEY_FILE")
        .env_remove("GATEKEEPER_PASSWORD");
    cmd
}

// cheap enough for tests
const CHEAP: [&str; 8] = [
    "--argon-mem",
    "64",
    "--argon-time",
    "1",
    "--argon-parallelism",
    "1",
    "--salt-len",
    "16",
];

fn hash(password: &str) -> String {
    let output = bin()
        .env("GATEKEEPER_PASSWORD", password)
        .arg("hash")
        .args(CHEAP)
        .output()
        .unwrap();
    assert!(output.status.success());
    String::from_utf8(output.stdout).unwrap().trim().to_string()
}

#[test]
fn keygen_prints_hash_and_block_key() {
    bin()
        .arg("keygen")
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"^[A-Za-z0-9+/]{86}\$[A-Za-z0-9+/]{43}\n$").unwrap());
}

#[test]
fn init_creates_key_file() {
    let dir = tempdir().unwrap();
    let keys = dir.path().join("keys.json");

    bin()
        .arg("--key-file")
        .arg(&keys)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("key file initialized"));

    assert!(keys.exists());
}

#[test]
fn init_twice_fails() {
    let dir = tempdir().unwrap();
    let keys = dir.path().join("keys.json");

    bin().arg("--key-file").arg(&keys).arg("init").assert().success();

    bin()
        .arg("--key-file")
        .arg(&keys)
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn key_file_can_come_from_env() {
    let dir = tempdir().unwrap();
    let keys = dir.path().join("keys.json");

    bin()
        .env("GATEKEEPER_KEY_FILE", &keys)
        .arg("init")
        .assert()
        .success();

    assert!(keys.exists());
}

#[test]
fn rotate_demotes_current_key() {
    let dir = tempdir().unwrap();
    let keys = dir.path().join("keys.json");

    bin().arg("--key-file").arg(&keys).arg("init").assert().success();

    let before = bin()
        .arg("--key-file")
        .arg(&keys)
        .arg("info")
        .output()
        .unwrap();
    let before = String::from_utf8(before.stdout).unwrap();
    assert!(before.contains("Previous:   none"));
    let current = before
        .lines()
        .find_map(|l| l.strip_prefix("Current:    "))
        .unwrap()
        .to_string();

    bin()
        .arg("--key-file")
        .arg(&keys)
        .arg("rotate")
        .assert()
        .success()
        .stdout(predicate::str::contains("keys rotated"));

    bin()
        .arg("--key-file")
        .arg(&keys)
        .arg("info")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("Previous:   {current}")))
        .stdout(predicate::str::contains(format!("Current:    {current}")).not());
}

#[test]
fn rotate_without_key_file_fails() {
    let dir = tempdir().unwrap();

    bin()
        .arg("--key-file")
        .arg(dir.path().join("missing.json"))
        .arg("rotate")
        .assert()
        .failure();
}

#[test]
fn export_prints_env_assignments() {
    let dir = tempdir().unwrap();
    let keys = dir.path().join("keys.json");

    bin().arg("--key-file").arg(&keys).arg("init").assert().success();

    bin()
        .arg("--key-file")
        .arg(&keys)
        .arg("export")
        .assert()
        .success()
        .stdout(predicate::str::contains("GATEKEEPER_CURRENT_KEY="))
        .stdout(predicate::str::contains("GATEKEEPER_PREVIOUS_KEY=\n"));
}

#[test]
fn hash_and_verify_roundtrip() {
    let record = hash("Passw0rd!");

    bin()
        .env("GATEKEEPER_PASSWORD", "Passw0rd!")
        .arg("verify")
        .arg(&record)
        .assert()
        .success()
        .stdout(predicate::str::contains("password matches"));
}

#[test]
fn verify_wrong_password_fails() {
    let record = hash("Passw0rd!");

    bin()
        .env("GATEKEEPER_PASSWORD", "wrong")
        .arg("verify")
        .arg(&record)
        .assert()
        .failure()
        .stdout(predicate::str::contains("password does not match"));
}

#[test]
fn password_can_be_piped() {
    let record = hash("from-stdin");

    bin()
        .arg("verify")
        .arg(&record)
        .write_stdin("from-stdin\n")
        .assert()
        .success();
}

#[test]
fn verify_malformed_record_fails() {
    bin()
        .env("GATEKEEPER_PASSWORD", "pw")
        .arg("verify")
        .arg("not-a-record")
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot verify password"));
}

#[test]
fn invalid_hash_params_are_rejected() {
    bin()
        .env("GATEKEEPER_PASSWORD", "pw")
        .arg("hash")
        .args(["--argon-time", "0"])
        .assert()
        .failure();
}
