//! Command-line behaviour against a throwaway data directory.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const FUEL: &str = r#"{"id":"f1","vehicleId":"van-7","liters":40.5,"pricePerLiter":1.79,"recordedAt":"2024-05-01T08:00:00Z"}"#;

fn fieldsync(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("fieldsync").unwrap();
    cmd.env("FIELDSYNC_HOME", home.path())
        .env_remove("FIELDSYNC_DB")
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1");
    cmd
}

fn record_fuel(home: &TempDir) {
    let file = home.path().join("fuel.json");
    std::fs::write(&file, FUEL).unwrap();
    fieldsync(home)
        .arg("record")
        .arg("fuel")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("Queued create for Fuel Entry f1"));
}

#[test]
fn record_then_status_reports_pending() {
    let home = TempDir::new().unwrap();
    record_fuel(&home);

    fieldsync(&home)
        .args(["status", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"pending\": 1"))
        .stdout(predicate::str::contains("\"network\": \"offline\""));
}

#[test]
fn queue_list_shows_item() {
    let home = TempDir::new().unwrap();
    record_fuel(&home);

    fieldsync(&home)
        .args(["queue", "list", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"recordId\": \"f1\""));
}

#[test]
fn offline_drain_keeps_queue() {
    let home = TempDir::new().unwrap();
    record_fuel(&home);

    fieldsync(&home)
        .args(["drain", "--offline", "--endpoint", "http://127.0.0.1:9", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"outcome\": \"offline\""));

    fieldsync(&home)
        .args(["status", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"pending\": 1"));
}

#[test]
fn drain_without_endpoint_fails() {
    let home = TempDir::new().unwrap();

    fieldsync(&home)
        .arg("drain")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No sync endpoint"));
}

#[test]
fn clear_requires_force() {
    let home = TempDir::new().unwrap();
    record_fuel(&home);

    fieldsync(&home)
        .args(["queue", "clear"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));

    fieldsync(&home)
        .args(["queue", "clear", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cleared 1 items"));
}

#[test]
fn explicit_db_path_is_used() {
    let home = TempDir::new().unwrap();
    let db = home.path().join("elsewhere.db");
    let file = home.path().join("fuel.json");
    std::fs::write(&file, FUEL).unwrap();

    fieldsync(&home)
        .arg("--db")
        .arg(&db)
        .arg("record")
        .arg("fuel")
        .arg(&file)
        .assert()
        .success();

    assert!(db.exists());
    assert!(!home.path().join("fieldsync.db").exists());
}

#[test]
fn unknown_kind_is_rejected() {
    let home = TempDir::new().unwrap();

    fieldsync(&home)
        .args(["records", "truck"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown record kind"));
}
