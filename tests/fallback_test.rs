use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;

fn orders_csv() -> tempfile::NamedTempFile {
    let mut csv = tempfile::NamedTempFile::new().unwrap();
    writeln!(csv, "order, merchant, user, total, pay_amount").unwrap();
    writeln!(csv, "ord-1, m-1, u-1, 100.0, 100.0").unwrap();
    csv
}

#[cfg(not(feature = "storage-rocksdb"))]
#[test]
fn test_rocksdb_fallback_warning() {
    let csv = orders_csv();

    let mut cmd = Command::new(cargo_bin!("mealpay"));
    cmd.arg("simulate")
        .arg(csv.path())
        .arg("--db-path")
        .arg("some_db");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("ord-1,u-1,100.0,PAID"))
        .stderr(predicate::str::contains("WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."));
}

#[cfg(feature = "storage-rocksdb")]
#[test]
fn test_rocksdb_no_fallback_warning() {
    let csv = orders_csv();

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test_db");

    let mut cmd = Command::new(cargo_bin!("mealpay"));
    cmd.arg("simulate")
        .arg(csv.path())
        .arg("--db-path")
        .arg(&db_path);

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("WARNING").not());
}
