mod common;

use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

#[test]
fn test_cli_end_to_end() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin!("mealpay"));
    cmd.arg("simulate").arg("tests/fixtures/orders.csv");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("order,user,pay_amount,status"))
        .stdout(predicate::str::contains("ord-1,u-1,35.00,PAID"))
        .stdout(predicate::str::contains("ord-2,u-2,12.50,PAID"))
        // Zero pay amount and pay above total are rejected rows
        .stdout(predicate::str::contains("ord-3").not())
        .stdout(predicate::str::contains("ord-4").not())
        .stderr(predicate::str::contains("Error reading order"));

    Ok(())
}

#[test]
fn test_cli_failed_outcome_leaves_orders_awaiting() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin!("mealpay"));
    cmd.arg("simulate")
        .arg("tests/fixtures/orders.csv")
        .args(["--method", "alipay", "--outcome", "failed", "--deliveries", "3"]);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("ord-1,u-1,35.00,AWAITING_PAYMENT"));

    Ok(())
}

#[test]
fn test_cli_generated_orders_all_paid() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("orders.csv");
    common::generate_csv(&path, 50)?;

    let output = Command::new(cargo_bin!("mealpay"))
        .arg("simulate")
        .arg(&path)
        .output()?;
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout)?;
    let rows: Vec<&str> = stdout.lines().skip(1).collect();
    assert_eq!(rows.len(), 50);
    assert!(rows.iter().all(|row| row.ends_with(",18.50,PAID")));

    Ok(())
}

#[test]
fn test_cli_rejects_unknown_method() {
    let mut cmd = Command::new(cargo_bin!("mealpay"));
    cmd.arg("simulate")
        .arg("tests/fixtures/orders.csv")
        .args(["--method", "cheque"]);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("unknown payment method"));
}

#[test]
fn test_cli_rejects_out_of_range_ttl() {
    let mut cmd = Command::new(cargo_bin!("mealpay"));
    cmd.arg("simulate")
        .arg("tests/fixtures/orders.csv")
        .args(["--ttl-secs", "9223372036854775807"]);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("out of range"));
}
