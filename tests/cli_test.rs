use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

fn ledger() -> Command {
    let mut cmd = Command::new(cargo_bin!("wallet-ledger"));
    for (key, _) in std::env::vars() {
        if key.starts_with("LEDGER_") {
            cmd.env_remove(key);
        }
    }
    cmd
}

#[test]
fn test_help_lists_flags() -> Result<(), Box<dyn std::error::Error>> {
    ledger()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--listen"))
        .stdout(predicate::str::contains("--max-attempts"))
        .stdout(predicate::str::contains("--lock-timeout-ms"))
        .stdout(predicate::str::contains("LEDGER_SEED_WALLETS"));
    Ok(())
}

#[test]
fn test_zero_attempts_rejected() {
    ledger()
        .args(["--max-attempts", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("max-attempts"));
}

#[test]
fn test_malformed_listen_address_rejected() {
    ledger()
        .args(["--listen", "not-an-address"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--listen"));
}

#[cfg(not(feature = "storage-rocksdb"))]
#[test]
fn test_db_path_requires_rocksdb_feature() {
    let dir = tempfile::tempdir().unwrap();
    ledger()
        .arg("--db-path")
        .arg(dir.path().join("ledger"))
        .args(["--listen", "127.0.0.1:0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("storage-rocksdb"));
}
