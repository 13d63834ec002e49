//! End-to-end tests of the `maildir-restore` binary against preloaded metadata.

use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use assert_fs::prelude::*;
use predicates::prelude::*;

const ARCHIVE: &str = "2025-01-15.mail";

fn metadata_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("metadata")
}

/// The binary with an isolated config location and log directory.
fn cli(home: &assert_fs::TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("maildir-restore");
    cmd.env("MAILDIR_RESTORE_CONFIG", home.path().join("absent.toml"))
        .env("XDG_CACHE_HOME", home.path().join("cache"))
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_version() {
    let home = assert_fs::TempDir::new().unwrap();
    cli(&home)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("maildir-restore"));
}

#[test]
fn test_completions_and_manpage() {
    let home = assert_fs::TempDir::new().unwrap();
    cli(&home)
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("maildir-restore"))
        .stdout(predicate::str::contains("--metadata-dir"));
    cli(&home)
        .arg("manpage")
        .assert()
        .success()
        .stdout(predicate::str::contains(".TH"))
        .stdout(predicate::str::contains("restore"));
    if cfg!(target_os = "linux") {
        home.child("cache/maildir-restore/maildir-restore.log")
            .assert(predicate::path::exists());
    }
}

#[test]
fn test_files_json() {
    let home = assert_fs::TempDir::new().unwrap();
    cli(&home)
        .args(["files", ARCHIVE, "--json", "-M"])
        .arg(metadata_dir())
        .assert()
        .success()
        .stdout(predicate::str::contains("./alice/Maildir/.Sent/cur/"))
        .stdout(predicate::str::contains("./bob/Maildir/cur/"))
        .stdout(predicate::str::contains("dovecot-uidlist"));
}

#[test]
fn test_users_with_filters() {
    let home = assert_fs::TempDir::new().unwrap();
    cli(&home)
        .args(["users", "--json", "-a", ARCHIVE, "-u", "^bob$", "-m", "^Sent$", "-M"])
        .arg(metadata_dir())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"bob\""))
        .stdout(predicate::str::contains("\"Sent\""))
        .stdout(predicate::str::contains("alice").not())
        .stdout(predicate::str::contains("Trash").not());
}

#[test]
fn test_invalid_filter_fails() {
    let home = assert_fs::TempDir::new().unwrap();
    cli(&home)
        .args(["files", ARCHIVE, "-m", "(unclosed", "-M"])
        .arg(metadata_dir())
        .assert()
        .failure()
        .stderr(predicate::str::contains("mailbox filter"));
}

#[test]
fn test_restore_dry_run_prints_plan() {
    let home = assert_fs::TempDir::new().unwrap();
    let out = home.child("out");
    cli(&home)
        .args(["restore", ARCHIVE, "--dry-run", "-T", "/nonexistent/tarsnap", "-M"])
        .arg(metadata_dir())
        .arg("-O")
        .arg(out.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Batches:"))
        .stdout(predicate::str::contains("2025-01-15.mail.alice.maildir"));
    out.assert(predicate::path::missing());
}

#[test]
fn test_restore_without_keyfile_fails() {
    let home = assert_fs::TempDir::new().unwrap();
    cli(&home)
        .args(["restore", ARCHIVE, "--no-progress", "-M"])
        .arg(metadata_dir())
        .arg("-O")
        .arg(home.path().join("out"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("key file"));
}

#[cfg(unix)]
#[test]
fn test_restore_with_fake_tool() {
    let home = assert_fs::TempDir::new().unwrap();
    let script = home.child("tool.sh");
    script
        .write_str(
            "dest=\"\"\n\
             while [ $# -gt 0 ]; do\n\
               case \"$1\" in\n\
                 -C) dest=\"$2\"; shift 2 ;;\n\
                 --keyfile|-f) shift 2 ;;\n\
                 -*) shift ;;\n\
                 *) break ;;\n\
               esac\n\
             done\n\
             for f in \"$@\"; do\n\
               mkdir -p \"$dest/$(dirname \"$f\")\"\n\
               printf 'x' > \"$dest/$f\"\n\
             done\n",
        )
        .unwrap();
    let out = home.child("out");
    let config = home.child("config.toml");
    config
        .write_str(&format!(
            "[tarsnap]\ncommand = \"/bin/sh\"\nkeyfile = \"/dev/null\"\nextra_args = [{:?}]\n\n\
             [restore]\noutput_dir = {:?}\nconcurrency = 2\n",
            script.path().display().to_string(),
            out.path().display().to_string(),
        ))
        .unwrap();

    cli(&home)
        .args(["restore", ARCHIVE, "--no-progress", "-u", "^alice$", "-c"])
        .arg(config.path())
        .arg("-M")
        .arg(metadata_dir())
        .assert()
        .success()
        .stdout(predicate::str::contains("Succeeded:"));

    out.child("alice/Maildir/.Lists.rust/cur/1736669700.M5P100.mail:2,S")
        .assert(predicate::path::is_file());
    out.child("bob").assert(predicate::path::missing());
}
