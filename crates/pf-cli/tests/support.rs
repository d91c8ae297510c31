use std::{fs, io::Read};

use zip::ZipArchive;

mod common;

use common::{parse_json, pf};

#[test]
fn sanitize_redacts_files_in_place() {
    let temp = tempfile::tempdir().expect("tempdir");
    let log = temp.path().join("session.log");
    fs::write(&log, "Flashing device 1A2B3C4D\nopening /Users/alice/pf\n").expect("write log");

    pf(temp.path())
        .arg("sanitize")
        .arg(&log)
        .assert()
        .success();
    let text = fs::read_to_string(&log).expect("read log");
    assert!(!text.contains("1A2B3C4D"), "{text}");
    assert!(text.contains("/Users/REDACTED/pf"), "{text}");
}

#[test]
fn sanitize_reports_unreadable_file() {
    let temp = tempfile::tempdir().expect("tempdir");
    let assert = pf(temp.path())
        .args(["--json", "sanitize"])
        .arg(temp.path().join("missing.log"))
        .assert()
        .code(2);
    assert_eq!(parse_json(&assert)["status"], "failure");
}

#[test]
fn support_writes_redacted_archive() {
    let temp = tempfile::tempdir().expect("tempdir");
    let logs = temp.path().join("logs");
    fs::create_dir_all(&logs).expect("logs dir");
    fs::write(logs.join("pf.log"), "waiting for 1A2B3C4D\n").expect("write log");

    let assert = pf(temp.path())
        .args(["--json", "support"])
        .assert()
        .success();
    let payload = parse_json(&assert);
    assert_eq!(payload["status"], "ok");

    let bundle = temp.path().join("support.zip");
    let mut archive = ZipArchive::new(fs::File::open(&bundle).expect("open bundle")).expect("zip");
    let mut log = String::new();
    archive
        .by_name("logs/pf.log")
        .expect("log in bundle")
        .read_to_string(&mut log)
        .expect("read log");
    assert_eq!(log, "waiting for REDACTED\n");
    assert!(archive.by_name("files.txt").is_ok());
}

#[test]
fn which_reports_missing_tool() {
    let temp = tempfile::tempdir().expect("tempdir");
    let assert = pf(temp.path())
        .args(["--json", "which", "pf-definitely-missing-tool"])
        .assert()
        .code(1);
    let payload = parse_json(&assert);
    assert!(payload["details"]["path"].is_null());
}

#[test]
fn clean_empties_tmp_dir() {
    let temp = tempfile::tempdir().expect("tempdir");
    let tmp = temp.path().join("tmp");
    fs::create_dir_all(tmp.join("extract")).expect("tmp dirs");
    fs::write(tmp.join("extract").join("boot.img"), b"x").expect("write");

    pf(temp.path()).arg("clean").assert().success();
    assert_eq!(fs::read_dir(&tmp).expect("tmp").count(), 0);
}
