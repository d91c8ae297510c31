use std::{fs, io::Write};

use flate2::{write::GzEncoder, Compression};

mod common;

use common::{parse_json, pf, tar_bytes, zip_bytes};

#[test]
fn locate_reports_nested_member_path() {
    let temp = tempfile::tempdir().expect("tempdir");
    let inner = zip_bytes(&[("boot.img", b"kernel")]);
    let archive = temp.path().join("outer.zip");
    fs::write(&archive, zip_bytes(&[("inner.zip", &inner)])).expect("write archive");

    let assert = pf(temp.path())
        .args(["--json", "locate"])
        .arg(&archive)
        .args(["boot.img", "--nested"])
        .assert()
        .success();
    let payload = parse_json(&assert);
    assert_eq!(payload["status"], "ok");
    assert_eq!(payload["details"]["path"], "inner.zip/boot.img");
}

#[test]
fn locate_without_nested_flag_is_not_found() {
    let temp = tempfile::tempdir().expect("tempdir");
    let inner = zip_bytes(&[("boot.img", b"kernel")]);
    let archive = temp.path().join("outer.zip");
    fs::write(&archive, zip_bytes(&[("inner.zip", &inner)])).expect("write archive");

    let assert = pf(temp.path())
        .args(["--json", "locate"])
        .arg(&archive)
        .arg("boot.img")
        .assert()
        .code(1);
    let payload = parse_json(&assert);
    assert_eq!(payload["status"], "user_error");
    assert!(payload["details"]["path"].is_null());
}

#[test]
fn locate_searches_zip_inside_tarball() {
    let temp = tempfile::tempdir().expect("tempdir");
    let inner = zip_bytes(&[("image/init_boot.img", b"ramdisk")]);
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&tar_bytes(&[("oriole/image-oriole.zip", &inner)]))
        .expect("gzip");
    let archive = temp.path().join("oriole-factory.tgz");
    fs::write(&archive, encoder.finish().expect("gzip")).expect("write archive");

    let assert = pf(temp.path())
        .args(["--json", "locate", "--nested"])
        .arg(&archive)
        .arg("init_boot.img")
        .assert()
        .success();
    let payload = parse_json(&assert);
    assert_eq!(
        payload["details"]["path"],
        "oriole/image-oriole.zip/image/init_boot.img"
    );
    let tmp = temp.path().join("tmp");
    assert_eq!(fs::read_dir(tmp).expect("tmp dir").count(), 0);
}

#[test]
fn corrupt_archive_fails() {
    let temp = tempfile::tempdir().expect("tempdir");
    let archive = temp.path().join("broken.zip");
    fs::write(&archive, b"not a zip").expect("write archive");

    pf(temp.path())
        .arg("locate")
        .arg(&archive)
        .arg("boot.img")
        .assert()
        .failure();
}

#[test]
fn sha1_reads_marker_and_scores_confidence() {
    let temp = tempfile::tempdir().expect("tempdir");
    let image = temp.path().join("boot.img");
    let mut blob = vec![0u8; 64];
    blob.extend_from_slice(b"SHA1=abcdef12");
    blob.extend_from_slice(&[0xff; 16]);
    fs::write(&image, blob).expect("write image");

    let assert = pf(temp.path())
        .args(["--json", "sha1", "--expected", "abcdef13"])
        .arg(&image)
        .assert()
        .success();
    let payload = parse_json(&assert);
    assert_eq!(payload["details"]["sha1"], "abcdef12");
    assert_eq!(payload["details"]["confidence"], 0.875);
}

#[test]
fn fingerprint_missing_marker_is_user_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let image = temp.path().join("boot.img");
    fs::write(&image, b"no markers here").expect("write image");

    let assert = pf(temp.path())
        .args(["--json", "fingerprint"])
        .arg(&image)
        .assert()
        .code(1);
    let payload = parse_json(&assert);
    assert!(payload["details"]["fingerprint"].is_null());
}

#[test]
fn confidence_of_different_lengths_is_zero() {
    let temp = tempfile::tempdir().expect("tempdir");
    let assert = pf(temp.path())
        .args(["--json", "confidence", "abcdef12", "abc"])
        .assert()
        .success();
    assert_eq!(parse_json(&assert)["details"]["confidence"], 0.0);
}

#[test]
fn digest_reports_known_hashes() {
    let temp = tempfile::tempdir().expect("tempdir");
    let file = temp.path().join("abc.txt");
    fs::write(&file, b"abc").expect("write file");

    let assert = pf(temp.path())
        .args(["--json", "digest"])
        .arg(&file)
        .assert()
        .success();
    let payload = parse_json(&assert);
    assert_eq!(payload["details"]["md5"], "900150983cd24fb0d6963f7d28e17f72");
    assert_eq!(
        payload["details"]["sha1"],
        "a9993e364706816aba3e25717850c26c9cd0d89d"
    );
    assert_eq!(
        payload["details"]["sha256"],
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}

#[test]
fn ui_coords_prints_centre() {
    let temp = tempfile::tempdir().expect("tempdir");
    let dump = temp.path().join("view.xml");
    fs::write(
        &dump,
        r#"<node text="Install" bounds="[600,1800][980,1900]" clickable="true" />"#,
    )
    .expect("write dump");

    let assert = pf(temp.path())
        .args(["--json", "ui-coords"])
        .arg(&dump)
        .arg("Install")
        .assert()
        .success();
    let payload = parse_json(&assert);
    assert_eq!(payload["details"]["x"], 790.0);
    assert_eq!(payload["details"]["y"], 1850.0);
}

#[test]
fn unreadable_image_is_recorded_in_diagram_log() {
    let temp = tempfile::tempdir().expect("tempdir");
    pf(temp.path())
        .arg("sha1")
        .arg(temp.path().join("missing.img"))
        .assert()
        .failure();

    let diagrams = fs::read_dir(temp.path().join("diagrams"))
        .expect("diagrams dir")
        .map(|entry| entry.expect("entry").path())
        .collect::<Vec<_>>();
    assert_eq!(diagrams.len(), 1, "{diagrams:?}");
    let text = fs::read_to_string(&diagrams[0]).expect("read diagram");
    assert!(text.contains("#red:Failed to read SHA1 from boot image;"), "{text}");
    assert!(text.contains("missing.img"), "{text}");
}
