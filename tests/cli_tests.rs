//! Command-line behavior: exit codes, output routing, and flag handling.

mod common;

use std::fs;

use assert_cmd::Command;
use common::fixture;
use cram_to_sam::container::CONTAINER_HEADER_LEN;
use cram_to_sam::output::bgzf::EOF_BLOCK;
use predicates::prelude::*;

fn cmd() -> Command {
    Command::cargo_bin("cram-to-sam").unwrap()
}

#[test]
fn test_help_exits_zero() {
    cmd()
        .arg("-h")
        .assert()
        .success()
        .stdout(predicate::str::contains("--region"));
}

#[test]
fn test_version_exits_zero() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_missing_arguments() {
    cmd().assert().code(1).stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_sam_to_stdout() {
    let fixture = fixture();
    let output = cmd()
        .arg(&fixture.input)
        .arg(&fixture.reference)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let text = String::from_utf8(output).unwrap();
    assert!(text.starts_with("@HD\tVN:1.6"));
    assert!(text.contains("@PG\tID:cram-to-sam"));
    let names: Vec<&str> = text
        .lines()
        .filter(|l| !l.starts_with('@'))
        .map(|l| l.split('\t').next().unwrap())
        .collect();
    assert_eq!(names, fixture.expected_names());
}

#[test]
fn test_region_and_prefix() {
    let fixture = fixture();
    cmd()
        .args(["-p", "lane1", "-r", "chr1:95-105"])
        .arg(&fixture.input)
        .arg(&fixture.reference)
        .assert()
        .success()
        .stdout(predicate::str::contains("lane1:4\t0\tchr1\t100\t"))
        .stdout(predicate::str::contains("r003").not());
}

#[test]
fn test_calmd_flag() {
    let fixture = fixture();
    cmd()
        .args(["-m", "-r", "chr1:10"])
        .arg(&fixture.input)
        .arg(&fixture.reference)
        .assert()
        .success()
        .stdout(predicate::str::contains("RG:Z:rg1\tMD:Z:20\tNM:i:0"));
}

#[test]
fn test_bam_output_file() {
    let fixture = fixture();
    let output = fixture.output("out.bam");
    cmd()
        .args(["-b9"])
        .arg(&fixture.input)
        .arg(&fixture.reference)
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    let data = fs::read(&output).unwrap();
    assert_eq!(&data[..4], &[0x1f, 0x8b, 0x08, 0x04]);
    assert!(data.ends_with(&EOF_BLOCK));
}

#[test]
fn test_uncompressed_bam() {
    let fixture = fixture();
    let fast = fixture.output("fast.bam");
    let stored = fixture.output("stored.bam");
    for (flag, path) in [("-1", &fast), ("-u", &stored)] {
        cmd()
            .args(["-b", flag])
            .arg(&fixture.input)
            .arg(&fixture.reference)
            .arg(path)
            .assert()
            .success();
    }
    assert!(fs::metadata(&stored).unwrap().len() > fs::metadata(&fast).unwrap().len());
}

#[test]
fn test_malformed_region() {
    let fixture = fixture();
    cmd()
        .args(["-r", "chr1:abc"])
        .arg(&fixture.input)
        .arg(&fixture.reference)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Malformed range"));
}

#[test]
fn test_unknown_reference() {
    let fixture = fixture();
    let output = fixture.output("never.sam");
    cmd()
        .args(["-r", "chrZZZ"])
        .arg(&fixture.input)
        .arg(&fixture.reference)
        .arg(&output)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Unknown reference name 'chrZZZ'"));
    assert!(!output.exists());
}

#[test]
fn test_missing_input() {
    let fixture = fixture();
    cmd()
        .arg(fixture.output("absent.ctr"))
        .arg(&fixture.reference)
        .assert()
        .code(1);
}

#[cfg(unix)]
#[test]
fn test_non_utf8_input_path() {
    use std::ffi::OsString;
    use std::os::unix::ffi::OsStringExt;

    let fixture = fixture();
    let mut name = b"absent".to_vec();
    name.push(0xff);
    name.extend_from_slice(b".ctr");
    let input = fixture.dir.path().join(OsString::from_vec(name));

    cmd()
        .arg(&input)
        .arg(&fixture.reference)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to open input"))
        .stderr(predicate::str::contains("panicked").not());
}

#[test]
fn test_truncated_input() {
    let fixture = fixture();
    fixture.truncate_input(CONTAINER_HEADER_LEN);
    cmd()
        .arg(&fixture.input)
        .arg(&fixture.reference)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("EOF container"));
}
