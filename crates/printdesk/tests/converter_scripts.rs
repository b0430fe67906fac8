//! `OfficeConverter` against stand-in shell scripts.
//!
//! The converter is invoked as
//! `<program> -env:UserInstallation=<url> --headless --convert-to pdf:... --outdir <dir> <input>`,
//! so the scripts see the output directory as `$6` and the input as `$7`.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serial_test::serial;
use tempfile::TempDir;

use printdesk::pipeline::{ConvertError, DocumentConverter, OfficeConverter};

fn script(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("fake-soffice");
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn input(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"PK\x03\x04 not really a document").unwrap();
    path
}

fn converter(program: PathBuf, out: &Path) -> OfficeConverter {
    OfficeConverter::new(Some(program), out)
        .with_timeouts(Duration::from_secs(5), Duration::from_millis(300))
        .with_polling(Duration::from_millis(20), Duration::from_millis(10))
}

fn pdf_count(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().extension().is_some_and(|x| x == "pdf"))
                .count()
        })
        .unwrap_or(0)
}

const WRITE_OUTPUT: &str = r#"base=$(basename "$7"); printf '%%PDF-1.4 converted' > "$6/${base%.*}.pdf""#;

#[tokio::test]
#[serial]
async fn test_conversion_renames_to_stored_name() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("converted");
    let program = script(dir.path(), WRITE_OUTPUT);
    let source = input(dir.path(), "essay.docx");

    let pdf = converter(program, &out)
        .convert(&source, "1700000000_ab12cd34_essay.docx")
        .await
        .unwrap();

    assert_eq!(pdf, out.join("1700000000_ab12cd34_essay.pdf"));
    assert_eq!(std::fs::read(&pdf).unwrap(), b"%PDF-1.4 converted");
    assert!(!out.join("essay.pdf").exists());
}

#[tokio::test]
#[serial]
async fn test_timeout_leaves_no_partial_output() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("converted");
    let body = format!("{}; sleep 10", WRITE_OUTPUT);
    let program = script(dir.path(), &body);
    let source = input(dir.path(), "slides.pptx");

    let err = converter(program, &out)
        .with_timeouts(Duration::from_millis(500), Duration::from_millis(300))
        .convert(&source, "1_x_slides.pptx")
        .await
        .unwrap_err();

    assert!(matches!(err, ConvertError::Timeout(_)));
    assert_eq!(pdf_count(&out), 0);
}

#[tokio::test]
#[serial]
async fn test_nonzero_exit_reports_stderr() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("converted");
    let program = script(dir.path(), "echo 'source file could not be loaded' >&2; exit 1");
    let source = input(dir.path(), "sheet.xlsx");

    let err = converter(program, &out)
        .convert(&source, "sheet.xlsx")
        .await
        .unwrap_err();

    match err {
        ConvertError::Failed { stderr, .. } => {
            assert!(stderr.contains("could not be loaded"))
        }
        other => panic!("expected exit failure, got {:?}", other),
    }
    assert_eq!(pdf_count(&out), 0);
}

#[tokio::test]
#[serial]
async fn test_success_without_output_is_an_error() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("converted");
    let program = script(dir.path(), "exit 0");
    let source = input(dir.path(), "notes.odt");

    let err = converter(program, &out)
        .convert(&source, "notes.odt")
        .await
        .unwrap_err();

    assert!(matches!(err, ConvertError::NoOutput(_)));
    assert_eq!(pdf_count(&out), 0);
}
