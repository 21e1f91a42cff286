// tests/format.rs

//! Format invoker: temporary drive letters, the format lock and exit codes.

mod common;

use std::sync::Arc;

use common::FakePlatform;
use ramdisk::ErrorKind;
use ramdisk::config::FormatConfig;
use ramdisk::lifecycle::{FormatInvoker, find_free_drive_letter};
use ramdisk::sys::codes;

const DEV: &str = r"\Device\ImDisk0";

fn format(fake: &FakePlatform, letter: Option<char>) -> ramdisk::error::Result<()> {
    let cfg = FormatConfig::default();
    FormatInvoker::new(fake, &cfg).format(DEV, letter, "/fs:ntfs /q /y")
}

#[test]
fn free_letter_search_starts_at_z() {
    let fake = FakePlatform::new();
    assert_eq!(find_free_drive_letter(&fake), Some('Z'));

    fake.state().dos_devices.insert("Z:".into(), r"\Device\Other".into());
    assert_eq!(find_free_drive_letter(&fake), Some('Y'));

    // D: through Z: taken; A: to C: are never candidates
    fake.state().logical_drives = 0x03FF_FFF8;
    assert_eq!(find_free_drive_letter(&fake), None);
}

#[test]
fn temporary_letter_is_removed_after_format() {
    let fake = FakePlatform::new();
    fake.add_device(0, None);

    format(&fake, None).expect("format");

    let st = fake.state();
    assert_eq!(st.processes.len(), 1);
    assert_eq!(st.processes[0].0.to_string_lossy(), r"C:\Windows\System32\format.com");
    assert_eq!(st.processes[0].1, ["Z:", "/fs:ntfs", "/q", "/y"]);
    assert!(!st.dos_devices.contains_key("Z:"));
    assert_eq!(
        st.events_matching(&["acquire-lock", "define", "run", "undefine", "release-lock"]),
        [
            "acquire-lock ImDiskFormat",
            r"define Z: \Device\ImDisk0",
            "run Z: /fs:ntfs /q /y",
            "undefine Z:",
            "release-lock",
        ]
    );
}

#[test]
fn existing_binding_is_left_in_place() {
    let fake = FakePlatform::new();
    fake.add_device(0, Some('R'));

    format(&fake, Some('R')).expect("format");

    let st = fake.state();
    assert_eq!(st.dos_devices.get("R:").map(String::as_str), Some(DEV));
    assert!(st.events_matching(&["define", "undefine"]).is_empty());
}

#[test]
fn no_free_letter_fails_and_releases_lock() {
    let fake = FakePlatform::new();
    fake.state().logical_drives = 0x03FF_FFFF;

    let err = format(&fake, None).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::FormatFailed);
    assert!(err.to_string().contains("No free drive letters"));
    let st = fake.state();
    assert!(!st.lock_held);
    assert_eq!(st.lock_acquisitions, 1);
    assert!(st.processes.is_empty());
}

#[test]
fn nonzero_exit_code_fails_and_still_cleans_up() {
    let fake = FakePlatform::new();
    fake.state().format_exit_code = 4;

    let err = format(&fake, None).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::FormatFailed);
    assert!(err.to_string().contains("exit code 4"));
    let st = fake.state();
    assert!(!st.dos_devices.contains_key("Z:"));
    assert!(!st.lock_held);
}

#[test]
fn tool_that_cannot_start_is_format_failure() {
    let fake = FakePlatform::new();
    fake.state().spawn_error = Some(codes::ERROR_FILE_NOT_FOUND);

    let err = format(&fake, None).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::FormatFailed);
    assert_eq!(err.os_error().map(|e| e.code()), Some(codes::ERROR_FILE_NOT_FOUND));
    assert!(!fake.state().lock_held);
}

#[test]
fn letter_bound_elsewhere_is_format_failure() {
    let fake = FakePlatform::new();
    fake.state().dos_devices.insert("R:".into(), r"\Device\HarddiskVolume3".into());

    let err = format(&fake, Some('R')).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::FormatFailed);
    let st = fake.state();
    assert_eq!(st.dos_devices.get("R:").map(String::as_str), Some(r"\Device\HarddiskVolume3"));
    assert!(st.processes.is_empty());
}

#[test]
fn sequential_formats_each_take_the_lock() {
    let fake = Arc::new(FakePlatform::new());
    format(&fake, None).unwrap();
    format(&fake, None).unwrap();
    assert_eq!(fake.state().lock_acquisitions, 2);
}
