// tests/remove.rs

//! Device removal: graceful, forced and emergency paths.

mod common;

use std::{path::PathBuf, sync::Arc};

use common::{FakePlatform, controller};
use ramdisk::ErrorKind;
use ramdisk::device::{DeviceDescriptor, MountPoint};
use ramdisk::error::exit_code;
use ramdisk::lifecycle::{CreateOptions, RemoveOptions};
use ramdisk::sys::codes;
use shared::constants::IMDISK_CTL_DEVICE_NAME;

const VOLUME_OPS: &[&str] = &["flush", "lock-volume", "dismount", "eject", "unlock-volume", "remove"];

fn on_r() -> MountPoint {
    MountPoint::DriveLetter('R')
}

#[test]
fn forced_remove_by_letter_runs_full_teardown() {
    let fake = Arc::new(FakePlatform::new());
    let ctl = controller(&fake);
    let opts = CreateOptions { mount_point: Some(on_r()), ..CreateOptions::default() };
    ctl.create(&mut DeviceDescriptor::in_memory(1 << 20), &opts).unwrap();

    let result = ctl.remove(&RemoveOptions {
        mount_point: Some(on_r()),
        force_dismount: true,
        ..RemoveOptions::default()
    });

    assert_eq!(exit_code(&result), 0);
    let st = fake.state();
    assert_eq!(
        st.events_matching(VOLUME_OPS),
        ["flush", "lock-volume", "dismount", "eject", "unlock-volume"]
    );
    assert!(st.events.iter().any(|e| e == "notify R"));
    assert!(!st.dos_devices.contains_key("R:"));
    assert!(st.devices.is_empty());
    assert_eq!(st.open_handles, 0);
}

#[test]
fn created_number_can_be_removed() {
    let fake = Arc::new(FakePlatform::new());
    let ctl = controller(&fake);
    let mut desc = DeviceDescriptor::in_memory(1 << 20);
    ctl.create(&mut desc, &CreateOptions::default()).unwrap();

    let number = desc.device_number.number().expect("concrete number after create");
    ctl.remove(&RemoveOptions { device_number: Some(number), ..RemoveOptions::default() })
        .expect("remove");

    assert!(fake.state().devices.is_empty());
}

#[test]
fn remove_by_number_detaches_letter_reported_by_driver() {
    let fake = Arc::new(FakePlatform::new());
    fake.add_device(2, Some('S'));
    let ctl = controller(&fake);

    ctl.remove(&RemoveOptions { device_number: Some(2), ..RemoveOptions::default() })
        .expect("remove");

    let st = fake.state();
    assert!(!st.devices.contains_key(&2));
    assert!(!st.dos_devices.contains_key("S:"));
    assert!(st.events.iter().any(|e| e.starts_with(r"open \Device\ImDisk2 ReadWrite")));
}

#[test]
fn never_created_number_is_device_not_found() {
    let fake = Arc::new(FakePlatform::new());
    fake.state().driver_loaded = true;
    let ctl = controller(&fake);

    let result = ctl.remove(&RemoveOptions { device_number: Some(7), ..RemoveOptions::default() });

    assert_eq!(result.as_ref().unwrap_err().kind(), ErrorKind::DeviceNotFound);
    assert_eq!(exit_code(&result), 1);
    // every degraded access level was tried
    assert_eq!(fake.state().events_matching(&[r"open \Device\ImDisk7"]).len(), 3);
}

#[test]
fn unbound_letter_is_device_not_found() {
    let fake = Arc::new(FakePlatform::new());
    let ctl = controller(&fake);

    let err = ctl
        .remove(&RemoveOptions { mount_point: Some(MountPoint::DriveLetter('Q')), ..RemoveOptions::default() })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DeviceNotFound);
}

#[test]
fn busy_volume_without_force_stays_and_closes_handles() {
    let fake = Arc::new(FakePlatform::new());
    fake.add_device(0, Some('R'));
    fake.state().devices.get_mut(&0).unwrap().busy = true;
    let ctl = controller(&fake);

    let err = ctl
        .remove(&RemoveOptions { mount_point: Some(on_r()), ..RemoveOptions::default() })
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DeviceInaccessible);
    assert_eq!(err.exit_code(), 2);
    let st = fake.state();
    assert!(st.devices.contains_key(&0));
    assert!(st.dos_devices.contains_key("R:"), "mount point must survive a failed removal");
    assert_eq!(st.open_handles, 0);
}

#[test]
fn busy_volume_with_force_is_dismounted_then_locked() {
    let fake = Arc::new(FakePlatform::new());
    fake.add_device(0, Some('R'));
    fake.state().devices.get_mut(&0).unwrap().busy = true;
    let ctl = controller(&fake);

    ctl.remove(&RemoveOptions { mount_point: Some(on_r()), force_dismount: true, ..RemoveOptions::default() })
        .expect("forced remove");

    assert_eq!(
        fake.state().events_matching(VOLUME_OPS),
        ["flush", "lock-volume refused", "dismount", "lock-volume", "eject", "unlock-volume"]
    );
}

#[test]
fn eject_failure_with_force_falls_back_to_driver_removal() {
    let fake = Arc::new(FakePlatform::new());
    fake.add_device(4, Some('R'));
    fake.state().eject_error = Some(codes::ERROR_ACCESS_DENIED);
    let ctl = controller(&fake);

    ctl.remove(&RemoveOptions { mount_point: Some(on_r()), force_dismount: true, ..RemoveOptions::default() })
        .expect("forced remove");

    let st = fake.state();
    assert!(st.events.iter().any(|e| e == "remove 4"));
    assert!(st.devices.is_empty());
    assert!(!st.dos_devices.contains_key("R:"));
    assert_eq!(st.open_handles, 0);
}

#[test]
fn eject_failure_without_force_is_inaccessible() {
    let fake = Arc::new(FakePlatform::new());
    fake.add_device(4, Some('R'));
    fake.state().eject_error = Some(codes::ERROR_ACCESS_DENIED);
    let ctl = controller(&fake);

    let err = ctl
        .remove(&RemoveOptions { mount_point: Some(on_r()), ..RemoveOptions::default() })
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DeviceInaccessible);
    let st = fake.state();
    assert!(st.devices.contains_key(&4));
    assert_eq!(
        st.events_matching(VOLUME_OPS),
        ["flush", "lock-volume", "dismount", "eject refused", "unlock-volume"]
    );
    assert_eq!(st.open_handles, 0);
}

#[test]
fn failed_forced_removal_still_unlocks_volume() {
    let fake = Arc::new(FakePlatform::new());
    fake.add_device(4, Some('R'));
    {
        let mut st = fake.state();
        st.eject_error = Some(codes::ERROR_ACCESS_DENIED);
        // the fallback cannot reach the control device either
        st.denied_devices.push(IMDISK_CTL_DEVICE_NAME.into());
    }
    let ctl = controller(&fake);

    let err = ctl
        .remove(&RemoveOptions { mount_point: Some(on_r()), force_dismount: true, ..RemoveOptions::default() })
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DriverInaccessible);
    let st = fake.state();
    assert_eq!(st.events_matching(VOLUME_OPS).last().map(String::as_str), Some("unlock-volume"));
    assert!(st.dos_devices.contains_key("R:"));
    assert_eq!(st.open_handles, 0);
}

#[test]
fn foreign_volume_is_rejected() {
    let fake = Arc::new(FakePlatform::new());
    fake.add_device(0, Some('R'));
    fake.state().short_query_reply = true;
    let ctl = controller(&fake);

    let err = ctl
        .remove(&RemoveOptions { mount_point: Some(on_r()), ..RemoveOptions::default() })
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DeviceInaccessible);
    assert!(err.to_string().contains("Is that drive really an ImDisk drive?"));
    assert!(fake.state().events_matching(&["lock-volume", "eject"]).is_empty());
}

#[test]
fn emergency_removal_skips_volume_steps() {
    let fake = Arc::new(FakePlatform::new());
    fake.add_device(5, Some('R'));
    let ctl = controller(&fake);

    ctl.remove(&RemoveOptions {
        device_number: Some(5),
        mount_point: Some(on_r()),
        emergency: true,
        ..RemoveOptions::default()
    })
    .expect("emergency remove");

    let st = fake.state();
    assert_eq!(st.events_matching(VOLUME_OPS), ["remove 5"]);
    assert!(!st.dos_devices.contains_key("R:"));
}

#[test]
fn emergency_removal_needs_a_number() {
    let fake = Arc::new(FakePlatform::new());
    let ctl = controller(&fake);

    let err = ctl
        .remove(&RemoveOptions { mount_point: Some(on_r()), emergency: true, ..RemoveOptions::default() })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadSyntax);
}

#[test]
fn emergency_removal_of_unknown_number_is_device_not_found() {
    let fake = Arc::new(FakePlatform::new());
    fake.state().driver_loaded = true;
    let ctl = controller(&fake);

    let result = ctl.remove(&RemoveOptions { device_number: Some(7), emergency: true, ..RemoveOptions::default() });

    assert_eq!(result.as_ref().unwrap_err().kind(), ErrorKind::DeviceNotFound);
    assert_eq!(exit_code(&result), 1);
}

#[test]
fn removal_needs_number_or_mount_point() {
    let fake = Arc::new(FakePlatform::new());
    let ctl = controller(&fake);

    let err = ctl.remove(&RemoveOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadSyntax);
    assert_eq!(err.exit_code(), 10);
}

#[test]
fn directory_mount_point_is_removed_with_device() {
    let fake = Arc::new(FakePlatform::new());
    let dir = PathBuf::from(r"C:\mnt\ram");
    let mp = MountPoint::Directory(dir.clone());
    let ctl = controller(&fake);
    ctl.create(
        &mut DeviceDescriptor::in_memory(1 << 20),
        &CreateOptions { mount_point: Some(mp.clone()), ..CreateOptions::default() },
    )
    .unwrap();
    assert_eq!(fake.state().mount_points.get(&dir).map(String::as_str), Some(r"\Device\ImDisk0"));

    ctl.remove(&RemoveOptions { mount_point: Some(mp), ..RemoveOptions::default() })
        .expect("remove");

    let st = fake.state();
    assert!(st.mount_points.is_empty());
    assert!(st.devices.is_empty());
}

#[test]
fn directory_that_is_not_a_mount_point_is_bad_mount_point() {
    let fake = Arc::new(FakePlatform::new());
    let ctl = controller(&fake);

    let err = ctl
        .remove(&RemoveOptions {
            mount_point: Some(MountPoint::Directory(r"C:\data".into())),
            ..RemoveOptions::default()
        })
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::BadMountPoint);
    assert_eq!(err.exit_code(), 9);
    assert!(err.to_string().contains("Not a mount point"));
}
