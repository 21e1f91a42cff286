//! In-memory stand-in for Windows and the ImDisk driver.
//!
//! The fake keeps just enough state to play the driver's side of every
//! handshake: loaded services, live devices, DOS device definitions,
//! directory mount points, the format lock and spawned processes. Every
//! visible action is appended to `events` so tests can check ordering.

#![allow(dead_code)]

use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use ramdisk::config::{DriverConfig, FormatConfig};
use ramdisk::lifecycle::Controller;
use ramdisk::sys::{Access, DeviceHandle, NamedLock, OsError, Platform, codes};
use shared::CreateData;
use shared::constants::*;

#[derive(Debug, Clone)]
pub struct FakeDevice {
    pub data: CreateData,
    pub locked: bool,
    pub dismounted: bool,
    /// Volume in use: locking fails until it is dismounted.
    pub busy: bool,
}

#[derive(Debug)]
pub struct FakeState {
    pub driver_installed: bool,
    pub driver_loaded: bool,
    pub awealloc_loaded: bool,
    pub proxy_started: bool,
    pub proxy_pipe_up: bool,
    /// Failed pipe probes before the helper's pipe shows up.
    pub proxy_pipe_delay: u32,
    pub start_errors: HashMap<String, u32>,
    pub driver_version: Option<u32>,
    pub create_error: Option<u32>,
    pub eject_error: Option<u32>,
    pub short_query_reply: bool,
    pub devices: BTreeMap<u32, FakeDevice>,
    pub dos_devices: BTreeMap<String, String>,
    /// Letters in use by real volumes, bit 0 = A:.
    pub logical_drives: u32,
    pub global_namespace: bool,
    pub dir_mount_supported: bool,
    pub mount_point_error: Option<u32>,
    pub mount_points: BTreeMap<PathBuf, String>,
    pub denied: Vec<Access>,
    /// Kernel names that refuse every open with access denied.
    pub denied_devices: Vec<String>,
    pub lock_held: bool,
    pub lock_acquisitions: u32,
    pub format_exit_code: i32,
    pub spawn_error: Option<u32>,
    pub processes: Vec<(PathBuf, Vec<String>)>,
    pub open_handles: i32,
    pub events: Vec<String>,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            driver_installed: true,
            driver_loaded: false,
            awealloc_loaded: false,
            proxy_started: false,
            proxy_pipe_up: false,
            proxy_pipe_delay: 0,
            start_errors: HashMap::new(),
            driver_version: Some(IMDISK_DRIVER_VERSION),
            create_error: None,
            eject_error: None,
            short_query_reply: false,
            devices: BTreeMap::new(),
            dos_devices: BTreeMap::new(),
            logical_drives: 0b1100, // C: and D:
            global_namespace: true,
            dir_mount_supported: true,
            mount_point_error: None,
            mount_points: BTreeMap::new(),
            denied: Vec::new(),
            denied_devices: Vec::new(),
            lock_held: false,
            lock_acquisitions: 0,
            format_exit_code: 0,
            spawn_error: None,
            processes: Vec::new(),
            open_handles: 0,
            events: Vec::new(),
        }
    }
}

impl FakeState {
    fn event(&mut self, e: impl Into<String>) {
        self.events.push(e.into());
    }

    /// Events starting with one of `prefixes`, in order.
    pub fn events_matching(&self, prefixes: &[&str]) -> Vec<String> {
        self.events
            .iter()
            .filter(|e| prefixes.iter().any(|p| e.starts_with(p)))
            .cloned()
            .collect()
    }
}

#[derive(Clone, Default)]
pub struct FakePlatform {
    state: Arc<Mutex<FakeState>>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// A device created behind the controller's back, bound to `letter`.
    pub fn add_device(&self, number: u32, letter: Option<char>) {
        let mut st = self.state();
        st.driver_loaded = true;
        let data = CreateData {
            device_number: number,
            drive_letter: letter,
            geometry: shared::DiskGeometry::sized(1 << 20),
            ..CreateData::default()
        };
        if let Some(c) = letter {
            st.dos_devices.insert(format!("{c}:"), device_path(number));
        }
        st.devices.insert(number, FakeDevice { data, locked: false, dismounted: false, busy: false });
    }

    fn handle(&self, target: Target) -> Box<dyn DeviceHandle> {
        self.state().open_handles += 1;
        Box::new(FakeHandle { state: self.state.clone(), target })
    }
}

/// Controller wired to `fake` with default bounds.
pub fn controller(fake: &Arc<FakePlatform>) -> Controller {
    Controller::new(fake.clone(), DriverConfig::default(), FormatConfig::default())
}

#[derive(Debug, Clone, Copy)]
enum Target {
    Control,
    AweAlloc,
    Device(u32),
}

struct FakeHandle {
    state: Arc<Mutex<FakeState>>,
    target: Target,
}

impl Drop for FakeHandle {
    fn drop(&mut self) {
        self.state.lock().unwrap().open_handles -= 1;
    }
}

fn write_reply(output: &mut [u8], bytes: &[u8]) -> usize {
    let n = output.len().min(bytes.len());
    output[..n].copy_from_slice(&bytes[..n]);
    n
}

impl DeviceHandle for FakeHandle {
    fn control(&mut self, code: u32, input: &[u8], output: &mut [u8]) -> Result<usize, OsError> {
        let mut st = self.state.lock().unwrap();

        if code == IOCTL_IMDISK_QUERY_VERSION {
            return match (self.target, st.driver_version) {
                (Target::AweAlloc, _) => Err(OsError::new(codes::ERROR_INVALID_FUNCTION)),
                (_, Some(v)) => Ok(write_reply(output, &v.to_le_bytes())),
                (_, None) => Ok(0),
            };
        }

        match self.target {
            Target::Control => control_request(&mut st, code, input, output),
            Target::Device(n) => device_request(&mut st, n, code, output),
            Target::AweAlloc => Err(OsError::new(codes::ERROR_INVALID_FUNCTION)),
        }
    }

    fn flush(&mut self) -> Result<(), OsError> {
        self.state.lock().unwrap().event("flush");
        Ok(())
    }
}

fn control_request(st: &mut FakeState, code: u32, input: &[u8], output: &mut [u8]) -> Result<usize, OsError> {
    match code {
        IOCTL_IMDISK_CREATE_DEVICE => {
            if let Some(code) = st.create_error {
                return Err(OsError::new(code));
            }
            let mut data =
                CreateData::decode(input).map_err(|_| OsError::new(codes::ERROR_INVALID_PARAMETER))?;
            let number = if data.device_number == IMDISK_AUTO_DEVICE_NUMBER {
                (0u32..).find(|n| !st.devices.contains_key(n)).unwrap()
            } else if st.devices.contains_key(&data.device_number) {
                return Err(OsError::new(codes::ERROR_ALREADY_EXISTS));
            } else {
                data.device_number
            };
            data.device_number = number;

            if let Some(c) = data.drive_letter {
                let name = format!("{c}:");
                if st.dos_devices.contains_key(&name) {
                    data.drive_letter = None;
                } else {
                    st.dos_devices.insert(name, device_path(number));
                }
            }
            st.event(format!("create {number}"));
            st.devices.insert(
                number,
                FakeDevice { data: data.clone(), locked: false, dismounted: false, busy: false },
            );
            let reply = data.encode().map_err(|_| OsError::new(codes::ERROR_INVALID_PARAMETER))?;
            Ok(write_reply(output, &reply))
        }
        IOCTL_IMDISK_REMOVE_DEVICE => {
            let number = u32::from_le_bytes(input[..4].try_into().unwrap());
            if st.devices.remove(&number).is_none() {
                return Err(OsError::new(codes::ERROR_FILE_NOT_FOUND));
            }
            st.event(format!("remove {number}"));
            Ok(0)
        }
        _ => Err(OsError::new(codes::ERROR_INVALID_FUNCTION)),
    }
}

fn device_request(st: &mut FakeState, number: u32, code: u32, output: &mut [u8]) -> Result<usize, OsError> {
    if code == FSCTL_UNLOCK_VOLUME {
        st.event("unlock-volume");
        if let Some(dev) = st.devices.get_mut(&number) {
            dev.locked = false;
        }
        return Ok(0);
    }

    let short_reply = st.short_query_reply;
    let eject_error = st.eject_error;
    let Some(dev) = st.devices.get_mut(&number) else {
        return Err(OsError::new(codes::ERROR_FILE_NOT_FOUND));
    };

    match code {
        IOCTL_IMDISK_QUERY_DEVICE => {
            let reply = dev.data.encode().map_err(|_| OsError::new(codes::ERROR_INVALID_PARAMETER))?;
            let reply = if short_reply { &reply[..20] } else { &reply[..] };
            Ok(write_reply(output, reply))
        }
        FSCTL_LOCK_VOLUME => {
            if dev.busy && !dev.dismounted {
                st.event("lock-volume refused");
                return Err(OsError::new(codes::ERROR_ACCESS_DENIED));
            }
            dev.locked = true;
            st.event("lock-volume");
            Ok(0)
        }
        FSCTL_DISMOUNT_VOLUME => {
            dev.dismounted = true;
            st.event("dismount");
            Ok(0)
        }
        IOCTL_STORAGE_EJECT_MEDIA => {
            if let Some(code) = eject_error {
                st.event("eject refused");
                return Err(OsError::new(code));
            }
            st.devices.remove(&number);
            st.event("eject");
            Ok(0)
        }
        _ => Err(OsError::new(codes::ERROR_INVALID_FUNCTION)),
    }
}

struct FakeLock {
    state: Arc<Mutex<FakeState>>,
    released: bool,
}

impl NamedLock for FakeLock {
    fn release(mut self: Box<Self>) -> Result<(), OsError> {
        self.released = true;
        let mut st = self.state.lock().unwrap();
        st.lock_held = false;
        st.event("release-lock");
        Ok(())
    }
}

impl Drop for FakeLock {
    fn drop(&mut self) {
        if !self.released {
            self.state.lock().unwrap().lock_held = false;
        }
    }
}

impl Platform for FakePlatform {
    fn open_device(&self, name: &str, access: Access) -> Result<Box<dyn DeviceHandle>, OsError> {
        let target = {
            let mut st = self.state();
            st.event(format!("open {name} {access:?}"));
            if st.denied.contains(&access) {
                return Err(OsError::new(codes::ERROR_ACCESS_DENIED));
            }

            let resolved = match name.strip_prefix(r"\\.\") {
                Some(letter) => st.dos_devices.get(letter).cloned(),
                None => Some(name.to_string()),
            };
            let Some(kernel_name) = resolved else {
                return Err(OsError::new(codes::ERROR_FILE_NOT_FOUND));
            };

            if st.denied_devices.contains(&kernel_name) {
                return Err(OsError::new(codes::ERROR_ACCESS_DENIED));
            }
            if kernel_name == IMDISK_CTL_DEVICE_NAME && st.driver_loaded {
                Target::Control
            } else if kernel_name == AWEALLOC_DEVICE_NAME && st.awealloc_loaded {
                Target::AweAlloc
            } else {
                match device_number_from_path(&kernel_name) {
                    Some(n) if st.devices.contains_key(&n) => Target::Device(n),
                    _ => return Err(OsError::new(codes::ERROR_FILE_NOT_FOUND)),
                }
            }
        };
        Ok(self.handle(target))
    }

    fn start_service(&self, service: &str) -> Result<(), OsError> {
        let mut st = self.state();
        st.event(format!("start {service}"));
        if let Some(&code) = st.start_errors.get(service) {
            return Err(OsError::new(code));
        }
        match service {
            IMDISK_DRIVER_NAME if !st.driver_installed => Err(OsError::new(codes::ERROR_SERVICE_DOES_NOT_EXIST)),
            IMDISK_DRIVER_NAME if st.driver_loaded => Err(OsError::new(codes::ERROR_SERVICE_ALREADY_RUNNING)),
            IMDISK_DRIVER_NAME => {
                st.driver_loaded = true;
                Ok(())
            }
            AWEALLOC_DRIVER_NAME => {
                st.awealloc_loaded = true;
                Ok(())
            }
            IMDPROXY_SVC => {
                st.proxy_started = true;
                Ok(())
            }
            _ => Err(OsError::new(codes::ERROR_SERVICE_DOES_NOT_EXIST)),
        }
    }

    fn probe_pipe(&self, _pipe: &str) -> Result<(), OsError> {
        let mut st = self.state();
        st.event("probe-pipe");
        if !st.proxy_pipe_up && st.proxy_started {
            if st.proxy_pipe_delay == 0 {
                st.proxy_pipe_up = true;
            } else {
                st.proxy_pipe_delay -= 1;
            }
        }
        if st.proxy_pipe_up { Ok(()) } else { Err(OsError::new(codes::ERROR_FILE_NOT_FOUND)) }
    }

    fn probe_global_namespace(&self) -> Result<(), OsError> {
        if self.state().global_namespace { Ok(()) } else { Err(OsError::new(codes::ERROR_FILE_NOT_FOUND)) }
    }

    fn full_path(&self, path: &str) -> Result<String, OsError> {
        let absolute = path.starts_with(r"\\") || path.as_bytes().get(1) == Some(&b':');
        Ok(if absolute { path.to_string() } else { format!(r"C:\work\{path}") })
    }

    fn sleep(&self, duration: Duration) {
        self.state().event(format!("sleep {}ms", duration.as_millis()));
    }

    fn yield_now(&self) {}

    fn query_dos_device(&self, name: &str) -> Result<String, OsError> {
        self.state()
            .dos_devices
            .get(name)
            .cloned()
            .ok_or_else(|| OsError::new(codes::ERROR_FILE_NOT_FOUND))
    }

    fn define_dos_device(&self, name: &str, target: &str) -> Result<(), OsError> {
        let mut st = self.state();
        st.event(format!("define {name} {target}"));
        st.dos_devices.insert(name.to_string(), target.to_string());
        Ok(())
    }

    fn remove_dos_device(&self, name: &str, target: Option<&str>) -> Result<(), OsError> {
        let mut st = self.state();
        match (st.dos_devices.get(name), target) {
            (None, _) => return Err(OsError::new(codes::ERROR_FILE_NOT_FOUND)),
            (Some(current), Some(t)) if current != t => return Err(OsError::new(codes::ERROR_FILE_NOT_FOUND)),
            _ => {}
        }
        st.dos_devices.remove(name);
        st.event(format!("undefine {name}"));
        Ok(())
    }

    fn logical_drives(&self) -> u32 {
        let st = self.state();
        st.dos_devices
            .keys()
            .filter_map(|k| k.chars().next())
            .filter(|c| c.is_ascii_uppercase())
            .fold(st.logical_drives, |mask, c| mask | 1 << (c as u32 - 'A' as u32))
    }

    fn notify_remove_pending(&self, letter: char) {
        self.state().event(format!("notify {letter}"));
    }

    fn supports_directory_mount_points(&self) -> bool {
        self.state().dir_mount_supported
    }

    fn create_mount_point(&self, dir: &Path, target: &str) -> Result<(), OsError> {
        let mut st = self.state();
        if let Some(code) = st.mount_point_error {
            return Err(OsError::new(code));
        }
        if st.mount_points.contains_key(dir) {
            return Err(OsError::new(codes::ERROR_DIR_NOT_EMPTY));
        }
        st.event(format!("mount {} {target}", dir.display()));
        st.mount_points.insert(dir.to_path_buf(), target.to_string());
        Ok(())
    }

    fn remove_mount_point(&self, dir: &Path) -> Result<(), OsError> {
        let mut st = self.state();
        if st.mount_points.remove(dir).is_none() {
            return Err(OsError::new(codes::ERROR_NOT_A_REPARSE_POINT));
        }
        st.event(format!("unmount {}", dir.display()));
        Ok(())
    }

    fn query_mount_point(&self, dir: &Path) -> Result<String, OsError> {
        self.state()
            .mount_points
            .get(dir)
            .cloned()
            .ok_or_else(|| OsError::new(codes::ERROR_NOT_A_REPARSE_POINT))
    }

    fn open_mount_point(&self, dir: &Path, access: Access) -> Result<Box<dyn DeviceHandle>, OsError> {
        let target = self.query_mount_point(dir)?;
        self.open_device(&target, access)
    }

    fn acquire_named_lock(&self, name: &str) -> Result<Box<dyn NamedLock>, OsError> {
        let mut st = self.state();
        assert!(!st.lock_held, "format lock acquired twice");
        st.lock_held = true;
        st.lock_acquisitions += 1;
        st.event(format!("acquire-lock {name}"));
        Ok(Box::new(FakeLock { state: self.state.clone(), released: false }))
    }

    fn run_process(&self, program: &Path, args: &[String]) -> Result<i32, OsError> {
        let mut st = self.state();
        st.event(format!("run {}", args.join(" ")));
        if let Some(code) = st.spawn_error {
            return Err(OsError::new(code));
        }
        st.processes.push((program.to_path_buf(), args.to_vec()));
        Ok(st.format_exit_code)
    }
}
