// src/main.rs

//! Agent entry-point: Windows service or console fallback.
//!
//! 1. Parse configuration & set up structured logging
//! 2. Register with the SCM (or run as a console fallback)
//! 3. Mount the RAM disk
//! 4. Wait for Stop / Shutdown, then unmount and exit cleanly

#[cfg(windows)]
fn main() {
    service::main();
}

#[cfg(not(windows))]
fn main() {
    eprintln!(
        "[{}][ERROR][main] The RAM disk agent only runs on Windows.",
        chrono::Local::now().to_rfc3339()
    );
    std::process::exit(ramdisk::ErrorKind::Fatal.code());
}

#[cfg(windows)]
mod service {
    // ───── std / 3rd-party imports ──────────────────────────────────────────
    use chrono::Local;
    use std::{
        ffi::OsString,
        io::BufRead,
        path::{Path, PathBuf},
        sync::{Arc, mpsc},
        time::Duration,
    };
    use windows_service::{
        define_windows_service,
        service::{
            ServiceControl, ServiceControlAccept, ServiceExitCode, ServiceState, ServiceStatus,
            ServiceType,
        },
        service_control_handler::{self, ServiceControlHandlerResult},
        service_dispatcher::start,
    };

    // ───── local imports ────────────────────────────────────────────────────
    use ramdisk::config::{self, Config};
    use ramdisk::lifecycle::Controller;
    use ramdisk::logging::setup_logging;
    use ramdisk::settings::JsonSettingsStore;
    use ramdisk::{RamDisk, RamDiskOwner, sys};

    // ───── service constants ────────────────────────────────────────────────
    const SERVICE_NAME: &str = "RamDisk";

    define_windows_service!(ffi_service_main, service_main);

    // ───── helpers ──────────────────────────────────────────────────────────

    /// Print an error with context and terminate the process.
    macro_rules! fatal {
        ($ctx:expr, $($arg:tt)+) => {{
            eprintln!(
                "[{}][ERROR][{}] {}",
                chrono::Local::now().to_rfc3339(),
                $ctx,
                format!($($arg)+)
            );
            std::process::exit(-1);
        }};
    }

    /// Directory that contains the running executable.
    fn exe_dir() -> PathBuf {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| fatal!("main", "Cannot determine executable directory"))
    }

    /// Load `default.toml` next to the executable; a missing file means defaults.
    fn load_cfg(exe_dir: &Path) -> Config {
        let path = exe_dir.join("default.toml");
        if !path.exists() {
            return Config::default();
        }
        config::load(&path).unwrap_or_else(|e| fatal!("config", "{}", e))
    }

    /// Build the process-wide disk owner from `cfg`.
    fn disk_owner(exe_dir: &Path, cfg: Config) -> RamDiskOwner<impl FnMut() -> RamDisk> {
        let platform = sys::native().unwrap_or_else(|| fatal!("main", "No native platform"));
        let settings = Arc::new(JsonSettingsStore::new(exe_dir.join(&cfg.settings.path)));
        RamDiskOwner::new(move || {
            let controller = Controller::new(platform.clone(), cfg.driver.clone(), cfg.format.clone())
                .with_settings(settings.clone());
            RamDisk::new(controller, cfg.disk.clone())
        })
    }

    // ───── service logic ────────────────────────────────────────────────────

    fn run_service() {
        // 1 ─ Context
        let exe_dir = exe_dir();
        let cfg = load_cfg(&exe_dir);

        // 2 ─ Logging
        if let Err(e) = setup_logging(&exe_dir, &cfg.logging) {
            fatal!("logging", "Logging setup failed: {}", e);
        }
        log::info!("Service bootstrap initiated");

        // 3 ─ Windows SCM registration
        let (svc_tx, svc_rx) = mpsc::sync_channel(1);
        let status_handle = service_control_handler::register(SERVICE_NAME, move |ctrl| match ctrl {
            ServiceControl::Stop | ServiceControl::Shutdown => {
                log::warn!("Stop requested via SCM");
                let _ = svc_tx.send(());
                ServiceControlHandlerResult::NoError
            }
            ServiceControl::Interrogate => ServiceControlHandlerResult::NoError,
            _ => ServiceControlHandlerResult::NotImplemented,
        })
        .unwrap_or_else(|e| fatal!("service", "Control handler registration failed: {}", e));

        let mut status = ServiceStatus {
            service_type: ServiceType::OWN_PROCESS,
            current_state: ServiceState::StartPending,
            controls_accepted: ServiceControlAccept::STOP | ServiceControlAccept::SHUTDOWN,
            exit_code: ServiceExitCode::Win32(0),
            checkpoint: 0,
            wait_hint: Duration::from_secs(60),
            process_id: None,
        };
        if let Err(e) = status_handle.set_service_status(status.clone()) {
            log::error!("Cannot report StartPending: {e}");
        }

        // 4 ─ Mount
        let mut owner = disk_owner(&exe_dir, cfg);
        if let Err(e) = owner.get().mount() {
            log::error!("Mount failed (code {}): {e}", e.exit_code());
        }
        status.current_state = ServiceState::Running;
        if let Err(e) = status_handle.set_service_status(status.clone()) {
            log::error!("Cannot report Running: {e}");
        }
        log::info!("Service running, disk mounted: {}", owner.get().was_mounted());

        // 5 ─ Wait for shutdown
        let _ = svc_rx.recv();
        log::warn!("Shutdown initiated");
        status.current_state = ServiceState::StopPending;
        let _ = status_handle.set_service_status(status.clone());

        let code = match owner.get().unmount() {
            Ok(()) => 0,
            Err(e) => {
                log::error!("Unmount failed: {e}");
                e.exit_code()
            }
        };
        owner.destroy();

        status.current_state = ServiceState::Stopped;
        status.exit_code = ServiceExitCode::ServiceSpecific(code as u32);
        if let Err(e) = status_handle.set_service_status(status) {
            log::error!("Cannot report Stopped: {e}");
        }
        log::info!("Service stopped cleanly");
    }

    /// Console mode: mount, wait for Enter, unmount.
    fn run_console() {
        let exe_dir = exe_dir();
        let cfg = load_cfg(&exe_dir);
        if let Err(e) = setup_logging(&exe_dir, &cfg.logging) {
            fatal!("logging", "Logging setup failed: {}", e);
        }

        let mut owner = disk_owner(&exe_dir, cfg);
        if let Err(e) = owner.get().mount() {
            log::error!("Mount failed (code {}): {e}", e.exit_code());
        }
        println!("RAM disk mounted: {}. Press Enter to unmount.", owner.get().was_mounted());

        let mut line = String::new();
        let _ = std::io::stdin().lock().read_line(&mut line);

        let code = match owner.get().unmount() {
            Ok(()) => 0,
            Err(e) => {
                log::error!("Unmount failed: {e}");
                e.exit_code()
            }
        };
        owner.destroy();
        std::process::exit(code);
    }

    // Windows SCM entry point.
    fn service_main(_args: Vec<OsString>) {
        run_service();
    }

    pub fn main() {
        // If registering as a service fails, run as a plain console app.
        if let Err(e) = start(SERVICE_NAME, ffi_service_main) {
            eprintln!(
                "[{}][ERROR][main] Not a service: {} – falling back to console.",
                Local::now().to_rfc3339(),
                e
            );
            run_console();
        }
    }
}
