// src/bin/ramdiskctl.rs

//! Command-line front-end for one-off create / remove / format operations.
//! The process exit code is the stable result code of the operation.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::Level;
use ramdisk::config::{self, Config};
use ramdisk::device::{BackingFile, DeviceDescriptor, DeviceNumber, MountPoint};
use ramdisk::error::exit_code;
use ramdisk::lifecycle::{Controller, CreateOptions, RemoveOptions};
use ramdisk::logging::setup_logging;
use ramdisk::settings::JsonSettingsStore;
use ramdisk::{ErrorKind, ramdisk_log, sys};
use shared::DiskGeometry;
use shared::constants::device_path;
use shared::flags::{BackingType, DeviceType, FileType, ProxyType};

#[derive(Parser, Debug)]
#[command(name = "ramdiskctl", version, about = "Create and remove ImDisk RAM disks")]
struct Cli {
    /// Configuration file (defaults apply when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a virtual disk
    Create(CreateArgs),
    /// Remove a virtual disk
    Remove(RemoveArgs),
    /// Format an existing virtual disk
    Format(FormatArgs),
}

#[derive(Args, Debug)]
struct CreateArgs {
    /// Disk size, e.g. 512M or 7G (defaults to the configured size)
    #[arg(short, long, value_parser = parse_size)]
    size: Option<u64>,

    /// Drive letter (R:) or empty NTFS directory
    #[arg(short, long)]
    mount: Option<String>,

    /// Device number to request instead of the first free one
    #[arg(short = 'u', long)]
    number: Option<u32>,

    #[arg(long, value_enum, default_value_t = DiskKind::Hd)]
    device_type: DiskKind,

    #[arg(long, value_enum, default_value_t = Backing::Vm)]
    backing: Backing,

    /// Physical memory (AWEAlloc) or parallel I/O for file backing
    #[arg(long, value_enum)]
    file_type: Option<FileKind>,

    #[arg(long, value_enum)]
    proxy_type: Option<ProxyKind>,

    /// Image file, proxy connection string or shared memory name
    #[arg(short, long)]
    file: Option<String>,

    /// Pass --file to the driver unchanged
    #[arg(long)]
    native: bool,

    /// Byte offset of the disk inside the image file
    #[arg(long, default_value_t = 0)]
    offset: i64,

    #[arg(long)]
    readonly: bool,

    #[arg(long)]
    removable: bool,

    /// Options for format.com after the drive letter, e.g. "/fs:ntfs /q /y"
    #[arg(short = 'p', long)]
    format: Option<String>,

    #[arg(long)]
    save_settings: bool,

    /// Print only the device number
    #[arg(long)]
    numeric: bool,
}

#[derive(Args, Debug)]
struct RemoveArgs {
    #[arg(short = 'u', long)]
    number: Option<u32>,

    #[arg(short, long)]
    mount: Option<String>,

    /// Dismount and remove even when the volume is in use
    #[arg(short = 'D', long)]
    force: bool,

    /// Drop the device without any graceful step
    #[arg(short = 'R', long)]
    emergency: bool,

    #[arg(long)]
    remove_settings: bool,
}

#[derive(Args, Debug)]
struct FormatArgs {
    /// Device number to format
    #[arg(short = 'u', long)]
    number: u32,

    /// Drive letter to format through (first free letter when omitted)
    #[arg(short, long)]
    letter: Option<char>,

    #[arg(short = 'p', long, default_value = "/fs:ntfs /q /y")]
    options: String,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum DiskKind {
    Hd,
    Fd,
    Cd,
    Raw,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Backing {
    Vm,
    File,
    Proxy,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum FileKind {
    Awe,
    Parallel,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum ProxyKind {
    Comm,
    Tcp,
    Shm,
}

/// `4096`, `64K`, `512M`, `7G`, `1T` (binary multiples).
fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let (digits, shift) = match s.char_indices().last() {
        Some((i, c)) if c.is_ascii_alphabetic() => {
            let shift = match c.to_ascii_uppercase() {
                'K' => 10,
                'M' => 20,
                'G' => 30,
                'T' => 40,
                other => return Err(format!("unknown size suffix '{other}'")),
            };
            (&s[..i], shift)
        }
        _ => (s, 0),
    };
    let value: u64 = digits.parse().map_err(|e| format!("invalid size '{s}': {e}"))?;
    value
        .checked_shl(shift)
        .filter(|v| v >> shift == value && *v > 0)
        .ok_or_else(|| format!("size '{s}' out of range"))
}

impl CreateArgs {
    fn descriptor(&self, default_size: u64) -> DeviceDescriptor {
        let mut flags = shared::DeviceFlags::default()
            .with_device_type(match self.device_type {
                DiskKind::Hd => DeviceType::HardDisk,
                DiskKind::Fd => DeviceType::Floppy,
                DiskKind::Cd => DeviceType::CdRom,
                DiskKind::Raw => DeviceType::Raw,
            })
            .with_backing(match self.backing {
                Backing::Vm => BackingType::VirtualMemory,
                Backing::File => BackingType::File,
                Backing::Proxy => BackingType::Proxy,
            })
            .with_read_only(self.readonly)
            .with_removable(self.removable);
        if let Some(kind) = self.file_type {
            flags = flags.with_file_type(match kind {
                FileKind::Awe => FileType::AweAlloc,
                FileKind::Parallel => FileType::ParallelIo,
            });
        }
        if let Some(kind) = self.proxy_type {
            flags = flags.with_proxy_type(match kind {
                ProxyKind::Comm => ProxyType::Comm,
                ProxyKind::Tcp => ProxyType::Tcp,
                ProxyKind::Shm => ProxyType::SharedMemory,
            });
        }

        DeviceDescriptor {
            device_number: self.number.map_or(DeviceNumber::Auto, DeviceNumber::Number),
            // file-backed disks take their size from the image unless given
            geometry: DiskGeometry::sized(self.size.unwrap_or(match self.backing {
                Backing::Vm => default_size,
                _ => 0,
            })),
            image_offset: self.offset,
            flags,
            backing_file: self.file.clone().map(|f| {
                if self.native { BackingFile::Native(f) } else { BackingFile::Path(f) }
            }),
        }
    }
}

fn parse_mount(s: &Option<String>) -> Option<MountPoint> {
    s.as_deref().and_then(|m| m.parse().ok())
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(p) => config::load(p).with_context(|| format!("loading {}", p.display())),
        None => Ok(Config::default()),
    }
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    let cfg = load_config(cli.config.as_ref())?;
    let base = std::env::current_dir().context("current directory")?;
    setup_logging(&base, &cfg.logging).map_err(|e| anyhow!("logging setup failed: {e}"))?;

    let platform = sys::native().ok_or_else(|| anyhow!("ramdiskctl only runs on Windows"))?;
    let settings = Arc::new(JsonSettingsStore::new(base.join(&cfg.settings.path)));
    let controller = Controller::new(platform, cfg.driver.clone(), cfg.format.clone()).with_settings(settings);

    let code = match cli.command {
        Command::Create(args) => {
            let mut desc = args.descriptor(cfg.disk.size_bytes);
            let opts = CreateOptions {
                mount_point: parse_mount(&args.mount),
                format_options: args.format.clone(),
                save_settings: args.save_settings,
            };
            let result = controller.create(&mut desc, &opts);
            match &result {
                Ok(created) if args.numeric => println!("{}", created.device_number),
                Ok(created) => println!(
                    "Created device {}: {} -> {}",
                    created.device_number,
                    created.mount_point.as_ref().map_or_else(|| "No mountpoint".into(), |m| m.to_string()),
                    args.file.as_deref().unwrap_or("Image in memory")
                ),
                Err(e) => eprintln!("{e}"),
            }
            exit_code(&result)
        }
        Command::Remove(args) => {
            let opts = RemoveOptions {
                device_number: args.number,
                mount_point: parse_mount(&args.mount),
                force_dismount: args.force,
                emergency: args.emergency,
                remove_settings: args.remove_settings,
            };
            let result = controller.remove(&opts);
            if let Err(e) = &result {
                eprintln!("{e}");
            }
            exit_code(&result)
        }
        Command::Format(args) => {
            let letter = args.letter.map(|c| c.to_ascii_uppercase());
            let result = controller.format_invoker().format(&device_path(args.number), letter, &args.options);
            if let Err(e) = &result {
                eprintln!("{e}");
            }
            exit_code(&result)
        }
    };
    ramdisk_log!(Level::Debug, "cli", "exit code {code}");
    Ok(code)
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            let code = if e.use_stderr() { ErrorKind::BadSyntax.code() } else { 0 };
            std::process::exit(code);
        }
    };

    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("ramdiskctl: {e:#}");
            ErrorKind::Fatal.code()
        }
    };
    std::process::exit(code);
}
