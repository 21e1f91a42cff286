/// Logs a progress line tagged with the lifecycle component that emitted it.
/// Usage:
/// ```rust
/// use log::Level;
/// ramdisk::ramdisk_log!(Level::Info, "remove", "Locking volume...");
/// ramdisk::ramdisk_log!(Level::Error, "create", "Error creating virtual disk: {}", 5);
/// ```
/// The component becomes the record target (`ramdisk::remove`), so the fern
/// line format prints it next to the level:
/// [2025-04-25T16:32:10+02:00][INFO ][ramdisk::remove][pid=4568][tid=ThreadId(1)] Locking volume...
#[macro_export]
macro_rules! ramdisk_log {
    ($level:expr, $component:literal, $($arg:tt)+) => {
        log::log!(target: concat!("ramdisk::", $component), $level, $($arg)+)
    };
}
