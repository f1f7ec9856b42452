//! Kernel-style print macros for the weft runtime
//!
//! Thread-safe leveled output in the manner of the Linux kernel's printk.
//! Lines go to stderr by default; `set_error_stream` redirects them to any
//! writer (the runtime surface exposes this for embedding applications).
//!
//! # Environment Variables
//!
//! - `WEFT_LOG_LEVEL=<level>` - 0=off, 1=error, 2=warn, 3=info, 4=debug, 5=trace
//! - `WEFT_FLUSH_EPRINT=1` - flush after each line (useful when debugging crashes)

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Mutex;

/// Log levels, in decreasing severity
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Off,
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            LogLevel::Off => "",
            LogLevel::Error => "[ERROR]",
            LogLevel::Warn => "[WARN] ",
            LogLevel::Info => "[INFO] ",
            LogLevel::Debug => "[DEBUG]",
            LogLevel::Trace => "[TRACE]",
        }
    }
}

static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);
static FLUSH_ENABLED: AtomicBool = AtomicBool::new(false);
static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Redirected sink; `None` means stderr.
static ERROR_STREAM: Mutex<Option<Box<dyn Write + Send>>> = Mutex::new(None);

/// Initialize from environment variables.
///
/// Called automatically on first use; calling explicitly makes the
/// initialization point deterministic.
pub fn init() {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }
    if let Ok(val) = std::env::var("WEFT_LOG_LEVEL") {
        let level = match val.to_lowercase().as_str() {
            "off" | "0" => LogLevel::Off,
            "error" | "1" => LogLevel::Error,
            "warn" | "2" => LogLevel::Warn,
            "info" | "3" => LogLevel::Info,
            "debug" | "4" => LogLevel::Debug,
            "trace" | "5" => LogLevel::Trace,
            _ => LogLevel::Info,
        };
        LOG_LEVEL.store(level as u8, Ordering::Relaxed);
    }
    if crate::env::env_get_bool("WEFT_FLUSH_EPRINT", false) {
        FLUSH_ENABLED.store(true, Ordering::Relaxed);
    }
}

/// Get the current log level
#[inline]
pub fn log_level() -> LogLevel {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    LogLevel::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

/// Set the log level programmatically
pub fn set_log_level(level: LogLevel) {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

/// Set the flush-per-line mode programmatically
pub fn set_flush_enabled(enabled: bool) {
    FLUSH_ENABLED.store(enabled, Ordering::Relaxed);
}

/// Redirect runtime output to `stream` instead of stderr.
pub fn set_error_stream(stream: Box<dyn Write + Send>) {
    *ERROR_STREAM.lock().unwrap_or_else(|e| e.into_inner()) = Some(stream);
}

/// Restore the default stderr sink.
pub fn reset_error_stream() {
    *ERROR_STREAM.lock().unwrap_or_else(|e| e.into_inner()) = None;
}

/// Check whether a log level is enabled
#[inline]
pub fn level_enabled(level: LogLevel) -> bool {
    level as u8 <= log_level() as u8
}

fn write_line(prefix: &str, args: std::fmt::Arguments<'_>) {
    let flush = FLUSH_ENABLED.load(Ordering::Relaxed);
    let mut sink = ERROR_STREAM.lock().unwrap_or_else(|e| e.into_inner());
    match sink.as_mut() {
        Some(stream) => {
            if !prefix.is_empty() {
                let _ = write!(stream, "{} ", prefix);
            }
            let _ = stream.write_fmt(args);
            let _ = stream.write_all(b"\n");
            if flush {
                let _ = stream.flush();
            }
        }
        None => {
            let stderr = std::io::stderr();
            let mut handle = stderr.lock();
            if !prefix.is_empty() {
                let _ = write!(handle, "{} ", prefix);
            }
            let _ = handle.write_fmt(args);
            let _ = handle.write_all(b"\n");
            if flush {
                let _ = handle.flush();
            }
        }
    }
}

/// Internal: unconditional line output
#[doc(hidden)]
pub fn _kprintln_impl(args: std::fmt::Arguments<'_>) {
    write_line("", args);
}

/// Internal: leveled line output
#[doc(hidden)]
pub fn _klog_impl(level: LogLevel, args: std::fmt::Arguments<'_>) {
    if !level_enabled(level) {
        return;
    }
    write_line(level.prefix(), args);
}

/// Print a line to the runtime's error stream, unconditionally
#[macro_export]
macro_rules! kprintln {
    () => {{
        $crate::kprint::_kprintln_impl(format_args!(""));
    }};
    ($($arg:tt)*) => {{
        $crate::kprint::_kprintln_impl(format_args!($($arg)*));
    }};
}

/// Error level log
#[macro_export]
macro_rules! kerror {
    ($($arg:tt)*) => {{
        $crate::kprint::_klog_impl($crate::kprint::LogLevel::Error, format_args!($($arg)*));
    }};
}

/// Warning level log
#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)*) => {{
        $crate::kprint::_klog_impl($crate::kprint::LogLevel::Warn, format_args!($($arg)*));
    }};
}

/// Info level log
#[macro_export]
macro_rules! kinfo {
    ($($arg:tt)*) => {{
        $crate::kprint::_klog_impl($crate::kprint::LogLevel::Info, format_args!($($arg)*));
    }};
}

/// Debug level log
#[macro_export]
macro_rules! kdebug {
    ($($arg:tt)*) => {{
        $crate::kprint::_klog_impl($crate::kprint::LogLevel::Debug, format_args!($($arg)*));
    }};
}

/// Trace level log (most verbose)
#[macro_export]
macro_rules! ktrace {
    ($($arg:tt)*) => {{
        $crate::kprint::_klog_impl($crate::kprint::LogLevel::Trace, format_args!($($arg)*));
    }};
}
