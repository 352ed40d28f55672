//! NexaOS IDT entry protocol
//!
//! The layer between a raw hardware trap vector and the kernel's high-level
//! fault and interrupt handlers. It provides:
//! - The vector catalog: every trap vector with its trap class
//! - Entry/exit state tracking (hardirq tracing, user/kernel context domain)
//! - IST nesting bookkeeping for NMI, #MC, #DB and #DF
//! - The `declare_idtentry*!` / `define_idtentry*!` generator macros
//! - A model of the low-level stub contract used to drive entries
//!
//! Everything the core needs from the rest of the kernel goes through
//! [`platform::TrapPlatform`].

#![no_std]

pub mod arch;
pub mod config;
pub mod context_tracking;
pub mod interrupts;
pub mod irqflags;
pub mod logger;
pub mod percpu;
pub mod platform;
pub mod serial;

pub use interrupts::{InterruptedContext, IstFamily, TrapClass, Vector};
pub use platform::{platform, TrapPlatform};

#[macro_export]
macro_rules! klog {
    ($level:expr, $($arg:tt)*) => {{
        $crate::logger::log($level, format_args!($($arg)*));
    }};
}

#[macro_export]
macro_rules! kfatal {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::FATAL, $($arg)*);
    }};
}

#[macro_export]
macro_rules! kerror {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::ERROR, $($arg)*);
    }};
}

#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::WARN, $($arg)*);
    }};
}

#[macro_export]
macro_rules! kinfo {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::INFO, $($arg)*);
    }};
}

#[macro_export]
macro_rules! kdebug {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::DEBUG, $($arg)*);
    }};
}

#[macro_export]
macro_rules! ktrace {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::TRACE, $($arg)*);
    }};
}

/// Report an entry-protocol pairing defect.
///
/// Panics when strict pairing is enabled (the default in debug builds),
/// otherwise logs at ERROR level and lets the caller saturate its counters.
#[macro_export]
macro_rules! entry_bug {
    ($($arg:tt)*) => {{
        if $crate::config::strict_pairing() {
            panic!($($arg)*);
        } else {
            $crate::kerror!($($arg)*);
        }
    }};
}

/// Bring up the entry layer: apply the command line and check the catalog.
pub fn init(cmdline: &str) -> Result<(), InitError> {
    let cfg = config::EntryConfig::from_cmdline(cmdline).map_err(InitError::Config)?;
    cfg.apply();
    logger::init();
    interrupts::vectors::init().map_err(InitError::Catalog)?;
    kinfo!(
        "idtentry: {} vectors, {} redirects, context tracking {}",
        interrupts::vectors::enabled_vectors().count(),
        interrupts::vectors::redirects().count(),
        if cfg.context_tracking { "on" } else { "off" }
    );
    Ok(())
}

/// Errors from [`init`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitError {
    Config(config::ConfigError),
    Catalog(interrupts::vectors::CatalogError),
}

impl core::fmt::Display for InitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            InitError::Config(err) => write!(f, "bad command line: {}", err),
            InitError::Catalog(err) => write!(f, "vector catalog: {}", err),
        }
    }
}
