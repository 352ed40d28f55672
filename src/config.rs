//! Entry-layer configuration
//!
//! Build-time choices come from Cargo features and are exposed as consts.
//! Run-time knobs live in atomics and are set from the kernel command line:
//!
//! ```text
//! context_tracking=on|off   user/kernel domain transitions on entry
//! hwlat=on|off              hardware-latency tracer NMI callbacks
//! panic_on_unrecovered_nmi=on|off
//! ist_strict=on|off         panic on entry pairing defects
//! loglevel=<level>          logger max level
//! tsc_khz=<n>               timestamp counter rate for log uptimes
//! ```

use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::logger::{self, LogLevel};

/// 64-bit class build: IST classes use dedicated stacks.
pub const X86_64: bool = !cfg!(feature = "x86_32");

pub const SMP: bool = cfg!(feature = "smp");
pub const X86_MCE: bool = cfg!(feature = "x86_mce");
pub const KVM_GUEST: bool = cfg!(feature = "kvm_guest");
pub const KVM_HOST: bool = cfg!(feature = "kvm_host");
pub const XEN_PV: bool = cfg!(feature = "xen_pv");
pub const HWLAT_TRACER: bool = cfg!(feature = "hwlat_tracer");

static CONTEXT_TRACKING: AtomicBool = AtomicBool::new(cfg!(feature = "context_tracking"));
static HWLAT_CALLBACK: AtomicBool = AtomicBool::new(false);
static PANIC_ON_UNRECOVERED_NMI: AtomicBool = AtomicBool::new(false);
static STRICT_PAIRING: AtomicBool = AtomicBool::new(cfg!(debug_assertions));

#[inline]
pub fn context_tracking() -> bool {
    CONTEXT_TRACKING.load(Ordering::Relaxed)
}

/// Whether the hwlat tracer wants NMI callbacks. Always false unless the
/// tracer is built in.
#[inline]
pub fn hwlat_callback_enabled() -> bool {
    HWLAT_TRACER && HWLAT_CALLBACK.load(Ordering::Relaxed)
}

#[inline]
pub fn panic_on_unrecovered_nmi() -> bool {
    PANIC_ON_UNRECOVERED_NMI.load(Ordering::Relaxed)
}

#[inline]
pub fn strict_pairing() -> bool {
    STRICT_PAIRING.load(Ordering::Relaxed)
}

/// Snapshot of the run-time knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryConfig {
    pub context_tracking: bool,
    pub hwlat: bool,
    pub panic_on_unrecovered_nmi: bool,
    pub strict_pairing: bool,
    pub log_level: LogLevel,
    pub tsc_khz: u64,
}

impl EntryConfig {
    pub fn current() -> Self {
        Self {
            context_tracking: context_tracking(),
            hwlat: HWLAT_CALLBACK.load(Ordering::Relaxed),
            panic_on_unrecovered_nmi: panic_on_unrecovered_nmi(),
            strict_pairing: strict_pairing(),
            log_level: logger::max_level(),
            tsc_khz: logger::ticks_per_us() * 1_000,
        }
    }

    /// Start from the current settings and apply every recognised
    /// directive. Unknown keys are left for other subsystems.
    pub fn from_cmdline(cmdline: &str) -> Result<Self, ConfigError> {
        let mut cfg = Self::current();
        for token in cmdline.split_whitespace() {
            let Some((key, value)) = token.split_once('=') else {
                continue;
            };
            if key.eq_ignore_ascii_case("context_tracking") {
                cfg.context_tracking = parse_switch(value).ok_or(ConfigError::BadSwitch("context_tracking"))?;
            } else if key.eq_ignore_ascii_case("hwlat") {
                cfg.hwlat = parse_switch(value).ok_or(ConfigError::BadSwitch("hwlat"))?;
            } else if key.eq_ignore_ascii_case("panic_on_unrecovered_nmi") {
                cfg.panic_on_unrecovered_nmi =
                    parse_switch(value).ok_or(ConfigError::BadSwitch("panic_on_unrecovered_nmi"))?;
            } else if key.eq_ignore_ascii_case("ist_strict") {
                cfg.strict_pairing = parse_switch(value).ok_or(ConfigError::BadSwitch("ist_strict"))?;
            } else if key.eq_ignore_ascii_case("log") || key.eq_ignore_ascii_case("loglevel") {
                cfg.log_level = LogLevel::from_str(value).ok_or(ConfigError::BadLogLevel)?;
            } else if key.eq_ignore_ascii_case("tsc_khz") {
                cfg.tsc_khz = value
                    .parse::<u64>()
                    .ok()
                    .filter(|khz| *khz >= 1_000)
                    .ok_or(ConfigError::BadNumber("tsc_khz"))?;
            }
        }
        Ok(cfg)
    }

    pub fn apply(&self) {
        CONTEXT_TRACKING.store(self.context_tracking, Ordering::Relaxed);
        HWLAT_CALLBACK.store(self.hwlat, Ordering::Relaxed);
        PANIC_ON_UNRECOVERED_NMI.store(self.panic_on_unrecovered_nmi, Ordering::Relaxed);
        STRICT_PAIRING.store(self.strict_pairing, Ordering::Relaxed);
        logger::set_max_level(self.log_level);
        logger::set_ticks_per_us(self.tsc_khz / 1_000);

        if self.hwlat && !HWLAT_TRACER {
            crate::kwarn!("config: hwlat requested but the tracer is not built in");
        }
    }
}

fn parse_switch(value: &str) -> Option<bool> {
    match value {
        "1" | "on" | "y" | "yes" | "true" => Some(true),
        "0" | "off" | "n" | "no" | "false" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Value of an on/off directive was not understood.
    BadSwitch(&'static str),
    BadLogLevel,
    /// Numeric directive out of range or not a number.
    BadNumber(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::BadSwitch(key) => write!(f, "{}= expects on/off", key),
            ConfigError::BadLogLevel => f.write_str("unknown log level"),
            ConfigError::BadNumber(key) => write!(f, "{}= expects a number", key),
        }
    }
}
