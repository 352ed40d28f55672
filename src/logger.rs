//! Leveled logging for the entry layer
//!
//! Records are filtered against a process-wide maximum level and handed to
//! [`TrapPlatform::write_log`](crate::platform::TrapPlatform::write_log).
//! The bare-metal sink prints one colored line per record on COM1, tagged
//! with the CPU that took the trap.

use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

use crate::platform::platform;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    PANIC,
    FATAL,
    ERROR,
    WARN,
    INFO,
    DEBUG,
    TRACE,
}

/// Indexed by `LogLevel as usize`: name, ANSI color.
const LEVELS: [(LogLevel, &str, &str); 7] = [
    (LogLevel::PANIC, "PANIC", "\x1b[1;37;41m"),
    (LogLevel::FATAL, "FATAL", "\x1b[1;37;41m"),
    (LogLevel::ERROR, "ERROR", "\x1b[1;31m"),
    (LogLevel::WARN, "WARN", "\x1b[33m"),
    (LogLevel::INFO, "INFO", "\x1b[32m"),
    (LogLevel::DEBUG, "DEBUG", "\x1b[36m"),
    (LogLevel::TRACE, "TRACE", "\x1b[90m"),
];

const COLOR_RESET: &str = "\x1b[0m";

/// Timestamp ticks per microsecond until the platform reports its rate.
const DEFAULT_TICKS_PER_US: u64 = 1_000;

static READY: AtomicBool = AtomicBool::new(false);
static MAX_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::INFO as u8);
static START_TICKS: AtomicU64 = AtomicU64::new(0);
static TICKS_PER_US: AtomicU64 = AtomicU64::new(DEFAULT_TICKS_PER_US);

impl LogLevel {
    pub const fn as_str(self) -> &'static str {
        LEVELS[self as usize].1
    }

    pub const fn priority(self) -> u8 {
        self as u8
    }

    fn color(self) -> &'static str {
        LEVELS[self as usize].2
    }

    /// Case-insensitive level name; `warning` is accepted for WARN.
    pub fn from_str(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("warning") {
            return Some(LogLevel::WARN);
        }
        LEVELS
            .iter()
            .find(|(_, name, _)| value.eq_ignore_ascii_case(name))
            .map(|(level, _, _)| *level)
    }
}

/// Latch the timestamp origin. Later calls are no-ops.
pub fn init() {
    if READY.swap(true, Ordering::SeqCst) {
        return;
    }
    START_TICKS.store(platform().timestamp(), Ordering::Relaxed);
}

pub fn is_initialized() -> bool {
    READY.load(Ordering::Relaxed)
}

pub fn enabled(level: LogLevel) -> bool {
    level.priority() <= MAX_LEVEL.load(Ordering::Relaxed)
}

pub fn set_max_level(level: LogLevel) {
    MAX_LEVEL.store(level.priority(), Ordering::Relaxed);
}

pub fn max_level() -> LogLevel {
    let raw = MAX_LEVEL.load(Ordering::Relaxed) as usize;
    LEVELS[raw.min(LEVELS.len() - 1)].0
}

/// Timestamp counter rate. Zero is ignored.
pub fn set_ticks_per_us(ticks: u64) {
    if ticks != 0 {
        TICKS_PER_US.store(ticks, Ordering::Relaxed);
    }
}

pub fn ticks_per_us() -> u64 {
    TICKS_PER_US.load(Ordering::Relaxed)
}

pub fn log(level: LogLevel, args: fmt::Arguments<'_>) {
    if enabled(level) {
        platform().write_log(level, uptime_us(), args);
    }
}

/// Microseconds since [`init`], or zero before it.
pub fn uptime_us() -> u64 {
    if !is_initialized() {
        return 0;
    }
    let elapsed = platform()
        .timestamp()
        .saturating_sub(START_TICKS.load(Ordering::Relaxed));
    elapsed / TICKS_PER_US.load(Ordering::Relaxed).max(1)
}

/// Bare-metal sink: `[uptime] [cpuN] [LEVEL] message` on COM1.
pub fn emit_serial_line(level: LogLevel, timestamp_us: u64, args: fmt::Arguments<'_>) {
    crate::serial::_print(format_args!(
        "{}[{}] [cpu{}] [{:<5}] {}{}\n",
        level.color(),
        TimestampDisplay {
            microseconds: timestamp_us
        },
        platform().cpu_id(),
        level.as_str(),
        args,
        COLOR_RESET,
    ));
}

/// `seconds.micros`, seconds right-aligned to five columns.
pub struct TimestampDisplay {
    pub microseconds: u64,
}

impl fmt::Display for TimestampDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>5}.{:06}",
            self.microseconds / 1_000_000,
            self.microseconds % 1_000_000
        )
    }
}
