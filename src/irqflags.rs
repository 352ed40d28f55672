//! Hardirq tracing state and hardware-latency tracer hooks
//!
//! The tracing flag mirrors what the kernel believes the interrupt flag to
//! be. Low-level entry code disables interrupts in hardware before any of
//! this runs, so entry turns the traced state off to match, and the return
//! path turns it back on when the interrupted context had interrupts
//! enabled.

use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::config;
use crate::percpu::{PerCpu, PerCpuError, MAX_CPUS};

struct TraceCpu {
    enabled: AtomicBool,
    on_events: AtomicU64,
    off_events: AtomicU64,
}

impl TraceCpu {
    const fn new() -> Self {
        Self {
            enabled: AtomicBool::new(false),
            on_events: AtomicU64::new(0),
            off_events: AtomicU64::new(0),
        }
    }
}

#[allow(clippy::declare_interior_mutable_const)]
const TRACE_INIT: TraceCpu = TraceCpu::new();

static TRACE: PerCpu<TraceCpu> = PerCpu::new([TRACE_INIT; MAX_CPUS]);

pub fn hardirqs_enabled() -> bool {
    TRACE.this_cpu().enabled.load(Ordering::Relaxed)
}

pub fn trace_hardirqs_on() {
    let cpu = TRACE.this_cpu();
    if !cpu.enabled.swap(true, Ordering::Relaxed) {
        cpu.on_events.fetch_add(1, Ordering::Relaxed);
    }
}

pub fn trace_hardirqs_off() {
    let cpu = TRACE.this_cpu();
    if cpu.enabled.swap(false, Ordering::Relaxed) {
        cpu.off_events.fetch_add(1, Ordering::Relaxed);
    }
}

/// Number of off→on and on→off transitions seen on `cpu`.
pub fn transitions(cpu: usize) -> Result<(u64, u64), PerCpuError> {
    let slot = TRACE.get(cpu)?;
    Ok((
        slot.on_events.load(Ordering::Relaxed),
        slot.off_events.load(Ordering::Relaxed),
    ))
}

// Hardware-latency tracer: counts NMIs and the time spent handling them so
// the tracer can subtract NMI time from detected latencies.

struct HwlatCpu {
    nmi_count: AtomicU64,
    nmi_enter_ts: AtomicU64,
    nmi_total_ticks: AtomicU64,
}

#[allow(clippy::declare_interior_mutable_const)]
const HWLAT_INIT: HwlatCpu = HwlatCpu {
    nmi_count: AtomicU64::new(0),
    nmi_enter_ts: AtomicU64::new(0),
    nmi_total_ticks: AtomicU64::new(0),
};

static HWLAT: PerCpu<HwlatCpu> = PerCpu::new([HWLAT_INIT; MAX_CPUS]);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HwlatStats {
    pub nmi_count: u64,
    pub nmi_total_ticks: u64,
}

#[inline]
pub fn ftrace_count_nmi() {
    if config::hwlat_callback_enabled() {
        HWLAT.this_cpu().nmi_count.fetch_add(1, Ordering::Relaxed);
    }
}

#[inline]
pub fn ftrace_nmi_handler_enter() {
    if config::hwlat_callback_enabled() {
        hwlat_timestamp(true);
    }
}

#[inline]
pub fn ftrace_nmi_handler_exit() {
    if config::hwlat_callback_enabled() {
        hwlat_timestamp(false);
    }
}

fn hwlat_timestamp(enter: bool) {
    let cpu = HWLAT.this_cpu();
    let now = crate::platform::platform().timestamp();
    if enter {
        cpu.nmi_enter_ts.store(now, Ordering::Relaxed);
    } else {
        let start = cpu.nmi_enter_ts.load(Ordering::Relaxed);
        cpu.nmi_total_ticks
            .fetch_add(now.saturating_sub(start), Ordering::Relaxed);
    }
}

pub fn hwlat_stats(cpu: usize) -> Result<HwlatStats, PerCpuError> {
    let slot = HWLAT.get(cpu)?;
    Ok(HwlatStats {
        nmi_count: slot.nmi_count.load(Ordering::Relaxed),
        nmi_total_ticks: slot.nmi_total_ticks.load(Ordering::Relaxed),
    })
}
