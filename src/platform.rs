//! Platform seam
//!
//! Everything the entry protocol consumes from the rest of the kernel goes
//! through [`TrapPlatform`]: CPU identity, side-band registers, the
//! execution-context tracker, the hardirq tracer, handler bodies, the log
//! sink and the terminal path. Every method has a bare-metal default, so a
//! kernel only overrides what it owns.
//!
//! A platform is installed once during early boot. Until then (and on
//! kernels that never install one) [`platform`] returns the bare-metal
//! default.

use core::fmt;
use core::ops::Range;

use spin::Once;
use x86_64::structures::idt::PageFaultErrorCode;

use crate::arch;
use crate::context_tracking::{self, ContextState};
use crate::interrupts::fault::{DebugCause, DieReport};
use crate::interrupts::InterruptedContext;
use crate::irqflags;
use crate::logger::{self, LogLevel};

/// Result of a delegated handler body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapOutcome {
    /// The condition was dealt with; resume the interrupted context.
    Handled,
    /// Nothing claimed the trap.
    Unhandled,
}

/// Current kernel stack and the guard region directly below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelStack {
    /// Lowest usable address.
    pub bottom: u64,
    /// One past the highest usable address.
    pub top: u64,
    pub guard_size: u64,
}

impl KernelStack {
    pub fn guard(&self) -> Range<u64> {
        self.bottom.saturating_sub(self.guard_size)..self.bottom
    }

    pub fn in_guard(&self, addr: u64) -> bool {
        self.guard().contains(&addr)
    }

    pub fn contains(&self, addr: u64) -> bool {
        (self.bottom..self.top).contains(&addr)
    }
}

pub trait TrapPlatform: Sync {
    fn cpu_id(&self) -> usize {
        0
    }

    fn read_cr2(&self) -> u64 {
        arch::read_cr2()
    }

    fn read_dr6(&self) -> u64 {
        arch::read_dr6()
    }

    /// Monotonic tick counter used for log timestamps and the hwlat tracer.
    fn timestamp(&self) -> u64 {
        arch::read_tsc()
    }

    /// Kernel stack of the current task, if the kernel has guard pages.
    fn kernel_stack(&self) -> Option<KernelStack> {
        None
    }

    fn ct_state(&self) -> ContextState {
        context_tracking::ct_state()
    }

    fn user_exit_irqoff(&self) {
        context_tracking::user_exit_irqoff()
    }

    fn user_enter_irqoff(&self) {
        context_tracking::user_enter_irqoff()
    }

    fn hardirqs_traced(&self) -> bool {
        irqflags::hardirqs_enabled()
    }

    fn trace_hardirqs_off(&self) {
        irqflags::trace_hardirqs_off()
    }

    fn trace_hardirqs_on(&self) {
        irqflags::trace_hardirqs_on()
    }

    /// Body of every vector without a dedicated delegate.
    fn handle_trap(&self, vector: u8, ctx: &mut InterruptedContext, error_code: u64) -> TrapOutcome {
        let _ = (vector, ctx, error_code);
        TrapOutcome::Unhandled
    }

    fn handle_page_fault(
        &self,
        ctx: &mut InterruptedContext,
        error_code: PageFaultErrorCode,
        address: u64,
    ) -> TrapOutcome {
        let _ = (ctx, error_code, address);
        TrapOutcome::Unhandled
    }

    fn handle_debug(&self, ctx: &mut InterruptedContext, dr6: u64, cause: DebugCause) -> TrapOutcome {
        let _ = (ctx, dr6, cause);
        TrapOutcome::Unhandled
    }

    /// Pending KVM async page-fault reason; zero means none.
    fn kvm_async_pf_flags(&self) -> u32 {
        0
    }

    fn write_log(&self, level: LogLevel, timestamp_us: u64, args: fmt::Arguments<'_>) {
        logger::emit_serial_line(level, timestamp_us, args)
    }

    /// Terminal path. Must not return.
    fn die(&self, report: &DieReport<'_>) -> ! {
        let _ = report;
        arch::halt_loop()
    }
}

struct BareMetal;

impl TrapPlatform for BareMetal {}

static BARE_METAL: BareMetal = BareMetal;
static PLATFORM: Once<&'static dyn TrapPlatform> = Once::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformError {
    AlreadyInstalled,
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformError::AlreadyInstalled => f.write_str("trap platform already installed"),
        }
    }
}

/// Install the kernel's platform. Only the first call wins.
pub fn install(platform: &'static dyn TrapPlatform) -> Result<(), PlatformError> {
    let mut installed = false;
    PLATFORM.call_once(|| {
        installed = true;
        platform
    });
    if installed {
        Ok(())
    } else {
        Err(PlatformError::AlreadyInstalled)
    }
}

pub fn is_installed() -> bool {
    PLATFORM.is_completed()
}

#[inline]
pub fn platform() -> &'static dyn TrapPlatform {
    match PLATFORM.get() {
        Some(platform) => *platform,
        None => &BARE_METAL,
    }
}
