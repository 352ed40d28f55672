//! Special-case handling shared by the entry bodies: the terminal path,
//! stack-overflow detection, page-fault escalation and #DB decoding.

use x86_64::structures::idt::PageFaultErrorCode;

use crate::interrupts::vectors::{X86_TRAP_DF, X86_TRAP_PF};
use crate::interrupts::InterruptedContext;
use crate::platform::{platform, TrapOutcome};
use crate::{kfatal, kwarn};

/// Everything the terminal path knows about the trap that killed the CPU.
#[derive(Debug, Clone, Copy)]
pub struct DieReport<'a> {
    pub message: &'a str,
    pub ctx: &'a InterruptedContext,
    pub vector: Option<u8>,
    pub error_code: u64,
    pub fault_address: Option<u64>,
}

/// The single terminal path. Logs the report and hands it to the platform.
pub fn die(report: &DieReport<'_>) -> ! {
    let ctx = report.ctx;
    match report.vector {
        Some(vector) => kfatal!(
            "{}: vector {} error {:#x} on CPU {}",
            report.message,
            vector,
            report.error_code,
            platform().cpu_id()
        ),
        None => kfatal!("{} on CPU {}", report.message, platform().cpu_id()),
    }
    kfatal!(
        "RIP {:#018x} CS {:#06x} RFLAGS {:#010x} RSP {:#018x} SS {:#06x}",
        ctx.rip,
        ctx.cs,
        ctx.rflags,
        ctx.rsp,
        ctx.ss
    );
    if let Some(address) = report.fault_address {
        kfatal!("fault address {:#018x}", address);
    }
    platform().die(report)
}

pub fn in_stack_guard(address: u64) -> bool {
    platform()
        .kernel_stack()
        .is_some_and(|stack| stack.in_guard(address))
}

/// The kernel ran off the end of its stack. Never returns.
pub fn handle_stack_overflow(message: &str, ctx: &InterruptedContext, fault_address: u64) -> ! {
    match platform().kernel_stack() {
        Some(stack) => {
            let guard = stack.guard();
            kfatal!(
                "BUG: stack guard page was hit at {:#x} (stack is {:#x}..{:#x}, guard {:#x}..{:#x})",
                fault_address,
                stack.bottom,
                stack.top,
                guard.start,
                guard.end
            );
        }
        None => kfatal!("BUG: stack guard page was hit at {:#x}", fault_address),
    }

    die(&DieReport {
        message,
        ctx,
        vector: None,
        error_code: 0,
        fault_address: Some(fault_address),
    })
}

/// Body of every plain exception vector.
pub fn do_error_trap(ctx: &mut InterruptedContext, error_code: u64, vector: u8, name: &str) {
    if platform().handle_trap(vector, ctx, error_code) == TrapOutcome::Handled {
        return;
    }

    if ctx.user_mode() {
        kwarn!(
            "{} in user mode: rip {:#x} rsp {:#x} error {:#x}",
            name,
            ctx.rip,
            ctx.rsp,
            error_code
        );
        return;
    }

    die(&DieReport {
        message: name,
        ctx,
        vector: Some(vector),
        error_code,
        fault_address: None,
    })
}

pub fn do_page_fault(ctx: &mut InterruptedContext, error_code: u64, address: u64) {
    let code = PageFaultErrorCode::from_bits_truncate(error_code);

    if platform().handle_page_fault(ctx, code, address) == TrapOutcome::Handled {
        return;
    }

    if ctx.user_mode() {
        kwarn!(
            "page fault: user access {:#x} at rip {:#x} ({:?}) not resolved",
            address,
            ctx.rip,
            code
        );
        return;
    }

    if in_stack_guard(address) {
        handle_stack_overflow("kernel stack overflow (page fault)", ctx, address);
    }

    die(&DieReport {
        message: "Oops: unresolved kernel page fault",
        ctx,
        vector: Some(X86_TRAP_PF),
        error_code,
        fault_address: Some(address),
    })
}

pub fn do_double_fault(ctx: &mut InterruptedContext, error_code: u64, address: u64) -> ! {
    if in_stack_guard(address) {
        handle_stack_overflow("kernel stack overflow (double-fault)", ctx, address);
    }

    die(&DieReport {
        message: "double fault",
        ctx,
        vector: Some(X86_TRAP_DF),
        error_code,
        fault_address: Some(address),
    })
}

// DR6 status bits
pub const DR_TRAP0: u64 = 1 << 0;
pub const DR_TRAP1: u64 = 1 << 1;
pub const DR_TRAP2: u64 = 1 << 2;
pub const DR_TRAP3: u64 = 1 << 3;
pub const DR_TRAP_BITS: u64 = DR_TRAP0 | DR_TRAP1 | DR_TRAP2 | DR_TRAP3;
pub const DR_STEP: u64 = 1 << 14;

// si_code values for SIGTRAP
pub const TRAP_BRKPT: i32 = 1;
pub const TRAP_TRACE: i32 = 2;
pub const TRAP_HWBKPT: i32 = 4;

/// Why #DB fired, as reported to user space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugCause {
    SingleStep,
    HwBreakpoint,
    Breakpoint,
}

impl DebugCause {
    pub const fn si_code(self) -> i32 {
        match self {
            DebugCause::SingleStep => TRAP_TRACE,
            DebugCause::HwBreakpoint => TRAP_HWBKPT,
            DebugCause::Breakpoint => TRAP_BRKPT,
        }
    }
}

/// Decode DR6. Single-step wins over breakpoint hits.
pub fn get_si_code(dr6: u64) -> DebugCause {
    if dr6 & DR_STEP != 0 {
        DebugCause::SingleStep
    } else if dr6 & DR_TRAP_BITS != 0 {
        DebugCause::HwBreakpoint
    } else {
        DebugCause::Breakpoint
    }
}
