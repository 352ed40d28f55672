//! Low-level stub contract
//!
//! The assembly stubs live outside this crate. This module states what each
//! row's stub must look like ([`StubSpec`]) and models what a stub does at
//! run time ([`dispatch`]): check the vector, fill in the error-code slot,
//! catch a blown kernel stack, pick the IST or regular-stack entry, call it
//! exactly once, then do the return-side bookkeeping before IRET.

use core::fmt;

use crate::config;
use crate::interrupts::entry;
use crate::interrupts::fault;
use crate::interrupts::vectors::{self, EntryPoint, IstFamily, TrapClass, Vector};
use crate::interrupts::InterruptedContext;
use crate::platform::platform;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubKind {
    /// Plain `idtentry`.
    IdtEntry { has_error_code: bool },
    /// IST stub that switches to the regular stack when coming from user
    /// mode.
    MceDb,
    /// Hand-written NMI stub.
    Nmi,
    /// 64-bit double fault.
    Df,
    /// 32-bit double fault through the task-gate shim.
    DfShim,
    /// No stub emitted.
    None,
}

/// What the assembly side must provide for one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StubSpec {
    pub vector: u8,
    pub asm_symbol: Option<&'static str>,
    pub xen_symbol: Option<&'static str>,
    pub kind: StubKind,
    /// TSS IST slot, `None` for regular-stack stubs.
    pub ist_slot: Option<u8>,
}

impl StubSpec {
    pub fn for_vector(row: &Vector) -> Self {
        let kind = match row.class {
            TrapClass::SoftwareOnly => StubKind::None,
            TrapClass::Simple
            | TrapClass::Redirect { .. }
            | TrapClass::DedicatedStackFallback(_) => StubKind::IdtEntry {
                has_error_code: false,
            },
            TrapClass::ErrorCode | TrapClass::FaultAddress => StubKind::IdtEntry {
                has_error_code: true,
            },
            TrapClass::DedicatedStack(IstFamily::Nmi) => StubKind::Nmi,
            TrapClass::DedicatedStack(_) if config::X86_64 => StubKind::MceDb,
            TrapClass::DedicatedStack(_) => StubKind::IdtEntry {
                has_error_code: false,
            },
            TrapClass::DoubleFault if config::X86_64 => StubKind::Df,
            TrapClass::DoubleFault => StubKind::DfShim,
        };

        let ist_slot = match row.class {
            TrapClass::DedicatedStack(family) if config::X86_64 => Some(family.ist_slot()),
            TrapClass::DoubleFault if config::X86_64 => Some(IstFamily::DoubleFault.ist_slot()),
            _ => None,
        };

        Self {
            vector: row.number,
            asm_symbol: row.asm_symbol,
            xen_symbol: row.xen_symbol,
            kind,
            ist_slot,
        }
    }

    pub fn has_error_code(&self) -> bool {
        matches!(
            self.kind,
            StubKind::IdtEntry {
                has_error_code: true
            } | StubKind::Df
                | StubKind::DfShim
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubError {
    /// No enabled row for this vector.
    UndefinedVector(u8),
    /// Row is software-only; hardware cannot raise it.
    NoStub(u8),
    MissingErrorCode(u8),
    UnexpectedErrorCode(u8),
}

impl fmt::Display for StubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StubError::UndefinedVector(n) => write!(f, "vector {:#04x} is not defined", n),
            StubError::NoStub(n) => write!(f, "vector {:#04x} has no stub", n),
            StubError::MissingErrorCode(n) => {
                write!(f, "vector {:#04x} expects a hardware error code", n)
            }
            StubError::UnexpectedErrorCode(n) => {
                write!(f, "vector {:#04x} takes no error code", n)
            }
        }
    }
}

/// How one trap went through the stub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatched {
    pub vector: u8,
    /// Class of the entry that actually ran.
    pub class: TrapClass,
    pub ist_slot: Option<u8>,
    /// The return side turned hardirq tracing back on.
    pub tracing_restored: bool,
    /// The return side re-entered the user context domain.
    pub reentered_user: bool,
}

/// Deliver native vector `number` as the hardware would.
pub fn dispatch(
    number: u8,
    ctx: &mut InterruptedContext,
    error_code: Option<u64>,
) -> Result<Dispatched, StubError> {
    let row = vectors::lookup(number).ok_or(StubError::UndefinedVector(number))?;
    run(row, ctx, error_code)
}

/// Deliver paravirt redirect `number`.
pub fn dispatch_redirect(
    number: u8,
    ctx: &mut InterruptedContext,
    error_code: Option<u64>,
) -> Result<Dispatched, StubError> {
    let row = vectors::lookup_redirect(number).ok_or(StubError::UndefinedVector(number))?;
    run(row, ctx, error_code)
}

/// Deliver the Xen event-channel upcall.
pub fn dispatch_xen_callback(ctx: &mut InterruptedContext) -> Result<Dispatched, StubError> {
    let row = vectors::xen_hypervisor_callback().ok_or(StubError::UndefinedVector(vectors::X86_TRAP_OTHER))?;
    run(row, ctx, None)
}

fn run(
    row: &'static Vector,
    ctx: &mut InterruptedContext,
    error_code: Option<u64>,
) -> Result<Dispatched, StubError> {
    let spec = StubSpec::for_vector(row);
    if spec.kind == StubKind::None {
        return Err(StubError::NoStub(row.number));
    }

    let code = match (spec.has_error_code(), error_code) {
        (true, Some(code)) => code,
        (true, None) => return Err(StubError::MissingErrorCode(row.number)),
        (false, Some(_)) => return Err(StubError::UnexpectedErrorCode(row.number)),
        (false, None) => 0,
    };
    ctx.error_code = code;

    if !ctx.user_mode() && fault::in_stack_guard(ctx.rsp) {
        let rsp = ctx.rsp;
        fault::handle_stack_overflow("kernel stack overflow (interrupted stack)", ctx, rsp);
    }

    let (class, ist_slot) = match row.entry {
        EntryPoint::Simple(func) => {
            func(ctx);
            (row.class, None)
        }
        EntryPoint::ErrorCode(func) => {
            func(ctx, code);
            (row.class, None)
        }
        EntryPoint::Ist { ist, noist } => match row.class {
            TrapClass::DedicatedStack(family)
                if spec.kind == StubKind::MceDb && ctx.user_mode() =>
            {
                noist(ctx);
                (TrapClass::DedicatedStackFallback(family), None)
            }
            _ => {
                ist(ctx);
                (row.class, spec.ist_slot)
            }
        },
        EntryPoint::DoubleFault(func) => func(ctx, code),
        EntryPoint::DoubleFaultShim(func) => {
            let address = platform().read_cr2();
            func(ctx, code, address)
        }
    };

    // IST entries on 64-bit restore tracing in ist_exit.
    let p = platform();
    let tracing_restored = ist_slot.is_none() && ctx.interrupts_enabled();
    if tracing_restored {
        p.trace_hardirqs_on();
        entry::note_tracing_restore();
    }

    let reentered_user = ctx.user_mode() && config::context_tracking();
    if reentered_user {
        p.user_enter_irqoff();
    }

    Ok(Dispatched {
        vector: row.number,
        class,
        ist_slot,
        tracing_restored,
        reentered_user,
    })
}
