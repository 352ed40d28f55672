//! IST nesting tracker
//!
//! NMI, #MC, #DB and #DF run on dedicated stacks and can hit the kernel at
//! any point: with interrupts off, or inside another IST handler. In those
//! places the context tracker and the hardirq tracer are mid-update and
//! cannot take a second transition, so such entries take the nested
//! (atomic) path: no domain transition, the family's depth goes up, and only
//! the frame that took the depth off zero may restore tracing.
//!
//! All state is per CPU and only touched by that CPU. Entries and exits on
//! one CPU nest strictly LIFO.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::interrupts::entry;
use crate::interrupts::vectors::IstFamily;
use crate::interrupts::InterruptedContext;
use crate::percpu::{PerCpu, PerCpuError, MAX_CPUS};
use crate::platform::platform;

struct IstCpu {
    depth: [AtomicU32; IstFamily::COUNT],
    /// Tracing state seen by the frame that took `depth` off zero.
    saved_trace: [AtomicBool; IstFamily::COUNT],
    /// IST frames currently running, any family, any path.
    active: AtomicU32,
    /// `active + 1` of the frame that opened the non-atomic scope, zero
    /// when no scope is open. Frames nested above it stay atomic.
    scope_frame: AtomicU32,
}

#[allow(clippy::declare_interior_mutable_const)]
const DEPTH_ZERO: AtomicU32 = AtomicU32::new(0);
#[allow(clippy::declare_interior_mutable_const)]
const TRACE_OFF: AtomicBool = AtomicBool::new(false);
#[allow(clippy::declare_interior_mutable_const)]
const IST_INIT: IstCpu = IstCpu {
    depth: [DEPTH_ZERO; IstFamily::COUNT],
    saved_trace: [TRACE_OFF; IstFamily::COUNT],
    active: AtomicU32::new(0),
    scope_frame: AtomicU32::new(0),
};

static IST: PerCpu<IstCpu> = PerCpu::new([IST_INIT; MAX_CPUS]);

/// Token for one IST entry; consumed by [`ist_exit`].
#[must_use = "every ist_enter needs its ist_exit"]
#[derive(Debug)]
pub struct IstState {
    family: IstFamily,
    cpu: usize,
    nested: bool,
    traced: bool,
    transitioned: bool,
}

impl IstState {
    pub fn family(&self) -> IstFamily {
        self.family
    }

    /// Entry took the nested (atomic) path.
    pub fn nested(&self) -> bool {
        self.nested
    }

    pub fn hardirqs_were_traced(&self) -> bool {
        self.traced
    }

    pub fn left_user(&self) -> bool {
        self.transitioned
    }
}

/// Enter an IST handler, picking the user, ordinary or nested path.
pub fn ist_enter(ctx: &InterruptedContext, family: IstFamily) -> IstState {
    let p = platform();
    let cpu_id = p.cpu_id();
    let cpu = IST.cpu(cpu_id);

    let traced = p.hardirqs_traced();
    p.trace_hardirqs_off();

    let from_user = ctx.user_mode();
    let nested =
        !from_user && (!ctx.interrupts_enabled() || cpu.active.load(Ordering::Relaxed) > 0);

    let mut transitioned = false;
    if from_user {
        transitioned = entry::enter_from_user_context(p);
    } else if nested {
        let slot = family.index();
        if cpu.depth[slot].fetch_add(1, Ordering::Relaxed) == 0 {
            cpu.saved_trace[slot].store(traced, Ordering::Relaxed);
        }
    }

    cpu.active.fetch_add(1, Ordering::Relaxed);
    entry::note_ist_entry(nested, from_user);

    IstState {
        family,
        cpu: cpu_id,
        nested,
        traced,
        transitioned,
    }
}

/// Undo [`ist_enter`], restoring tracing when the family unwinds to zero.
pub fn ist_exit(ctx: &InterruptedContext, state: IstState) {
    let _ = ctx;
    let cpu = IST.cpu(state.cpu);
    let slot = state.family.index();

    if cpu.active.load(Ordering::Relaxed) == 0 {
        crate::entry_bug!("ist: exit with no active IST frame ({})", state.family.name());
    } else {
        cpu.active.fetch_sub(1, Ordering::Relaxed);
    }

    let restore = if state.nested {
        match cpu.depth[slot].load(Ordering::Relaxed) {
            0 => {
                crate::entry_bug!("ist: {} depth underflow", state.family.name());
                false
            }
            depth => {
                cpu.depth[slot].fetch_sub(1, Ordering::Relaxed);
                depth == 1 && cpu.saved_trace[slot].load(Ordering::Relaxed)
            }
        }
    } else {
        state.traced && cpu.depth[slot].load(Ordering::Relaxed) == 0
    };

    if restore {
        platform().trace_hardirqs_on();
        entry::note_tracing_restore();
    }
}

/// Account a double fault. There is no matching exit: the handler never
/// returns.
#[doc(hidden)]
pub fn mark_double_fault() {
    let cpu = IST.this_cpu();
    cpu.depth[IstFamily::DoubleFault.index()].fetch_add(1, Ordering::Relaxed);
    cpu.active.fetch_add(1, Ordering::Relaxed);
    entry::note_ist_entry(true, false);
}

/// Window inside an IST handler where atomic-context restrictions are
/// lifted. Closed on drop.
#[must_use = "the scope closes as soon as it is dropped"]
#[derive(Debug)]
pub struct NonAtomicScope {
    cpu: usize,
    armed: bool,
}

/// Open a non-atomic scope. Only legal when the trap came from user mode,
/// and never while another scope is open on this CPU.
pub fn ist_begin_non_atomic(ctx: &InterruptedContext) -> NonAtomicScope {
    let cpu_id = platform().cpu_id();

    if !ctx.user_mode() {
        crate::entry_bug!("ist: non-atomic scope requested from kernel mode");
        return NonAtomicScope {
            cpu: cpu_id,
            armed: false,
        };
    }

    let cpu = IST.cpu(cpu_id);
    let frame = cpu.active.load(Ordering::Relaxed) + 1;
    if cpu
        .scope_frame
        .compare_exchange(0, frame, Ordering::Relaxed, Ordering::Relaxed)
        .is_err()
    {
        crate::entry_bug!("ist: overlapping non-atomic scopes");
        return NonAtomicScope {
            cpu: cpu_id,
            armed: false,
        };
    }

    NonAtomicScope {
        cpu: cpu_id,
        armed: true,
    }
}

/// Close a scope from [`ist_begin_non_atomic`].
pub fn ist_end_non_atomic(scope: NonAtomicScope) {
    drop(scope);
}

impl Drop for NonAtomicScope {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if IST.cpu(self.cpu).scope_frame.swap(0, Ordering::Relaxed) == 0 {
            crate::entry_bug!("ist: closing a non-atomic scope that is not open");
        }
    }
}

/// Inside an IST frame and not inside a non-atomic scope.
pub fn in_ist_atomic() -> bool {
    let cpu = IST.this_cpu();
    cpu.active.load(Ordering::Relaxed) > 0 && !scope_covers(cpu)
}

/// A non-atomic scope is open and belongs to the innermost frame.
pub fn in_non_atomic_scope() -> bool {
    scope_covers(IST.this_cpu())
}

fn scope_covers(cpu: &IstCpu) -> bool {
    let frame = cpu.scope_frame.load(Ordering::Relaxed);
    frame != 0 && frame == cpu.active.load(Ordering::Relaxed) + 1
}

/// Nested-path depth of `family` on this CPU.
pub fn ist_depth(family: IstFamily) -> u32 {
    IST.this_cpu().depth[family.index()].load(Ordering::Relaxed)
}

/// Nested-path depth of `family` on `cpu`.
pub fn ist_depth_on(cpu: usize, family: IstFamily) -> Result<u32, PerCpuError> {
    Ok(IST.get(cpu)?.depth[family.index()].load(Ordering::Relaxed))
}

/// IST frames running on this CPU, any family.
pub fn active_ist_frames() -> u32 {
    IST.this_cpu().active.load(Ordering::Relaxed)
}
