//! Entry/exit state tracking for ordinary trap entries
//!
//! `idtentry_enter` runs before every handler body: the low-level stub
//! entered with interrupts disabled in hardware, so the hardirq tracer is
//! told the same, and a trap from user mode leaves the user context domain.
//! `idtentry_exit` runs after the body on every path.

use core::sync::atomic::{AtomicU64, Ordering};

use crate::config;
use crate::context_tracking::ContextState;
use crate::interrupts::InterruptedContext;
use crate::percpu::{PerCpu, PerCpuError, MAX_CPUS};
use crate::platform::{platform, TrapPlatform};

/// What `idtentry_enter` did; handed back to `idtentry_exit`.
#[must_use = "every idtentry_enter needs its idtentry_exit"]
#[derive(Debug)]
pub struct EntryState {
    traced: bool,
    transitioned: bool,
}

impl EntryState {
    /// Hardirq tracing was on when the trap hit.
    pub fn hardirqs_were_traced(&self) -> bool {
        self.traced
    }

    /// The entry left the user context domain.
    pub fn left_user(&self) -> bool {
        self.transitioned
    }
}

/// Start an ordinary entry: tracing off, and leave the user domain when
/// the trap came from user mode.
pub fn idtentry_enter(ctx: &InterruptedContext) -> EntryState {
    let p = platform();
    let traced = p.hardirqs_traced();
    p.trace_hardirqs_off();

    let stats = STATS.this_cpu();
    stats.entries.fetch_add(1, Ordering::Relaxed);

    let transitioned = if ctx.user_mode() {
        stats.user_entries.fetch_add(1, Ordering::Relaxed);
        enter_from_user_context(p)
    } else {
        false
    };

    EntryState {
        traced,
        transitioned,
    }
}

/// Hook that runs after the body, before returning to the stub.
pub fn idtentry_exit(ctx: &InterruptedContext, state: EntryState) {
    let _ = (ctx, state);
    STATS.this_cpu().exits.fetch_add(1, Ordering::Relaxed);
}

/// Leave the user domain. Returns whether a transition was made.
///
/// The tracker is expected to say `User` here; anything else means it lost
/// sync somewhere else in the kernel, which is reported but not acted on.
pub(crate) fn enter_from_user_context(p: &dyn TrapPlatform) -> bool {
    if !config::context_tracking() {
        return false;
    }

    let state = p.ct_state();
    if state != ContextState::User {
        STATS.this_cpu().ct_warnings.fetch_add(1, Ordering::Relaxed);
        crate::kwarn!(
            "idtentry: trap from user mode but context tracking says {}",
            state.as_str()
        );
    }
    p.user_exit_irqoff();
    true
}

struct StatsCpu {
    entries: AtomicU64,
    exits: AtomicU64,
    user_entries: AtomicU64,
    ist_entries: AtomicU64,
    nested_ist_entries: AtomicU64,
    ct_warnings: AtomicU64,
    tracing_restores: AtomicU64,
}

#[allow(clippy::declare_interior_mutable_const)]
const STATS_INIT: StatsCpu = StatsCpu {
    entries: AtomicU64::new(0),
    exits: AtomicU64::new(0),
    user_entries: AtomicU64::new(0),
    ist_entries: AtomicU64::new(0),
    nested_ist_entries: AtomicU64::new(0),
    ct_warnings: AtomicU64::new(0),
    tracing_restores: AtomicU64::new(0),
};

static STATS: PerCpu<StatsCpu> = PerCpu::new([STATS_INIT; MAX_CPUS]);

/// Per-CPU entry counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryStats {
    /// `idtentry_enter` calls.
    pub entries: u64,
    /// `idtentry_exit` calls.
    pub exits: u64,
    /// Entries, ordinary or IST, that hit user mode.
    pub user_entries: u64,
    pub ist_entries: u64,
    /// IST entries that took the nested (atomic) path.
    pub nested_ist_entries: u64,
    pub ct_warnings: u64,
    pub tracing_restores: u64,
}

pub(crate) fn note_ist_entry(nested: bool, from_user: bool) {
    let stats = STATS.this_cpu();
    stats.ist_entries.fetch_add(1, Ordering::Relaxed);
    if nested {
        stats.nested_ist_entries.fetch_add(1, Ordering::Relaxed);
    }
    if from_user {
        stats.user_entries.fetch_add(1, Ordering::Relaxed);
    }
}

pub(crate) fn note_tracing_restore() {
    STATS
        .this_cpu()
        .tracing_restores
        .fetch_add(1, Ordering::Relaxed);
}

/// Entry counters of this CPU.
pub fn stats() -> EntryStats {
    snapshot(STATS.this_cpu())
}

/// Entry counters of `cpu`.
pub fn stats_for(cpu: usize) -> Result<EntryStats, PerCpuError> {
    Ok(snapshot(STATS.get(cpu)?))
}

fn snapshot(slot: &StatsCpu) -> EntryStats {
    EntryStats {
        entries: slot.entries.load(Ordering::Relaxed),
        exits: slot.exits.load(Ordering::Relaxed),
        user_entries: slot.user_entries.load(Ordering::Relaxed),
        ist_entries: slot.ist_entries.load(Ordering::Relaxed),
        nested_ist_entries: slot.nested_ist_entries.load(Ordering::Relaxed),
        ct_warnings: slot.ct_warnings.load(Ordering::Relaxed),
        tracing_restores: slot.tracing_restores.load(Ordering::Relaxed),
    }
}
