//! Trap entry protocol
//!
//! - `vectors`: the vector catalog
//! - `entry`: enter/exit tracking for ordinary entries
//! - `ist`: nesting bookkeeping for IST entries
//! - `idtentry`: the `declare_*!`/`define_*!` generator macros
//! - `stub`: the low-level stub contract and a model of it
//! - `fault`: terminal path, stack overflow, page fault and #DB helpers
//! - `exceptions`: the entry functions themselves

pub mod idtentry;

pub mod entry;
pub mod exceptions;
pub mod fault;
pub mod ist;
pub mod regs;
pub mod stub;
pub mod vectors;

pub use entry::{idtentry_enter, idtentry_exit, EntryState, EntryStats};
pub use ist::{ist_begin_non_atomic, ist_end_non_atomic, ist_enter, ist_exit, IstState, NonAtomicScope};
pub use regs::InterruptedContext;
pub use stub::{dispatch, dispatch_redirect, dispatch_xen_callback, Dispatched, StubError, StubKind, StubSpec};
pub use vectors::{lookup, lookup_redirect, CatalogError, EntryPoint, IstFamily, TrapClass, Vector};
