//! Default execution-context tracker
//!
//! Records, per CPU, whether the CPU is executing in the user or kernel
//! domain. Trap entry leaves the user domain when a trap hits user code and
//! the return path re-enters it. A kernel that runs its own tracker overrides
//! the `ct_state`/`user_*_irqoff` methods of its platform instead.

use core::sync::atomic::{AtomicU8, Ordering};

use crate::percpu::{PerCpu, PerCpuError, MAX_CPUS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ContextState {
    /// Tracking is off on this CPU.
    Disabled = 0,
    Kernel = 1,
    User = 2,
    Guest = 3,
}

impl ContextState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => ContextState::Kernel,
            2 => ContextState::User,
            3 => ContextState::Guest,
            _ => ContextState::Disabled,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            ContextState::Disabled => "disabled",
            ContextState::Kernel => "kernel",
            ContextState::User => "user",
            ContextState::Guest => "guest",
        }
    }
}

#[allow(clippy::declare_interior_mutable_const)]
const KERNEL: AtomicU8 = AtomicU8::new(ContextState::Kernel as u8);

static CT_STATE: PerCpu<AtomicU8> = PerCpu::new([KERNEL; MAX_CPUS]);

/// Domain recorded for the current CPU.
pub fn ct_state() -> ContextState {
    ContextState::from_raw(CT_STATE.this_cpu().load(Ordering::Relaxed))
}

pub fn ct_state_of(cpu: usize) -> Result<ContextState, PerCpuError> {
    Ok(ContextState::from_raw(CT_STATE.get(cpu)?.load(Ordering::Relaxed)))
}

/// Leave the user domain. Interrupts must be off.
pub fn user_exit_irqoff() {
    CT_STATE
        .this_cpu()
        .store(ContextState::Kernel as u8, Ordering::Relaxed);
}

/// Enter the user domain. Interrupts must be off.
pub fn user_enter_irqoff() {
    CT_STATE
        .this_cpu()
        .store(ContextState::User as u8, Ordering::Relaxed);
}

/// Force the current CPU's domain, e.g. when bringing a CPU online or
/// switching tracking off for it.
pub fn set_ct_state(state: ContextState) {
    CT_STATE.this_cpu().store(state as u8, Ordering::Relaxed);
}
