//! CPU-indexed arena
//!
//! Per-CPU state is a fixed array with one slot per CPU id. A slot is only
//! ever touched by the CPU whose id it carries, so slots hold relaxed
//! atomics for interior mutability and nothing here takes a lock.

use core::fmt;

/// Maximum number of CPUs supported
pub const MAX_CPUS: usize = 256;

/// Errors for `PerCpu` lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerCpuError {
    /// CPU id is outside the arena.
    OutOfRange(usize),
}

impl fmt::Display for PerCpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PerCpuError::OutOfRange(cpu) => write!(f, "cpu {} exceeds MAX_CPUS ({})", cpu, MAX_CPUS),
        }
    }
}

pub struct PerCpu<T> {
    slots: [T; MAX_CPUS],
}

impl<T> PerCpu<T> {
    pub const fn new(slots: [T; MAX_CPUS]) -> Self {
        Self { slots }
    }

    pub fn get(&self, cpu: usize) -> Result<&T, PerCpuError> {
        self.slots.get(cpu).ok_or(PerCpuError::OutOfRange(cpu))
    }

    /// Slot for `cpu`.
    ///
    /// The platform guarantees `cpu_id() < MAX_CPUS`; a larger id is a
    /// platform bug and there is no slot to fall back to.
    #[inline]
    pub fn cpu(&self, cpu: usize) -> &T {
        match self.get(cpu) {
            Ok(slot) => slot,
            Err(err) => panic!("per-cpu: {}", err),
        }
    }

    /// Slot of the CPU executing this code.
    #[inline]
    pub fn this_cpu(&self) -> &T {
        self.cpu(crate::platform::platform().cpu_id())
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots.iter().enumerate()
    }
}
