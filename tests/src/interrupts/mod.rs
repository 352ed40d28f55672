//! Trap entry protocol tests

mod entry;
mod regs;
mod stub;
