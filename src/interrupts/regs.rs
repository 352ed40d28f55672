//! Interrupted register state

use x86_64::registers::rflags::RFlags;
use x86_64::structures::gdt::SegmentSelector;
use x86_64::structures::idt::InterruptStackFrameValue;
use x86_64::PrivilegeLevel;

use crate::config;

pub const KERNEL_CS: u64 = SegmentSelector::new(1, PrivilegeLevel::Ring0).0 as u64;
pub const KERNEL_SS: u64 = SegmentSelector::new(2, PrivilegeLevel::Ring0).0 as u64;
pub const USER_CS: u64 = SegmentSelector::new(4, PrivilegeLevel::Ring3).0 as u64;
pub const USER_SS: u64 = SegmentSelector::new(3, PrivilegeLevel::Ring3).0 as u64;

const AUX_FAULT_ADDRESS: u64 = 1 << 0;

/// Register snapshot saved by the low-level stub.
///
/// Layout follows the push order of the stub: general registers, the
/// hardware error-code slot, then the IRET frame. Two trailing words are
/// owned by the entry layer and hold the captured side-band fault address.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterruptedContext {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub rbp: u64,
    pub rbx: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rax: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rsi: u64,
    pub rdi: u64,
    pub error_code: u64,
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
    fault_address: u64,
    aux: u64,
}

impl InterruptedContext {
    /// Kernel-mode context with interrupts enabled.
    pub fn kernel(rip: u64, rsp: u64) -> Self {
        Self {
            rip,
            rsp,
            cs: KERNEL_CS,
            ss: KERNEL_SS,
            rflags: RFlags::INTERRUPT_FLAG.bits() | 0x2,
            ..Self::default()
        }
    }

    /// User-mode context with interrupts enabled.
    pub fn user(rip: u64, rsp: u64) -> Self {
        Self {
            rip,
            rsp,
            cs: USER_CS,
            ss: USER_SS,
            rflags: RFlags::INTERRUPT_FLAG.bits() | 0x2,
            ..Self::default()
        }
    }

    pub fn from_frame(frame: &InterruptStackFrameValue, error_code: u64) -> Self {
        Self {
            rip: frame.instruction_pointer.as_u64(),
            cs: u64::from(frame.code_segment.0),
            rflags: frame.cpu_flags.bits(),
            rsp: frame.stack_pointer.as_u64(),
            ss: u64::from(frame.stack_segment.0),
            error_code,
            ..Self::default()
        }
    }

    pub fn with_interrupts(mut self, enabled: bool) -> Self {
        // Raw bits: RFlags has no name for the reserved always-one bit.
        if enabled {
            self.rflags |= RFlags::INTERRUPT_FLAG.bits();
        } else {
            self.rflags &= !RFlags::INTERRUPT_FLAG.bits();
        }
        self
    }

    pub fn flags(&self) -> RFlags {
        RFlags::from_bits_truncate(self.rflags)
    }

    /// Whether the trap hit user-mode code.
    ///
    /// Ring 3 code segment, or VM86 mode on 32-bit builds.
    pub fn user_mode(&self) -> bool {
        let rpl = SegmentSelector(self.cs as u16).rpl();
        if matches!(rpl, PrivilegeLevel::Ring3) {
            return true;
        }
        !config::X86_64 && self.flags().contains(RFlags::VIRTUAL_8086_MODE)
    }

    pub fn interrupts_enabled(&self) -> bool {
        self.flags().contains(RFlags::INTERRUPT_FLAG)
    }

    /// Attach the side-band fault address captured for this trap.
    pub fn set_fault_address(&mut self, address: u64) {
        self.fault_address = address;
        self.aux |= AUX_FAULT_ADDRESS;
    }

    pub fn fault_address(&self) -> Option<u64> {
        if self.aux & AUX_FAULT_ADDRESS != 0 {
            Some(self.fault_address)
        } else {
            None
        }
    }
}
