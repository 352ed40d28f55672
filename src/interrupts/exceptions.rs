//! High-level entry functions
//!
//! One entry per catalog row, each generated by the `define_*!` macro of
//! its trap class. The bodies are thin: they decode what the hardware gave
//! them and delegate to the platform.

use core::sync::atomic::{AtomicU64, Ordering};

use crate::config;
use crate::interrupts::fault::{self, DieReport};
use crate::interrupts::ist;
use crate::interrupts::vectors::*;
use crate::irqflags;
use crate::percpu::{PerCpu, PerCpuError, MAX_CPUS};
use crate::platform::{platform, TrapOutcome};
use crate::{kdebug, ktrace, kwarn};

crate::define_idtentry! {
    fn exc_divide_error(regs) {
        fault::do_error_trap(regs, 0, X86_TRAP_DE, "divide error");
    }
}

crate::define_idtentry! {
    fn exc_int3(regs) {
        fault::do_error_trap(regs, 0, X86_TRAP_BP, "int3");
    }
}

crate::define_idtentry! {
    fn exc_overflow(regs) {
        fault::do_error_trap(regs, 0, X86_TRAP_OF, "overflow");
    }
}

crate::define_idtentry! {
    fn exc_bounds(regs) {
        fault::do_error_trap(regs, 0, X86_TRAP_BR, "bounds");
    }
}

crate::define_idtentry! {
    fn exc_invalid_op(regs) {
        fault::do_error_trap(regs, 0, X86_TRAP_UD, "invalid opcode");
    }
}

crate::define_idtentry! {
    fn exc_device_not_available(regs) {
        fault::do_error_trap(regs, 0, X86_TRAP_NM, "device not available");
    }
}

crate::define_idtentry! {
    fn exc_coproc_segment_overrun(regs) {
        fault::do_error_trap(regs, 0, X86_TRAP_OLD_MF, "coprocessor segment overrun");
    }
}

crate::define_idtentry! {
    /// Erratum on some old CPUs; nothing to do.
    fn exc_spurious_interrupt_bug(regs) {
        ktrace!("spurious interrupt bug at rip {:#x}", regs.rip);
    }
}

crate::define_idtentry! {
    fn exc_coprocessor_error(regs) {
        fault::do_error_trap(regs, 0, X86_TRAP_MF, "coprocessor error");
    }
}

crate::define_idtentry! {
    fn exc_simd_coprocessor_error(regs) {
        fault::do_error_trap(regs, 0, X86_TRAP_XF, "SIMD coprocessor error");
    }
}

crate::define_idtentry_sw! {
    /// 32-bit IRET to user mode faulted; raised by the exception fixup,
    /// not by hardware.
    fn exc_iret_error(regs) {
        fault::do_error_trap(regs, 0, X86_TRAP_IRET, "iret exception");
    }
}

crate::define_idtentry_errorcode! {
    fn exc_invalid_tss(regs, error_code) {
        fault::do_error_trap(regs, error_code, X86_TRAP_TS, "invalid TSS");
    }
}

crate::define_idtentry_errorcode! {
    fn exc_segment_not_present(regs, error_code) {
        fault::do_error_trap(regs, error_code, X86_TRAP_NP, "segment not present");
    }
}

crate::define_idtentry_errorcode! {
    fn exc_stack_segment(regs, error_code) {
        fault::do_error_trap(regs, error_code, X86_TRAP_SS, "stack segment");
    }
}

crate::define_idtentry_errorcode! {
    fn exc_general_protection(regs, error_code) {
        fault::do_error_trap(regs, error_code, X86_TRAP_GP, "general protection fault");
    }
}

crate::define_idtentry_errorcode! {
    fn exc_alignment_check(regs, error_code) {
        fault::do_error_trap(regs, error_code, X86_TRAP_AC, "alignment check");
    }
}

crate::define_idtentry_cr2! {
    fn exc_page_fault(regs, error_code, address) {
        fault::do_page_fault(regs, error_code, address);
    }
}

crate::define_idtentry_cr2! {
    /// #PF on KVM guests: the host may use it to deliver async page-fault
    /// notifications.
    fn exc_async_page_fault(regs, error_code, address) {
        let reason = platform().kvm_async_pf_flags();
        if reason == 0 {
            fault::do_page_fault(regs, error_code, address);
            return;
        }
        ASYNC_PF_EVENTS.this_cpu().fetch_add(1, Ordering::Relaxed);
        ktrace!("kvm: async page fault reason {:#x} token {:#x}", reason, address);
    }
}

#[allow(clippy::declare_interior_mutable_const)]
const COUNTER_ZERO: AtomicU64 = AtomicU64::new(0);

static NMI_COUNT: PerCpu<AtomicU64> = PerCpu::new([COUNTER_ZERO; MAX_CPUS]);
static ASYNC_PF_EVENTS: PerCpu<AtomicU64> = PerCpu::new([COUNTER_ZERO; MAX_CPUS]);

pub fn nmi_count(cpu: usize) -> Result<u64, PerCpuError> {
    Ok(NMI_COUNT.get(cpu)?.load(Ordering::Relaxed))
}

pub fn async_pf_events(cpu: usize) -> Result<u64, PerCpuError> {
    Ok(ASYNC_PF_EVENTS.get(cpu)?.load(Ordering::Relaxed))
}

crate::define_idtentry_ist! {
    IstFamily::Nmi,
    fn exc_nmi(regs) {
        NMI_COUNT.this_cpu().fetch_add(1, Ordering::Relaxed);
        irqflags::ftrace_count_nmi();

        irqflags::ftrace_nmi_handler_enter();
        let outcome = platform().handle_trap(X86_TRAP_NMI, regs, 0);
        irqflags::ftrace_nmi_handler_exit();

        if outcome == TrapOutcome::Handled {
            return;
        }

        if config::panic_on_unrecovered_nmi() {
            fault::die(&DieReport {
                message: "NMI: not continuing",
                ctx: regs,
                vector: Some(X86_TRAP_NMI),
                error_code: 0,
                fault_address: None,
            });
        }
        kwarn!(
            "Uhhuh. NMI received for unknown reason on CPU {}",
            platform().cpu_id()
        );
    }
}

crate::define_idtentry_noist!(noist_exc_nmi, exc_nmi);

crate::define_idtentry_ist! {
    IstFamily::Debug,
    fn exc_debug(regs) {
        let dr6 = platform().read_dr6();
        let cause = fault::get_si_code(dr6);

        if platform().handle_debug(regs, dr6, cause) == TrapOutcome::Handled {
            return;
        }
        if regs.user_mode() {
            kwarn!(
                "#DB in user mode: rip {:#x} dr6 {:#x} si_code {}",
                regs.rip,
                dr6,
                cause.si_code()
            );
        } else {
            kdebug!("#DB in kernel at {:#x}, dr6 {:#x} ignored", regs.rip, dr6);
        }
    }
}

crate::define_idtentry_noist!(noist_exc_debug, exc_debug);

crate::define_idtentry_ist! {
    IstFamily::MachineCheck,
    fn exc_machine_check(regs) {
        let outcome = if regs.user_mode() {
            // Recovery from user mode may need to sleep or take locks.
            let scope = ist::ist_begin_non_atomic(regs);
            let outcome = platform().handle_trap(X86_TRAP_MC, regs, 0);
            ist::ist_end_non_atomic(scope);
            outcome
        } else {
            platform().handle_trap(X86_TRAP_MC, regs, 0)
        };

        if outcome == TrapOutcome::Handled || regs.user_mode() {
            return;
        }
        fault::die(&DieReport {
            message: "machine check",
            ctx: regs,
            vector: Some(X86_TRAP_MC),
            error_code: 0,
            fault_address: None,
        });
    }
}

crate::define_idtentry_noist!(noist_exc_machine_check, exc_machine_check);

crate::define_idtentry_df! {
    fn exc_double_fault(regs, error_code, address) -> ! {
        fault::do_double_fault(regs, error_code, address)
    }
}

// System vectors

fn do_sysvec(regs: &mut crate::interrupts::InterruptedContext, vector: u8, name: &str) {
    if platform().handle_trap(vector, regs, 0) == TrapOutcome::Unhandled {
        kdebug!("{} ({:#04x}) with no handler", name, vector);
    }
}

crate::define_idtentry! {
    fn sysvec_reschedule_ipi(regs) {
        do_sysvec(regs, RESCHEDULE_VECTOR, "reschedule IPI");
    }
}

crate::define_idtentry! {
    fn sysvec_thermal(regs) {
        do_sysvec(regs, THERMAL_APIC_VECTOR, "thermal interrupt");
    }
}

crate::define_idtentry! {
    fn sysvec_threshold(regs) {
        do_sysvec(regs, THRESHOLD_APIC_VECTOR, "threshold interrupt");
    }
}

crate::define_idtentry! {
    fn sysvec_irq_work(regs) {
        do_sysvec(regs, IRQ_WORK_VECTOR, "irq work");
    }
}

crate::define_idtentry! {
    fn sysvec_deferred_error(regs) {
        do_sysvec(regs, DEFERRED_ERROR_VECTOR, "deferred error");
    }
}

crate::define_idtentry! {
    fn sysvec_kvm_posted_intr_ipi(regs) {
        do_sysvec(regs, POSTED_INTR_VECTOR, "posted interrupt");
    }
}

crate::define_idtentry! {
    fn sysvec_kvm_posted_intr_wakeup_ipi(regs) {
        do_sysvec(regs, POSTED_INTR_WAKEUP_VECTOR, "posted interrupt wakeup");
    }
}

crate::define_idtentry! {
    fn sysvec_kvm_posted_intr_nested_ipi(regs) {
        do_sysvec(regs, POSTED_INTR_NESTED_VECTOR, "nested posted interrupt");
    }
}

// Paravirt

crate::define_idtentry! {
    /// Xen event-channel upcall. No pending event is not an error.
    fn exc_xen_hypervisor_callback(regs) {
        do_sysvec(regs, X86_TRAP_OTHER, "xen hypervisor callback");
    }
}
