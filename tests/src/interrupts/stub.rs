//! Low-level stub contract tests
//!
//! Checks the per-row stub requirements and the run-time model: error-code
//! slot, IST vs regular-stack selection and the return-side bookkeeping.

#[cfg(test)]
mod tests {
    use nexa_idtentry::config;
    use nexa_idtentry::context_tracking::{self, ContextState};
    use nexa_idtentry::interrupts::fault::DR_STEP;
    use nexa_idtentry::interrupts::ist;
    use nexa_idtentry::interrupts::vectors::{
        lookup, IstFamily, TrapClass, IDT_VECTORS, IRQ_WORK_VECTOR, X86_TRAP_DB, X86_TRAP_DE,
        X86_TRAP_DF, X86_TRAP_GP, X86_TRAP_MC, X86_TRAP_NMI, X86_TRAP_OTHER, X86_TRAP_PF,
    };
    use nexa_idtentry::interrupts::{
        dispatch, dispatch_redirect, dispatch_xen_callback, InterruptedContext,
    };
    use nexa_idtentry::interrupts::{StubError, StubKind, StubSpec};
    use nexa_idtentry::platform::{KernelStack, TrapOutcome};

    use crate::mock::{run_terminal, Event, Finish, MockCpu};

    fn spec_of(vector: u8) -> StubSpec {
        StubSpec::for_vector(lookup(vector).unwrap())
    }

    // =========================================================================
    // Stub Requirements
    // =========================================================================

    #[test]
    fn test_stub_kinds_per_class() {
        assert_eq!(
            spec_of(X86_TRAP_DE).kind,
            StubKind::IdtEntry {
                has_error_code: false
            }
        );
        assert_eq!(
            spec_of(X86_TRAP_PF).kind,
            StubKind::IdtEntry {
                has_error_code: true
            }
        );
        assert_eq!(spec_of(X86_TRAP_NMI).kind, StubKind::Nmi);

        let db = spec_of(X86_TRAP_DB);
        assert_eq!(db.kind, StubKind::MceDb);
        assert_eq!(db.ist_slot, Some(IstFamily::Debug.ist_slot()));

        let df = spec_of(X86_TRAP_DF);
        assert_eq!(df.kind, StubKind::Df);
        assert_eq!(df.ist_slot, Some(0));
        assert!(df.has_error_code());
    }

    #[test]
    fn test_machine_check_stub() {
        if !config::X86_MCE {
            return;
        }
        let mc = spec_of(X86_TRAP_MC);
        assert_eq!(mc.kind, StubKind::MceDb);
        assert_eq!(mc.ist_slot, Some(3));
        assert_eq!(mc.asm_symbol, Some("asm_exc_machine_check"));
    }

    #[test]
    fn test_software_row_has_no_stub() {
        let iret = IDT_VECTORS
            .iter()
            .find(|row| row.class == TrapClass::SoftwareOnly)
            .unwrap();
        let spec = StubSpec::for_vector(iret);
        assert_eq!(spec.kind, StubKind::None);
        assert_eq!(spec.asm_symbol, None);
        assert_eq!(spec.ist_slot, None);
    }

    // =========================================================================
    // Dispatch Errors
    // =========================================================================

    #[test]
    fn test_dispatch_undefined_vector() {
        let _cpu = MockCpu::setup();
        let mut ctx = InterruptedContext::kernel(0x1000, 0x8000);
        assert_eq!(
            dispatch(21, &mut ctx, None),
            Err(StubError::UndefinedVector(21))
        );
    }

    #[test]
    fn test_dispatch_error_code_mismatch() {
        let cpu = MockCpu::setup();
        let mut ctx = InterruptedContext::kernel(0x1000, 0x8000);

        assert_eq!(
            dispatch(X86_TRAP_GP, &mut ctx, None),
            Err(StubError::MissingErrorCode(X86_TRAP_GP))
        );
        assert_eq!(
            dispatch(X86_TRAP_DE, &mut ctx, Some(1)),
            Err(StubError::UnexpectedErrorCode(X86_TRAP_DE))
        );
        // Rejected before any entry work.
        assert!(cpu.events().is_empty());
    }

    #[test]
    fn test_stub_error_display() {
        assert_eq!(
            StubError::MissingErrorCode(0x0d).to_string(),
            "vector 0x0d expects a hardware error code"
        );
        assert_eq!(StubError::NoStub(0x20).to_string(), "vector 0x20 has no stub");
    }

    // =========================================================================
    // Stack Selection
    // =========================================================================

    #[test]
    fn test_debug_from_kernel_runs_on_ist_stack() {
        let cpu = MockCpu::setup();
        cpu.set_debug_handled(true);
        let mut ctx = InterruptedContext::kernel(0x1000, 0x8000);

        let done = dispatch(X86_TRAP_DB, &mut ctx, None).unwrap();

        assert_eq!(done.class, TrapClass::DedicatedStack(IstFamily::Debug));
        assert_eq!(done.ist_slot, Some(2));
        assert!(!done.tracing_restored);
        assert_eq!(ist::active_ist_frames(), 0);
    }

    #[test]
    fn test_debug_from_user_falls_back_to_regular_stack() {
        let cpu = MockCpu::setup();
        cpu.enter_user();
        cpu.set_dr6(DR_STEP);
        cpu.set_debug_handled(true);
        let mut ctx = InterruptedContext::user(0x40_0000, 0x7fff_0000);

        let done = dispatch(X86_TRAP_DB, &mut ctx, None).unwrap();

        assert_eq!(done.class, TrapClass::DedicatedStackFallback(IstFamily::Debug));
        assert_eq!(done.ist_slot, None);
        assert!(done.tracing_restored);
        assert!(done.reentered_user);
        assert_eq!(context_tracking::ct_state(), ContextState::User);
        assert_eq!(
            cpu.events(),
            vec![
                Event::TraceOff,
                Event::UserExit,
                Event::Debug {
                    dr6: DR_STEP,
                    cause: nexa_idtentry::interrupts::fault::DebugCause::SingleStep
                },
                Event::TraceOn,
                Event::UserEnter,
            ]
        );
    }

    #[test]
    fn test_nmi_from_user_stays_on_ist_stack() {
        let cpu = MockCpu::setup();
        cpu.enter_user();
        cpu.on_trap(|_, _, _| TrapOutcome::Handled);
        let mut ctx = InterruptedContext::user(0x40_0000, 0x7fff_0000);

        let done = dispatch(X86_TRAP_NMI, &mut ctx, None).unwrap();

        assert_eq!(done.class, TrapClass::DedicatedStack(IstFamily::Nmi));
        assert_eq!(done.ist_slot, Some(1));
        assert!(done.reentered_user);
        assert!(cpu.events().contains(&Event::UserExit));
    }

    #[test]
    fn test_sysvec_dispatch() {
        let cpu = MockCpu::setup();
        let mut ctx = InterruptedContext::kernel(0x1000, 0x8000);

        let done = dispatch(IRQ_WORK_VECTOR, &mut ctx, None).unwrap();

        assert_eq!(done.class, TrapClass::Simple);
        assert!(done.tracing_restored);
        assert!(cpu.events().contains(&Event::Trap {
            vector: IRQ_WORK_VECTOR,
            error_code: 0
        }));
    }

    // =========================================================================
    // Stack Overflow on Entry
    // =========================================================================

    #[test]
    fn test_kernel_trap_on_guard_page_is_stack_overflow() {
        let finish = run_terminal(|| {
            let cpu = MockCpu::setup();
            cpu.set_kernel_stack(Some(KernelStack {
                bottom: 0xffff_c000_0001_0000,
                top: 0xffff_c000_0001_8000,
                guard_size: 0x1000,
            }));
            let mut ctx = InterruptedContext::kernel(0xffff_8000_0000_1000, 0xffff_c000_0000_ff80);
            let _ = dispatch(X86_TRAP_DE, &mut ctx, None);
        });

        let Finish::Died(death) = finish else {
            panic!("stack overflow returned");
        };
        assert_eq!(death.message, "kernel stack overflow (interrupted stack)");
        assert_eq!(death.fault_address, Some(0xffff_c000_0000_ff80));
        // The entry itself never ran.
        assert!(!death
            .events
            .iter()
            .any(|event| matches!(event, Event::Trap { .. })));
    }

    // =========================================================================
    // Paravirt Redirects
    // =========================================================================

    #[test]
    fn test_redirect_dispatch_follows_xen_build() {
        let cpu = MockCpu::setup();
        cpu.on_trap(|_, _, _| TrapOutcome::Handled);
        let mut ctx = InterruptedContext::kernel(0x1000, 0x8000);

        let result = dispatch_redirect(X86_TRAP_NMI, &mut ctx, None);

        if config::XEN_PV {
            let done = result.unwrap();
            assert_eq!(done.class, TrapClass::Redirect { target: IstFamily::Nmi });
            assert_eq!(done.ist_slot, None);
            assert_eq!(ist::active_ist_frames(), 0);
            assert!(cpu.events().contains(&Event::Trap {
                vector: X86_TRAP_NMI,
                error_code: 0
            }));
        } else {
            assert_eq!(result, Err(StubError::UndefinedVector(X86_TRAP_NMI)));
        }
    }

    #[test]
    fn test_xen_callback_dispatch_follows_xen_build() {
        let cpu = MockCpu::setup();
        cpu.on_trap(|_, _, _| TrapOutcome::Handled);
        let mut ctx = InterruptedContext::kernel(0x1000, 0x8000);

        let result = dispatch_xen_callback(&mut ctx);

        if config::XEN_PV {
            let done = result.unwrap();
            assert_eq!(done.vector, X86_TRAP_OTHER);
            assert_eq!(done.class, TrapClass::Simple);
            assert_eq!(done.ist_slot, None);
            assert!(done.tracing_restored);
            assert!(cpu.events().contains(&Event::Trap {
                vector: X86_TRAP_OTHER,
                error_code: 0
            }));
        } else {
            assert_eq!(result, Err(StubError::UndefinedVector(X86_TRAP_OTHER)));
            assert!(cpu.events().is_empty());
        }
    }
}
