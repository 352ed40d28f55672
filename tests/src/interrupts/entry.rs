//! Entry/exit state tracker tests
//!
//! Covers `idtentry_enter`/`idtentry_exit` directly and through ordinary
//! vectors: hardirq tracing, user/kernel domain transitions and the
//! per-CPU counters.

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use serial_test::serial;

    use nexa_idtentry::context_tracking::{self, ContextState};
    use nexa_idtentry::interrupts::entry::{self, idtentry_enter, idtentry_exit};
    use nexa_idtentry::interrupts::vectors::X86_TRAP_GP;
    use nexa_idtentry::interrupts::{dispatch, InterruptedContext};
    use nexa_idtentry::irqflags;
    use nexa_idtentry::logger::LogLevel;
    use nexa_idtentry::platform::TrapOutcome;

    use crate::mock::{Event, MockCpu};

    // =========================================================================
    // Enter / Exit
    // =========================================================================

    #[test]
    fn test_kernel_entry_turns_tracing_off_without_transition() {
        let cpu = MockCpu::setup();
        cpu.trace_on();
        let ctx = InterruptedContext::kernel(0xffff_8000_0010_0000, 0xffff_8000_0020_0000);

        let state = idtentry_enter(&ctx);
        assert!(state.hardirqs_were_traced());
        assert!(!state.left_user());
        assert!(!irqflags::hardirqs_enabled());
        idtentry_exit(&ctx, state);

        assert_eq!(cpu.events(), vec![Event::TraceOff]);
        assert_eq!(context_tracking::ct_state(), ContextState::Kernel);
    }

    #[test]
    fn test_user_entry_leaves_user_domain() {
        let cpu = MockCpu::setup();
        cpu.enter_user();
        let ctx = InterruptedContext::user(0x40_1000, 0x7fff_f000);

        let state = idtentry_enter(&ctx);
        assert!(state.left_user());
        assert_eq!(context_tracking::ct_state(), ContextState::Kernel);
        idtentry_exit(&ctx, state);

        assert_eq!(cpu.events(), vec![Event::TraceOff, Event::UserExit]);
        let stats = entry::stats();
        assert_eq!(stats.user_entries, 1);
        assert_eq!(stats.ct_warnings, 0);
    }

    #[test]
    #[serial(logger)]
    fn test_user_entry_with_desynced_tracker_warns() {
        let cpu = MockCpu::setup();
        // Tracker still says kernel although the trap hit user code.
        let ctx = InterruptedContext::user(0x40_1000, 0x7fff_f000);

        let state = idtentry_enter(&ctx);
        assert!(state.left_user());
        idtentry_exit(&ctx, state);

        assert_eq!(entry::stats().ct_warnings, 1);
        assert!(cpu.logged(LogLevel::WARN, "context tracking says kernel"));
        assert!(cpu.events().contains(&Event::UserExit));
    }

    #[test]
    fn test_stats_count_balanced_pairs() {
        let _cpu = MockCpu::setup();
        let ctx = InterruptedContext::kernel(0x1000, 0x8000);

        for _ in 0..3 {
            let state = idtentry_enter(&ctx);
            idtentry_exit(&ctx, state);
        }

        let stats = entry::stats();
        assert_eq!(stats.entries, 3);
        assert_eq!(stats.exits, 3);
        assert_eq!(stats.ist_entries, 0);
    }

    #[test]
    fn test_stats_for_other_cpu_untouched() {
        let first = MockCpu::setup();
        let ctx = InterruptedContext::kernel(0x1000, 0x8000);
        let state = idtentry_enter(&ctx);
        idtentry_exit(&ctx, state);

        let second = MockCpu::setup();
        assert_ne!(first.id, second.id);
        assert_eq!(entry::stats_for(first.id).unwrap().entries, 1);
        assert_eq!(entry::stats_for(second.id).unwrap().entries, 0);
    }

    // =========================================================================
    // Error-code Vector End to End
    // =========================================================================

    fn capture_traps(cpu: &MockCpu) -> Rc<RefCell<Vec<(u8, u64, u64)>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        cpu.on_trap(move |vector, _ctx, error_code| {
            sink.borrow_mut().push((vector, error_code, entry::stats().exits));
            TrapOutcome::Handled
        });
        seen
    }

    #[test]
    fn test_errorcode_vector_from_user() {
        let cpu = MockCpu::setup();
        cpu.enter_user();
        let seen = capture_traps(&cpu);
        let mut ctx = InterruptedContext::user(0x40_2000, 0x7fff_e000);

        let done = dispatch(X86_TRAP_GP, &mut ctx, Some(0x0002)).unwrap();

        // Body ran once with the hardware error code, before the exit half.
        assert_eq!(*seen.borrow(), vec![(X86_TRAP_GP, 0x0002, 0)]);
        assert_eq!(
            cpu.events(),
            vec![
                Event::TraceOff,
                Event::UserExit,
                Event::Trap {
                    vector: X86_TRAP_GP,
                    error_code: 0x0002
                },
                Event::TraceOn,
                Event::UserEnter,
            ]
        );
        assert!(done.tracing_restored);
        assert!(done.reentered_user);
        assert_eq!(context_tracking::ct_state(), ContextState::User);

        let stats = entry::stats();
        assert_eq!((stats.entries, stats.exits), (1, 1));
    }

    #[test]
    fn test_errorcode_vector_from_kernel() {
        let cpu = MockCpu::setup();
        let seen = capture_traps(&cpu);
        let mut ctx = InterruptedContext::kernel(0xffff_8000_0000_4000, 0xffff_8000_0080_0000);

        let done = dispatch(X86_TRAP_GP, &mut ctx, Some(0x0002)).unwrap();

        assert_eq!(seen.borrow().len(), 1);
        assert!(!cpu.events().contains(&Event::UserExit));
        assert!(!cpu.events().contains(&Event::UserEnter));
        assert!(!done.reentered_user);
        assert_eq!(ctx.error_code, 0x0002);
    }

    #[test]
    fn test_interrupts_off_context_keeps_tracing_off() {
        let cpu = MockCpu::setup();
        let _seen = capture_traps(&cpu);
        let mut ctx = InterruptedContext::kernel(0x1000, 0x8000).with_interrupts(false);

        let done = dispatch(X86_TRAP_GP, &mut ctx, Some(0)).unwrap();

        assert!(!done.tracing_restored);
        assert!(!irqflags::hardirqs_enabled());
        assert!(!cpu.events().contains(&Event::TraceOn));
    }
}
