//! Interrupted register state tests

#[cfg(test)]
mod tests {
    use std::mem::{offset_of, size_of};

    use x86_64::registers::rflags::RFlags;

    use nexa_idtentry::interrupts::regs::{KERNEL_CS, KERNEL_SS, USER_CS, USER_SS};
    use nexa_idtentry::interrupts::InterruptedContext;

    #[test]
    fn test_selectors() {
        assert_eq!(KERNEL_CS, 0x08);
        assert_eq!(KERNEL_SS, 0x10);
        assert_eq!(USER_CS, 0x23);
        assert_eq!(USER_SS, 0x1b);
    }

    #[test]
    fn test_mode_detection() {
        let kernel = InterruptedContext::kernel(0x1000, 0x8000);
        let user = InterruptedContext::user(0x40_0000, 0x7fff_0000);
        assert!(!kernel.user_mode());
        assert!(user.user_mode());
        assert!(kernel.interrupts_enabled());
        assert!(user.interrupts_enabled());
    }

    #[test]
    fn test_with_interrupts_only_touches_if() {
        let ctx = InterruptedContext::kernel(0x1000, 0x8000);
        let masked = ctx.with_interrupts(false);
        assert!(!masked.interrupts_enabled());
        assert_eq!(masked.rflags, 0x2);
        assert_eq!(masked.rip, ctx.rip);
        assert_eq!(masked.with_interrupts(true).flags(), ctx.flags());
    }

    #[test]
    fn test_vm86_flag_is_not_user_mode_on_64bit() {
        let mut ctx = InterruptedContext::kernel(0x1000, 0x8000);
        ctx.rflags |= RFlags::VIRTUAL_8086_MODE.bits();
        assert_eq!(ctx.user_mode(), !nexa_idtentry::config::X86_64);
    }

    #[test]
    fn test_fault_address_starts_empty() {
        let mut ctx = InterruptedContext::default();
        assert_eq!(ctx.fault_address(), None);

        // Zero is a valid fault address.
        ctx.set_fault_address(0);
        assert_eq!(ctx.fault_address(), Some(0));
        ctx.set_fault_address(0xffff_8000_dead_0000);
        assert_eq!(ctx.fault_address(), Some(0xffff_8000_dead_0000));
    }

    #[test]
    fn test_layout_matches_stub_push_order() {
        assert_eq!(offset_of!(InterruptedContext, r15), 0);
        assert_eq!(offset_of!(InterruptedContext, rdi), 14 * 8);
        assert_eq!(offset_of!(InterruptedContext, error_code), 15 * 8);
        assert_eq!(offset_of!(InterruptedContext, rip), 16 * 8);
        assert_eq!(offset_of!(InterruptedContext, ss), 20 * 8);
        assert_eq!(size_of::<InterruptedContext>(), 23 * 8);
    }
}
