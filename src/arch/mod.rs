//! Raw x86 accessors used by the bare-metal platform.
//!
//! Only the registers the entry protocol reads directly live here:
//! - CR2 (page-fault linear address)
//! - DR6 (debug status)
//! - TSC (log timestamps, hwlat tracer)
//!
//! Non-x86_64 builds get inert fallbacks so the crate still type-checks
//! on other hosts.

/// Read the side-band fault address register.
#[inline]
pub fn read_cr2() -> u64 {
    #[cfg(target_arch = "x86_64")]
    {
        x86_64::registers::control::Cr2::read_raw()
    }

    #[cfg(not(target_arch = "x86_64"))]
    {
        0
    }
}

/// Read the debug status register.
#[inline]
pub fn read_dr6() -> u64 {
    #[cfg(target_arch = "x86_64")]
    {
        let value: u64;
        // SAFETY: reading DR6 has no side effects; it faults only outside ring 0,
        // and this is only reached from the bare-metal platform.
        unsafe {
            core::arch::asm!("mov {}, dr6", out(reg) value, options(nomem, nostack, preserves_flags));
        }
        value
    }

    #[cfg(not(target_arch = "x86_64"))]
    {
        0
    }
}

#[inline]
pub fn read_tsc() -> u64 {
    // SAFETY: rdtsc only reads the time-stamp counter; every x86_64 CPU
    // has it.
    #[cfg(target_arch = "x86_64")]
    unsafe {
        core::arch::x86_64::_rdtsc()
    }

    #[cfg(not(target_arch = "x86_64"))]
    {
        0
    }
}

/// Stop this CPU for good.
pub fn halt_loop() -> ! {
    loop {
        #[cfg(target_arch = "x86_64")]
        {
            x86_64::instructions::interrupts::disable();
            x86_64::instructions::hlt();
        }

        #[cfg(not(target_arch = "x86_64"))]
        core::hint::spin_loop();
    }
}
