//! Trap class generator
//!
//! Two families of macros, one pair per trap class:
//!
//! - `declare_*!` expands to a catalog row ([`Vector`]) for one entry point:
//!   vector number, class, symbol names of the low-level stubs and the
//!   high-level entry function the stub calls.
//! - `define_*!` wraps a handler body in the high-level entry function for
//!   its class. The body becomes a nested function, so a `return` inside it
//!   still lands in front of the exit half of the wrapper.
//!
//! ```ignore
//! define_idtentry_errorcode! {
//!     fn exc_general_protection(regs, error_code) {
//!         if fixup(regs) {
//!             return;
//!         }
//!         report(regs, error_code);
//!     }
//! }
//!
//! static ROW: Vector = declare_idtentry_errorcode!(X86_TRAP_GP, exc_general_protection);
//! ```
//!
//! High-level entry functions are `extern "C"` and, on bare-metal targets,
//! exported unmangled so the assembly stubs can call them by name.
//!
//! [`Vector`]: crate::interrupts::vectors::Vector

/// Expands the first block on 64-bit builds and the second on 32-bit ones.
#[cfg(not(feature = "x86_32"))]
#[doc(hidden)]
#[macro_export]
macro_rules! __if_x86_64 {
    ({ $($yes:tt)* } else { $($no:tt)* }) => { $($yes)* };
}

#[cfg(feature = "x86_32")]
#[doc(hidden)]
#[macro_export]
macro_rules! __if_x86_64 {
    ({ $($yes:tt)* } else { $($no:tt)* }) => { $($no)* };
}

// ---------------------------------------------------------------------------
// declare side
// ---------------------------------------------------------------------------

/// Row for a simple entry: no hardware error code.
#[macro_export]
macro_rules! declare_idtentry {
    ($vector:expr, $func:ident $(, enabled = $enabled:expr)?) => {
        $crate::interrupts::vectors::Vector {
            number: $vector,
            class: $crate::interrupts::vectors::TrapClass::Simple,
            name: stringify!($func),
            asm_symbol: Some(concat!("asm_", stringify!($func))),
            xen_symbol: Some(concat!("xen_asm_", stringify!($func))),
            entry: $crate::interrupts::vectors::EntryPoint::Simple($func),
            enabled: true $(&& $enabled)?,
        }
    };
}

/// Row for an entry with a hardware-pushed error code.
#[macro_export]
macro_rules! declare_idtentry_errorcode {
    ($vector:expr, $func:ident $(, enabled = $enabled:expr)?) => {
        $crate::interrupts::vectors::Vector {
            number: $vector,
            class: $crate::interrupts::vectors::TrapClass::ErrorCode,
            name: stringify!($func),
            asm_symbol: Some(concat!("asm_", stringify!($func))),
            xen_symbol: Some(concat!("xen_asm_", stringify!($func))),
            entry: $crate::interrupts::vectors::EntryPoint::ErrorCode($func),
            enabled: true $(&& $enabled)?,
        }
    };
}

/// Row for a fault that needs CR2 captured before anything else runs.
#[macro_export]
macro_rules! declare_idtentry_cr2 {
    ($vector:expr, $func:ident $(, enabled = $enabled:expr)?) => {
        $crate::interrupts::vectors::Vector {
            number: $vector,
            class: $crate::interrupts::vectors::TrapClass::FaultAddress,
            name: stringify!($func),
            asm_symbol: Some(concat!("asm_", stringify!($func))),
            xen_symbol: Some(concat!("xen_asm_", stringify!($func))),
            entry: $crate::interrupts::vectors::EntryPoint::ErrorCode($func),
            enabled: true $(&& $enabled)?,
        }
    };
}

/// Row for an IST entry and its regular-stack sibling.
#[macro_export]
macro_rules! declare_idtentry_ist {
    ($vector:expr, $func:ident, $noist:ident, $family:expr $(, enabled = $enabled:expr)?) => {
        $crate::interrupts::vectors::Vector {
            number: $vector,
            class: $crate::interrupts::vectors::TrapClass::DedicatedStack($family),
            name: stringify!($func),
            asm_symbol: Some(concat!("asm_", stringify!($func))),
            xen_symbol: Some(concat!("xen_asm_", stringify!($func))),
            entry: $crate::interrupts::vectors::EntryPoint::Ist {
                ist: $func,
                noist: $noist,
            },
            enabled: true $(&& $enabled)?,
        }
    };
}

/// NMI row. The NMI stub is hand-written and has no paravirt variant.
#[macro_export]
macro_rules! declare_idtentry_nmi {
    ($vector:expr, $func:ident, $noist:ident) => {
        $crate::interrupts::vectors::Vector {
            number: $vector,
            class: $crate::interrupts::vectors::TrapClass::DedicatedStack(
                $crate::interrupts::vectors::IstFamily::Nmi,
            ),
            name: stringify!($func),
            asm_symbol: Some(concat!("asm_", stringify!($func))),
            xen_symbol: None,
            entry: $crate::interrupts::vectors::EntryPoint::Ist {
                ist: $func,
                noist: $noist,
            },
            enabled: true,
        }
    };
}

#[macro_export]
macro_rules! declare_idtentry_df {
    ($vector:expr, $func:ident) => {
        $crate::interrupts::vectors::Vector {
            number: $vector,
            class: $crate::interrupts::vectors::TrapClass::DoubleFault,
            name: stringify!($func),
            asm_symbol: Some(concat!("asm_", stringify!($func))),
            xen_symbol: $crate::__if_x86_64!({ Some(concat!("xen_asm_", stringify!($func))) } else { None }),
            entry: $crate::__if_x86_64!({
                $crate::interrupts::vectors::EntryPoint::DoubleFault($func)
            } else {
                $crate::interrupts::vectors::EntryPoint::DoubleFaultShim($func)
            }),
            enabled: true,
        }
    };
}

/// Row for a software convention with no hardware stub.
#[macro_export]
macro_rules! declare_idtentry_sw {
    ($vector:expr, $func:ident $(, enabled = $enabled:expr)?) => {
        $crate::interrupts::vectors::Vector {
            number: $vector,
            class: $crate::interrupts::vectors::TrapClass::SoftwareOnly,
            name: stringify!($func),
            asm_symbol: None,
            xen_symbol: None,
            entry: $crate::interrupts::vectors::EntryPoint::Simple($func),
            enabled: true $(&& $enabled)?,
        }
    };
}

/// Paravirt redirect row: `xen<name>` forwards to the regular-stack entry
/// of an IST family.
#[macro_export]
macro_rules! declare_idtentry_xen {
    ($vector:expr, $name:ident, $family:expr, $target:ident $(, enabled = $enabled:expr)?) => {
        $crate::interrupts::vectors::Vector {
            number: $vector,
            class: $crate::interrupts::vectors::TrapClass::Redirect { target: $family },
            name: concat!("xen", stringify!($name)),
            asm_symbol: Some(concat!("asm_exc_xen", stringify!($name))),
            xen_symbol: Some(concat!("xen_asm_exc_xen", stringify!($name))),
            entry: $crate::interrupts::vectors::EntryPoint::Simple($target),
            enabled: true $(&& $enabled)?,
        }
    };
}

/// Row for a named system vector (IPIs, APIC local interrupts).
#[macro_export]
macro_rules! declare_sysvec {
    ($vector:expr, $func:ident $(, enabled = $enabled:expr)?) => {
        $crate::interrupts::vectors::Vector {
            number: $vector,
            class: $crate::interrupts::vectors::TrapClass::Simple,
            name: stringify!($func),
            asm_symbol: Some(concat!("asm_", stringify!($func))),
            xen_symbol: None,
            entry: $crate::interrupts::vectors::EntryPoint::Simple($func),
            enabled: true $(&& $enabled)?,
        }
    };
}

// ---------------------------------------------------------------------------
// define side
// ---------------------------------------------------------------------------

/// Simple entry: `idtentry_enter`, body, `idtentry_exit`.
#[macro_export]
macro_rules! define_idtentry {
    ($(#[$attr:meta])* fn $func:ident($regs:ident) $body:block) => {
        $(#[$attr])*
        #[cfg_attr(target_os = "none", no_mangle)]
        pub extern "C" fn $func(regs: &mut $crate::interrupts::InterruptedContext) {
            #[inline(always)]
            fn __body($regs: &mut $crate::interrupts::InterruptedContext) $body

            let state = $crate::interrupts::entry::idtentry_enter(regs);
            __body(regs);
            $crate::interrupts::entry::idtentry_exit(regs, state);
        }
    };
}

/// Same as [`define_idtentry!`]; used for entries that have no stub.
#[macro_export]
macro_rules! define_idtentry_sw {
    ($($tt:tt)*) => {
        $crate::define_idtentry! { $($tt)* }
    };
}

#[macro_export]
macro_rules! define_idtentry_errorcode {
    ($(#[$attr:meta])* fn $func:ident($regs:ident, $code:ident) $body:block) => {
        $(#[$attr])*
        #[cfg_attr(target_os = "none", no_mangle)]
        pub extern "C" fn $func(regs: &mut $crate::interrupts::InterruptedContext, error_code: u64) {
            #[inline(always)]
            fn __body($regs: &mut $crate::interrupts::InterruptedContext, $code: u64) $body

            let state = $crate::interrupts::entry::idtentry_enter(regs);
            __body(regs, error_code);
            $crate::interrupts::entry::idtentry_exit(regs, state);
        }
    };
}

/// Error-code entry that reads CR2 before `idtentry_enter` and hands the
/// address to the body.
#[macro_export]
macro_rules! define_idtentry_cr2 {
    ($(#[$attr:meta])* fn $func:ident($regs:ident, $code:ident, $addr:ident) $body:block) => {
        $(#[$attr])*
        #[cfg_attr(target_os = "none", no_mangle)]
        pub extern "C" fn $func(regs: &mut $crate::interrupts::InterruptedContext, error_code: u64) {
            #[inline(always)]
            fn __body($regs: &mut $crate::interrupts::InterruptedContext, $code: u64, $addr: u64) $body

            let address = $crate::platform::platform().read_cr2();
            regs.set_fault_address(address);

            let state = $crate::interrupts::entry::idtentry_enter(regs);
            __body(regs, error_code, address);
            $crate::interrupts::entry::idtentry_exit(regs, state);
        }
    };
}

/// IST entry. The body lands in a module named after the entry so the
/// regular-stack sibling from [`define_idtentry_noist!`] can share it.
///
/// 32-bit builds have no IST; the entry runs the ordinary tracker.
#[macro_export]
macro_rules! define_idtentry_ist {
    ($family:expr, $(#[$attr:meta])* fn $func:ident($regs:ident) $body:block) => {
        #[doc(hidden)]
        pub mod $func {
            #[allow(unused_imports)]
            use super::*;

            #[inline(always)]
            pub fn body($regs: &mut $crate::interrupts::InterruptedContext) $body
        }

        $(#[$attr])*
        #[cfg_attr(target_os = "none", no_mangle)]
        pub extern "C" fn $func(regs: &mut $crate::interrupts::InterruptedContext) {
            if $crate::config::X86_64 {
                let state = $crate::interrupts::ist::ist_enter(regs, $family);
                $func::body(regs);
                $crate::interrupts::ist::ist_exit(regs, state);
            } else {
                let state = $crate::interrupts::entry::idtentry_enter(regs);
                $func::body(regs);
                $crate::interrupts::entry::idtentry_exit(regs, state);
            }
        }
    };
}

/// Regular-stack entry for an IST vector: `noist_<func>` running the body
/// of `<func>` under the ordinary tracker. Used from user mode and by
/// paravirt redirects.
#[macro_export]
macro_rules! define_idtentry_noist {
    ($(#[$attr:meta])* $noist:ident, $func:ident) => {
        $(#[$attr])*
        #[cfg_attr(target_os = "none", no_mangle)]
        pub extern "C" fn $noist(regs: &mut $crate::interrupts::InterruptedContext) {
            let state = $crate::interrupts::entry::idtentry_enter(regs);
            $func::body(regs);
            $crate::interrupts::entry::idtentry_exit(regs, state);
        }
    };
}

/// Double fault entry. The body must not return.
///
/// On 64-bit the entry reads CR2, turns tracing off and accounts the DF
/// family, with no context transition: nothing about the tracker state can
/// be trusted at this point. On 32-bit the doublefault shim has already
/// read CR2 and the body is called directly.
#[macro_export]
macro_rules! define_idtentry_df {
    ($(#[$attr:meta])* fn $func:ident($regs:ident, $code:ident, $addr:ident) -> ! $body:block) => {
        $crate::__if_x86_64! {
            {
                $(#[$attr])*
                #[cfg_attr(target_os = "none", no_mangle)]
                pub extern "C" fn $func(
                    regs: &mut $crate::interrupts::InterruptedContext,
                    error_code: u64,
                ) -> ! {
                    #[inline(always)]
                    fn __body(
                        $regs: &mut $crate::interrupts::InterruptedContext,
                        $code: u64,
                        $addr: u64,
                    ) -> ! $body

                    let address = $crate::platform::platform().read_cr2();
                    regs.set_fault_address(address);

                    $crate::platform::platform().trace_hardirqs_off();
                    $crate::interrupts::ist::mark_double_fault();
                    __body(regs, error_code, address)
                }
            } else {
                $(#[$attr])*
                #[cfg_attr(target_os = "none", no_mangle)]
                pub extern "C" fn $func(
                    regs: &mut $crate::interrupts::InterruptedContext,
                    error_code: u64,
                    address: u64,
                ) -> ! {
                    #[inline(always)]
                    fn __body(
                        $regs: &mut $crate::interrupts::InterruptedContext,
                        $code: u64,
                        $addr: u64,
                    ) -> ! $body

                    regs.set_fault_address(address);
                    __body(regs, error_code, address)
                }
            }
        }
    };
}
