//! Vector catalog
//!
//! The closed set of trap vectors this kernel handles, each with its trap
//! class and high-level entry function. Rows are built at compile time by
//! the `declare_*!` macros; whether a row is live depends on the build's
//! features. Nothing is registered at run time.

use core::fmt;

use lazy_static::lazy_static;

use crate::config;
use crate::interrupts::exceptions::*;
use crate::interrupts::InterruptedContext;

// Exception vectors
pub const X86_TRAP_DE: u8 = 0;
pub const X86_TRAP_DB: u8 = 1;
pub const X86_TRAP_NMI: u8 = 2;
pub const X86_TRAP_BP: u8 = 3;
pub const X86_TRAP_OF: u8 = 4;
pub const X86_TRAP_BR: u8 = 5;
pub const X86_TRAP_UD: u8 = 6;
pub const X86_TRAP_NM: u8 = 7;
pub const X86_TRAP_DF: u8 = 8;
pub const X86_TRAP_OLD_MF: u8 = 9;
pub const X86_TRAP_TS: u8 = 10;
pub const X86_TRAP_NP: u8 = 11;
pub const X86_TRAP_SS: u8 = 12;
pub const X86_TRAP_GP: u8 = 13;
pub const X86_TRAP_PF: u8 = 14;
pub const X86_TRAP_SPURIOUS: u8 = 15;
pub const X86_TRAP_MF: u8 = 16;
pub const X86_TRAP_AC: u8 = 17;
pub const X86_TRAP_MC: u8 = 18;
pub const X86_TRAP_XF: u8 = 19;
pub const X86_TRAP_IRET: u8 = 32;
/// Dummy number for entries not reached through the IDT. The native stubs
/// never compare against it, and it is kept out of the native index.
pub const X86_TRAP_OTHER: u8 = 0xff;

// System vectors
pub const RESCHEDULE_VECTOR: u8 = 0xfd;
pub const THERMAL_APIC_VECTOR: u8 = 0xfa;
pub const THRESHOLD_APIC_VECTOR: u8 = 0xf9;
pub const IRQ_WORK_VECTOR: u8 = 0xf6;
pub const DEFERRED_ERROR_VECTOR: u8 = 0xf4;
pub const POSTED_INTR_VECTOR: u8 = 0xf2;
pub const POSTED_INTR_WAKEUP_VECTOR: u8 = 0xf1;
pub const POSTED_INTR_NESTED_VECTOR: u8 = 0xf0;

/// Trap families that run on a dedicated (IST) stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IstFamily {
    Nmi,
    Debug,
    MachineCheck,
    DoubleFault,
}

impl IstFamily {
    pub const COUNT: usize = 4;
    pub const ALL: [IstFamily; Self::COUNT] = [
        IstFamily::Nmi,
        IstFamily::Debug,
        IstFamily::MachineCheck,
        IstFamily::DoubleFault,
    ];

    pub const fn index(self) -> usize {
        match self {
            IstFamily::Nmi => 0,
            IstFamily::Debug => 1,
            IstFamily::MachineCheck => 2,
            IstFamily::DoubleFault => 3,
        }
    }

    /// TSS IST slot (0-based) holding this family's stack.
    pub const fn ist_slot(self) -> u8 {
        match self {
            IstFamily::DoubleFault => 0,
            IstFamily::Nmi => 1,
            IstFamily::Debug => 2,
            IstFamily::MachineCheck => 3,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            IstFamily::Nmi => "NMI",
            IstFamily::Debug => "#DB",
            IstFamily::MachineCheck => "#MC",
            IstFamily::DoubleFault => "#DF",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapClass {
    /// No error code.
    Simple,
    /// Hardware pushes an error code.
    ErrorCode,
    /// Error code plus CR2, read before any other entry work.
    FaultAddress,
    /// Runs on the family's IST stack and may nest.
    DedicatedStack(IstFamily),
    /// Regular-stack sibling of a `DedicatedStack` entry.
    DedicatedStackFallback(IstFamily),
    /// IST stack; never returns.
    DoubleFault,
    /// No stub; software convention only.
    SoftwareOnly,
    /// Paravirt entry forwarding to the fallback of an IST family.
    Redirect { target: IstFamily },
}

impl TrapClass {
    pub fn has_error_code(&self) -> bool {
        matches!(
            self,
            TrapClass::ErrorCode | TrapClass::FaultAddress | TrapClass::DoubleFault
        )
    }

    /// Whether the class needs a low-level stub.
    pub fn needs_stub(&self) -> bool {
        !matches!(self, TrapClass::SoftwareOnly | TrapClass::Redirect { .. })
    }

    pub fn ist_family(&self) -> Option<IstFamily> {
        match *self {
            TrapClass::DedicatedStack(family) | TrapClass::DedicatedStackFallback(family) => {
                Some(family)
            }
            TrapClass::DoubleFault => Some(IstFamily::DoubleFault),
            _ => None,
        }
    }
}

pub type SimpleEntry = extern "C" fn(&mut InterruptedContext);
pub type ErrorCodeEntry = extern "C" fn(&mut InterruptedContext, u64);
pub type DoubleFaultEntry = extern "C" fn(&mut InterruptedContext, u64) -> !;
/// 32-bit double fault, called by the shim with CR2 already read.
pub type DoubleFaultShimEntry = extern "C" fn(&mut InterruptedContext, u64, u64) -> !;

/// High-level entry function(s) of a row, by calling contract.
#[derive(Clone, Copy)]
pub enum EntryPoint {
    Simple(SimpleEntry),
    ErrorCode(ErrorCodeEntry),
    Ist { ist: SimpleEntry, noist: SimpleEntry },
    DoubleFault(DoubleFaultEntry),
    DoubleFaultShim(DoubleFaultShimEntry),
}

impl EntryPoint {
    pub fn shape(&self) -> &'static str {
        match self {
            EntryPoint::Simple(_) => "simple",
            EntryPoint::ErrorCode(_) => "errorcode",
            EntryPoint::Ist { .. } => "ist",
            EntryPoint::DoubleFault(_) => "df",
            EntryPoint::DoubleFaultShim(_) => "df-shim",
        }
    }

    /// Whether this contract fits `class`.
    pub fn fits(&self, class: TrapClass) -> bool {
        match (class, self) {
            (TrapClass::Simple, EntryPoint::Simple(_))
            | (TrapClass::SoftwareOnly, EntryPoint::Simple(_))
            | (TrapClass::Redirect { .. }, EntryPoint::Simple(_))
            | (TrapClass::DedicatedStackFallback(_), EntryPoint::Simple(_))
            | (TrapClass::ErrorCode, EntryPoint::ErrorCode(_))
            | (TrapClass::FaultAddress, EntryPoint::ErrorCode(_))
            | (TrapClass::DedicatedStack(_), EntryPoint::Ist { .. }) => true,
            (TrapClass::DoubleFault, EntryPoint::DoubleFault(_)) => config::X86_64,
            (TrapClass::DoubleFault, EntryPoint::DoubleFaultShim(_)) => !config::X86_64,
            _ => false,
        }
    }
}

impl fmt::Debug for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntryPoint::{}", self.shape())
    }
}

/// One catalog row.
#[derive(Debug, Clone, Copy)]
pub struct Vector {
    pub number: u8,
    pub class: TrapClass,
    /// High-level entry function name.
    pub name: &'static str,
    /// Native low-level stub, `None` when no stub is emitted.
    pub asm_symbol: Option<&'static str>,
    /// Paravirt low-level stub.
    pub xen_symbol: Option<&'static str>,
    pub entry: EntryPoint,
    /// Present in this build.
    pub enabled: bool,
}

pub static IDT_VECTORS: [Vector; 30] = [
    // Simple exception entries
    crate::declare_idtentry!(X86_TRAP_DE, exc_divide_error),
    crate::declare_idtentry!(X86_TRAP_BP, exc_int3),
    crate::declare_idtentry!(X86_TRAP_OF, exc_overflow),
    crate::declare_idtentry!(X86_TRAP_BR, exc_bounds),
    crate::declare_idtentry!(X86_TRAP_UD, exc_invalid_op),
    crate::declare_idtentry!(X86_TRAP_NM, exc_device_not_available),
    crate::declare_idtentry!(X86_TRAP_OLD_MF, exc_coproc_segment_overrun),
    crate::declare_idtentry!(X86_TRAP_SPURIOUS, exc_spurious_interrupt_bug),
    crate::declare_idtentry!(X86_TRAP_MF, exc_coprocessor_error),
    crate::declare_idtentry!(X86_TRAP_XF, exc_simd_coprocessor_error),
    // 32-bit software IRET trap
    crate::declare_idtentry_sw!(X86_TRAP_IRET, exc_iret_error, enabled = !config::X86_64),
    // Hardware error code
    crate::declare_idtentry_errorcode!(X86_TRAP_TS, exc_invalid_tss),
    crate::declare_idtentry_errorcode!(X86_TRAP_NP, exc_segment_not_present),
    crate::declare_idtentry_errorcode!(X86_TRAP_SS, exc_stack_segment),
    crate::declare_idtentry_errorcode!(X86_TRAP_GP, exc_general_protection),
    crate::declare_idtentry_errorcode!(X86_TRAP_AC, exc_alignment_check),
    // Page fault
    crate::declare_idtentry_cr2!(X86_TRAP_PF, exc_page_fault, enabled = !config::KVM_GUEST),
    crate::declare_idtentry_cr2!(X86_TRAP_PF, exc_async_page_fault, enabled = config::KVM_GUEST),
    // IST
    crate::declare_idtentry_ist!(
        X86_TRAP_MC,
        exc_machine_check,
        noist_exc_machine_check,
        IstFamily::MachineCheck,
        enabled = config::X86_MCE
    ),
    crate::declare_idtentry_nmi!(X86_TRAP_NMI, exc_nmi, noist_exc_nmi),
    crate::declare_idtentry_ist!(X86_TRAP_DB, exc_debug, noist_exc_debug, IstFamily::Debug),
    crate::declare_idtentry_df!(X86_TRAP_DF, exc_double_fault),
    // System vectors
    crate::declare_sysvec!(RESCHEDULE_VECTOR, sysvec_reschedule_ipi, enabled = config::SMP),
    crate::declare_sysvec!(THERMAL_APIC_VECTOR, sysvec_thermal),
    crate::declare_sysvec!(THRESHOLD_APIC_VECTOR, sysvec_threshold, enabled = config::X86_MCE),
    crate::declare_sysvec!(IRQ_WORK_VECTOR, sysvec_irq_work),
    crate::declare_sysvec!(DEFERRED_ERROR_VECTOR, sysvec_deferred_error, enabled = config::X86_MCE),
    crate::declare_sysvec!(POSTED_INTR_VECTOR, sysvec_kvm_posted_intr_ipi, enabled = config::KVM_HOST),
    crate::declare_sysvec!(
        POSTED_INTR_WAKEUP_VECTOR,
        sysvec_kvm_posted_intr_wakeup_ipi,
        enabled = config::KVM_HOST
    ),
    crate::declare_sysvec!(
        POSTED_INTR_NESTED_VECTOR,
        sysvec_kvm_posted_intr_nested_ipi,
        enabled = config::KVM_HOST
    ),
];

/// Paravirt redirects. Not native IDT vectors, so kept apart.
pub static XEN_REDIRECTS: [Vector; 2] = [
    crate::declare_idtentry_xen!(X86_TRAP_NMI, nmi, IstFamily::Nmi, noist_exc_nmi, enabled = config::XEN_PV),
    crate::declare_idtentry_xen!(X86_TRAP_DB, debug, IstFamily::Debug, noist_exc_debug, enabled = config::XEN_PV),
];

/// Paravirt entries with their own stubs and no IDT vector.
pub static XEN_ENTRIES: [Vector; 1] = [crate::declare_idtentry!(
    X86_TRAP_OTHER,
    exc_xen_hypervisor_callback,
    enabled = config::XEN_PV
)];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogError {
    /// Two enabled rows share a vector number.
    DuplicateVector(u8),
    /// Class needs a low-level stub but the row names none.
    MissingStub(u8),
    /// Software-only row names a stub.
    UnexpectedStub(u8),
    /// Entry function contract does not fit the row's class.
    EntryShape(u8),
    /// Redirect to an IST family with no enabled row.
    DanglingRedirect(u8),
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::DuplicateVector(n) => write!(f, "vector {:#04x} declared twice", n),
            CatalogError::MissingStub(n) => write!(f, "vector {:#04x} has no low-level stub", n),
            CatalogError::UnexpectedStub(n) => {
                write!(f, "software-only vector {:#04x} names a stub", n)
            }
            CatalogError::EntryShape(n) => {
                write!(f, "vector {:#04x} entry does not match its class", n)
            }
            CatalogError::DanglingRedirect(n) => {
                write!(f, "redirect {:#04x} targets a missing IST family", n)
            }
        }
    }
}

/// Check a table of native rows.
pub fn validate(table: &[Vector]) -> Result<(), CatalogError> {
    for (i, row) in table.iter().enumerate() {
        if !row.enabled {
            continue;
        }
        if table[i + 1..]
            .iter()
            .any(|other| other.enabled && other.number == row.number)
        {
            return Err(CatalogError::DuplicateVector(row.number));
        }
        check_row(row)?;
    }
    Ok(())
}

/// Check redirect rows against the native table they forward into.
pub fn validate_redirects(redirects: &[Vector], natives: &[Vector]) -> Result<(), CatalogError> {
    for (i, row) in redirects.iter().enumerate() {
        if !row.enabled {
            continue;
        }
        if redirects[i + 1..]
            .iter()
            .any(|other| other.enabled && other.number == row.number)
        {
            return Err(CatalogError::DuplicateVector(row.number));
        }
        check_row(row)?;

        let TrapClass::Redirect { target } = row.class else {
            return Err(CatalogError::EntryShape(row.number));
        };
        let has_target = natives
            .iter()
            .any(|native| native.enabled && native.class == TrapClass::DedicatedStack(target));
        if !has_target {
            return Err(CatalogError::DanglingRedirect(row.number));
        }
    }
    Ok(())
}

fn check_row(row: &Vector) -> Result<(), CatalogError> {
    match (row.class.needs_stub(), row.asm_symbol) {
        (true, None) => return Err(CatalogError::MissingStub(row.number)),
        (false, Some(_)) if row.class == TrapClass::SoftwareOnly => {
            return Err(CatalogError::UnexpectedStub(row.number))
        }
        _ => {}
    }
    if !row.entry.fits(row.class) {
        return Err(CatalogError::EntryShape(row.number));
    }
    Ok(())
}

lazy_static! {
    static ref INDEX: [Option<&'static Vector>; 256] = {
        let mut index = [None; 256];
        for row in IDT_VECTORS.iter().filter(|row| row.enabled) {
            index[row.number as usize] = Some(row);
        }
        index
    };
}

/// Validate the built-in tables and build the lookup index.
pub fn init() -> Result<(), CatalogError> {
    validate(&IDT_VECTORS)?;
    validate_redirects(&XEN_REDIRECTS, &IDT_VECTORS)?;
    validate(&XEN_ENTRIES)?;
    lazy_static::initialize(&INDEX);

    for row in enabled_vectors() {
        crate::kdebug!(
            "idtentry: {:#04x} {:<36} {:?}",
            row.number,
            row.name,
            row.class
        );
    }
    Ok(())
}

/// Enabled native row for `number`, or `None` for reserved/unused vectors.
pub fn lookup(number: u8) -> Option<&'static Vector> {
    INDEX[number as usize]
}

pub fn lookup_redirect(number: u8) -> Option<&'static Vector> {
    redirects().find(|row| row.number == number)
}

pub fn enabled_vectors() -> impl Iterator<Item = &'static Vector> {
    IDT_VECTORS.iter().filter(|row| row.enabled)
}

pub fn redirects() -> impl Iterator<Item = &'static Vector> {
    XEN_REDIRECTS.iter().filter(|row| row.enabled)
}

/// The Xen event-channel upcall row, on `xen_pv` builds.
pub fn xen_hypervisor_callback() -> Option<&'static Vector> {
    XEN_ENTRIES.iter().find(|row| row.enabled)
}
