//! Per-CPU arena tests

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use nexa_idtentry::interrupts::entry;
    use nexa_idtentry::percpu::{PerCpu, PerCpuError, MAX_CPUS};

    use crate::mock::MockCpu;

    #[allow(clippy::declare_interior_mutable_const)]
    const ZERO: AtomicU32 = AtomicU32::new(0);

    static COUNTERS: PerCpu<AtomicU32> = PerCpu::new([ZERO; MAX_CPUS]);

    #[test]
    fn test_this_cpu_follows_platform_cpu_id() {
        let cpu = MockCpu::setup();
        COUNTERS.this_cpu().fetch_add(5, Ordering::Relaxed);

        assert_eq!(COUNTERS.get(cpu.id).unwrap().load(Ordering::Relaxed), 5);
        assert_eq!(COUNTERS.cpu(cpu.id).load(Ordering::Relaxed), 5);
    }

    #[test]
    fn test_get_out_of_range() {
        assert_eq!(COUNTERS.get(MAX_CPUS).err(), Some(PerCpuError::OutOfRange(MAX_CPUS)));
        assert_eq!(
            PerCpuError::OutOfRange(300).to_string(),
            "cpu 300 exceeds MAX_CPUS (256)"
        );
        assert!(entry::stats_for(MAX_CPUS).is_err());
    }

    #[test]
    #[should_panic(expected = "per-cpu")]
    fn test_cpu_out_of_range_panics() {
        let _ = COUNTERS.cpu(MAX_CPUS);
    }

    #[test]
    fn test_iter_visits_every_slot() {
        assert_eq!(COUNTERS.iter().count(), MAX_CPUS);
        assert_eq!(COUNTERS.iter().last().map(|(cpu, _)| cpu), Some(MAX_CPUS - 1));
    }
}
