//! Hardirq tracing state tests

#[cfg(test)]
mod tests {
    use nexa_idtentry::irqflags::{
        ftrace_count_nmi, hardirqs_enabled, hwlat_stats, trace_hardirqs_off, trace_hardirqs_on,
        transitions,
    };

    use crate::mock::MockCpu;

    #[test]
    fn test_transitions_count_real_changes_only() {
        let cpu = MockCpu::setup();
        let (on_before, off_before) = transitions(cpu.id).unwrap();

        trace_hardirqs_on();
        trace_hardirqs_on();
        assert!(hardirqs_enabled());
        trace_hardirqs_off();
        trace_hardirqs_off();
        assert!(!hardirqs_enabled());

        let (on, off) = transitions(cpu.id).unwrap();
        assert_eq!(on - on_before, 1);
        assert_eq!(off - off_before, 1);
    }

    #[test]
    fn test_hwlat_is_off_by_default() {
        let cpu = MockCpu::setup();
        ftrace_count_nmi();
        assert_eq!(hwlat_stats(cpu.id).unwrap().nmi_count, 0);
    }

    #[test]
    fn test_out_of_range_cpu() {
        assert!(transitions(usize::MAX).is_err());
        assert!(hwlat_stats(usize::MAX).is_err());
    }
}
