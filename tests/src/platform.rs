//! Platform installation tests
//!
//! Installation is once per process, so every test here forks.

#[cfg(test)]
mod tests {
    use rusty_fork::rusty_fork_test;

    use nexa_idtentry::platform::{self, PlatformError};

    use crate::mock::platform::{install, mock};

    rusty_fork_test! {
        #[test]
        fn test_bare_metal_defaults_before_install() {
            assert!(!platform::is_installed());
            let p = platform::platform();
            assert_eq!(p.cpu_id(), 0);
            assert_eq!(p.kvm_async_pf_flags(), 0);
            assert!(p.kernel_stack().is_none());
        }
    }

    rusty_fork_test! {
        #[test]
        fn test_install_once() {
            assert_eq!(platform::install(mock()), Ok(()));
            assert!(platform::is_installed());
            assert_eq!(platform::install(mock()), Err(PlatformError::AlreadyInstalled));
            assert_eq!(
                PlatformError::AlreadyInstalled.to_string(),
                "trap platform already installed"
            );

            // The helper tolerates an existing installation.
            install();
            assert!(platform::is_installed());
        }
    }
}
