//! Mock implementations for testing
//!
//! Provides a mock trap platform standing in for the CPU and the rest of
//! the kernel.


pub use platform::{run_terminal, Death, Event, Finish, MockCpu, MockPlatform};
