//! Long-running services supervised during a deployment.
//!
//! Each service is in its own submodule with:
//! - `cmd.rs` - Command builder for the service arguments
//! - `mod.rs` - Config, handle and start logic

pub mod validator;

// Re-export commonly used types
pub use validator::{CleanupOutcome, StartupSignal, ValidatorConfig, ValidatorHandle};
