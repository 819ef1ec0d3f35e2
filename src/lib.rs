//! checkhost host process: built-in check modules and the check runner used
//! by the `checkhost` binary.

pub mod checks;
pub mod runner;

pub use checks::{agent_check_base, register_builtin_checks};
pub use runner::CheckRunner;
