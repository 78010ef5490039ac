//! The build driver and the pieces it runs on.

mod clean;
mod core;
pub mod executor;
pub mod feedback;
pub mod utils;

pub use clean::clean;
pub use core::{BuildError, BuildPlan, CompileEntry, Layout, Project};
pub use executor::{MultiCommand, build_using, run_commands, run_commands_parallel};
