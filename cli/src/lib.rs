//! Embeddable command-line surface for task-runner scripts.
//!
//! A build script defines its tasks and options against `dagrun_core`,
//! then hands control to [`app::run`], which parses the command line,
//! applies option overrides, wires up cancellation and progress display,
//! and executes the requested tasks.

pub mod app;
pub mod args;

pub use app::run;
pub use args::Args;
