//! Embassy async tasks
//!
//! Each task runs independently and communicates via channels/signals.

pub mod commands;
pub mod control;
pub mod limits;
pub mod probe;
pub mod supervisor;
pub mod telemetry;

pub use commands::command_task;
pub use control::control_task;
pub use limits::limits_task;
pub use probe::{probe_task, ProbeLevel};
pub use supervisor::supervisor_task;
pub use telemetry::telemetry_task;
