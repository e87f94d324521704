//! Tool wrappers exposed to the planner. Every call routes through
//! [`crate::action::ActionGuard::evaluate_and_execute`].

pub mod fs;
pub mod git;
pub mod shell;
pub mod web;

pub use fs::FsTool;
pub use git::GitTool;
pub use shell::ShellTool;
pub use web::WebTool;
