//! Action requests, results, and the orchestrating [`ActionGuard`].

pub mod guard;
pub mod request;
pub mod result;

pub use guard::ActionGuard;
pub use request::{ActionKind, ActionRequest};
pub use result::{ActionResult, Outcome};
