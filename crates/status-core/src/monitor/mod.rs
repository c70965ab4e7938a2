pub mod change;
pub mod engine;
pub mod error;
pub mod store;

pub use change::{has_changed, Transition};
pub use engine::{Monitor, RunSummary, TargetReport};
pub use error::StateError;
pub use store::StateStore;
