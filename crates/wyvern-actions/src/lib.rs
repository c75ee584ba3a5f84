pub mod backoff;
pub mod builtin;
pub mod registry;

pub use backoff::Backoff;
pub use builtin::command::CommandAction;
pub use builtin::print::{PrintAction, PrintTarget};
pub use registry::{ActionFactory, ActionRegistry};
