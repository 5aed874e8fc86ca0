//! Command dispatch: from a command name and flat options to a rendered
//! result and an exit status.

pub mod dispatch;
pub mod request;

pub use dispatch::{Dispatcher, Outcome, OutputFormat};
pub use request::{CommandRequest, ImportSource, Options, COMMANDS};
