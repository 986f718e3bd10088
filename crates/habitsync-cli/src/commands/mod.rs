pub mod common;
pub mod habit;
pub mod queue;
pub mod social;
pub mod status;
pub mod sync;
pub mod watch;
