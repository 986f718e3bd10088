//! Application services
//!
//! The store service: every local mutation and the engine's store steps.

mod database;

pub(crate) use database::Reconciled;
pub use database::{HabitPatch, SyncStore};
