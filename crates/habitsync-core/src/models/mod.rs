//! Data models for habitsync

mod entity;
mod habit;
mod ids;
mod operation;
mod resource;
mod social;
mod sync_conflict;

pub use entity::{SyncStatus, SyncableEntity};
pub use habit::{Habit, HabitCompletion, HabitFrequency};
pub use ids::LocalId;
pub use operation::{NewOperation, OperationType, QueuedOperation};
pub use resource::{ResourceData, ResourceKind, SyncableResource};
pub use social::{Challenge, Friend, FriendStatus, Notification};
pub use sync_conflict::{Resolution, SyncConflict};
