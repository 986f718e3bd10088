//! Resource kinds and the typed payload carried by every syncable entity

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{Challenge, Friend, Habit, HabitCompletion, Notification};
use crate::error::{Error, Result};

/// The closed set of resource kinds the sync core knows how to push and pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Habit,
    HabitCompletion,
    Challenge,
    Friend,
    Notification,
}

impl ResourceKind {
    /// All kinds, in the order remote changes must be applied
    /// (completions reference habits).
    pub const ALL: [Self; 5] = [
        Self::Habit,
        Self::HabitCompletion,
        Self::Challenge,
        Self::Friend,
        Self::Notification,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Habit => "habit",
            Self::HabitCompletion => "habit_completion",
            Self::Challenge => "challenge",
            Self::Friend => "friend",
            Self::Notification => "notification",
        }
    }

    /// Local table holding entities of this kind
    pub const fn table(self) -> &'static str {
        match self {
            Self::Habit => "habits",
            Self::HabitCompletion => "habit_completions",
            Self::Challenge => "challenges",
            Self::Friend => "friends",
            Self::Notification => "notifications",
        }
    }

    /// Remote API collection path segment
    pub const fn collection(self) -> &'static str {
        match self {
            Self::Habit => "habits",
            Self::HabitCompletion => "habit-completions",
            Self::Challenge => "challenges",
            Self::Friend => "friends",
            Self::Notification => "notifications",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown resource kind: {s}")))
    }
}

/// Resource-specific fields of an entity, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "fields", rename_all = "snake_case")]
pub enum ResourceData {
    Habit(Habit),
    HabitCompletion(HabitCompletion),
    Challenge(Challenge),
    Friend(Friend),
    Notification(Notification),
}

impl ResourceData {
    pub const fn kind(&self) -> ResourceKind {
        match self {
            Self::Habit(_) => ResourceKind::Habit,
            Self::HabitCompletion(_) => ResourceKind::HabitCompletion,
            Self::Challenge(_) => ResourceKind::Challenge,
            Self::Friend(_) => ResourceKind::Friend,
            Self::Notification(_) => ResourceKind::Notification,
        }
    }

    /// Serialize only the resource fields (no kind tag); this is what gets
    /// stored in the `data` column and snapshotted into queue payloads.
    pub fn to_fields(&self) -> Result<serde_json::Value> {
        let value = match self {
            Self::Habit(habit) => serde_json::to_value(habit)?,
            Self::HabitCompletion(completion) => serde_json::to_value(completion)?,
            Self::Challenge(challenge) => serde_json::to_value(challenge)?,
            Self::Friend(friend) => serde_json::to_value(friend)?,
            Self::Notification(notification) => serde_json::to_value(notification)?,
        };
        Ok(value)
    }

    /// Parse resource fields of the given kind.
    pub fn from_fields(kind: ResourceKind, fields: serde_json::Value) -> Result<Self> {
        let data = match kind {
            ResourceKind::Habit => Self::Habit(serde_json::from_value(fields)?),
            ResourceKind::HabitCompletion => {
                Self::HabitCompletion(serde_json::from_value(fields)?)
            }
            ResourceKind::Challenge => Self::Challenge(serde_json::from_value(fields)?),
            ResourceKind::Friend => Self::Friend(serde_json::from_value(fields)?),
            ResourceKind::Notification => Self::Notification(serde_json::from_value(fields)?),
        };
        Ok(data)
    }
}

/// Typed capability implemented by every resource struct.
///
/// Dispatch to the right table and endpoint goes through [`ResourceKind`],
/// so adding a kind without handling it everywhere fails to compile.
pub trait SyncableResource: Sized {
    const KIND: ResourceKind;

    fn into_data(self) -> ResourceData;

    fn from_data(data: &ResourceData) -> Option<&Self>;

    fn from_data_mut(data: &mut ResourceData) -> Option<&mut Self>;
}

macro_rules! impl_syncable_resource {
    ($ty:ident) => {
        impl SyncableResource for $ty {
            const KIND: ResourceKind = ResourceKind::$ty;

            fn into_data(self) -> ResourceData {
                ResourceData::$ty(self)
            }

            fn from_data(data: &ResourceData) -> Option<&Self> {
                match data {
                    ResourceData::$ty(inner) => Some(inner),
                    _ => None,
                }
            }

            fn from_data_mut(data: &mut ResourceData) -> Option<&mut Self> {
                match data {
                    ResourceData::$ty(inner) => Some(inner),
                    _ => None,
                }
            }
        }
    };
}

impl_syncable_resource!(Habit);
impl_syncable_resource!(HabitCompletion);
impl_syncable_resource!(Challenge);
impl_syncable_resource!(Friend);
impl_syncable_resource!(Notification);
