//! Challenge, friend, and notification models

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A shared challenge between friends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// User ids of participants, in join order
    #[serde(default)]
    pub participants: Vec<String>,
}

impl Challenge {
    pub fn new(title: impl Into<String>, start_date: NaiveDate, end_date: NaiveDate) -> Result<Self> {
        if end_date < start_date {
            return Err(Error::InvalidInput(format!(
                "Challenge ends ({end_date}) before it starts ({start_date})"
            )));
        }
        Ok(Self {
            title: title.into(),
            description: None,
            start_date,
            end_date,
            participants: Vec::new(),
        })
    }

    /// Add a participant; returns `false` if they had already joined.
    pub fn join(&mut self, user_id: impl Into<String>) -> bool {
        let user_id = user_id.into();
        if self.participants.contains(&user_id) {
            return false;
        }
        self.participants.push(user_id);
        true
    }
}

/// Relationship state with another user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FriendStatus {
    #[default]
    Pending,
    Accepted,
    Blocked,
}

/// Another user in the friend list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Friend {
    pub user_id: String,
    pub display_name: String,
    #[serde(default)]
    pub status: FriendStatus,
}

impl Friend {
    #[must_use]
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            status: FriendStatus::Pending,
        }
    }
}

/// An in-app notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Free-form category, e.g. "reminder" or "friend_request"
    pub category: String,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub read: bool,
}

impl Notification {
    #[must_use]
    pub fn new(category: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            title: title.into(),
            body: None,
            read: false,
        }
    }
}
