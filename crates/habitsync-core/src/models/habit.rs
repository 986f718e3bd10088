//! Habit and habit-completion models

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use super::LocalId;
use crate::error::{Error, Result};

/// How often a habit is expected to be completed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HabitFrequency {
    #[default]
    Daily,
    Weekly,
}

impl HabitFrequency {
    /// Number of whole periods between two dates (negative when `to` is earlier).
    pub fn periods_between(self, from: NaiveDate, to: NaiveDate) -> i64 {
        match self {
            Self::Daily => (to - from).num_days(),
            Self::Weekly => (week_start(to) - week_start(from)).num_days() / 7,
        }
    }
}

fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

/// A habit being tracked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Habit {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub frequency: HabitFrequency,
    #[serde(default)]
    pub current_streak: u32,
    #[serde(default)]
    pub longest_streak: u32,
    #[serde(default)]
    pub last_completed_on: Option<NaiveDate>,
    #[serde(default)]
    pub archived: bool,
}

impl Habit {
    /// Create a daily habit with no completions
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            frequency: HabitFrequency::Daily,
            current_streak: 0,
            longest_streak: 0,
            last_completed_on: None,
            archived: false,
        }
    }

    #[must_use]
    pub const fn with_frequency(mut self, frequency: HabitFrequency) -> Self {
        self.frequency = frequency;
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Recompute streak counters for a completion on `on`.
    ///
    /// A completion in the period right after the last one extends the
    /// streak, a later one restarts it at 1. A second completion in the same
    /// period, or one before the last completion, is rejected.
    pub fn record_completion(&mut self, on: NaiveDate) -> Result<()> {
        if self.archived {
            return Err(Error::InvalidInput(format!(
                "Habit '{}' is archived",
                self.name
            )));
        }

        self.current_streak = match self.last_completed_on {
            None => 1,
            Some(last) => match self.frequency.periods_between(last, on) {
                0 => {
                    return Err(Error::InvalidInput(format!(
                        "Habit '{}' is already completed for {on}",
                        self.name
                    )))
                }
                1 => self.current_streak.saturating_add(1),
                gap if gap < 0 => {
                    return Err(Error::InvalidInput(format!(
                        "Completion on {on} predates the last completion ({last})"
                    )))
                }
                _ => 1,
            },
        };
        self.longest_streak = self.longest_streak.max(self.current_streak);
        self.last_completed_on = Some(on);
        Ok(())
    }
}

/// One completion of a habit on a given day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HabitCompletion {
    /// Local id of the completed habit, when known on this device
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub habit_local_id: Option<LocalId>,
    /// Server id of the completed habit, filled in once the habit is synced
    #[serde(default)]
    pub habit_id: Option<String>,
    pub completed_on: NaiveDate,
    #[serde(default)]
    pub note: Option<String>,
}

impl HabitCompletion {
    #[must_use]
    pub const fn new(habit_local_id: LocalId, completed_on: NaiveDate) -> Self {
        Self {
            habit_local_id: Some(habit_local_id),
            habit_id: None,
            completed_on,
            note: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn first_completion_starts_streak() {
        let mut habit = Habit::new("Stretch");
        habit.record_completion(day(4)).unwrap();
        assert_eq!(habit.current_streak, 1);
        assert_eq!(habit.longest_streak, 1);
        assert_eq!(habit.last_completed_on, Some(day(4)));
    }

    #[test]
    fn consecutive_days_extend_streak() {
        let mut habit = Habit::new("Stretch");
        habit.record_completion(day(4)).unwrap();
        habit.record_completion(day(5)).unwrap();
        habit.record_completion(day(6)).unwrap();
        assert_eq!(habit.current_streak, 3);
        assert_eq!(habit.longest_streak, 3);
    }

    #[test]
    fn gap_resets_streak_but_keeps_longest() {
        let mut habit = Habit::new("Stretch");
        habit.record_completion(day(4)).unwrap();
        habit.record_completion(day(5)).unwrap();
        habit.record_completion(day(9)).unwrap();
        assert_eq!(habit.current_streak, 1);
        assert_eq!(habit.longest_streak, 2);
    }

    #[test]
    fn same_day_and_backdated_completions_are_rejected() {
        let mut habit = Habit::new("Stretch");
        habit.record_completion(day(5)).unwrap();
        assert!(habit.record_completion(day(5)).is_err());
        assert!(habit.record_completion(day(3)).is_err());
        assert_eq!(habit.current_streak, 1);
    }

    #[test]
    fn weekly_habits_count_calendar_weeks() {
        let mut habit = Habit::new("Long run").with_frequency(HabitFrequency::Weekly);
        // 2024-03-04 is a Monday, 2024-03-10 the Sunday of the same week
        habit.record_completion(day(4)).unwrap();
        assert!(habit.record_completion(day(10)).is_err());
        habit.record_completion(day(11)).unwrap();
        assert_eq!(habit.current_streak, 2);
        habit.record_completion(day(28)).unwrap();
        assert_eq!(habit.current_streak, 1);
    }

    #[test]
    fn archived_habit_cannot_be_completed() {
        let mut habit = Habit::new("Old");
        habit.archived = true;
        assert!(habit.record_completion(day(1)).is_err());
    }
}
