use std::fmt;

use serde::{Deserialize, Serialize};

pub type ExerciseId = i64;

/// Lifecycle status stored in the exercise table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i64)]
pub enum ExerciseStatus {
    Calibrating = 1,
    Comparing = 2,
    ReadyOrDone = 3,
}

impl ExerciseStatus {
    /// Statuses that make a record a candidate for the active exercise.
    pub const ELIGIBLE: [ExerciseStatus; 2] = [Self::Calibrating, Self::ReadyOrDone];

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Calibrating),
            2 => Some(Self::Comparing),
            3 => Some(Self::ReadyOrDone),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn is_eligible(self) -> bool {
        Self::ELIGIBLE.contains(&self)
    }
}

impl fmt::Display for ExerciseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Calibrating => "calibrating",
            Self::Comparing => "comparing",
            Self::ReadyOrDone => "ready/done",
        };
        write!(f, "{} ({})", name, self.code())
    }
}

/// Names the reference pose an exercise is compared against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExerciseKey(String);

impl ExerciseKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExerciseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One row of the exercise table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseRecord {
    pub id: ExerciseId,
    pub name: String,
    pub category: String,
    pub status: ExerciseStatus,
}

impl ExerciseRecord {
    /// Reference poses are keyed by category.
    pub fn key(&self) -> ExerciseKey {
        ExerciseKey::new(self.category.clone())
    }
}

/// The exercise the worker is currently driven by.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveExercise {
    pub id: ExerciseId,
    pub name: String,
    pub key: ExerciseKey,
    pub mode: ExerciseStatus,
}

impl From<&ExerciseRecord> for ActiveExercise {
    fn from(record: &ExerciseRecord) -> Self {
        Self {
            id: record.id,
            name: record.name.clone(),
            key: record.key(),
            mode: record.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        for status in [ExerciseStatus::Calibrating, ExerciseStatus::Comparing, ExerciseStatus::ReadyOrDone] {
            assert_eq!(ExerciseStatus::from_code(status.code()), Some(status));
        }
        assert_eq!(ExerciseStatus::from_code(0), None);
        assert_eq!(ExerciseStatus::from_code(4), None);
    }

    #[test]
    fn test_eligibility() {
        assert!(ExerciseStatus::Calibrating.is_eligible());
        assert!(ExerciseStatus::ReadyOrDone.is_eligible());
        assert!(!ExerciseStatus::Comparing.is_eligible());
    }

    #[test]
    fn test_active_from_record_uses_category_key() {
        let record = ExerciseRecord {
            id: 4,
            name: "Warrior II".to_string(),
            category: "warrior2".to_string(),
            status: ExerciseStatus::Calibrating,
        };
        let active = ActiveExercise::from(&record);
        assert_eq!(active.key.as_str(), "warrior2");
        assert_eq!(active.mode, ExerciseStatus::Calibrating);
        assert_eq!(active.id, 4);
    }
}
