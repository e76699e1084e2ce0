use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::domain::appointment::Appointment;

/// Canonical appointment event type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    Created,
    Updated,
    Cancelled,
    Completed,
    Reminder,
    CheckIn,
    NoShow,
    /// Unrecognized tag, lower-cased.
    Other(String),
}

impl NotificationKind {
    /// Maps a free-form event tag onto the canonical set. Rules are checked
    /// in order and the first substring hit wins; `_` and whitespace count
    /// as `-` while matching.
    pub fn normalize(tag: Option<&str>) -> Self {
        let Some(tag) = tag.map(str::trim).filter(|t| !t.is_empty()) else {
            return Self::Created;
        };

        let lowered = tag.to_lowercase();
        let probe: String = lowered
            .chars()
            .map(|c| if c == '_' || c.is_whitespace() { '-' } else { c })
            .collect();
        let has = |needles: &[&str]| needles.iter().any(|n| probe.contains(n));

        if has(&["cancel"]) {
            Self::Cancelled
        } else if has(&["update", "resched", "change"]) {
            Self::Updated
        } else if has(&["complete", "done"]) {
            Self::Completed
        } else if has(&["remind"]) {
            Self::Reminder
        } else if has(&["check-in", "checkin"]) {
            Self::CheckIn
        } else if has(&["no-show", "noshow"]) {
            Self::NoShow
        } else if has(&["create", "new", "add"]) {
            Self::Created
        } else {
            Self::Other(lowered)
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
            Self::Reminder => "reminder",
            Self::CheckIn => "checkin",
            Self::NoShow => "no-show",
            Self::Other(raw) => raw,
        }
    }

    /// Leading phrase of a generated notification sentence.
    pub fn descriptor(&self) -> &'static str {
        match self {
            Self::Created => "New appointment scheduled",
            Self::Updated => "Appointment updated",
            Self::Cancelled => "Appointment cancelled",
            Self::Completed => "Appointment completed",
            Self::Reminder => "Appointment reminder",
            Self::CheckIn => "Appointment check-in",
            Self::NoShow => "Appointment marked as no-show",
            Self::Other(_) => "Appointment update",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for NotificationKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationData {
    pub appointment: Option<Appointment>,
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    pub id: i64,
    pub message: String,
    pub received_at: DateTime<Utc>,
    pub read: bool,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub data: NotificationData,
}

/// A notification before it enters the log. Missing `id` and `received_at`
/// are filled from the clock on insertion.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub id: Option<i64>,
    pub message: String,
    pub received_at: Option<DateTime<Utc>>,
    pub read: bool,
    pub kind: NotificationKind,
    pub data: NotificationData,
}

impl NewNotification {
    pub fn new(message: String, kind: NotificationKind, data: NotificationData) -> Self {
        Self {
            id: None,
            message,
            received_at: None,
            read: false,
            kind,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_rules() {
        let cases = [
            ("Appointment Rescheduled", NotificationKind::Updated),
            ("NO_SHOW", NotificationKind::NoShow),
            ("no show", NotificationKind::NoShow),
            ("Cancel", NotificationKind::Cancelled),
            ("appointment.changed", NotificationKind::Updated),
            ("DONE", NotificationKind::Completed),
            ("reminder_24h", NotificationKind::Reminder),
            ("CHECK_IN", NotificationKind::CheckIn),
            ("customerCheckin", NotificationKind::CheckIn),
            ("new_booking", NotificationKind::Created),
            ("appointment_created", NotificationKind::Created),
        ];

        for (tag, expected) in cases {
            assert_eq!(NotificationKind::normalize(Some(tag)), expected, "tag {tag:?}");
        }
    }

    #[test]
    fn test_normalize_first_rule_wins() {
        // "cancel" outranks "update"
        assert_eq!(
            NotificationKind::normalize(Some("update_cancelled")),
            NotificationKind::Cancelled
        );
    }

    #[test]
    fn test_normalize_absent_and_unknown() {
        assert_eq!(NotificationKind::normalize(None), NotificationKind::Created);
        assert_eq!(NotificationKind::normalize(Some("   ")), NotificationKind::Created);
        assert_eq!(
            NotificationKind::normalize(Some("weird-tag")),
            NotificationKind::Other("weird-tag".to_string())
        );
        assert_eq!(
            NotificationKind::normalize(Some("Weird_Tag")),
            NotificationKind::Other("weird_tag".to_string())
        );
    }

    #[test]
    fn test_kind_serializes_as_canonical_string() {
        let value = serde_json::to_value(NotificationKind::NoShow).unwrap();
        assert_eq!(value, serde_json::json!("no-show"));
        assert_eq!(NotificationKind::CheckIn.to_string(), "checkin");
    }
}
