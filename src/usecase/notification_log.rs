use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::domain::notification::{NewNotification, NotificationEvent};

pub const DEFAULT_MAX_NOTIFICATIONS: usize = 25;

/// Newest-first notification history with a fixed capacity. Overflow drops
/// the oldest entries.
#[derive(Debug)]
pub struct NotificationLog {
    entries: VecDeque<NotificationEvent>,
    capacity: usize,
}

impl Default for NotificationLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_NOTIFICATIONS)
    }
}

impl NotificationLog {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Records a notification. Returns `None` when it has no displayable text.
    pub fn push(&mut self, notification: NewNotification, now: DateTime<Utc>) -> Option<NotificationEvent> {
        if notification.message.trim().is_empty() {
            tracing::debug!(kind = %notification.kind, "dropping notification without message");
            return None;
        }

        let event = NotificationEvent {
            id: notification.id.unwrap_or_else(|| now.timestamp_millis()),
            message: notification.message,
            received_at: notification.received_at.unwrap_or(now),
            read: notification.read,
            kind: notification.kind,
            data: notification.data,
        };

        self.entries.push_front(event.clone());
        self.entries.truncate(self.capacity);

        Some(event)
    }

    /// Returns how many entries changed.
    pub fn mark_all_read(&mut self) -> usize {
        let mut changed = 0;
        for entry in self.entries.iter_mut().filter(|e| !e.read) {
            entry.read = true;
            changed += 1;
        }
        changed
    }

    pub fn unread_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.read).count()
    }

    pub fn snapshot(&self) -> Vec<NotificationEvent> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
