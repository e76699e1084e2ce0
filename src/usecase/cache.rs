use crate::domain::{appointment::Appointment, notification::NotificationKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheChange {
    Inserted,
    Replaced,
    Removed,
    Unchanged,
}

/// Appointments known to the till, most recently changed first.
#[derive(Debug, Default)]
pub struct AppointmentCache {
    entries: Vec<Appointment>,
}

impl AppointmentCache {
    /// Applies one feed event. Identified appointments are kept unique by id;
    /// unidentified ones can only be added, never matched or removed.
    pub fn reconcile(&mut self, kind: &NotificationKind, appointment: Appointment) -> CacheChange {
        let cancelled = *kind == NotificationKind::Cancelled;

        let Some(id) = appointment.id() else {
            if cancelled {
                return CacheChange::Unchanged;
            }
            self.entries.insert(0, appointment);
            return CacheChange::Inserted;
        };

        let existing = self
            .entries
            .iter()
            .position(|entry| entry.id().as_ref() == Some(&id));

        match (cancelled, existing) {
            (true, Some(index)) => {
                self.entries.remove(index);
                CacheChange::Removed
            }
            (true, None) => CacheChange::Unchanged,
            (false, Some(index)) => {
                self.entries[index] = appointment;
                CacheChange::Replaced
            }
            (false, None) => {
                self.entries.insert(0, appointment);
                CacheChange::Inserted
            }
        }
    }

    pub fn replace_all(&mut self, appointments: Vec<Appointment>) {
        self.entries = appointments;
    }

    pub fn snapshot(&self) -> Vec<Appointment> {
        self.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
