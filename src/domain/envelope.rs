use serde_json::{Map, Value};

use crate::domain::appointment::Appointment;

/// Fields that may carry the event type, in priority order.
const TYPE_FIELDS: [&str; 5] = ["type", "event", "eventType", "action", "status"];

/// Fields that may carry the appointment, in priority order.
/// `details.appointment` is checked after these.
const APPOINTMENT_FIELDS: [&str; 3] = ["appointment", "data", "payload"];

/// A frame received from the appointment feed.
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingEnvelope {
    /// The frame decoded to a JSON object.
    Structured(Map<String, Value>),
    /// Anything else, kept verbatim.
    Text(String),
}

impl IncomingEnvelope {
    pub fn parse(frame: &str) -> Self {
        match serde_json::from_str::<Value>(frame) {
            Ok(Value::Object(fields)) => Self::Structured(fields),
            Ok(Value::String(text)) => Self::Text(text),
            Ok(_) | Err(_) => Self::Text(frame.to_string()),
        }
    }

    pub fn type_tag(&self) -> Option<String> {
        let Self::Structured(fields) = self else {
            return None;
        };

        TYPE_FIELDS
            .iter()
            .filter_map(|key| fields.get(*key))
            .find(|v| is_populated(v))
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
    }

    /// The sender-supplied display text, if it has any non-blank content.
    pub fn explicit_message(&self) -> Option<String> {
        let text = match self {
            Self::Text(raw) => raw.clone(),
            Self::Structured(fields) => match fields.get("message").filter(|v| is_populated(v))? {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            },
        };

        (!text.trim().is_empty()).then_some(text)
    }

    /// Resolves the appointment carried by the frame. The first populated
    /// slot wins even when it is not an object, in which case there is no
    /// appointment. A bare object with both `id` and `customer` counts as the
    /// appointment itself.
    pub fn appointment(&self) -> Option<Appointment> {
        let Self::Structured(fields) = self else {
            return None;
        };

        let nested = fields
            .get("details")
            .filter(|d| is_populated(d))
            .and_then(|d| d.get("appointment"));

        let slot = APPOINTMENT_FIELDS
            .iter()
            .filter_map(|key| fields.get(*key))
            .chain(nested)
            .find(|v| is_populated(v));

        match slot {
            Some(value) => Appointment::from_value(value.clone()),
            None if looks_like_appointment(fields) => {
                Appointment::from_value(Value::Object(fields.clone()))
            }
            None => None,
        }
    }

    pub fn raw(&self) -> Value {
        match self {
            Self::Structured(fields) => Value::Object(fields.clone()),
            Self::Text(raw) => Value::String(raw.clone()),
        }
    }
}

fn looks_like_appointment(fields: &Map<String, Value>) -> bool {
    ["id", "customer"]
        .iter()
        .all(|key| fields.get(*key).is_some_and(is_populated))
}

/// Loose truthiness as used by the booking server's payloads.
fn is_populated(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::appointment::AppointmentId;
    use serde_json::json;

    fn structured(value: Value) -> IncomingEnvelope {
        IncomingEnvelope::parse(&value.to_string())
    }

    #[test]
    fn test_parse_object_and_text() {
        assert!(matches!(IncomingEnvelope::parse(r#"{"type":"new"}"#), IncomingEnvelope::Structured(_)));
        assert_eq!(
            IncomingEnvelope::parse("Walk-in at 3pm"),
            IncomingEnvelope::Text("Walk-in at 3pm".to_string())
        );
        assert_eq!(IncomingEnvelope::parse("42"), IncomingEnvelope::Text("42".to_string()));
        assert_eq!(IncomingEnvelope::parse("{broken"), IncomingEnvelope::Text("{broken".to_string()));
    }

    #[test]
    fn test_json_string_frame_is_decoded() {
        let envelope = IncomingEnvelope::parse(r#""Ana is running \"late\"""#);
        assert_eq!(envelope, IncomingEnvelope::Text(r#"Ana is running "late""#.to_string()));
        assert_eq!(envelope.explicit_message().as_deref(), Some(r#"Ana is running "late""#));
    }

    #[test]
    fn test_type_tag_priority() {
        let envelope = structured(json!({"status": "done", "action": "cancel", "event": ""}));
        assert_eq!(envelope.type_tag().as_deref(), Some("cancel"));

        let envelope = structured(json!({"type": "created", "event": "cancel"}));
        assert_eq!(envelope.type_tag().as_deref(), Some("created"));

        assert_eq!(structured(json!({"message": "hi"})).type_tag(), None);
        assert_eq!(IncomingEnvelope::Text("cancel".to_string()).type_tag(), None);
    }

    #[test]
    fn test_appointment_slot_priority() {
        let envelope = structured(json!({
            "payload": {"id": 3},
            "data": {"id": 2},
            "appointment": {"id": 1},
            "details": {"appointment": {"id": 4}}
        }));
        assert_eq!(envelope.appointment().unwrap().id(), Some(AppointmentId::from(1)));

        let envelope = structured(json!({
            "appointment": null,
            "data": {"id": 2},
            "payload": {"id": 3}
        }));
        assert_eq!(envelope.appointment().unwrap().id(), Some(AppointmentId::from(2)));

        let envelope = structured(json!({"details": {"appointment": {"id": 4}}}));
        assert_eq!(envelope.appointment().unwrap().id(), Some(AppointmentId::from(4)));
    }

    #[test]
    fn test_appointment_from_bare_message() {
        let envelope = structured(json!({"id": 9, "customer": {"name": "Ana"}, "type": "update"}));
        let appointment = envelope.appointment().unwrap();
        assert_eq!(appointment.id(), Some(AppointmentId::from(9)));
        assert_eq!(appointment.customer_name(), Some("Ana"));

        let envelope = structured(json!({"id": 9, "type": "update"}));
        assert!(envelope.appointment().is_none());
    }

    #[test]
    fn test_populated_non_object_slot_yields_nothing() {
        let envelope = structured(json!({"data": "refresh", "payload": {"id": 3}}));
        assert!(envelope.appointment().is_none());
    }

    #[test]
    fn test_explicit_message() {
        assert_eq!(
            structured(json!({"message": "Ana is here"})).explicit_message().as_deref(),
            Some("Ana is here")
        );
        assert_eq!(structured(json!({"message": "   "})).explicit_message(), None);
        assert_eq!(
            structured(json!({"message": {"text": "x"}})).explicit_message().as_deref(),
            Some(r#"{"text":"x"}"#)
        );
        assert_eq!(
            IncomingEnvelope::Text("plain".to_string()).explicit_message().as_deref(),
            Some("plain")
        );
    }
}
