use crate::domain::{
    appointment::Appointment, envelope::IncomingEnvelope, notification::NotificationKind,
};

pub const FALLBACK_MESSAGE: &str = "Appointment update received.";

/// Display text for a feed frame: the sender's own text when it has one,
/// otherwise a sentence describing the appointment, otherwise a generic line.
pub fn resolve_message(
    envelope: &IncomingEnvelope,
    kind: &NotificationKind,
    appointment: Option<&Appointment>,
) -> String {
    envelope
        .explicit_message()
        .or_else(|| appointment.map(|a| describe(kind, a)))
        .unwrap_or_else(|| FALLBACK_MESSAGE.to_string())
}

/// e.g. `Appointment cancelled for Ana (5/3/2024 • 10:00 - 11:00). Services: Haircut.`
pub fn describe(kind: &NotificationKind, appointment: &Appointment) -> String {
    let customer = appointment.customer_name().unwrap_or("a customer");

    let mut details = Vec::new();
    if let Some(date) = appointment.date() {
        details.push(date.format("%-m/%-d/%Y").to_string());
    }
    match (appointment.start_time(), appointment.end_time()) {
        (Some(start), Some(end)) => details.push(format!("{start} - {end}")),
        (Some(start), None) => details.push(start.to_string()),
        _ => {}
    }

    let mut message = format!("{} for {}", kind.descriptor(), customer);
    if !details.is_empty() {
        message.push_str(&format!(" ({})", details.join(" • ")));
    }
    message.push('.');

    let services: Vec<String> = appointment.services().into_iter().map(|s| s.name).collect();
    if !services.is_empty() {
        message.push_str(&format!(" Services: {}.", services.join(", ")));
    }

    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cancelled_structured_payload_without_message() {
        let envelope = IncomingEnvelope::parse(
            &json!({"type": "cancelled", "data": {"id": 7, "customer": {"name": "J"}}}).to_string(),
        );
        let kind = NotificationKind::normalize(envelope.type_tag().as_deref());
        let appointment = envelope.appointment();

        let message = resolve_message(&envelope, &kind, appointment.as_ref());

        assert_eq!(message, "Appointment cancelled for J.");
    }

    #[test]
    fn test_plain_text_is_used_verbatim() {
        let envelope = IncomingEnvelope::parse("Ana checked in early");
        let message = resolve_message(&envelope, &NotificationKind::Created, None);
        assert_eq!(message, "Ana checked in early");
    }

    #[test]
    fn test_explicit_message_wins() {
        let envelope = IncomingEnvelope::parse(
            &json!({"type": "new", "message": "Booked online", "appointment": {"id": 1}}).to_string(),
        );
        let appointment = envelope.appointment();
        assert_eq!(
            resolve_message(&envelope, &NotificationKind::Created, appointment.as_ref()),
            "Booked online"
        );
    }

    #[test]
    fn test_fallback_without_appointment_or_message() {
        let envelope = IncomingEnvelope::parse(&json!({"type": "cancelled"}).to_string());
        assert_eq!(
            resolve_message(&envelope, &NotificationKind::Cancelled, None),
            FALLBACK_MESSAGE
        );
    }

    #[test]
    fn test_describe_full_appointment() {
        let appointment = Appointment::from_value(json!({
            "id": 3,
            "customer": {"name": "Ana"},
            "date": "2024-05-03",
            "startTime": "10:00",
            "endTime": "11:00",
            "services": [{"name": "Haircut", "price": 35}, {"name": "Color", "price": 80}]
        }))
        .unwrap();

        assert_eq!(
            describe(&NotificationKind::Updated, &appointment),
            "Appointment updated for Ana (5/3/2024 • 10:00 - 11:00). Services: Haircut, Color."
        );
    }

    #[test]
    fn test_describe_sparse_appointment() {
        let appointment = Appointment::from_value(json!({"startTime": "9:30"})).unwrap();
        assert_eq!(
            describe(&NotificationKind::Other("moved".to_string()), &appointment),
            "Appointment update for a customer (9:30)."
        );
    }
}
