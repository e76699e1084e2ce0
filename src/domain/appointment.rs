use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Keys an appointment identifier may live under, in resolution order.
const ID_KEYS: [&str; 3] = ["id", "_id", "appointmentId"];

#[derive(Debug, Clone, PartialEq)]
pub enum AppointmentId {
    Number(serde_json::Number),
    Text(String),
}

impl AppointmentId {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(Self::Number(n.clone())),
            Value::String(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for AppointmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for AppointmentId {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<&str> for AppointmentId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceLine {
    pub name: String,
    pub price: Option<f64>,
}

/// An appointment as owned by the booking server.
///
/// The record is kept verbatim so consumers see exactly what the server sent;
/// the accessors below expose the fields the till cares about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Appointment(Map<String, Value>);

impl Appointment {
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self(fields)),
            _ => None,
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn id(&self) -> Option<AppointmentId> {
        ID_KEYS
            .iter()
            .filter_map(|key| self.0.get(*key))
            .find_map(AppointmentId::from_value)
    }

    pub fn customer_name(&self) -> Option<&str> {
        self.customer_field("name")
    }

    pub fn customer_phone(&self) -> Option<&str> {
        self.customer_field("phone")
    }

    /// Calendar day of the appointment. Accepts ISO dates, ISO date-times
    /// and epoch milliseconds; anything else is treated as absent.
    pub fn date(&self) -> Option<NaiveDate> {
        match self.0.get("date")? {
            Value::String(raw) => parse_date(raw),
            Value::Number(ms) => ms
                .as_i64()
                .and_then(DateTime::from_timestamp_millis)
                .map(|dt| dt.date_naive()),
            _ => None,
        }
    }

    pub fn start_time(&self) -> Option<&str> {
        non_empty_str(self.0.get("startTime"))
    }

    pub fn end_time(&self) -> Option<&str> {
        non_empty_str(self.0.get("endTime"))
    }

    pub fn services(&self) -> Vec<ServiceLine> {
        match self.0.get("services") {
            Some(Value::Array(entries)) => entries.iter().filter_map(service_line).collect(),
            _ => Vec::new(),
        }
    }

    fn customer_field(&self, key: &str) -> Option<&str> {
        non_empty_str(self.0.get("customer")?.get(key))
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.date_naive())
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").map(|dt| dt.date()))
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()
}

// Services arrive either as `{name, price}` objects (sometimes `title`
// instead of `name`, sometimes a string price) or as bare labels.
fn service_line(value: &Value) -> Option<ServiceLine> {
    match value {
        Value::String(label) if !label.is_empty() => Some(ServiceLine {
            name: label.clone(),
            price: None,
        }),
        Value::Number(n) => Some(ServiceLine {
            name: n.to_string(),
            price: None,
        }),
        Value::Object(fields) => {
            let name = non_empty_str(fields.get("name"))
                .or_else(|| non_empty_str(fields.get("title")))?;
            let price = match fields.get("price") {
                Some(Value::Number(n)) => n.as_f64(),
                Some(Value::String(s)) => s.trim().parse().ok(),
                _ => None,
            };
            Some(ServiceLine {
                name: name.to_string(),
                price,
            })
        }
        _ => None,
    }
}
