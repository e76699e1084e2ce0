use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::Value;

use crate::{
    domain::appointment::{Appointment, AppointmentId},
    repository::errors::RepositoryError,
    usecase::contracts::{AppointmentRepository, TokenProvider},
};

/// Appointment listing served by the booking API.
pub struct HttpAppointmentRepository {
    client: Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
}

impl HttpAppointmentRepository {
    pub fn new(
        base_url: &str,
        tokens: Arc<dyn TokenProvider>,
        timeout: Duration,
    ) -> Result<Self, RepositoryError> {
        let client = Client::builder()
            .user_agent("SalonPOS/1.0")
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
        })
    }

    fn get(&self, path: &str) -> RequestBuilder {
        let request = self.client.get(format!("{}{}", self.base_url, path));
        match self.tokens.access_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, RepositoryError> {
        let response = request.send().await.map_err(|e| {
            tracing::error!(error = %e, "appointments request failed");
            RepositoryError::from(e)
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(RepositoryError::NotFound);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, %body, "appointments API returned error");
            return Err(RepositoryError::Status(status));
        }

        Ok(response)
    }
}

#[async_trait]
impl AppointmentRepository for HttpAppointmentRepository {
    #[tracing::instrument(skip(self))]
    async fn list(&self) -> Result<Vec<Appointment>, RepositoryError> {
        tracing::debug!("fetching appointments");

        let response = self.send(self.get("/appointments")).await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        let appointments = match body {
            Value::Array(items) => items
                .into_iter()
                .filter_map(Appointment::from_value)
                .collect::<Vec<_>>(),
            other => {
                tracing::warn!(kind = json_kind(&other), "appointments listing is not an array, treating as empty");
                Vec::new()
            }
        };

        tracing::debug!(count = appointments.len(), "appointments fetched");
        Ok(appointments)
    }

    #[tracing::instrument(skip(self), fields(appointment_id = %id))]
    async fn find_by_id(&self, id: &AppointmentId) -> Result<Appointment, RepositoryError> {
        tracing::debug!("fetching appointment details");

        let response = self.send(self.get(&format!("/appointments/{id}"))).await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        Appointment::from_value(body)
            .ok_or_else(|| RepositoryError::Decode("appointment is not an object".to_string()))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::session::SessionStore;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn repository(server: &MockServer, token: Option<&str>) -> HttpAppointmentRepository {
        let session = SessionStore::default();
        if let Some(token) = token {
            session.set_access_token(token);
        }
        HttpAppointmentRepository::new(&server.uri(), Arc::new(session), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_list_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/appointments"))
            .and(header("Authorization", "Bearer abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 1, "customer": {"name": "Ana"}},
                {"id": 2, "customer": {"name": "Bo"}},
                "junk"
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let appointments = tokio_test::assert_ok!(repository(&server, Some("abc123")).list().await);

        assert_eq!(appointments.len(), 2);
        assert_eq!(appointments[1].customer_name(), Some("Bo"));
    }

    #[tokio::test]
    async fn test_list_non_array_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/appointments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
            .mount(&server)
            .await;

        let appointments = repository(&server, None).list().await.unwrap();
        assert!(appointments.is_empty());
    }

    #[tokio::test]
    async fn test_list_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/appointments"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let result = repository(&server, None).list().await;
        assert!(matches!(result, Err(RepositoryError::Status(s)) if s == StatusCode::SERVICE_UNAVAILABLE));
    }

    #[tokio::test]
    async fn test_find_by_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/appointments/42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 42,
                "customer": {"name": "Ana", "phone": "555-0100"},
                "services": [{"name": "Haircut", "price": 35}]
            })))
            .mount(&server)
            .await;

        let appointment = repository(&server, Some("t"))
            .find_by_id(&AppointmentId::from(42))
            .await
            .unwrap();

        assert_eq!(appointment.customer_phone(), Some("555-0100"));
        assert_eq!(appointment.services()[0].price, Some(35.0));
    }

    #[tokio::test]
    async fn test_find_by_id_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/appointments/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result = repository(&server, None)
            .find_by_id(&AppointmentId::from("missing"))
            .await;
        assert!(matches!(result, Err(RepositoryError::NotFound)));
    }
}
