use std::sync::Arc;

use appointment_notifier::config::AppConfig;
use appointment_notifier::delivery::ws::WebSocketTransport;
use appointment_notifier::repository::http::HttpAppointmentRepository;
use appointment_notifier::repository::session::SessionStore;
use appointment_notifier::telemetry;
use appointment_notifier::usecase::contracts::SystemClock;
use appointment_notifier::usecase::notifications::NotificationClient;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _telemetry = telemetry::init(&config.telemetry_config(), env_filter, config.telemetry_enabled)?;

    tracing::info!("starting the appointment notifier");

    PrometheusBuilder::new()
        .with_http_listener(config.metrics_listen_addr)
        .install()?;
    tracing::info!(addr = %config.metrics_listen_addr, "prometheus metrics initialized");

    let session = Arc::new(SessionStore::default());
    if let Some(token) = config.access_token.as_deref().filter(|t| !t.is_empty()) {
        session.set_access_token(token);
    }

    let repository = HttpAppointmentRepository::new(
        &config.api_base_url,
        session.clone(),
        config.http_timeout(),
    )?;
    let client = NotificationClient::new(
        config.client_settings(),
        repository,
        WebSocketTransport::new(),
        session,
        Arc::new(SystemClock),
    );

    let mut notifications = client.subscribe();
    client.start();

    match client.refresh_appointments().await {
        Ok(appointments) => tracing::info!(count = appointments.len(), "initial appointments loaded"),
        Err(e) => tracing::warn!(error = %e, retryable = e.is_retryable(), "failed to load appointments"),
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "failed to listen for ctrl-c");
                }
                break;
            }
            received = notifications.recv() => match received {
                Ok(notification) => {
                    tracing::info!(
                        id = notification.id,
                        kind = %notification.kind,
                        unread = client.unread_count(),
                        cached = client.cached_appointments().len(),
                        "{}",
                        notification.message
                    );
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "notification subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    client.shutdown();
    tracing::info!("appointment notifier stopped");

    Ok(())
}
