//! API server entry point.

use std::sync::Arc;

use api::config::{Config, LogFormat};
use api::cookies::SessionCookies;
use api::state::AppState;
use auth::TokenService;
use domain::{EventPublisher, Marketplace, NullEventPublisher};
use messaging::{ConsumerHandle, EventConsumer, NatsEventPublisher};
use metrics_exporter_prometheus::PrometheusHandle;
use store::{InMemoryStore, MarketStore, PostgresStore};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Builds the app over `store` and serves it until a shutdown signal.
async fn serve<S: MarketStore>(
    store: S,
    tokens: Arc<TokenService>,
    events: Arc<dyn EventPublisher>,
    metrics_handle: PrometheusHandle,
    config: &Config,
) {
    let market = Marketplace::new(store, tokens, events);
    let state = Arc::new(AppState::new(
        market,
        SessionCookies::new(config.cookie_secure),
    ));
    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

#[tokio::main]
async fn main() {
    // 1. Configuration and tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Signing keys; the server does not start without them
    let tokens = Arc::new(
        TokenService::from_files(&config.jwt_private_key_path, &config.jwt_public_key_path)
            .expect("failed to load JWT keys"),
    );

    // 4. Event bus: publisher and logging consumer, both optional
    let nats = match &config.nats_url {
        Some(url) => match messaging::connect(url).await {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, order events will be dropped");
                None
            }
        },
        None => {
            tracing::info!("NATS_URL not set, order events will be dropped");
            None
        }
    };

    let publisher = nats
        .clone()
        .map(|client| NatsEventPublisher::new(client, config.order_events_subject.clone()));
    let events: Arc<dyn EventPublisher> = match &publisher {
        Some(publisher) => Arc::new(publisher.clone()),
        None => Arc::new(NullEventPublisher),
    };

    let consumer: Option<ConsumerHandle> = match (&nats, config.event_consumer_enabled) {
        (Some(client), true) => {
            match EventConsumer::new(client.clone(), config.order_events_subject.clone())
                .start()
                .await
            {
                Ok(handle) => Some(handle),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to start event consumer");
                    None
                }
            }
        }
        _ => None,
    };

    // 5. Store and server
    match &config.database_url {
        Some(url) => {
            let store = PostgresStore::connect(url, config.database_max_connections)
                .await
                .expect("failed to connect to database");
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            serve(store, tokens, events, metrics_handle, &config).await;
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            serve(InMemoryStore::new(), tokens, events, metrics_handle, &config).await;
        }
    }

    // 6. Drain the event bus
    if let Some(consumer) = consumer {
        consumer.stop().await;
    }
    if let Some(publisher) = publisher {
        publisher.flush().await;
    }

    tracing::info!("server shut down gracefully");
}
