pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use axum::middleware::from_fn;
use axum::{
    routing::{get, post},
    Router,
};
use mongodb::{options::ClientOptions, Client};
use secrecy::ExposeSecret;
use service_core::middleware::{
    metrics::metrics_middleware, tracing::request_id_middleware,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use config::Config;
use services::{LateFeePolicy, PaymentLifecycle, PaymentRepository, RazorpayClient};

/// Concrete lifecycle wiring: MongoDB store, Razorpay gateway.
pub type Lifecycle = PaymentLifecycle<PaymentRepository, RazorpayClient>;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub repository: PaymentRepository,
    pub lifecycle: Lifecycle,
}

pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        let mut client_options = ClientOptions::parse(config.database.url.expose_secret()).await?;
        client_options.app_name = Some(config.service_name.clone());

        let client = Client::with_options(client_options)?;
        let db = client.database(&config.database.db_name);

        let repository = PaymentRepository::new(&db);
        repository.init_indexes().await?;

        let razorpay = RazorpayClient::new(config.razorpay.clone());
        if razorpay.is_configured() {
            tracing::info!("Razorpay client initialized");
        } else {
            tracing::warn!("Razorpay credentials not configured - payment features will be limited");
        }

        let lifecycle = PaymentLifecycle::new(
            repository.clone(),
            razorpay,
            LateFeePolicy {
                daily_rate: config.billing.late_fee_daily_rate,
            },
            config.billing.currency.clone(),
        );

        let state = AppState {
            config: config.clone(),
            repository,
            lifecycle,
        };

        let router = Router::new()
            .route("/health", get(handlers::health_check))
            .route("/ready", get(handlers::readiness_check))
            .route("/metrics", get(handlers::metrics))
            // Tenant-scoped reads
            .route(
                "/tenants/:tenant_id/obligation",
                get(handlers::payments::get_obligation),
            )
            .route(
                "/tenants/:tenant_id/payments",
                get(handlers::payments::list_payments),
            )
            .route(
                "/tenants/:tenant_id/payments/pending",
                get(handlers::payments::list_pending),
            )
            .route(
                "/tenants/:tenant_id/payments/stats",
                get(handlers::payments::get_stats),
            )
            // Gateway order flow
            .route("/payments/order", post(handlers::payments::create_order))
            .route("/payments/verify", post(handlers::payments::verify_payment))
            // Periodic trigger
            .route("/payments/sweep", post(handlers::payments::sweep_overdue))
            .layer(from_fn(metrics_middleware))
            .layer(from_fn(request_id_middleware))
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or("-");

                    tracing::info_span!(
                        "http_request",
                        request_id = %request_id,
                        method = %request.method(),
                        uri = %request.uri(),
                        version = ?request.version(),
                    )
                }),
            )
            .with_state(state);

        // Port 0 binds a random port for tests.
        let addr = format!("{}:{}", config.server.host, config.server.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        Ok(Self {
            port,
            listener,
            router,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> anyhow::Result<()> {
        tracing::info!("Listening on port {}", self.port);
        axum::serve(self.listener, self.router).await?;
        Ok(())
    }
}
