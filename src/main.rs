use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use clap::Parser;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hitl_gateway::api::{self, AppState};
use hitl_gateway::config;
use hitl_gateway::delivery::{check_websocket_endpoint, normalize_websocket_url, WsValidator};
use hitl_gateway::hitl::HitlService;
use hitl_gateway::notification::{LogStatusSink, StatusSink, WebhookStatusSink};

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::load()?;
    init_tracing(cfg.hitl.debug)?;

    let args = cli::Cli::parse();

    let result = match args.command {
        Some(cli::Commands::Serve { port }) => {
            let port = port.unwrap_or(cfg.port);
            run_server(cfg, port).await
        }
        Some(cli::Commands::Validate { url }) => validate_command(&cfg, &url),
        Some(cli::Commands::Probe { url }) => probe_command(&cfg, &url).await,
        None => {
            let port = cfg.port;
            run_server(cfg, port).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

fn init_tracing(debug: bool) -> anyhow::Result<()> {
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::{trace as sdktrace, Resource};

    let telemetry_layer = if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic())
            .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "hitl-gateway"),
            ])))
            .install_batch(opentelemetry_sdk::runtime::Tokio)
            .context("failed to install OpenTelemetry tracer")?;
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    let default_filter = if debug {
        "hitl_gateway=debug,hitl=debug,tower_http=debug"
    } else {
        "hitl_gateway=info,hitl=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .with(telemetry_layer)
        .init();
    Ok(())
}

fn build_sink(cfg: &config::Config) -> anyhow::Result<Arc<dyn StatusSink>> {
    match &cfg.status_webhook_url {
        Some(url) => {
            tracing::info!(url = %url, "status updates go to webhook");
            Ok(Arc::new(WebhookStatusSink::new(
                url.clone(),
                cfg.status_webhook_secret.clone(),
            )?))
        }
        None => {
            tracing::info!("HITL_STATUS_WEBHOOK_URL not set, status updates are only logged");
            Ok(Arc::new(LogStatusSink))
        }
    }
}

async fn run_server(cfg: config::Config, port: u16) -> anyhow::Result<()> {
    let sink = build_sink(&cfg)?;
    let service = Arc::new(HitlService::new(cfg.hitl.clone(), sink));
    tracing::info!(
        default_timeout_secs = cfg.hitl.default_timeout,
        allowed_hosts = ?cfg.hitl.allowed_hosts,
        retry_attempts = cfg.hitl.ws_retry_attempts,
        "HITL service initialized"
    );

    let state = Arc::new(AppState {
        service: service.clone(),
    });

    let app = api::api_router(state)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer({
            use axum::http::{HeaderName, Method};
            use tower_http::cors::AllowOrigin;
            let dashboard_origin = std::env::var("DASHBOARD_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:3000".to_string());
            CorsLayer::new()
                .allow_origin(AllowOrigin::predicate(move |origin, _| {
                    let origin_str = origin.to_str().unwrap_or("");
                    origin_str == dashboard_origin
                        || origin_str.starts_with("http://localhost:")
                        || origin_str.starts_with("http://127.0.0.1:")
                }))
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([HeaderName::from_static("content-type")])
        });

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("HITL gateway listening on {}", addr);

    let shutdown_service = service.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
            tracing::info!("shutdown signal received");
            shutdown_service.shutdown();
        })
        .await?;

    Ok(())
}

fn validate_command(cfg: &config::Config, url: &str) -> anyhow::Result<()> {
    let validator = WsValidator::from_config(&cfg.hitl);
    let target = normalize_websocket_url(url).unwrap_or_else(|| url.to_string());
    let info = validator.info(&target);
    println!("{}", serde_json::to_string_pretty(&info)?);
    if !info.valid {
        anyhow::bail!("{} is not an allowed WebSocket destination", target);
    }
    Ok(())
}

async fn probe_command(cfg: &config::Config, url: &str) -> anyhow::Result<()> {
    let validator = WsValidator::from_config(&cfg.hitl);
    let target = normalize_websocket_url(url).unwrap_or_else(|| url.to_string());
    check_websocket_endpoint(&validator, &target)
        .await
        .with_context(|| format!("probe of {} failed", target))?;
    println!("{} is reachable", target);
    Ok(())
}
